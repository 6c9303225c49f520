//! Generated-identifier helpers
//!
//! Producers behind the `generated` field strategies: uuid v4, cuid, and
//! millisecond timestamps.

use crate::record::now_millis;
use rand::Rng;

/// Random UUID v4, hyphenated lowercase.
pub fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Collision-resistant id: `c` followed by 32 random hex characters.
pub fn cuid() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(33);
    out.push('c');
    for _ in 0..32 {
        let nibble: usize = rng.gen_range(0..16);
        out.push(HEX[nibble] as char);
    }
    out
}

/// Current wall-clock milliseconds, for `timestamp`-generated fields.
pub fn timestamp_id() -> i64 {
    now_millis()
}
