//! Bucket definitions and field specifications
//!
//! A [`BucketDefinition`] is immutable after registration: the primary-key
//! field, the schema (field name → [`FieldSpec`]), optional secondary
//! indexes, optional TTL and capacity, a persistence flag, and the storage
//! ordering hint. Builders keep schema literals readable in application code
//! and tests.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Value type a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// A date: accepted as a timestamp number or a string.
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in string format checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Url,
    IsoDate,
}

impl StringFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Url => "url",
            StringFormat::IsoDate => "iso-date",
        }
    }
}

/// Strategy for producing a value when the caller omits the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedStrategy {
    /// Random UUID v4 string
    Uuid,
    /// `c` followed by 32 random hex characters
    Cuid,
    /// Next value of the bucket's monotone counter
    Autoincrement,
    /// Current wall-clock milliseconds
    Timestamp,
}

/// Default for an absent field: a fixed value or a producer invoked per
/// record (so mutable defaults are distinct per record).
#[derive(Clone)]
pub enum DefaultValue {
    Fixed(Value),
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Fixed(v) => v.clone(),
            DefaultValue::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            DefaultValue::Producer(_) => f.debug_tuple("Producer").field(&"<fn>").finish(),
        }
    }
}

/// Specification of a single schema field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    /// Allowed values (strict equality)
    pub allowed: Option<Vec<Value>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Regex source; anchor-less, so callers anchor themselves
    pub pattern: Option<String>,
    pub format: Option<StringFormat>,
    pub default: Option<DefaultValue>,
    pub generated: Option<GeneratedStrategy>,
    /// Documentation-only reference to another bucket; never enforced
    pub reference: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            unique: false,
            allowed: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
            default: None,
            generated: None,
            reference: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn array() -> Self {
        Self::new(FieldType::Array)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn pattern(mut self, source: impl Into<String>) -> Self {
        self.pattern = Some(source.into());
        self
    }

    pub fn format(mut self, format: StringFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Fixed(value));
        self
    }

    pub fn default_with(mut self, producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    pub fn generated(mut self, strategy: GeneratedStrategy) -> Self {
        self.generated = Some(strategy);
        self
    }

    pub fn reference(mut self, bucket: impl Into<String>) -> Self {
        self.reference = Some(bucket.into());
        self
    }
}

/// Storage-ordering hint for a bucket's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageOrder {
    /// Insertion order (the default)
    #[default]
    Unordered,
    /// Ascending primary-key order
    OrderedByKey,
}

/// Immutable definition of a bucket.
///
/// Schema fields keep their declaration order so validation issues come out
/// in a stable, schema-declared order.
#[derive(Debug, Clone)]
pub struct BucketDefinition {
    /// Name of the primary-key field
    pub key_field: String,
    /// Field name → spec, in declaration order
    pub schema: Vec<(String, FieldSpec)>,
    /// Secondary-index fields (unique fields are indexed implicitly)
    pub indexes: Vec<String>,
    /// Per-record time-to-live in milliseconds
    pub ttl_ms: Option<i64>,
    /// Capacity cap; inserting past it evicts the oldest record
    pub max_size: Option<usize>,
    /// Whether the bucket participates in store persistence (default yes
    /// when the store has persistence configured)
    pub persistent: bool,
    pub order: StorageOrder,
}

impl BucketDefinition {
    pub fn builder(key_field: impl Into<String>) -> BucketDefinitionBuilder {
        BucketDefinitionBuilder {
            def: BucketDefinition {
                key_field: key_field.into(),
                schema: Vec::new(),
                indexes: Vec::new(),
                ttl_ms: None,
                max_size: None,
                persistent: true,
                order: StorageOrder::Unordered,
            },
        }
    }

    /// Look up a field's spec.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.schema
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    /// Every field that carries an index: the declared secondary indexes
    /// plus every `unique` field, deduplicated, in declaration order.
    pub fn indexed_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for name in &self.indexes {
            if !fields.contains(name) {
                fields.push(name.clone());
            }
        }
        for (name, spec) in &self.schema {
            if spec.unique && !fields.contains(name) {
                fields.push(name.clone());
            }
        }
        fields
    }

    /// Fields enforcing uniqueness.
    pub fn unique_fields(&self) -> Vec<String> {
        self.schema
            .iter()
            .filter(|(_, spec)| spec.unique)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Builder for [`BucketDefinition`].
pub struct BucketDefinitionBuilder {
    def: BucketDefinition,
}

impl BucketDefinitionBuilder {
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.def.schema.push((name.into(), spec));
        self
    }

    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.def.indexes.push(field.into());
        self
    }

    pub fn ttl_ms(mut self, ttl: i64) -> Self {
        self.def.ttl_ms = Some(ttl);
        self
    }

    pub fn max_size(mut self, max: usize) -> Self {
        self.def.max_size = Some(max);
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.def.persistent = false;
        self
    }

    pub fn ordered_by_key(mut self) -> Self {
        self.def.order = StorageOrder::OrderedByKey;
        self
    }

    pub fn build(self) -> BucketDefinition {
        self.def
    }
}
