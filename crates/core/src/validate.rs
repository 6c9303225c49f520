//! Schema validation and record preparation
//!
//! [`SchemaValidator`] is compiled once per bucket from its definition
//! (pattern regexes are built here, so a bad pattern fails registration, not
//! the first insert). It prepares records for insertion or update: generated
//! fields, defaults, metadata stamping, then validation that collects every
//! violated constraint before failing.

use crate::error::{IssueCode, StoreError, StoreResult, ValidationIssue};
use crate::format;
use crate::ids;
use crate::record::{now_millis, Fields, Record, FIELD_CREATED_AT, FIELD_UPDATED_AT, FIELD_VERSION};
use crate::schema::{BucketDefinition, FieldSpec, FieldType, GeneratedStrategy, StringFormat};
use regex::Regex;
use serde_json::Value;

struct PreparedField {
    name: String,
    spec: FieldSpec,
    pattern: Option<Regex>,
}

/// Per-bucket validator with pre-compiled constraint machinery.
pub struct SchemaValidator {
    bucket: String,
    key_field: String,
    fields: Vec<PreparedField>,
}

impl SchemaValidator {
    /// Compile a validator from a bucket definition.
    ///
    /// Fails with [`StoreError::InvalidDefinition`] when a `pattern` source
    /// does not compile.
    pub fn new(bucket: &str, definition: &BucketDefinition) -> StoreResult<Self> {
        let mut fields = Vec::with_capacity(definition.schema.len());
        for (name, spec) in &definition.schema {
            let pattern = match &spec.pattern {
                Some(source) => Some(Regex::new(source).map_err(|e| {
                    StoreError::invalid_definition(
                        bucket,
                        format!("field '{}' pattern does not compile: {}", name, e),
                    )
                })?),
                None => None,
            };
            fields.push(PreparedField {
                name: name.clone(),
                spec: spec.clone(),
                pattern,
            });
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key_field: definition.key_field.clone(),
            fields,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Field names carrying a `generated` strategy.
    pub fn generated_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.spec.generated.is_some())
            .map(|f| f.name.as_str())
    }

    /// Prepare a record for insertion.
    ///
    /// Absent generated fields are produced (`next_autoincrement` supplies
    /// counter values), absent fields with defaults are filled, metadata is
    /// stamped (`_version` 1, `_createdAt` = `_updatedAt` = now), and the
    /// result is validated. Fields not named in the schema pass through.
    pub fn prepare_insert(
        &self,
        input: Fields,
        next_autoincrement: &mut dyn FnMut() -> i64,
    ) -> StoreResult<Record> {
        let mut fields = input;

        for prepared in &self.fields {
            if fields.contains_key(&prepared.name) {
                continue;
            }
            if let Some(strategy) = prepared.spec.generated {
                let value = match strategy {
                    GeneratedStrategy::Uuid => Value::from(ids::uuid_v4()),
                    GeneratedStrategy::Cuid => Value::from(ids::cuid()),
                    GeneratedStrategy::Autoincrement => Value::from(next_autoincrement()),
                    GeneratedStrategy::Timestamp => Value::from(ids::timestamp_id()),
                };
                fields.insert(prepared.name.clone(), value);
            }
        }

        for prepared in &self.fields {
            if fields.contains_key(&prepared.name) {
                continue;
            }
            if let Some(default) = &prepared.spec.default {
                fields.insert(prepared.name.clone(), default.produce());
            }
        }

        let now = now_millis();
        fields.insert(FIELD_VERSION.to_string(), Value::from(1));
        fields.insert(FIELD_CREATED_AT.to_string(), Value::from(now));
        fields.insert(FIELD_UPDATED_AT.to_string(), Value::from(now));

        self.validate(&fields)?;
        Ok(Record::new(fields))
    }

    /// Prepare an updated record.
    ///
    /// The primary key, generated fields, and metadata are stripped from
    /// `changes`; the rest merges over `existing`. `_version` bumps by one,
    /// `_updatedAt` advances, `_createdAt` is preserved.
    pub fn prepare_update(&self, existing: &Record, changes: Fields) -> StoreResult<Record> {
        let mut fields = existing.fields().clone();

        for (name, value) in changes {
            if name == self.key_field
                || name == FIELD_VERSION
                || name == FIELD_CREATED_AT
                || name == FIELD_UPDATED_AT
            {
                continue;
            }
            if self
                .fields
                .iter()
                .any(|f| f.name == name && f.spec.generated.is_some())
            {
                continue;
            }
            fields.insert(name, value);
        }

        fields.insert(
            FIELD_VERSION.to_string(),
            Value::from(existing.version() + 1),
        );
        fields.insert(FIELD_UPDATED_AT.to_string(), Value::from(now_millis()));
        fields.insert(
            FIELD_CREATED_AT.to_string(),
            Value::from(existing.created_at()),
        );

        self.validate(&fields)?;
        Ok(Record::new(fields))
    }

    /// Validate a field map against the schema, collecting every violation.
    pub fn validate(&self, fields: &Fields) -> StoreResult<()> {
        let mut issues = Vec::new();

        for prepared in &self.fields {
            let value = fields.get(&prepared.name);
            let absent = matches!(value, None | Some(Value::Null));

            if absent {
                if prepared.spec.required {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        "required field is missing",
                        IssueCode::Required,
                    ));
                }
                continue;
            }
            let value = match value {
                Some(value) => value,
                None => continue,
            };

            if !type_matches(prepared.spec.field_type, value) {
                issues.push(ValidationIssue::new(
                    &prepared.name,
                    format!("expected {}", prepared.spec.field_type),
                    IssueCode::Type,
                ));
                continue;
            }

            self.check_constraints(prepared, value, &mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(StoreError::validation(&self.bucket, issues))
        }
    }

    fn check_constraints(
        &self,
        prepared: &PreparedField,
        value: &Value,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let spec = &prepared.spec;

        if let Some(allowed) = &spec.allowed {
            if !allowed.iter().any(|a| crate::equality::deep_equal(a, value)) {
                issues.push(ValidationIssue::new(
                    &prepared.name,
                    "value is not in the allowed set",
                    IssueCode::Enum,
                ));
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = spec.min {
                if number < min {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        format!("value is below minimum {}", min),
                        IssueCode::Min,
                    ));
                }
            }
            if let Some(max) = spec.max {
                if number > max {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        format!("value is above maximum {}", max),
                        IssueCode::Max,
                    ));
                }
            }
        }

        if let Some(text) = value.as_str() {
            let len = text.chars().count();
            if let Some(min_length) = spec.min_length {
                if len < min_length {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        format!("length is below minimum {}", min_length),
                        IssueCode::MinLength,
                    ));
                }
            }
            if let Some(max_length) = spec.max_length {
                if len > max_length {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        format!("length is above maximum {}", max_length),
                        IssueCode::MaxLength,
                    ));
                }
            }
            if let Some(pattern) = &prepared.pattern {
                if !pattern.is_match(text) {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        format!("value does not match pattern {}", pattern.as_str()),
                        IssueCode::Pattern,
                    ));
                }
            }
            if let Some(fmt) = spec.format {
                let ok = match fmt {
                    StringFormat::Email => format::is_email(text),
                    StringFormat::Url => format::is_url(text),
                    StringFormat::IsoDate => format::is_iso_date(text),
                };
                if !ok {
                    issues.push(ValidationIssue::new(
                        &prepared.name,
                        format!("value is not a valid {}", fmt.as_str()),
                        IssueCode::Format,
                    ));
                }
            }
        }
    }
}

fn type_matches(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
        FieldType::Date => value.is_number() || value.is_string(),
    }
}
