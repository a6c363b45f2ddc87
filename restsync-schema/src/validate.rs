//! Item validation.
//!
//! Validation is pass/fail per field: a validator returns the list of
//! failing top-level fields with a message each. Rule semantics beyond
//! that are up to the validator; [`BasicValidator`] covers the rules the
//! schema can express.

use crate::introspect::field_display_name;
use crate::node::{FieldDescriptor, FieldType, ObjectSchema, Rule, SchemaNode};
use restsync_types::{is_defined, Item, IID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_name: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            message: message.into(),
        }
    }
}

/// Side-channel context for cross-field and cross-entity rules.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// The root schema.
    pub schema: &'a SchemaNode,
    /// The whole store as a nested plain tree, IIDs stripped.
    pub data: &'a Value,
}

/// Validates one clean item (IID stripped) against its item schema.
///
/// Implement this to add rules the schema cannot express. Most callers use
/// [`BasicValidator`].
pub trait ItemValidator: Send + Sync {
    fn validate(
        &self,
        item_schema: &ObjectSchema,
        item: &Item,
        context: &ValidationContext<'_>,
    ) -> Vec<ValidationError>;
}

/// Checks presence, primitive type, allowed values, `min`/`max`, `uri`,
/// and rejects fields the schema does not declare.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl ItemValidator for BasicValidator {
    fn validate(
        &self,
        item_schema: &ObjectSchema,
        item: &Item,
        _context: &ValidationContext<'_>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for field in &item_schema.fields {
            let value = item.get(&field.name).filter(|v| is_defined(v));
            match &field.schema {
                SchemaNode::Object(_) => {
                    if value.is_some_and(|v| !v.is_object()) {
                        errors.push(ValidationError::new(
                            &field.name,
                            format!("\"{}\" must be an object", field_display_name(&field.name, None)),
                        ));
                    }
                }
                SchemaNode::Array(_) => {
                    if value.is_some_and(|v| !v.is_array()) {
                        errors.push(ValidationError::new(
                            &field.name,
                            format!("\"{}\" must be an array", field_display_name(&field.name, None)),
                        ));
                    }
                }
                node => {
                    if let Some(desc) = crate::normalize_conditional(node) {
                        if let Some(message) = check_field(&field.name, desc, value) {
                            errors.push(ValidationError::new(&field.name, message));
                        }
                    }
                }
            }
        }

        for name in item.keys() {
            if name != IID_FIELD && item_schema.field(name).is_none() {
                errors.push(ValidationError::new(
                    name,
                    format!("\"{name}\" is not allowed"),
                ));
            }
        }

        errors
    }
}

fn check_field(name: &str, desc: &FieldDescriptor, value: Option<&Value>) -> Option<String> {
    let label = field_display_name(name, Some(desc));
    let Some(value) = value else {
        return desc
            .is_required()
            .then(|| format!("\"{label}\" is required"));
    };

    if desc.allows(value) {
        return None;
    }
    if desc.allow_only && !desc.valids.is_empty() {
        let listed: Vec<String> = desc.valids.iter().map(Value::to_string).collect();
        return Some(format!("\"{label}\" must be one of [{}]", listed.join(", ")));
    }

    if !type_matches(desc.field_type, value) {
        return Some(format!("\"{label}\" must be a {}", type_name(desc.field_type)));
    }

    for rule in &desc.rules {
        match rule {
            Rule::Min { limit } => match value {
                Value::Number(n) if n.as_f64().is_some_and(|x| x < *limit) => {
                    return Some(format!("\"{label}\" must be greater than or equal to {limit}"));
                }
                Value::String(s) if (s.chars().count() as f64) < *limit => {
                    return Some(format!(
                        "\"{label}\" length must be at least {limit} characters long"
                    ));
                }
                _ => {}
            },
            Rule::Max { limit } => match value {
                Value::Number(n) if n.as_f64().is_some_and(|x| x > *limit) => {
                    return Some(format!("\"{label}\" must be less than or equal to {limit}"));
                }
                Value::String(s) if (s.chars().count() as f64) > *limit => {
                    return Some(format!(
                        "\"{label}\" length must be less than or equal to {limit} characters long"
                    ));
                }
                _ => {}
            },
            Rule::Uri => {
                if !value.as_str().is_some_and(looks_like_uri) {
                    return Some(format!("\"{label}\" must be a valid uri"));
                }
            }
            Rule::Pk | Rule::Fk { .. } | Rule::Format { .. } | Rule::Unknown => {}
        }
    }
    None
}

fn type_matches(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String | FieldType::Date => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Any => true,
    }
}

const fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Date => "valid date",
        FieldType::Number => "number",
        FieldType::Integer => "integer",
        FieldType::Boolean => "boolean",
        FieldType::Any => "value",
    }
}

/// `scheme://rest`, scheme starting with a letter.
fn looks_like_uri(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
}
