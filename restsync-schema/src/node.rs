use crate::error::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version of the JSON schema document format understood by this crate.
pub const SCHEMA_FORMAT_VERSION: u32 = 1;

/// Versioned envelope for a schema supplied as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub version: u32,
    pub root: SchemaNode,
}

impl SchemaDocument {
    /// Wraps a root node in the current format version.
    #[must_use]
    pub fn new(root: SchemaNode) -> Self {
        Self {
            version: SCHEMA_FORMAT_VERSION,
            root,
        }
    }

    /// Parses a schema document, rejecting other format versions.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let doc: Self = serde_json::from_str(json)?;
        if doc.version != SCHEMA_FORMAT_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                expected: SCHEMA_FORMAT_VERSION,
                found: doc.version,
            });
        }
        Ok(doc)
    }

    /// Unwraps the root node.
    #[must_use]
    pub fn into_root(self) -> SchemaNode {
        self.root
    }
}

/// One node of the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaNode {
    Object(ObjectSchema),
    Array(ArraySchema),
    Field(FieldDescriptor),
    /// A field whose rules depend on another field's value.
    Conditional(ConditionalSchema),
}

impl SchemaNode {
    /// Shorthand for an object node with fields in declaration order.
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, SchemaNode)>,
        S: Into<String>,
    {
        Self::Object(ObjectSchema {
            fields: fields
                .into_iter()
                .map(|(name, schema)| NamedSchema {
                    name: name.into(),
                    schema,
                })
                .collect(),
        })
    }

    /// Shorthand for an array node.
    #[must_use]
    pub fn array(items: SchemaNode) -> Self {
        Self::Array(ArraySchema {
            items: Box::new(items),
        })
    }

    /// Shorthand for a conditional node.
    #[must_use]
    pub fn conditional(branches: Vec<FieldDescriptor>) -> Self {
        Self::Conditional(ConditionalSchema { branches })
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArraySchema> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
}

impl From<FieldDescriptor> for SchemaNode {
    fn from(field: FieldDescriptor) -> Self {
        Self::Field(field)
    }
}

/// An object node: named child schemas in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub fields: Vec<NamedSchema>,
}

/// A named child of an object node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSchema {
    pub name: String,
    pub schema: SchemaNode,
}

/// An array node and its single element schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    pub items: Box<SchemaNode>,
}

/// A conditional field, modelled as its candidate branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalSchema {
    pub branches: Vec<FieldDescriptor>,
}

/// A leaf field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub required: bool,
    /// Only values listed in `valids` are accepted.
    #[serde(default)]
    pub allow_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valids: Vec<Value>,
    #[serde(default)]
    pub meta: FieldMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Primitive type of a leaf field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Any,
}

/// A validation or key rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Rule {
    /// Part of the primary key.
    Pk,
    /// Foreign key into `path`, shaped `<collectionPath>.[].<fieldName>`.
    Fk {
        path: String,
        /// Sibling field scoping the lookup (cascading FKs).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_field_name: Option<String>,
    },
    Min {
        limit: f64,
    },
    Max {
        limit: f64,
    },
    Uri,
    Format {
        format: String,
    },
    #[serde(other)]
    Unknown,
}

/// Free-form field tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Assigned by the server on create.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Used to label the entity in lists and lookups.
    #[serde(default)]
    pub display_name: bool,
}

impl FieldDescriptor {
    /// A bare field of the given type.
    #[must_use]
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            rules: Vec::new(),
            required: false,
            allow_only: false,
            valids: Vec::new(),
            meta: FieldMeta::default(),
            label: None,
        }
    }

    /// Shorthand for a string field.
    #[must_use]
    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    /// Shorthand for a number field.
    #[must_use]
    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    /// Shorthand for an integer field.
    #[must_use]
    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    /// Shorthand for a boolean field.
    #[must_use]
    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    /// Shorthand for a date field.
    #[must_use]
    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn pk(self) -> Self {
        self.rule(Rule::Pk)
    }

    #[must_use]
    pub fn fk(self, path: impl Into<String>) -> Self {
        self.rule(Rule::Fk {
            path: path.into(),
            parent_field_name: None,
        })
    }

    #[must_use]
    pub fn fk_with_parent(self, path: impl Into<String>, parent_field_name: impl Into<String>) -> Self {
        self.rule(Rule::Fk {
            path: path.into(),
            parent_field_name: Some(parent_field_name.into()),
        })
    }

    #[must_use]
    pub fn min(self, limit: f64) -> Self {
        self.rule(Rule::Min { limit })
    }

    #[must_use]
    pub fn max(self, limit: f64) -> Self {
        self.rule(Rule::Max { limit })
    }

    #[must_use]
    pub fn uri(self) -> Self {
        self.rule(Rule::Uri)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn generated(mut self) -> Self {
        self.meta.generated = true;
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.meta.hidden = true;
        self
    }

    #[must_use]
    pub fn display_name(mut self) -> Self {
        self.meta.display_name = true;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Suggested values; with `only` set, nothing else is accepted.
    #[must_use]
    pub fn valids(mut self, values: Vec<Value>, only: bool) -> Self {
        self.valids = values;
        self.allow_only = only;
        self
    }

    // ── Rule lookups ─────────────────────────────────────────────

    /// Finds the first rule satisfying a predicate.
    pub fn find_rule(&self, pred: impl Fn(&Rule) -> bool) -> Option<&Rule> {
        self.rules.iter().find(|r| pred(r))
    }

    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.rules.iter().any(|r| matches!(r, Rule::Pk))
    }

    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key_path().is_some()
    }

    /// The full FK target path, e.g. `makes.[].makeId`.
    #[must_use]
    pub fn foreign_key_path(&self) -> Option<&str> {
        self.rules.iter().find_map(|r| match r {
            Rule::Fk { path, .. } => Some(path.as_str()),
            _ => None,
        })
    }

    /// The sibling field a cascading FK is scoped by.
    #[must_use]
    pub fn foreign_key_parent_field_name(&self) -> Option<&str> {
        self.rules.iter().find_map(|r| match r {
            Rule::Fk {
                parent_field_name, ..
            } => parent_field_name.as_deref(),
            _ => None,
        })
    }

    /// The target collection: the FK path minus its trailing `.[].<field>`.
    #[must_use]
    pub fn foreign_key_collection_path(&self) -> Option<String> {
        let chunks: Vec<&str> = crate::path::segments(self.foreign_key_path()?).collect();
        if chunks.len() < 2 {
            return None;
        }
        Some(chunks[..chunks.len() - 2].join("."))
    }

    /// The field the FK points at in the target collection.
    #[must_use]
    pub fn foreign_key_target_field(&self) -> Option<&str> {
        crate::path::segments(self.foreign_key_path()?).last()
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.meta.generated
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.meta.hidden
    }

    #[must_use]
    pub fn has_suggested_values(&self) -> bool {
        !self.valids.is_empty()
    }

    #[must_use]
    pub fn suggested_values(&self) -> &[Value] {
        &self.valids
    }

    #[must_use]
    pub fn suggested_values_only(&self) -> bool {
        self.allow_only
    }

    /// Whether `value` is explicitly listed as acceptable.
    #[must_use]
    pub fn allows(&self, value: &Value) -> bool {
        self.valids.contains(value)
    }
}

impl ObjectSchema {
    /// The child schema named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.schema)
    }

    /// The leaf descriptor named `name`, conditionals normalized.
    #[must_use]
    pub fn field_descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field(name).and_then(crate::normalize_conditional)
    }

    /// Child names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Leaf descriptors in declaration order, skipping nested objects/arrays.
    pub fn leaf_fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().filter_map(|f| {
            crate::normalize_conditional(&f.schema).map(|d| (f.name.as_str(), d))
        })
    }

    /// Fields tagged `pk`, in declaration order.
    #[must_use]
    pub fn primary_key_field_names(&self) -> Vec<&str> {
        self.leaf_fields()
            .filter(|(_, d)| d.is_primary_key())
            .map(|(name, _)| name)
            .collect()
    }

    /// Fields carrying an `fk` rule, in declaration order.
    #[must_use]
    pub fn foreign_key_field_names(&self) -> Vec<&str> {
        self.leaf_fields()
            .filter(|(_, d)| d.is_foreign_key())
            .map(|(name, _)| name)
            .collect()
    }

    /// Display-name fields: explicit tags, else `name`, else the primary key.
    #[must_use]
    pub fn display_name_field_names(&self) -> Vec<&str> {
        let tagged: Vec<&str> = self
            .leaf_fields()
            .filter(|(_, d)| d.meta.display_name)
            .map(|(name, _)| name)
            .collect();
        if !tagged.is_empty() {
            return tagged;
        }
        if let Some(name) = self.field_names().find(|n| *n == "name") {
            return vec![name];
        }
        self.primary_key_field_names()
    }

    /// Whether any field is server generated.
    #[must_use]
    pub fn has_generated_field(&self) -> bool {
        self.leaf_fields().any(|(_, d)| d.is_generated())
    }
}
