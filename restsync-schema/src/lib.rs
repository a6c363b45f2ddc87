//! Schema model for restsync.
//!
//! A schema describes a nested REST resource tree: objects hold named
//! fields, arrays hold one element schema, and leaves are typed fields
//! tagged with rules (`pk`, `fk`, `min`, ...) and metadata (`generated`,
//! `hidden`, ...). This crate owns that descriptor and everything derived
//! from it:
//! - [`SchemaNode`] and friends, with builder shorthands
//! - [`resolve`] and the other introspection helpers
//! - [`ForeignKeyMetadata`] for FK lookups
//! - [`ItemValidator`] with the built-in [`BasicValidator`]
//!
//! Schema paths are dotted strings where `[]` stands for "one element of
//! the preceding array", e.g. `makes.[].models.[]`.

mod error;
mod foreign_key;
mod introspect;
mod node;
pub mod path;
mod validate;

pub use error::{SchemaError, SchemaResult};
pub use foreign_key::ForeignKeyMetadata;
pub use introspect::{
    field_display_name, normalize_conditional, resolve, resolve_array, resolve_item_schema,
};
pub use node::{
    ArraySchema, ConditionalSchema, FieldDescriptor, FieldMeta, FieldType, NamedSchema,
    ObjectSchema, Rule, SchemaDocument, SchemaNode, SCHEMA_FORMAT_VERSION,
};
pub use validate::{BasicValidator, ItemValidator, ValidationContext, ValidationError};
