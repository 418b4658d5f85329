/// Data model layer
///
/// Describes every table once (fields, columns, kinds, references) and validates
/// client payloads against those descriptions:
/// - Entity catalogue and record type
/// - Payload validation and normalization

// Entity catalogue: tables, slugs, fields and references
pub mod types;

// Payload validation against the catalogue
pub mod validation;

pub use types::{record_id, EntityKind, FieldKind, FieldSpec, Record};
pub use validation::{validate, Validated};
