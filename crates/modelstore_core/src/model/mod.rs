//! Entity model and record contract.
//!
//! # Responsibility
//! - Define how typed entities map to flat key/value records.
//! - Provide the codecs shared by the document and relational backends.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Field access goes through the explicit `Entity::FIELDS` registry only.

pub mod codec;
pub mod record;

pub use codec::{decode_enum, CodecError, EnumRepr, FieldCodec, FieldKind, RecordEnum};
pub use record::{
    from_record, to_record, validate_registry, Entity, EntityId, Field, Record, RecordError,
    RecordResult, ID_KEY,
};
pub use serde_json::Value;
