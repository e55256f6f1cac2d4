//! Record contract shared by every repository backend.
//!
//! # Responsibility
//! - Define the `Entity` trait and its explicit field registry.
//! - Convert entities to and from flat `Record`s.
//!
//! # Invariants
//! - The identifier is exposed under the `id` key and never changes after
//!   construction.
//! - `from_record(to_record(e))` reproduces every registered field of `e`.
//! - Unknown keys and uncoercible values are errors, not silently kept data.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

use super::codec::{CodecError, FieldKind};

/// Public key of the identifier inside a record.
pub const ID_KEY: &str = "id";

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex")
});

/// Flat key/value form of an entity.
pub type Record = Map<String, Value>;

pub type RecordResult<T> = Result<T, RecordError>;

/// Opaque, globally unique entity identifier.
///
/// `Default` generates a fresh identifier, so `#[derive(Default)]` on an
/// entity assigns one at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generates a random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps a caller-provided identifier.
    ///
    /// # Errors
    /// - `RecordError::InvalidId` when the value is empty or whitespace.
    pub fn new(value: impl Into<String>) -> RecordResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(RecordError::InvalidId(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::generate()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Value::String(value.0)
    }
}

impl From<&EntityId> for Value {
    fn from(value: &EntityId) -> Self {
        Value::String(value.0.clone())
    }
}

/// Record-level serialization failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    InvalidId(String),
    UnknownField {
        entity: &'static str,
        field: String,
    },
    InvalidField {
        entity: &'static str,
        field: &'static str,
        source: CodecError,
    },
    InvalidRegistry {
        entity: &'static str,
        reason: String,
    },
    MalformedJson(String),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(value) => write!(f, "invalid entity id `{value}`"),
            Self::UnknownField { entity, field } => {
                write!(f, "{entity} has no field `{field}`")
            }
            Self::InvalidField {
                entity,
                field,
                source,
            } => write!(f, "invalid value for {entity}.{field}: {source}"),
            Self::InvalidRegistry { entity, reason } => {
                write!(f, "invalid field registry for {entity}: {reason}")
            }
            Self::MalformedJson(message) => write!(f, "malformed record JSON: {message}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidField { source, .. } => Some(source),
            Self::InvalidId(_)
            | Self::UnknownField { .. }
            | Self::InvalidRegistry { .. }
            | Self::MalformedJson(_) => None,
        }
    }
}

/// One entry of an entity's field registry.
///
/// Built with the `field!` macro; the function pointers read, write, check
/// and normalize plain values for exactly one struct field.
pub struct Field<E> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub encode: fn(&E) -> Value,
    pub decode: fn(&mut E, Value) -> Result<(), CodecError>,
    pub normalize: fn(Value) -> Result<Value, CodecError>,
    pub check: fn(&E) -> Result<(), CodecError>,
}

impl<E> Clone for Field<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Field<E> {}

impl<E> Debug for Field<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<E: Entity> Field<E> {
    /// Reads the plain value of this field.
    pub fn read(&self, entity: &E) -> Value {
        (self.encode)(entity)
    }

    /// Replaces this field on `entity` with a decoded `value`.
    pub fn write(&self, entity: &mut E, value: Value) -> RecordResult<()> {
        (self.decode)(entity, value).map_err(|source| self.invalid(source))
    }

    /// Returns the canonical plain form of `value` for this field.
    ///
    /// Enumerations given by member name come back as their underlying value.
    pub fn canonicalize(&self, value: Value) -> RecordResult<Value> {
        (self.normalize)(value).map_err(|source| self.invalid(source))
    }

    /// Fails when the current value has no faithful plain form.
    pub fn verify(&self, entity: &E) -> RecordResult<()> {
        (self.check)(entity).map_err(|source| self.invalid(source))
    }

    fn invalid(&self, source: CodecError) -> RecordError {
        RecordError::InvalidField {
            entity: E::TYPE_NAME,
            field: self.name,
            source,
        }
    }
}

/// Builds a `Field` registry entry for one struct field.
///
/// ```ignore
/// const FIELDS: &'static [Field<Self>] = &[
///     field!(Self, username: String),
///     field!(Self, status: UserStatus),
/// ];
/// ```
#[macro_export]
macro_rules! field {
    ($entity:ty, $name:ident : $ty:ty) => {
        $crate::model::Field::<$entity> {
            name: stringify!($name),
            kind: <$ty as $crate::model::FieldCodec>::KIND,
            encode: |entity: &$entity| -> $crate::model::Value {
                <$ty as $crate::model::FieldCodec>::encode(&entity.$name)
            },
            decode: |entity: &mut $entity,
                     value: $crate::model::Value|
             -> ::core::result::Result<(), $crate::model::CodecError> {
                entity.$name = <$ty as $crate::model::FieldCodec>::decode(value)?;
                Ok(())
            },
            normalize: |value: $crate::model::Value|
             -> ::core::result::Result<$crate::model::Value, $crate::model::CodecError> {
                <$ty as $crate::model::FieldCodec>::decode(value)
                    .map(|decoded| <$ty as $crate::model::FieldCodec>::encode(&decoded))
            },
            check: |entity: &$entity| -> ::core::result::Result<(), $crate::model::CodecError> {
                <$ty as $crate::model::FieldCodec>::check(&entity.$name)
            },
        }
    };
}

/// A persistable record type with an identifier and a field registry.
pub trait Entity: Clone + Send + Sized + 'static {
    /// Collection name: the JSON file stem and the SQLite table name.
    const TYPE_NAME: &'static str;

    /// Ordered registry of persisted fields, excluding the identifier.
    const FIELDS: &'static [Field<Self>];

    /// Creates an entity with default field values and the given identifier.
    fn blank(id: EntityId) -> Self;

    fn id(&self) -> &EntityId;

    fn field(name: &str) -> Option<&'static Field<Self>> {
        Self::FIELDS.iter().find(|field| field.name == name)
    }

    /// Flattens this entity into a record keyed by field name plus `id`.
    fn to_record(&self) -> Record {
        to_record(self)
    }

    /// Rebuilds an entity from a record produced by `to_record`.
    fn from_record(record: Record) -> RecordResult<Self> {
        from_record(record)
    }

    /// Checks that every field survives `to_record` unchanged.
    ///
    /// # Errors
    /// - `RecordError::InvalidField` naming the first field that does not,
    ///   such as a non-finite real.
    fn validate(&self) -> RecordResult<()> {
        Self::FIELDS.iter().try_for_each(|field| field.verify(self))
    }

    fn to_json(&self) -> String {
        Value::Object(self.to_record()).to_string()
    }

    fn from_json(json: &str) -> RecordResult<Self> {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(record)) => Self::from_record(record),
            Ok(other) => Err(RecordError::MalformedJson(format!(
                "expected an object, found `{other}`"
            ))),
            Err(err) => Err(RecordError::MalformedJson(err.to_string())),
        }
    }
}

pub fn to_record<E: Entity>(entity: &E) -> Record {
    let mut record = Record::new();
    for field in E::FIELDS {
        record.insert(field.name.to_string(), field.read(entity));
    }
    record.insert(ID_KEY.to_string(), Value::from(entity.id()));
    record
}

pub fn from_record<E: Entity>(mut record: Record) -> RecordResult<E> {
    let id = match record.remove(ID_KEY) {
        Some(Value::String(raw)) => EntityId::new(raw)?,
        Some(Value::Null) | None => EntityId::generate(),
        Some(other) => return Err(RecordError::InvalidId(other.to_string())),
    };

    let mut entity = E::blank(id);
    for (key, value) in record {
        let Some(field) = E::field(&key) else {
            return Err(RecordError::UnknownField {
                entity: E::TYPE_NAME,
                field: key,
            });
        };
        field.write(&mut entity, value)?;
    }

    Ok(entity)
}

/// Checks that an entity's registry can back both storage formats.
///
/// Field names must be plain identifiers (they become SQL column names),
/// unique, and must not shadow `id`.
pub fn validate_registry<E: Entity>() -> RecordResult<()> {
    let invalid = |reason: String| RecordError::InvalidRegistry {
        entity: E::TYPE_NAME,
        reason,
    };

    if !is_identifier(E::TYPE_NAME) {
        return Err(invalid(format!(
            "type name `{}` is not a plain identifier",
            E::TYPE_NAME
        )));
    }

    let mut seen = HashSet::new();
    for field in E::FIELDS {
        if field.name == ID_KEY {
            return Err(invalid(format!("field name `{ID_KEY}` is reserved")));
        }
        if !is_identifier(field.name) {
            return Err(invalid(format!(
                "field name `{}` is not a plain identifier",
                field.name
            )));
        }
        if !seen.insert(field.name) {
            return Err(invalid(format!("field `{}` is declared twice", field.name)));
        }
    }

    Ok(())
}

pub(crate) fn is_identifier(value: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::{is_identifier, validate_registry, Entity, EntityId, Field, RecordError};
    use crate::model::CodecError;

    #[derive(Debug, Clone, Default)]
    struct Pair {
        id: EntityId,
        left: String,
        right: f64,
    }

    impl Entity for Pair {
        const TYPE_NAME: &'static str = "Pair";
        const FIELDS: &'static [Field<Self>] = &[
            crate::field!(Pair, left: String),
            crate::field!(Pair, right: f64),
            crate::field!(Pair, left: String),
        ];

        fn blank(id: EntityId) -> Self {
            Self {
                id,
                ..Self::default()
            }
        }

        fn id(&self) -> &EntityId {
            &self.id
        }
    }

    #[test]
    fn identifiers_follow_sql_safe_pattern() {
        assert!(is_identifier("user_status"));
        assert!(is_identifier("_hidden1"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("name; DROP TABLE x"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn duplicate_registry_entries_are_rejected() {
        let err = validate_registry::<Pair>().unwrap_err();
        assert!(matches!(err, RecordError::InvalidRegistry { entity: "Pair", .. }));
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert_eq!(
            EntityId::new("  ").unwrap_err(),
            RecordError::InvalidId("  ".to_string())
        );
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn validate_names_the_non_finite_field() {
        let mut pair = Pair::default();
        assert!(pair.validate().is_ok());

        pair.right = f64::NAN;
        let err = pair.validate().unwrap_err();
        assert!(matches!(
            err,
            RecordError::InvalidField {
                entity: "Pair",
                field: "right",
                source: CodecError::NonFinite(_),
            }
        ));
    }
}
