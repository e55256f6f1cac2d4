//! Field-level value codecs.
//!
//! # Responsibility
//! - Convert typed field values to and from plain `serde_json::Value`s.
//! - Coerce raw values into enumeration members.
//!
//! # Invariants
//! - `decode(encode(v)) == v` for every supported field type.
//! - Enumeration coercion tries the underlying value first, then the member
//!   name. Anything else is a `CodecError`, never a silently kept raw value.
//! - Reals encode with a single zero (`-0.0` becomes `0.0`); non-finite reals
//!   have no plain form and fail `check`.

use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

use super::record::RecordError;

/// Storage shape of one registered field.
///
/// The relational backend stores every column as text and uses the kind to
/// decode column text back into a plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Bool,
    Enum(EnumRepr),
    Nested,
    List,
}

/// Primitive type underlying an enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRepr {
    Integer,
    Text,
}

/// Failure to convert one plain value into a field type.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    UnknownEnumValue {
        enum_name: &'static str,
        value: String,
    },
    NonFinite(f64),
    Nested(Box<RecordError>),
}

impl CodecError {
    pub fn type_mismatch(expected: &'static str, found: &Value) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.to_string(),
        }
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected {expected}, found `{found}`")
            }
            Self::UnknownEnumValue { enum_name, value } => {
                write!(f, "`{value}` is not a value or member name of {enum_name}")
            }
            Self::NonFinite(value) => write!(f, "`{value}` is not a finite number"),
            Self::Nested(err) => write!(f, "nested record: {err}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Nested(err) => Some(err.as_ref()),
            Self::TypeMismatch { .. } | Self::UnknownEnumValue { .. } | Self::NonFinite(_) => {
                None
            }
        }
    }
}

/// Conversion between a typed field value and its plain representation.
pub trait FieldCodec: Sized {
    const KIND: FieldKind;

    fn encode(&self) -> Value;

    fn decode(value: Value) -> Result<Self, CodecError>;

    /// Rejects values `encode` cannot represent faithfully.
    fn check(&self) -> Result<(), CodecError> {
        Ok(())
    }
}

impl FieldCodec for String {
    const KIND: FieldKind = FieldKind::Text;

    fn encode(&self) -> Value {
        Value::String(self.clone())
    }

    fn decode(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::String(text) => Ok(text),
            other => Err(CodecError::type_mismatch("string", &other)),
        }
    }
}

impl FieldCodec for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn encode(&self) -> Value {
        Value::from(*self)
    }

    fn decode(value: Value) -> Result<Self, CodecError> {
        value
            .as_i64()
            .ok_or_else(|| CodecError::type_mismatch("integer", &value))
    }
}

impl FieldCodec for f64 {
    const KIND: FieldKind = FieldKind::Real;

    fn encode(&self) -> Value {
        // `-0.0 == 0.0`, so this folds both zeros into one column text.
        let value = if *self == 0.0 { 0.0 } else { *self };
        Value::from(value)
    }

    fn decode(value: Value) -> Result<Self, CodecError> {
        value
            .as_f64()
            .ok_or_else(|| CodecError::type_mismatch("number", &value))
    }

    fn check(&self) -> Result<(), CodecError> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(CodecError::NonFinite(*self))
        }
    }
}

impl FieldCodec for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn encode(&self) -> Value {
        Value::Bool(*self)
    }

    fn decode(value: Value) -> Result<Self, CodecError> {
        value
            .as_bool()
            .ok_or_else(|| CodecError::type_mismatch("boolean", &value))
    }
}

impl<T: FieldCodec> FieldCodec for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn encode(&self) -> Value {
        match self {
            Some(inner) => inner.encode(),
            None => Value::Null,
        }
    }

    fn decode(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(None),
            other => T::decode(other).map(Some),
        }
    }

    fn check(&self) -> Result<(), CodecError> {
        self.as_ref().map_or(Ok(()), T::check)
    }
}

impl<T: FieldCodec> FieldCodec for Vec<T> {
    const KIND: FieldKind = FieldKind::List;

    fn encode(&self) -> Value {
        Value::Array(self.iter().map(FieldCodec::encode).collect())
    }

    fn decode(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::decode).collect(),
            other => Err(CodecError::type_mismatch("array", &other)),
        }
    }

    fn check(&self) -> Result<(), CodecError> {
        self.iter().try_for_each(T::check)
    }
}

/// Closed set of named constants with a stable primitive representation.
///
/// Implemented by `record_enum!`; implement by hand only when the macro
/// shape does not fit.
pub trait RecordEnum: Copy + 'static {
    const NAME: &'static str;
    const REPR: EnumRepr;
    const MEMBERS: &'static [(&'static str, Self)];

    /// Underlying primitive value of this member.
    fn repr(self) -> Value;

    /// Member name as declared.
    fn member_name(self) -> &'static str;
}

/// Coerces a raw value into an enumeration member.
///
/// Matches the underlying value first, then the member name ignoring ASCII
/// case, so both `2` and `"BANNED"` resolve to the same member.
pub fn decode_enum<T: RecordEnum>(value: Value) -> Result<T, CodecError> {
    if let Some((_, member)) = T::MEMBERS.iter().find(|(_, member)| member.repr() == value) {
        return Ok(*member);
    }

    if let Value::String(name) = &value {
        if let Some((_, member)) = T::MEMBERS
            .iter()
            .find(|(member_name, _)| member_name.eq_ignore_ascii_case(name))
        {
            return Ok(*member);
        }
    }

    Err(CodecError::UnknownEnumValue {
        enum_name: T::NAME,
        value: value.to_string(),
    })
}

/// Declares an enumeration usable as an entity field.
///
/// The generated type derives `Debug, Clone, Copy, PartialEq, Eq, Hash` and
/// implements `RecordEnum`, `FieldCodec` and `From<Self> for Value`.
///
/// ```
/// modelstore_core::record_enum! {
///     pub enum Status: i64 {
///         Created = 0,
///         Confirmed = 1,
///     }
/// }
/// ```
#[macro_export]
macro_rules! record_enum {
    (@repr i64) => {
        $crate::model::EnumRepr::Integer
    };
    (@repr str) => {
        $crate::model::EnumRepr::Text
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $crate::model::RecordEnum for $name {
            const NAME: &'static str = stringify!($name);
            const REPR: $crate::model::EnumRepr = $crate::record_enum!(@repr $repr);
            const MEMBERS: &'static [(&'static str, Self)] =
                &[$( (stringify!($variant), $name::$variant) ),+];

            fn repr(self) -> $crate::model::Value {
                match self {
                    $( $name::$variant => $crate::model::Value::from($value) ),+
                }
            }

            fn member_name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant) ),+
                }
            }
        }

        impl $crate::model::FieldCodec for $name {
            const KIND: $crate::model::FieldKind = $crate::model::FieldKind::Enum(
                <$name as $crate::model::RecordEnum>::REPR,
            );

            fn encode(&self) -> $crate::model::Value {
                $crate::model::RecordEnum::repr(*self)
            }

            fn decode(
                value: $crate::model::Value,
            ) -> ::core::result::Result<Self, $crate::model::CodecError> {
                $crate::model::decode_enum::<$name>(value)
            }
        }

        impl ::core::convert::From<$name> for $crate::model::Value {
            fn from(value: $name) -> Self {
                $crate::model::RecordEnum::repr(value)
            }
        }
    };
}

/// Makes an `Entity` type usable as a nested field of another entity.
///
/// Nested records are stored as JSON objects (JSON text in SQLite columns).
#[macro_export]
macro_rules! nested_entity {
    ($ty:ty) => {
        impl $crate::model::FieldCodec for $ty {
            const KIND: $crate::model::FieldKind = $crate::model::FieldKind::Nested;

            fn encode(&self) -> $crate::model::Value {
                $crate::model::Value::Object($crate::model::Entity::to_record(self))
            }

            fn decode(
                value: $crate::model::Value,
            ) -> ::core::result::Result<Self, $crate::model::CodecError> {
                match value {
                    $crate::model::Value::Object(record) => {
                        <$ty as $crate::model::Entity>::from_record(record).map_err(|err| {
                            $crate::model::CodecError::Nested(::std::boxed::Box::new(err))
                        })
                    }
                    other => Err($crate::model::CodecError::type_mismatch("object", &other)),
                }
            }

            fn check(&self) -> ::core::result::Result<(), $crate::model::CodecError> {
                $crate::model::Entity::validate(self).map_err(|err| {
                    $crate::model::CodecError::Nested(::std::boxed::Box::new(err))
                })
            }
        }

        impl ::core::convert::From<$ty> for $crate::model::Value {
            fn from(value: $ty) -> Self {
                $crate::model::Value::Object($crate::model::Entity::to_record(&value))
            }
        }
    };
}
