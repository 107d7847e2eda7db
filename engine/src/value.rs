//! # Dynamic Values
//!
//! Arguments and results cross contract boundaries with their static types
//! erased: a [`Dynamic`] is a nominal [`TypeTag`] plus a structural
//! [`Value`] tree. On the wire the pair degenerates to `(tag, bytes)`
//! (see [`Dynamic::to_wire`]), but in memory the tree stays structured so
//! that escrow traversal is an ordinary recursive walk instead of a
//! deserialization pass.
//!
//! Typed Rust code converts through the [`FaeValue`] trait. The trait plays
//! two roles at once:
//!
//! 1. **Wire codec.** `into_value`/`from_value` are the per-type
//!    encoder/decoder pair; `from_value` on a tag-matched but misshapen
//!    tree is the "decoder registered by the interpreter" failing.
//! 2. **Traversal description.** Because `into_value` preserves record
//!    field names and variant constructor names, the engine can traverse
//!    any encoded value for escrow references and report symbolic paths
//!    (`deposit.coin`) without reflection.
//!
//! Tags are compared as strings. Two types with the same tag are the same
//! type as far as the engine is concerned, which is exactly the property
//! the interpreter needs when it reconstructs values across module
//! boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::InputError;
use crate::escrow::EscrowHandle;

/// Nominal type identity for a [`Dynamic`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    /// Tag from a type name.
    pub fn new(name: impl Into<String>) -> Self {
        TypeTag(name.into())
    }

    /// The tag's textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structural value tree.
///
/// Record fields and variant constructors keep their names; those names are
/// the path segments escrow locators resolve against. Field order is
/// declaration order and is significant: the engine never reorders, so a
/// value re-encodes to the same bytes it decoded from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Nat(u64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Named fields in declaration order. Tuples encode here with field
    /// names `"0"`, `"1"`, … so tuple components are addressable by path.
    Record(Vec<(String, Value)>),
    /// A data-type constructor application.
    Variant(String, Vec<Value>),
    /// An escrow reference. The linear resources; see the `escrow` module.
    Escrow(EscrowHandle),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Nat(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Variant(name, fields) => {
                write!(f, "{name}")?;
                if !fields.is_empty() {
                    write!(f, "(")?;
                    for (i, field) in fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{field}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Value::Escrow(handle) => write!(f, "{handle}"),
        }
    }
}

/// A tag-matched value whose tree does not have the shape the decoder
/// expects. Distinct from a tag mismatch: the tag said yes, the bytes said
/// no.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value does not have the shape of {0}")]
pub struct ShapeError(pub TypeTag);

/// A type-erased value: nominal tag plus structural tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dynamic {
    pub tag: TypeTag,
    pub value: Value,
}

impl Dynamic {
    /// Erase a typed value.
    pub fn new<T: FaeValue>(value: T) -> Self {
        Dynamic {
            tag: T::type_tag(),
            value: value.into_value(),
        }
    }

    /// Recover a typed value, checking the tag first.
    pub fn decode<T: FaeValue>(self) -> Result<T, InputError> {
        let expected = T::type_tag();
        if self.tag != expected {
            return Err(InputError::BadArgType {
                expected,
                actual: self.tag,
            });
        }
        T::from_value(self.value).map_err(|ShapeError(tag)| InputError::MalformedValue(tag))
    }

    /// The `(tag, bytes)` wire form.
    pub fn to_wire(&self) -> (TypeTag, Vec<u8>) {
        let bytes =
            bincode::serialize(&self.value).expect("Value serialization should never fail");
        (self.tag.clone(), bytes)
    }

    /// Reconstruct from the wire form.
    pub fn from_wire(tag: TypeTag, bytes: &[u8]) -> Result<Self, ShapeError> {
        let value = bincode::deserialize(bytes).map_err(|_| ShapeError(tag.clone()))?;
        Ok(Dynamic { tag, value })
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.value, self.tag)
    }
}

/// Conversion between typed Rust values and the structural tree.
pub trait FaeValue: Sized {
    /// The nominal tag this type erases to.
    fn type_tag() -> TypeTag;
    /// Encode into the structural tree.
    fn into_value(self) -> Value;
    /// Decode from a tree whose tag already matched.
    fn from_value(value: Value) -> Result<Self, ShapeError>;
}

impl FaeValue for () {
    fn type_tag() -> TypeTag {
        TypeTag::new("()")
    }
    fn into_value(self) -> Value {
        Value::Unit
    }
    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Unit => Ok(()),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

impl FaeValue for bool {
    fn type_tag() -> TypeTag {
        TypeTag::new("bool")
    }
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Bool(b) => Ok(b),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

impl FaeValue for i64 {
    fn type_tag() -> TypeTag {
        TypeTag::new("i64")
    }
    fn into_value(self) -> Value {
        Value::Int(self)
    }
    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Int(i) => Ok(i),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

impl FaeValue for u64 {
    fn type_tag() -> TypeTag {
        TypeTag::new("u64")
    }
    fn into_value(self) -> Value {
        Value::Nat(self)
    }
    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Nat(n) => Ok(n),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

impl FaeValue for String {
    fn type_tag() -> TypeTag {
        TypeTag::new("String")
    }
    fn into_value(self) -> Value {
        Value::Text(self)
    }
    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Text(s) => Ok(s),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

impl<T: FaeValue> FaeValue for Vec<T> {
    fn type_tag() -> TypeTag {
        TypeTag::new(format!("Vec<{}>", T::type_tag()))
    }
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }
    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::List(items) => items
                .into_iter()
                .map(|item| T::from_value(item).map_err(|_| ShapeError(Self::type_tag())))
                .collect(),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

macro_rules! tuple_fae_value {
    ($(($($name:ident : $idx:tt),+))+) => {$(
        impl<$($name: FaeValue),+> FaeValue for ($($name,)+) {
            fn type_tag() -> TypeTag {
                let parts = [$($name::type_tag().as_str().to_string()),+];
                TypeTag::new(format!("({})", parts.join(", ")))
            }
            fn into_value(self) -> Value {
                Value::Record(vec![
                    $((stringify!($idx).to_string(), self.$idx.into_value()),)+
                ])
            }
            fn from_value(value: Value) -> Result<Self, ShapeError> {
                match value {
                    Value::Record(fields) => {
                        let mut iter = fields.into_iter();
                        Ok(($(
                            {
                                let (_, field) = iter
                                    .next()
                                    .ok_or_else(|| ShapeError(Self::type_tag()))?;
                                $name::from_value(field)
                                    .map_err(|_| ShapeError(Self::type_tag()))?
                            },
                        )+))
                    }
                    _ => Err(ShapeError(Self::type_tag())),
                }
            }
        }
    )+};
}

tuple_fae_value! {
    (A: 0)
    (A: 0, B: 1)
    (A: 0, B: 1, C: 2)
    (A: 0, B: 1, C: 2, D: 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrips() {
        assert_eq!(Dynamic::new(42i64).decode::<i64>().unwrap(), 42);
        assert_eq!(Dynamic::new(true).decode::<bool>().unwrap(), true);
        assert_eq!(
            Dynamic::new("fae".to_string()).decode::<String>().unwrap(),
            "fae"
        );
        Dynamic::new(()).decode::<()>().unwrap();
    }

    #[test]
    fn tag_mismatch_is_bad_arg_type() {
        let err = Dynamic::new(42i64).decode::<bool>().unwrap_err();
        assert_eq!(
            err,
            InputError::BadArgType {
                expected: TypeTag::new("bool"),
                actual: TypeTag::new("i64"),
            }
        );
    }

    #[test]
    fn tuple_tags_compose() {
        assert_eq!(
            <(i64, String)>::type_tag().as_str(),
            "(i64, String)"
        );
        let d = Dynamic::new((1i64, "x".to_string()));
        assert_eq!(d.decode::<(i64, String)>().unwrap(), (1, "x".to_string()));
    }

    #[test]
    fn tuple_fields_addressable_by_index_name() {
        let d = Dynamic::new((1i64, 2i64));
        match d.value {
            Value::Record(fields) => {
                assert_eq!(fields[0].0, "0");
                assert_eq!(fields[1].0, "1");
            }
            other => panic!("expected record, got {other}"),
        }
    }

    #[test]
    fn wire_form_roundtrips() {
        let d = Dynamic::new(vec![1i64, 2, 3]);
        let (tag, bytes) = d.to_wire();
        let back = Dynamic::from_wire(tag, &bytes).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Dynamic::new(7i64).to_string(), "7 :: i64");
        assert_eq!(
            Dynamic::new((1i64, true)).to_string(),
            "{0: 1, 1: true} :: (i64, bool)"
        );
    }
}
