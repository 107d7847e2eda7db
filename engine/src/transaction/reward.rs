//! The built-in reward escrow.
//!
//! A transaction marked as a reward transaction gets one extra input
//! result: a fresh escrow that accepts unit and pays out a [`Reward`]
//! token on its single use. The token type is deliberately inert: it is
//! proof-of-reward, and whatever economy wants to honor it does so by
//! accepting it in its own contracts.

use crate::escrow::{Escrow, EscrowMap};
use crate::runtime::one_shot;
use crate::value::{FaeValue, ShapeError, TypeTag, Value};

/// The token a reward escrow pays out. Cannot be constructed by user
/// code through any engine surface other than using a reward escrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reward;

impl FaeValue for Reward {
    fn type_tag() -> TypeTag {
        TypeTag::new("Reward")
    }

    fn into_value(self) -> Value {
        Value::Variant("Reward".to_string(), vec![])
    }

    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Variant(name, fields) if name == "Reward" && fields.is_empty() => Ok(Reward),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

/// Mint the one-shot reward escrow.
pub(crate) fn reward_escrow() -> Escrow {
    Escrow {
        arg_ty: <()>::type_tag(),
        ret_ty: Reward::type_tag(),
        escrows: EscrowMap::new(),
        code: one_shot(|_ctx, ()| Ok(Reward)),
    }
}
