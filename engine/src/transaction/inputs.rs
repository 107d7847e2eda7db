//! # Input Tuple Deserialization
//!
//! The transaction body declares its argument shape as a tuple type; the
//! engine reconstructs it from the ordered sequence of input results.
//! One dynamic per field, in dispatch order, each tag-checked against the
//! field's declared type. Nothing else: by the time deserialization runs,
//! every escrow transfer has already happened during dispatch, so this is
//! a pure, storage-free decoding pass.

use crate::error::{EngineError, InputError};
use crate::value::{Dynamic, FaeValue};

/// A tuple of [`FaeValue`]s reconstructible from a sequence of input
/// results.
pub trait InputTuple: Sized {
    /// Number of inputs the tuple consumes.
    const ARITY: usize;

    /// Decode the ordered results. Exactly one dynamic per field.
    fn decode(results: Vec<Dynamic>) -> Result<Self, EngineError>;
}

fn check_arity(expected: usize, actual: usize) -> Result<(), EngineError> {
    if actual > expected {
        return Err(InputError::TooManyInputs { expected, actual }.into());
    }
    if actual < expected {
        return Err(InputError::NotEnoughInputs { expected, actual }.into());
    }
    Ok(())
}

impl InputTuple for () {
    const ARITY: usize = 0;

    fn decode(results: Vec<Dynamic>) -> Result<Self, EngineError> {
        check_arity(0, results.len())
    }
}

macro_rules! input_tuple {
    ($(($arity:expr; $($name:ident),+))+) => {$(
        impl<$($name: FaeValue),+> InputTuple for ($($name,)+) {
            const ARITY: usize = $arity;

            fn decode(results: Vec<Dynamic>) -> Result<Self, EngineError> {
                check_arity($arity, results.len())?;
                let mut iter = results.into_iter();
                Ok(($(
                    iter.next()
                        .ok_or(InputError::NotEnoughInputs {
                            expected: $arity,
                            actual: $arity,
                        })?
                        .decode::<$name>()?,
                )+))
            }
        }
    )+};
}

input_tuple! {
    (1; A)
    (2; A, B)
    (3; A, B, C)
    (4; A, B, C, D)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;

    #[test]
    fn empty_tuple_takes_no_inputs() {
        <()>::decode(vec![]).unwrap();
        let err = <()>::decode(vec![Dynamic::new(1i64)]).unwrap_err();
        assert_eq!(
            err,
            InputError::TooManyInputs {
                expected: 0,
                actual: 1
            }
            .into()
        );
    }

    #[test]
    fn decodes_in_order() {
        let (a, b) =
            <(i64, String)>::decode(vec![Dynamic::new(7i64), Dynamic::new("x".to_string())])
                .unwrap();
        assert_eq!(a, 7);
        assert_eq!(b, "x");
    }

    #[test]
    fn shortage_is_not_enough_inputs() {
        let err = <(i64, i64)>::decode(vec![Dynamic::new(7i64)]).unwrap_err();
        assert_eq!(
            err,
            InputError::NotEnoughInputs {
                expected: 2,
                actual: 1
            }
            .into()
        );
    }

    #[test]
    fn field_type_mismatch_is_bad_arg_type() {
        let err = <(bool,)>::decode(vec![Dynamic::new(7i64)]).unwrap_err();
        assert_eq!(
            err,
            InputError::BadArgType {
                expected: TypeTag::new("bool"),
                actual: TypeTag::new("i64"),
            }
            .into()
        );
    }
}
