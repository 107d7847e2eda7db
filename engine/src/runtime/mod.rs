//! # Contract Runtime
//!
//! Contracts are coroutines flattened into an explicit two-message state
//! machine. Each call hands the contract's code a dynamic argument and one
//! of two things comes back:
//!
//! - [`Outcome::Release`] — suspend: yield a value plus the continuation
//!   to run on the next call.
//! - [`Outcome::Spend`] — terminate: yield a final value; the contract
//!   (or escrow) is gone afterwards, though a spent output slot keeps its
//!   index and nonce.
//!
//! Code runs against a [`CallCtx`]: the ambient escrow map of the current
//! frame, the append-only outputs writer for this call's own publications,
//! the transaction signer, and the deterministic entry-ID allocator. The
//! context surface (`use_escrow`, `new_escrow`, `new_contract`, `sender`)
//! is the same for contract code and transaction bodies; what separates
//! them is that only `ContractCode::call` can produce an `Outcome`, so a
//! body has no way to express `release` or `spend` at all.
//!
//! Every value crossing a frame boundary is normalized here: its escrow
//! backing is [`transfer`](crate::escrow::traverse::transfer)red between
//! maps, and any deferred `TxIn` references are executed into `TxOut`
//! in the destination frame.
//!
//! `ContractCode` is consume-on-call (`self: Box<Self>`) but clonable via
//! [`boxed_clone`](ContractCode::boxed_clone): the transaction engine
//! dispatches against copies and commits continuations only after the
//! whole transaction succeeds, which is what keeps storage bit-identical
//! on failure.

use std::collections::BTreeSet;
use tracing::debug;

use crate::crypto::keys::PublicKey;
use crate::error::{EngineError, EscrowError, InputError};
use crate::escrow::traverse::{transfer, traverse_escrows};
use crate::escrow::{Escrow, EscrowId, EscrowMap, EscrowSource};
use crate::ids::{EntryId, ShortContractId, TransactionId};
use crate::storage::StoredContract;
use crate::value::{Dynamic, FaeValue, TypeTag};

/// What a contract call produced.
pub enum Outcome {
    /// Suspend with a value; `next` runs on the next call.
    Release {
        value: Dynamic,
        next: Box<dyn ContractCode>,
    },
    /// Terminate with a final value.
    Spend { value: Dynamic },
}

/// A contract's (or escrow's) resumable code.
///
/// Calling consumes the current step; the continuation, if any, arrives
/// inside [`Outcome::Release`]. Implementations must be clonable so the
/// engine can execute against a copy and discard it on failure.
pub trait ContractCode: Send {
    fn call(self: Box<Self>, ctx: &mut CallCtx<'_>, arg: Dynamic)
        -> Result<Outcome, EngineError>;

    fn boxed_clone(&self) -> Box<dyn ContractCode>;
}

impl Clone for Box<dyn ContractCode> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// A typed step result for closure-based contract code.
pub enum Step<V> {
    /// Yield `V` and suspend into the given continuation.
    Release(V, Box<dyn ContractCode>),
    /// Yield `V` and terminate.
    Spend(V),
}

struct Typed<A, V, F> {
    f: F,
    _types: std::marker::PhantomData<fn(A) -> V>,
}

impl<A, V, F> ContractCode for Typed<A, V, F>
where
    A: FaeValue + 'static,
    V: FaeValue + 'static,
    F: FnOnce(&mut CallCtx<'_>, A) -> Result<Step<V>, EngineError> + Clone + Send + 'static,
{
    fn call(
        self: Box<Self>,
        ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        let arg = arg.decode::<A>()?;
        match (self.f)(ctx, arg)? {
            Step::Release(value, next) => Ok(Outcome::Release {
                value: Dynamic::new(value),
                next,
            }),
            Step::Spend(value) => Ok(Outcome::Spend {
                value: Dynamic::new(value),
            }),
        }
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(Typed {
            f: self.f.clone(),
            _types: std::marker::PhantomData,
        })
    }
}

/// Wrap a typed closure as contract code. The closure decides per call
/// whether to release or spend.
pub fn contract_fn<A, V, F>(f: F) -> Box<dyn ContractCode>
where
    A: FaeValue + 'static,
    V: FaeValue + 'static,
    F: FnOnce(&mut CallCtx<'_>, A) -> Result<Step<V>, EngineError> + Clone + Send + 'static,
{
    Box::new(Typed {
        f,
        _types: std::marker::PhantomData,
    })
}

/// Wrap a typed closure as contract code that spends on its first call.
pub fn one_shot<A, V, F>(f: F) -> Box<dyn ContractCode>
where
    A: FaeValue + 'static,
    V: FaeValue + 'static,
    F: FnOnce(&mut CallCtx<'_>, A) -> Result<V, EngineError> + Clone + Send + 'static,
{
    contract_fn(move |ctx: &mut CallCtx<'_>, arg: A| Ok(Step::Spend(f(ctx, arg)?)))
}

/// Deterministic entry-ID allocation: a per-transaction counter hashed
/// with the transaction ID. No randomness, so replays allocate the same
/// IDs.
pub struct EntryAllocator {
    tx: TransactionId,
    next: u64,
}

impl EntryAllocator {
    pub(crate) fn new(tx: TransactionId) -> Self {
        EntryAllocator { tx, next: 0 }
    }

    /// Allocate the next entry ID.
    pub fn fresh(&mut self) -> EntryId {
        let id = EntryId::derive(&self.tx, self.next);
        self.next += 1;
        id
    }
}

/// The ambient context a contract call or transaction body runs in.
pub struct CallCtx<'a> {
    pub(crate) escrows: &'a mut EscrowMap,
    pub(crate) outputs: &'a mut Vec<StoredContract>,
    pub(crate) signer: &'a PublicKey,
    pub(crate) alloc: &'a mut EntryAllocator,
}

impl<'a> CallCtx<'a> {
    /// The public key of the transaction's signer.
    pub fn sender(&self) -> PublicKey {
        *self.signer
    }

    /// Create a fresh escrow in the current frame.
    ///
    /// `backing` values are consumed for their escrow references: every
    /// entry they reference moves from this frame into the new escrow's
    /// own map, so the new escrow is worth what it swallowed.
    pub fn new_escrow<A, V>(
        &mut self,
        backing: Vec<Dynamic>,
        code: Box<dyn ContractCode>,
    ) -> Result<EscrowId<A, V>, EngineError>
    where
        A: FaeValue + 'static,
        V: FaeValue + 'static,
    {
        let entry = self.alloc.fresh();
        let mut inner = EscrowMap::new();
        for mut value in backing {
            transfer(&mut value.value, self.escrows, &mut inner)?;
        }
        debug!(%entry, backing = inner.len(), "escrow created");
        self.escrows.insert(
            entry,
            Escrow {
                arg_ty: A::type_tag(),
                ret_ty: V::type_tag(),
                escrows: inner,
                code,
            },
        );
        Ok(EscrowId::direct(entry))
    }

    /// Publish a new contract into the current call's output scope.
    ///
    /// During input dispatch the scope is that input's own output set;
    /// in a transaction body it is the transaction's top-level outputs.
    /// `trusts` is the set of short contract IDs whose results the new
    /// contract will accept as chained `Trusted` arguments.
    pub fn new_contract<A, V>(
        &mut self,
        backing: Vec<Dynamic>,
        trusts: BTreeSet<ShortContractId>,
        code: Box<dyn ContractCode>,
    ) -> Result<(), EngineError>
    where
        A: FaeValue + 'static,
        V: FaeValue + 'static,
    {
        let mut inner = EscrowMap::new();
        for mut value in backing {
            transfer(&mut value.value, self.escrows, &mut inner)?;
        }
        debug!(index = self.outputs.len(), "contract published");
        self.outputs.push(StoredContract {
            arg_ty: A::type_tag(),
            ret_ty: V::type_tag(),
            trusts,
            escrows: inner,
            code,
        });
        Ok(())
    }

    /// Call an escrow in the current frame.
    ///
    /// The argument's backing moves into the escrow for the duration of
    /// the call; the returned value's backing moves out with it. A
    /// released escrow stays in the frame under the same entry ID; a
    /// spent one is gone.
    pub fn use_escrow<A, V>(&mut self, id: &EscrowId<A, V>, arg: A) -> Result<V, EngineError>
    where
        A: FaeValue + 'static,
        V: FaeValue + 'static,
    {
        let entry = id.entry()?;
        let value = call_escrow(
            self.escrows,
            self.outputs,
            self.signer,
            self.alloc,
            entry,
            Dynamic::new(arg),
        )?;
        Ok(value.decode::<V>()?)
    }
}

/// Invoke the escrow at `entry` within the frame owning `escrows`.
///
/// This is the single choke point for escrow calls: `use_escrow` and
/// deferred `TxIn` execution both land here, so the transfer discipline
/// cannot be bypassed.
pub(crate) fn call_escrow(
    escrows: &mut EscrowMap,
    outputs: &mut Vec<StoredContract>,
    signer: &PublicKey,
    alloc: &mut EntryAllocator,
    entry: EntryId,
    mut arg: Dynamic,
) -> Result<Dynamic, EngineError> {
    let escrow = escrows
        .remove(&entry)
        .ok_or(EscrowError::BadEscrowId(entry))?;
    let Escrow {
        arg_ty,
        ret_ty,
        escrows: mut inner,
        code,
    } = escrow;

    if arg.tag != arg_ty {
        return Err(InputError::BadArgType {
            expected: arg_ty,
            actual: arg.tag,
        }
        .into());
    }
    absorb(&mut arg, escrows, &mut inner, outputs, signer, alloc)?;

    debug!(%entry, "escrow invoked");
    let outcome = {
        let mut ctx = CallCtx {
            escrows: &mut inner,
            outputs,
            signer,
            alloc,
        };
        code.call(&mut ctx, arg)?
    };

    match outcome {
        Outcome::Release { mut value, next } => {
            check_return(&value, &ret_ty)?;
            absorb(&mut value, &mut inner, escrows, outputs, signer, alloc)?;
            escrows.insert(
                entry,
                Escrow {
                    arg_ty,
                    ret_ty,
                    escrows: inner,
                    code: next,
                },
            );
            Ok(value)
        }
        Outcome::Spend { mut value } => {
            check_return(&value, &ret_ty)?;
            absorb(&mut value, &mut inner, escrows, outputs, signer, alloc)?;
            debug!(%entry, "escrow spent");
            // `inner` drops here: a spent escrow's residual backing is
            // destroyed with it.
            Ok(value)
        }
    }
}

pub(crate) fn check_return(value: &Dynamic, ret_ty: &TypeTag) -> Result<(), EngineError> {
    if &value.tag != ret_ty {
        return Err(InputError::BadArgType {
            expected: ret_ty.clone(),
            actual: value.tag.clone(),
        }
        .into());
    }
    Ok(())
}

/// Normalize a value into a destination frame: move its escrow backing
/// from `from` to `to`, then execute any deferred `TxIn` calls inside the
/// destination, rewriting them to `TxOut`.
pub(crate) fn absorb(
    value: &mut Dynamic,
    from: &mut EscrowMap,
    to: &mut EscrowMap,
    outputs: &mut Vec<StoredContract>,
    signer: &PublicKey,
    alloc: &mut EntryAllocator,
) -> Result<(), EngineError> {
    transfer(&mut value.value, from, to)?;
    run_deferred(&mut value.value, to, outputs, signer, alloc)
}

fn run_deferred(
    value: &mut crate::value::Value,
    escrows: &mut EscrowMap,
    outputs: &mut Vec<StoredContract>,
    signer: &PublicKey,
    alloc: &mut EntryAllocator,
) -> Result<(), EngineError> {
    traverse_escrows(value, &mut |handle, _path| {
        if let EscrowSource::TxIn { entry, arg } = &handle.source {
            let entry = *entry;
            let arg = (**arg).clone();
            let val = call_escrow(escrows, outputs, signer, alloc, entry, arg)?;
            handle.source = EscrowSource::TxOut {
                entry,
                val: Box::new(val),
            };
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn test_frame() -> (EscrowMap, Vec<StoredContract>, PublicKey, EntryAllocator) {
        (
            EscrowMap::new(),
            Vec::new(),
            Keypair::from_seed(&[1u8; 32]).public_key(),
            EntryAllocator::new(TransactionId::derive(b"runtime-test")),
        )
    }

    fn ctx<'a>(
        escrows: &'a mut EscrowMap,
        outputs: &'a mut Vec<StoredContract>,
        signer: &'a PublicKey,
        alloc: &'a mut EntryAllocator,
    ) -> CallCtx<'a> {
        CallCtx {
            escrows,
            outputs,
            signer,
            alloc,
        }
    }

    #[test]
    fn one_shot_escrow_spends_on_use() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let mut ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        let id = ctx
            .new_escrow::<(), u64>(vec![], one_shot(|_ctx, ()| Ok(99u64)))
            .unwrap();
        assert_eq!(ctx.use_escrow(&id, ()).unwrap(), 99);

        // Spent: the entry is gone from the frame.
        assert!(matches!(
            ctx.use_escrow(&id, ()),
            Err(EngineError::Escrow(EscrowError::BadEscrowId(_)))
        ));
        assert!(escrows.is_empty());
    }

    #[test]
    fn released_escrow_survives_with_continuation() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let mut ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        // First call releases 1 and continues; second call spends 2.
        let code = contract_fn(|_ctx: &mut CallCtx<'_>, ()| {
            Ok(Step::Release(1u64, one_shot(|_ctx, ()| Ok(2u64))))
        });
        let id = ctx.new_escrow::<(), u64>(vec![], code).unwrap();

        assert_eq!(ctx.use_escrow(&id, ()).unwrap(), 1);
        assert_eq!(ctx.use_escrow(&id, ()).unwrap(), 2);
        assert!(escrows.is_empty());
    }

    #[test]
    fn argument_type_is_checked() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let mut ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        let id = ctx
            .new_escrow::<u64, u64>(vec![], one_shot(|_ctx, n: u64| Ok(n)))
            .unwrap();
        // Bypass the typed wrapper to hand the escrow a wrong-typed
        // argument.
        let entry = id.entry().unwrap();
        let err = call_escrow(
            &mut escrows,
            &mut outputs,
            &signer,
            &mut alloc,
            entry,
            Dynamic::new(true),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Input(InputError::BadArgType { .. })
        ));
    }

    #[test]
    fn backing_moves_into_new_escrow() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let mut ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        let coin = ctx
            .new_escrow::<(), u64>(vec![], one_shot(|_ctx, ()| Ok(7u64)))
            .unwrap();
        drop(ctx);
        assert_eq!(escrows.len(), 1);
        let mut ctx = self::ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        // Wrap the coin in a vault escrow; the coin's entry moves inside.
        let vault_code = {
            let coin = coin.clone();
            one_shot(move |ctx: &mut CallCtx<'_>, ()| ctx.use_escrow(&coin, ()))
        };
        let vault = ctx
            .new_escrow::<(), u64>(vec![Dynamic::new(coin)], vault_code)
            .unwrap();
        drop(ctx);
        assert_eq!(escrows.len(), 1);
        let mut ctx = self::ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        // Redeeming the vault redeems the coin inside it.
        assert_eq!(ctx.use_escrow(&vault, ()).unwrap(), 7);
        drop(ctx);
        assert!(escrows.is_empty());
    }

    #[test]
    fn deferred_call_rewrites_to_tx_out() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let mut ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        let id = ctx
            .new_escrow::<u64, u64>(vec![], one_shot(|_ctx, n: u64| Ok(n * 2)))
            .unwrap();
        let deferred = id.defer(21).unwrap();

        // Push the deferred reference across a boundary: normalization
        // executes the call in the destination frame.
        let mut value = Dynamic::new(deferred);
        let mut dest = EscrowMap::new();
        absorb(
            &mut value,
            &mut escrows,
            &mut dest,
            &mut outputs,
            &signer,
            &mut alloc,
        )
        .unwrap();

        let completed = value.decode::<EscrowId<u64, u64>>().unwrap();
        assert_eq!(completed.result().unwrap(), 42);
        assert!(dest.is_empty());
    }

    #[test]
    fn sender_is_the_signer() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);
        assert_eq!(ctx.sender(), signer);
    }

    #[test]
    fn escrow_can_publish_contracts_into_the_call_scope() {
        let (mut escrows, mut outputs, signer, mut alloc) = test_frame();
        let mut ctx = ctx(&mut escrows, &mut outputs, &signer, &mut alloc);

        let id = ctx
            .new_escrow::<(), u64>(
                vec![],
                one_shot(|ctx: &mut CallCtx<'_>, ()| {
                    ctx.new_contract::<(), u64>(
                        vec![],
                        BTreeSet::new(),
                        one_shot(|_ctx, ()| Ok(1u64)),
                    )?;
                    Ok(0u64)
                }),
            )
            .unwrap();
        ctx.use_escrow(&id, ()).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].ret_ty, u64::type_tag());
    }
}
