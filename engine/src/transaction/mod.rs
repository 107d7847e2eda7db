//! # Transaction Engine
//!
//! The orchestrator everything else exists for. [`run_transaction`] takes
//! a request (transaction ID, signer, reward flag, ordered input list) and
//! a body, and performs, in order:
//!
//! 1. **Input dispatch.** Each referenced contract is resolved (with its
//!    nonce assertion enforced), handed its argument (a literal from the
//!    host, or an earlier input's result under the trust discipline) and
//!    called. Its return value joins the result sequence; its continuation
//!    or spend is *staged*, not written. Contracts it publishes during the
//!    call are attributed to that input, never to the transaction.
//! 2. **Reward injection.** A reward transaction gets one extra result:
//!    a fresh one-shot reward escrow.
//! 3. **Body execution.** The result sequence is deserialized into the
//!    body's declared tuple and the body runs with the transaction-level
//!    context: it can use escrows, create them, and publish top-level
//!    contracts, but it cannot release or spend; a body is not a
//!    contract.
//! 4. **Closure check.** The transaction's escrow map must end empty;
//!    scarcity means nothing if a transaction can quietly retire value.
//! 5. **Commit.** Staged contract updates are written through the storage
//!    paths (bumping nonces), and the entry (input records, input order,
//!    indexed outputs, signers, result) is installed.
//!
//! ## Failure
//!
//! Dispatch runs against *clones* of the stored contracts and every write
//! is staged, so when any step fails the storage map is bit-identical to
//! what it was before the transaction, except for one new entry under
//! the transaction's ID, poisoned with the failure. Reading that entry's
//! semantic fields re-raises the failure; the failure also propagates to
//! the caller.

pub mod inputs;
pub mod reward;

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::crypto::keys::PublicKey;
use crate::error::{EngineError, EscrowError, InputError, StorageError};
use crate::escrow::EscrowMap;
use crate::ids::{ContractId, ContractRef, ShortContractId, TransactionId};
use crate::runtime::{absorb, check_return, CallCtx, EntryAllocator, Outcome};
use crate::storage::{
    EntryData, InputOutputVersions, OutputSlot, Storage, StoredContract, TransactionEntry,
};
use crate::value::{Dynamic, FaeValue};

pub use inputs::InputTuple;
pub use reward::Reward;

use crate::escrow::EscrowId;
use crate::transaction::reward::reward_escrow;

/// The argument supplied to one input contract.
#[derive(Clone, Debug)]
pub enum InputArg {
    /// A host-supplied value.
    Literal(Dynamic),
    /// The result of the `i`-th earlier input, admitted only if the
    /// receiving contract's trust set contains the source's short ID.
    Trusted(usize),
}

/// A transaction to execute: identity, signer, reward flag, and the
/// ordered input list.
#[derive(Clone)]
pub struct TxRequest {
    pub tx_id: TransactionId,
    pub signer: PublicKey,
    pub is_reward: bool,
    pub inputs: Vec<(ContractRef, InputArg)>,
}

impl TxRequest {
    pub fn new(tx_id: TransactionId, signer: PublicKey) -> Self {
        TxRequest {
            tx_id,
            signer,
            is_reward: false,
            inputs: Vec::new(),
        }
    }

    /// Mark this transaction as a reward transaction.
    pub fn reward(mut self) -> Self {
        self.is_reward = true;
        self
    }

    /// Append an input.
    pub fn input(mut self, contract: impl Into<ContractRef>, arg: InputArg) -> Self {
        self.inputs.push((contract.into(), arg));
        self
    }

    /// Append an input with a literal argument.
    pub fn literal<T: FaeValue>(self, contract: impl Into<ContractRef>, value: T) -> Self {
        self.input(contract, InputArg::Literal(Dynamic::new(value)))
    }

    /// Append an input chained from the `index`-th earlier input's result.
    pub fn trusted(self, contract: impl Into<ContractRef>, index: usize) -> Self {
        self.input(contract, InputArg::Trusted(index))
    }
}

/// Execute a transaction against storage.
///
/// On success, returns the body's result; the committed entry is
/// installed under the request's transaction ID and all input-contract
/// updates are applied. On failure, returns the error and installs a
/// poisoned entry instead; no other storage state changes.
///
/// Fails up front with `BadTransactionId` if an entry (committed or
/// poisoned) already exists under the ID: entries are written once.
pub fn run_transaction<I, R, F>(
    storage: &mut Storage,
    request: TxRequest,
    body: F,
) -> Result<R, EngineError>
where
    I: InputTuple,
    R: FaeValue + Clone,
    F: FnOnce(&mut CallCtx<'_>, I) -> Result<R, EngineError>,
{
    let TxRequest {
        tx_id,
        signer,
        is_reward,
        inputs,
    } = request;

    if storage.contains(&tx_id) {
        return Err(StorageError::BadTransactionId(tx_id).into());
    }

    let mut signers = BTreeMap::new();
    signers.insert("self".to_string(), signer);

    let mut frame = TxFrame::new(storage, tx_id, &signer);
    match frame.execute::<I, R, F>(inputs, is_reward, body) {
        Ok((result, data, staged)) => {
            for (id, update) in staged {
                storage.install(&id, update)?;
            }
            storage.insert_entry(tx_id, TransactionEntry::committed(signers, data));
            debug!(%tx_id, "transaction committed");
            Ok(result)
        }
        Err(error) => {
            warn!(%tx_id, %error, "transaction poisoned");
            storage.insert_entry(tx_id, TransactionEntry::poisoned(signers, error.clone()));
            Err(error)
        }
    }
}

/// Per-transaction execution state: the ambient escrow map, the growing
/// result sequence, the per-input records, and the staged contract
/// updates that only land in storage at commit.
struct TxFrame<'a> {
    storage: &'a Storage,
    tx_id: TransactionId,
    signer: &'a PublicKey,
    alloc: EntryAllocator,
    escrows: EscrowMap,
    results: Vec<(ContractId, Dynamic)>,
    records: BTreeMap<ShortContractId, InputOutputVersions>,
    order: Vec<ShortContractId>,
    /// One record per completed call, in call order; commit replays them
    /// through `Storage::install` so nonces advance once per call.
    staged: Vec<(ContractId, Option<StoredContract>)>,
    /// Latest staged state per contract, consulted before storage so a
    /// contract dispatched twice in one transaction sees its own update.
    staged_view: BTreeMap<ContractId, (Option<StoredContract>, u64)>,
}

type Staged = Vec<(ContractId, Option<StoredContract>)>;

impl<'a> TxFrame<'a> {
    fn new(storage: &'a Storage, tx_id: TransactionId, signer: &'a PublicKey) -> Self {
        TxFrame {
            storage,
            tx_id,
            signer,
            alloc: EntryAllocator::new(tx_id),
            escrows: EscrowMap::new(),
            results: Vec::new(),
            records: BTreeMap::new(),
            order: Vec::new(),
            staged: Vec::new(),
            staged_view: BTreeMap::new(),
        }
    }

    fn execute<I, R, F>(
        &mut self,
        inputs: Vec<(ContractRef, InputArg)>,
        is_reward: bool,
        body: F,
    ) -> Result<(R, EntryData, Staged), EngineError>
    where
        I: InputTuple,
        R: FaeValue + Clone,
        F: FnOnce(&mut CallCtx<'_>, I) -> Result<R, EngineError>,
    {
        for (contract, arg) in inputs {
            self.dispatch(contract, arg)?;
        }

        if is_reward {
            self.inject_reward();
        }

        let tuple = I::decode(self.results.iter().map(|(_, d)| d.clone()).collect())?;

        let mut outputs: Vec<StoredContract> = Vec::new();
        let result = {
            let mut ctx = CallCtx {
                escrows: &mut self.escrows,
                outputs: &mut outputs,
                signer: self.signer,
                alloc: &mut self.alloc,
            };
            body(&mut ctx, tuple)?
        };

        if !self.escrows.is_empty() {
            return Err(EscrowError::OpenEscrows(self.escrows.entry_ids()).into());
        }

        let data = EntryData {
            input_outputs: std::mem::take(&mut self.records),
            input_order: std::mem::take(&mut self.order),
            outputs: outputs.into_iter().map(OutputSlot::fresh).collect(),
            result: Dynamic::new(result.clone()),
        };
        Ok((result, data, std::mem::take(&mut self.staged)))
    }

    /// Resolve a contract reference against the staged view first, then
    /// storage, enforcing the nonce assertion either way.
    fn resolve(&self, r: &ContractRef) -> Result<(StoredContract, u64), EngineError> {
        let (contract, nonce) = match self.staged_view.get(&r.id) {
            Some((contract, nonce)) => (contract.clone(), *nonce),
            None => {
                let slot = self.storage.slot(&r.id)?;
                (slot.contract().cloned(), slot.nonce())
            }
        };
        if let Some(claimed) = r.claimed_nonce {
            if nonce != claimed {
                return Err(StorageError::BadNonce {
                    id: r.id.clone(),
                    actual: nonce,
                    claimed,
                }
                .into());
            }
        }
        match contract {
            Some(contract) => Ok((contract, nonce)),
            None => Err(InputError::BadInput(r.id.clone()).into()),
        }
    }

    fn dispatch(&mut self, r: ContractRef, arg: InputArg) -> Result<(), EngineError> {
        let id = r.id.clone();
        let short = id.shorten();
        debug!(contract = %r, "dispatching input");

        let (contract, nonce) = self.resolve(&r)?;

        let mut arg = match arg {
            InputArg::Literal(value) => value,
            InputArg::Trusted(index) => {
                let (source, value) = self
                    .results
                    .get(index)
                    .ok_or_else(|| InputError::BadChainedInput(id.clone(), index))?;
                if !contract.trusts.contains(&source.shorten()) {
                    return Err(InputError::UntrustedInput {
                        contract: id.clone(),
                        source_contract: source.clone(),
                    }
                    .into());
                }
                value.clone()
            }
        };

        let StoredContract {
            arg_ty,
            ret_ty,
            trusts,
            escrows: mut inner,
            code,
        } = contract;

        if arg.tag != arg_ty {
            return Err(InputError::BadArgType {
                expected: arg_ty,
                actual: arg.tag,
            }
            .into());
        }

        // The input's own output scope: publications during this call are
        // attributed to the input, not the transaction.
        let mut published: Vec<StoredContract> = Vec::new();

        absorb(
            &mut arg,
            &mut self.escrows,
            &mut inner,
            &mut published,
            self.signer,
            &mut self.alloc,
        )?;

        let outcome = {
            let mut ctx = CallCtx {
                escrows: &mut inner,
                outputs: &mut published,
                signer: self.signer,
                alloc: &mut self.alloc,
            };
            code.call(&mut ctx, arg)?
        };

        let (mut value, next) = match outcome {
            Outcome::Release { value, next } => (value, Some(next)),
            Outcome::Spend { value } => (value, None),
        };
        check_return(&value, &ret_ty)?;
        absorb(
            &mut value,
            &mut inner,
            &mut self.escrows,
            &mut published,
            self.signer,
            &mut self.alloc,
        )?;

        // A released contract keeps whatever backing it did not return;
        // a spent one takes its residue with it.
        let update = next.map(|code| StoredContract {
            arg_ty,
            ret_ty,
            trusts,
            escrows: inner,
            code,
        });

        self.staged.push((id.clone(), update.clone()));
        self.staged_view.insert(id.clone(), (update, nonce + 1));

        self.records.insert(
            short,
            InputOutputVersions {
                real_id: id.clone(),
                outputs: published.into_iter().map(OutputSlot::fresh).collect(),
                versions: BTreeMap::new(),
                nonce: nonce + 1,
            },
        );
        self.order.push(short);
        self.results.push((id, value));
        Ok(())
    }

    fn inject_reward(&mut self) {
        let entry = self.alloc.fresh();
        self.escrows.insert(entry, reward_escrow());
        let id = EscrowId::<(), Reward>::direct(entry);
        debug!(%entry, "reward escrow minted");
        self.results
            .push((ContractId::JustTransaction(self.tx_id), Dynamic::new(id)));
    }
}
