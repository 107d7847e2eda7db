//! # Storage
//!
//! The single shared object in the engine: an ordered map from transaction
//! ID to transaction entry. Entries are written once, at commit, and are
//! read-only afterwards, except for the contract slots inside them, which
//! the engine writes through the typed path accessors when a later
//! transaction calls the contracts they hold.
//!
//! ## Slots and nonces
//!
//! Contract outputs live in [`OutputSlot`]s. A slot's index is assigned at
//! creation and never shifts: spending a contract empties the slot but the
//! slot (and its nonce) remain, so `TransactionOutput(tx, 3)` means the
//! same thing forever. The nonce counts completed calls since creation;
//! it starts at 0 for a fresh output and increments once per completed
//! call, whether the call released a continuation or spent the contract.
//!
//! ## Poisoned entries
//!
//! A failed transaction still installs an entry, holding the captured
//! failure instead of a body. Reading `input_outputs`, `input_order`,
//! `outputs`, or `result` on such an entry re-raises the failure; the
//! signer map stays readable. This is what makes failures auditable
//! without making them contagious: descending *through* a poisoned entry
//! to one of its contracts reports the original failure, not a generic
//! lookup error.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::debug;

use crate::crypto::keys::PublicKey;
use crate::error::{EngineError, StorageError};
use crate::escrow::EscrowMap;
use crate::ids::{ContractId, ContractRef, ShortContractId, TransactionId, VersionId};
use crate::runtime::ContractCode;
use crate::value::{Dynamic, TypeTag};

/// A contract as it rests in a storage slot: declared types, trust set,
/// backing escrows, and resumable code.
#[derive(Clone)]
pub struct StoredContract {
    pub arg_ty: TypeTag,
    pub ret_ty: TypeTag,
    /// Short IDs whose chained results this contract accepts as `Trusted`
    /// arguments.
    pub trusts: BTreeSet<ShortContractId>,
    pub escrows: EscrowMap,
    pub code: Box<dyn ContractCode>,
}

/// An output slot: a position that may hold a contract, plus the call
/// count for whatever has occupied it.
#[derive(Clone)]
pub struct OutputSlot {
    contract: Option<StoredContract>,
    nonce: u64,
}

impl std::fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSlot")
            .field("contract", &self.contract.is_some())
            .field("nonce", &self.nonce)
            .finish()
    }
}

impl OutputSlot {
    /// A freshly published contract: nonce starts at 0.
    pub(crate) fn fresh(contract: StoredContract) -> Self {
        OutputSlot {
            contract: Some(contract),
            nonce: 0,
        }
    }

    /// Completed calls since this slot was created.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The resident contract, if not yet spent.
    pub fn contract(&self) -> Option<&StoredContract> {
        self.contract.as_ref()
    }

    /// Whether the slot has been emptied by a spend.
    pub fn is_spent(&self) -> bool {
        self.contract.is_none()
    }
}

/// The record kept for one input of a committed transaction.
#[derive(Clone, Debug)]
pub struct InputOutputVersions {
    /// The full contract ID this input's short ID stands for.
    pub real_id: ContractId,
    /// Contracts the input published during its call, indexed in creation
    /// order.
    pub outputs: Vec<OutputSlot>,
    /// Recorded contract versions. Committed empty by the engine; the
    /// module version control populates it.
    pub versions: BTreeMap<VersionId, TypeTag>,
    /// The input's nonce after its call completed.
    pub nonce: u64,
}

/// The semantic fields of a committed transaction entry.
#[derive(Clone)]
pub struct EntryData {
    pub input_outputs: BTreeMap<ShortContractId, InputOutputVersions>,
    pub input_order: Vec<ShortContractId>,
    pub outputs: Vec<OutputSlot>,
    pub result: Dynamic,
}

/// A transaction's permanent record: its signers, and either its committed
/// data or the failure that poisoned it.
pub struct TransactionEntry {
    signers: BTreeMap<String, PublicKey>,
    data: Result<EntryData, EngineError>,
}

impl TransactionEntry {
    pub(crate) fn committed(signers: BTreeMap<String, PublicKey>, data: EntryData) -> Self {
        TransactionEntry {
            signers,
            data: Ok(data),
        }
    }

    pub(crate) fn poisoned(signers: BTreeMap<String, PublicKey>, error: EngineError) -> Self {
        TransactionEntry {
            signers,
            data: Err(error),
        }
    }

    /// The signer map. Readable even on poisoned entries.
    pub fn signers(&self) -> &BTreeMap<String, PublicKey> {
        &self.signers
    }

    /// Whether this entry records a failure.
    pub fn is_poisoned(&self) -> bool {
        self.data.is_err()
    }

    fn data(&self) -> Result<&EntryData, EngineError> {
        self.data.as_ref().map_err(Clone::clone)
    }

    fn data_mut(&mut self) -> Result<&mut EntryData, EngineError> {
        self.data.as_mut().map_err(|e| e.clone())
    }

    /// Per-input records, keyed by short contract ID. Re-raises on a
    /// poisoned entry.
    pub fn input_outputs(
        &self,
    ) -> Result<&BTreeMap<ShortContractId, InputOutputVersions>, EngineError> {
        Ok(&self.data()?.input_outputs)
    }

    /// Input short IDs in dispatch order. Re-raises on a poisoned entry.
    pub fn input_order(&self) -> Result<&[ShortContractId], EngineError> {
        Ok(&self.data()?.input_order)
    }

    /// Top-level output slots. Re-raises on a poisoned entry.
    pub fn outputs(&self) -> Result<&[OutputSlot], EngineError> {
        Ok(&self.data()?.outputs)
    }

    /// The transaction's informational result. Re-raises on a poisoned
    /// entry.
    pub fn result(&self) -> Result<&Dynamic, EngineError> {
        Ok(&self.data()?.result)
    }
}

/// The storage map.
#[derive(Default)]
pub struct Storage {
    entries: BTreeMap<TransactionId, TransactionEntry>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists under `tx` (committed or poisoned).
    pub fn contains(&self, tx: &TransactionId) -> bool {
        self.entries.contains_key(tx)
    }

    /// All transaction IDs, in order.
    pub fn transaction_ids(&self) -> impl Iterator<Item = &TransactionId> {
        self.entries.keys()
    }

    /// The entry under `tx`.
    pub fn entry(&self, tx: &TransactionId) -> Result<&TransactionEntry, StorageError> {
        self.entries
            .get(tx)
            .ok_or(StorageError::BadTransactionId(*tx))
    }

    pub(crate) fn insert_entry(&mut self, tx: TransactionId, entry: TransactionEntry) {
        debug!(%tx, poisoned = entry.is_poisoned(), "transaction entry installed");
        self.entries.insert(tx, entry);
    }

    /// Descend to the output slot a contract ID names.
    ///
    /// Each level that fails raises its targeted error:
    /// `BadTransactionId` for an unknown transaction, `BadInputId` for an
    /// unknown input record, `BadContractId` for a missing index, and
    /// `InvalidContractId` for `JustTransaction` IDs, which name a
    /// transaction rather than a slot. Descending through a poisoned
    /// entry re-raises the entry's captured failure.
    pub fn slot(&self, id: &ContractId) -> Result<&OutputSlot, EngineError> {
        match id {
            ContractId::JustTransaction(_) => {
                Err(StorageError::InvalidContractId(id.clone()).into())
            }
            ContractId::TransactionOutput(tx, i) => self
                .entry(tx)?
                .outputs()?
                .get(*i)
                .ok_or_else(|| StorageError::BadContractId(id.clone()).into()),
            ContractId::InputOutput(tx, short, i) => self
                .entry(tx)?
                .input_outputs()?
                .get(short)
                .ok_or(StorageError::BadInputId(*tx, *short))?
                .outputs
                .get(*i)
                .ok_or_else(|| StorageError::BadContractId(id.clone()).into()),
        }
    }

    fn slot_mut(&mut self, id: &ContractId) -> Result<&mut OutputSlot, EngineError> {
        match id {
            ContractId::JustTransaction(_) => {
                Err(StorageError::InvalidContractId(id.clone()).into())
            }
            ContractId::TransactionOutput(tx, i) => {
                let entry = self
                    .entries
                    .get_mut(tx)
                    .ok_or(StorageError::BadTransactionId(*tx))?;
                entry
                    .data_mut()?
                    .outputs
                    .get_mut(*i)
                    .ok_or_else(|| StorageError::BadContractId(id.clone()).into())
            }
            ContractId::InputOutput(tx, short, i) => {
                let entry = self
                    .entries
                    .get_mut(tx)
                    .ok_or(StorageError::BadTransactionId(*tx))?;
                entry
                    .data_mut()?
                    .input_outputs
                    .get_mut(short)
                    .ok_or(StorageError::BadInputId(*tx, *short))?
                    .outputs
                    .get_mut(*i)
                    .ok_or_else(|| StorageError::BadContractId(id.clone()).into())
            }
        }
    }

    /// Resolve a contract reference, enforcing its nonce assertion.
    pub fn check_ref(&self, r: &ContractRef) -> Result<&OutputSlot, EngineError> {
        let slot = self.slot(&r.id)?;
        if let Some(claimed) = r.claimed_nonce {
            if slot.nonce != claimed {
                return Err(StorageError::BadNonce {
                    id: r.id.clone(),
                    actual: slot.nonce,
                    claimed,
                }
                .into());
            }
        }
        Ok(slot)
    }

    /// Write a completed call back through a contract ID.
    ///
    /// `Some` installs the continuation of a released contract; `None`
    /// clears the slot after a spend. Either way the call completed, so
    /// the nonce increments; the slot itself stays, keeping later indices
    /// stable.
    pub(crate) fn install(
        &mut self,
        id: &ContractId,
        update: Option<StoredContract>,
    ) -> Result<(), EngineError> {
        let slot = self
            .slot_mut(id)
            .map_err(|_| StorageError::InvalidNonceAt(id.clone()))?;
        slot.nonce += 1;
        slot.contract = update;
        debug!(%id, nonce = slot.nonce, spent = slot.contract.is_none(), "contract slot updated");
        Ok(())
    }
}
