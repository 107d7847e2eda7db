//! # Audit Rendering
//!
//! The persisted-entry layout, rendered as text. Rendering never fails on
//! a poisoned entry: each semantic field is read individually and a field
//! that re-raises prints as `<exception> …` instead, so a failed
//! transaction's record is exactly as inspectable as a committed one.
//!
//! [`Storage::audit`] renders the whole map in transaction-ID order. Two
//! runs of the engine over identical inputs must produce byte-identical
//! audit output; the determinism tests compare exactly these bytes.

use crate::error::{EngineError, StorageError};
use crate::ids::TransactionId;
use crate::storage::{Storage, TransactionEntry};

/// Render one transaction entry in the audit layout.
///
/// Fails only if no entry exists under `tx`; failures *inside* the entry
/// are caught per field and printed.
pub fn show_transaction(storage: &Storage, tx: &TransactionId) -> Result<String, EngineError> {
    let entry = storage.entry(tx)?;
    Ok(render_entry(tx, entry))
}

fn render_entry(tx: &TransactionId, entry: &TransactionEntry) -> String {
    let mut out = String::new();
    out.push_str(&format!("Transaction {tx}\n"));

    match entry.result() {
        Ok(result) => out.push_str(&format!("  result: {result}\n")),
        Err(e) => out.push_str(&format!("  result: <exception> {e}\n")),
    }

    match entry.outputs() {
        Ok(outputs) => {
            let indices: Vec<String> = (0..outputs.len()).map(|i| i.to_string()).collect();
            out.push_str(&format!("  outputs: [{}]\n", indices.join(", ")));
        }
        Err(e) => out.push_str(&format!("  outputs: <exception> {e}\n")),
    }

    out.push_str("  signers:\n");
    for (name, key) in entry.signers() {
        out.push_str(&format!("    {name}: {key}\n"));
    }

    match entry.input_order() {
        Ok(order) => {
            for short in order {
                out.push_str(&format!("  input {short}\n"));
                let record = entry.input_outputs().and_then(|records| {
                    records
                        .get(short)
                        .ok_or_else(|| StorageError::BadInputId(*tx, *short).into())
                });
                match record {
                    Ok(record) => {
                        out.push_str(&format!("    nonce: {}\n", record.nonce));
                        let indices: Vec<String> =
                            (0..record.outputs.len()).map(|i| i.to_string()).collect();
                        out.push_str(&format!("    outputs: [{}]\n", indices.join(", ")));
                        out.push_str("    versions:\n");
                        for (version, tag) in &record.versions {
                            out.push_str(&format!("      {version}: {tag}\n"));
                        }
                    }
                    Err(e) => out.push_str(&format!("    <exception> {e}\n")),
                }
            }
        }
        Err(e) => out.push_str(&format!("  inputs: <exception> {e}\n")),
    }

    out
}

impl Storage {
    /// Render every entry, in transaction-ID order.
    ///
    /// This is the engine's determinism witness: equal runs produce equal
    /// bytes here, and the end-to-end tests hold it to that.
    pub fn audit(&self) -> String {
        let mut out = String::new();
        for tx in self.transaction_ids() {
            if let Ok(rendered) = show_transaction(self, tx) {
                out.push_str(&rendered);
                out.push('\n');
            }
        }
        out
    }
}
