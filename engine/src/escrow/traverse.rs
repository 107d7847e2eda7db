//! # Escrow Traversal
//!
//! The structural walk underneath the linearity discipline. Given any
//! [`Value`], [`traverse_escrows`] visits every [`EscrowHandle`] it
//! transitively contains, exactly once, in structural order, carrying the
//! accumulated path of record-field and variant-constructor names. List
//! elements share their parent's path: a locator cannot distinguish
//! elements of the same list, which is what makes "more than one match"
//! a resolvable condition rather than an ambiguity.
//!
//! Deferred calls traverse inside-out: a `TxIn`'s captured argument is
//! walked before the `TxIn` handle itself is presented, so an argument's
//! backing moves before the deferred entry does. A `TxOut`'s carried
//! result is walked the same way.
//!
//! Built on the walk:
//!
//! - [`transfer`] — move every referenced backing entry from one escrow
//!   map to another, the operation performed at every call boundary.
//! - [`resolve_locator`] — find the unique escrow at a path inside a
//!   container.

use std::collections::BTreeSet;
use tracing::trace;

use crate::error::{EngineError, EscrowError};
use crate::escrow::{EscrowHandle, EscrowMap, EscrowPath, EscrowSource};
use crate::ids::EntryId;
use crate::value::Value;

/// Visit every escrow handle in `value`, mutably, with its path.
pub fn traverse_escrows<F>(value: &mut Value, visit: &mut F) -> Result<(), EngineError>
where
    F: FnMut(&mut EscrowHandle, &[String]) -> Result<(), EngineError>,
{
    let mut path = Vec::new();
    walk(value, &mut path, visit)
}

fn walk<F>(
    value: &mut Value,
    path: &mut Vec<String>,
    visit: &mut F,
) -> Result<(), EngineError>
where
    F: FnMut(&mut EscrowHandle, &[String]) -> Result<(), EngineError>,
{
    match value {
        Value::Unit
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Nat(_)
        | Value::Text(_)
        | Value::Bytes(_) => Ok(()),
        Value::List(items) => {
            for item in items {
                walk(item, path, visit)?;
            }
            Ok(())
        }
        Value::Record(fields) => {
            for (name, field) in fields {
                path.push(name.clone());
                walk(field, path, visit)?;
                path.pop();
            }
            Ok(())
        }
        Value::Variant(name, fields) => {
            path.push(name.clone());
            for field in fields {
                walk(field, path, visit)?;
            }
            path.pop();
            Ok(())
        }
        Value::Escrow(handle) => {
            match &mut handle.source {
                EscrowSource::TxIn { arg, .. } => walk(&mut arg.value, path, visit)?,
                EscrowSource::TxOut { val, .. } => walk(&mut val.value, path, visit)?,
                EscrowSource::Direct { .. } | EscrowSource::Locator { .. } => {}
            }
            visit(handle, path)
        }
    }
}

/// How strongly a reference demands its backing entry at transfer time.
enum Demand {
    /// The entry must exist in the source map (`Direct`, `TxIn`).
    Required(EntryId),
    /// The entry moves if still live; a spent deferred call carries only
    /// its result (`TxOut`).
    IfLive(EntryId),
}

/// Collect the entries a value's references demand, in traversal order.
///
/// An unresolved locator here means the value reached an operational
/// context without being resolved first.
fn collect(value: &mut Value) -> Result<Vec<Demand>, EngineError> {
    let mut demands = Vec::new();
    traverse_escrows(value, &mut |handle, _path| {
        match &handle.source {
            EscrowSource::Direct { entry } | EscrowSource::TxIn { entry, .. } => {
                demands.push(Demand::Required(*entry));
            }
            EscrowSource::TxOut { entry, .. } => {
                demands.push(Demand::IfLive(*entry));
            }
            EscrowSource::Locator { path } => {
                return Err(EscrowError::UnresolvedEscrowLocator(path.clone()).into());
            }
        }
        Ok(())
    })?;
    Ok(demands)
}

/// Move the backing of every escrow `value` references from `from` into
/// `to`.
///
/// This is the transfer half of the linearity invariant: a reference
/// crossing a call boundary is only as good as the entry that travels
/// with it. Referencing the same entry twice in one value is
/// `DuplicateEscrow`; a required entry absent from the source map is
/// `MissingEscrow`.
pub fn transfer(
    value: &mut Value,
    from: &mut EscrowMap,
    to: &mut EscrowMap,
) -> Result<(), EngineError> {
    let demands = collect(value)?;
    let mut seen = BTreeSet::new();
    for demand in demands {
        let (entry, required) = match demand {
            Demand::Required(entry) => (entry, true),
            Demand::IfLive(entry) => (entry, false),
        };
        if !seen.insert(entry) {
            return Err(EscrowError::DuplicateEscrow(entry).into());
        }
        match from.remove(&entry) {
            Some(escrow) => {
                trace!(%entry, "escrow transferred");
                to.insert(entry, escrow);
            }
            None if required => return Err(EscrowError::MissingEscrow(entry).into()),
            None => {}
        }
    }
    Ok(())
}

/// Find the unique escrow reference at `path` inside `container`.
///
/// Zero matches or more than one match fail with
/// `UnresolvedEscrowLocator`; locators inside the container are not
/// candidates (a locator cannot resolve to another locator).
pub fn resolve_locator(
    container: &Value,
    path: &EscrowPath,
) -> Result<EscrowHandle, EscrowError> {
    let mut found = Vec::new();
    collect_at_path(container, &mut Vec::new(), path.segments(), &mut found);
    match found.as_slice() {
        [handle] => Ok(handle.clone()),
        _ => Err(EscrowError::UnresolvedEscrowLocator(path.clone())),
    }
}

fn collect_at_path(
    value: &Value,
    at: &mut Vec<String>,
    target: &[String],
    found: &mut Vec<EscrowHandle>,
) {
    match value {
        Value::List(items) => {
            for item in items {
                collect_at_path(item, at, target, found);
            }
        }
        Value::Record(fields) => {
            for (name, field) in fields {
                at.push(name.clone());
                collect_at_path(field, at, target, found);
                at.pop();
            }
        }
        Value::Variant(name, fields) => {
            at.push(name.clone());
            for field in fields {
                collect_at_path(field, at, target, found);
            }
            at.pop();
        }
        Value::Escrow(handle) => {
            if at == target && !matches!(handle.source, EscrowSource::Locator { .. }) {
                found.push(handle.clone());
            }
        }
        _ => {}
    }
}
