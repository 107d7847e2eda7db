//! # Escrows
//!
//! An escrow is the engine's linear resource: a one-owner callable whose
//! references inside values *are* the scarce thing being traded. A value
//! "backed" by an escrow is worth something precisely because the backing
//! entry lives in exactly one escrow map at a time and moves only when the
//! value referencing it is returned across a call boundary.
//!
//! Three layers:
//!
//! - [`EscrowHandle`] — the untyped reference that actually sits inside a
//!   [`Value`](crate::value::Value) tree, with its declared argument and
//!   return tags. One of four sources: a resolved entry, a deferred call
//!   (`TxIn`), a completed deferred call (`TxOut`), or a symbolic
//!   [`EscrowPath`] locator.
//! - [`EscrowId<A, V>`] — the phantom-typed wrapper user code holds. The
//!   types are the escrow's argument and return types, so `use_escrow`
//!   is fully typed at the call site.
//! - [`Escrow`] / [`EscrowMap`] — a live escrow (its code, types, and own
//!   backing map) and the ordered map a frame owns them in.
//!
//! A locator never reaches an operational point: transferring or invoking
//! through one fails with `UnresolvedEscrowLocator`. Resolve it first with
//! [`EscrowId::resolve`] against the container the escrow actually sits in.

pub mod traverse;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::{EngineError, EscrowError};
use crate::ids::EntryId;
use crate::runtime::ContractCode;
use crate::value::{Dynamic, FaeValue, ShapeError, TypeTag, Value};

/// A symbolic path of record-field / variant-constructor names, written
/// `a.b.c`. Whitespace around the dots is permitted on parse and dropped
/// on print.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EscrowPath(Vec<String>);

impl EscrowPath {
    /// Build a path from its segments.
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        EscrowPath(segments.into_iter().map(Into::into).collect())
    }

    /// The path's segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for EscrowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl fmt::Debug for EscrowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Error parsing an escrow path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid escrow path: segments must be non-empty, separated by dots")]
pub struct InvalidPath;

impl FromStr for EscrowPath {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s.split('.').map(|seg| seg.trim().to_string()).collect();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(InvalidPath);
        }
        Ok(EscrowPath(segments))
    }
}

/// Where an escrow reference points.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowSource {
    /// A resolved reference to a live entry.
    Direct { entry: EntryId },
    /// A deferred call: the argument was captured in the caller's context
    /// and the call runs when the reference next crosses into a frame.
    TxIn { entry: EntryId, arg: Box<Dynamic> },
    /// A completed deferred call carrying its result.
    TxOut { entry: EntryId, val: Box<Dynamic> },
    /// A symbolic path, not yet resolved to an entry.
    Locator { path: EscrowPath },
}

/// The untyped escrow reference stored inside value trees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowHandle {
    pub source: EscrowSource,
    pub arg_ty: TypeTag,
    pub ret_ty: TypeTag,
}

impl EscrowHandle {
    /// The referenced entry, for sources that have one.
    pub fn entry(&self) -> Result<&EntryId, EscrowError> {
        match &self.source {
            EscrowSource::Direct { entry }
            | EscrowSource::TxIn { entry, .. }
            | EscrowSource::TxOut { entry, .. } => Ok(entry),
            EscrowSource::Locator { path } => {
                Err(EscrowError::UnresolvedEscrowLocator(path.clone()))
            }
        }
    }
}

impl fmt::Display for EscrowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            EscrowSource::Locator { path } => {
                write!(f, "EscrowLocator {} :: {} -> {}", path, self.arg_ty, self.ret_ty)
            }
            EscrowSource::Direct { entry }
            | EscrowSource::TxIn { entry, .. }
            | EscrowSource::TxOut { entry, .. } => {
                write!(f, "{} :: {} -> {}", entry, self.arg_ty, self.ret_ty)
            }
        }
    }
}

/// A typed escrow reference: `A` is the escrow's argument type, `V` its
/// return type.
#[derive(Clone, PartialEq, Eq)]
pub struct EscrowId<A, V> {
    handle: EscrowHandle,
    _types: PhantomData<fn() -> (A, V)>,
}

impl<A: FaeValue, V: FaeValue> EscrowId<A, V> {
    pub(crate) fn direct(entry: EntryId) -> Self {
        EscrowId {
            handle: EscrowHandle {
                source: EscrowSource::Direct { entry },
                arg_ty: A::type_tag(),
                ret_ty: V::type_tag(),
            },
            _types: PhantomData,
        }
    }

    /// A symbolic reference to the escrow at `path` inside some container.
    /// Must be [`resolve`](Self::resolve)d before operational use.
    pub fn locator(path: EscrowPath) -> Self {
        EscrowId {
            handle: EscrowHandle {
                source: EscrowSource::Locator { path },
                arg_ty: A::type_tag(),
                ret_ty: V::type_tag(),
            },
            _types: PhantomData,
        }
    }

    /// Recover the typed wrapper from an untyped handle, checking tags.
    pub fn from_handle(handle: EscrowHandle) -> Result<Self, ShapeError> {
        if handle.arg_ty != A::type_tag() || handle.ret_ty != V::type_tag() {
            return Err(ShapeError(Self::type_tag()));
        }
        Ok(EscrowId {
            handle,
            _types: PhantomData,
        })
    }

    /// The underlying untyped handle.
    pub fn handle(&self) -> &EscrowHandle {
        &self.handle
    }

    /// The referenced entry ID, unless this is an unresolved locator.
    pub fn entry(&self) -> Result<EntryId, EscrowError> {
        self.handle.entry().copied()
    }

    /// Capture an argument for a deferred call: the call itself runs when
    /// this reference next crosses into a frame that holds the entry.
    pub fn defer(self, arg: A) -> Result<Self, EscrowError> {
        match self.handle.source {
            EscrowSource::Direct { entry } => Ok(EscrowId {
                handle: EscrowHandle {
                    source: EscrowSource::TxIn {
                        entry,
                        arg: Box::new(Dynamic::new(arg)),
                    },
                    arg_ty: self.handle.arg_ty,
                    ret_ty: self.handle.ret_ty,
                },
                _types: PhantomData,
            }),
            EscrowSource::TxIn { entry, .. } | EscrowSource::TxOut { entry, .. } => {
                Err(EscrowError::BadEscrowId(entry))
            }
            EscrowSource::Locator { path } => Err(EscrowError::UnresolvedEscrowLocator(path)),
        }
    }

    /// The result of a completed deferred call.
    pub fn result(&self) -> Result<V, EngineError> {
        match &self.handle.source {
            EscrowSource::TxOut { val, .. } => Ok((**val).clone().decode::<V>()?),
            EscrowSource::Direct { entry } | EscrowSource::TxIn { entry, .. } => {
                Err(EscrowError::NotEscrowOut(*entry).into())
            }
            EscrowSource::Locator { path } => {
                Err(EscrowError::UnresolvedEscrowLocator(path.clone()).into())
            }
        }
    }

    /// Resolve a locator against the container holding the escrow.
    ///
    /// Finds the unique escrow reference at this locator's path inside
    /// `container`; zero matches, multiple matches, or a type mismatch all
    /// fail with `UnresolvedEscrowLocator`. Non-locator IDs resolve to
    /// themselves.
    pub fn resolve<C: FaeValue + Clone>(self, container: &C) -> Result<Self, EscrowError> {
        let path = match self.handle.source {
            EscrowSource::Locator { ref path } => path.clone(),
            _ => return Ok(self),
        };
        let container = container.clone().into_value();
        let handle = traverse::resolve_locator(&container, &path)?;
        if handle.arg_ty != self.handle.arg_ty || handle.ret_ty != self.handle.ret_ty {
            return Err(EscrowError::UnresolvedEscrowLocator(path));
        }
        Ok(EscrowId {
            handle,
            _types: PhantomData,
        })
    }
}

impl<A, V> fmt::Display for EscrowId<A, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.handle)
    }
}

impl<A, V> fmt::Debug for EscrowId<A, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.handle)
    }
}

impl<A: FaeValue, V: FaeValue> FaeValue for EscrowId<A, V> {
    fn type_tag() -> TypeTag {
        TypeTag::new(format!(
            "EscrowId<{} -> {}>",
            A::type_tag(),
            V::type_tag()
        ))
    }

    fn into_value(self) -> Value {
        Value::Escrow(self.handle)
    }

    fn from_value(value: Value) -> Result<Self, ShapeError> {
        match value {
            Value::Escrow(handle) => Self::from_handle(handle),
            _ => Err(ShapeError(Self::type_tag())),
        }
    }
}

/// A live escrow: its declared types, its own backing map, and its code.
#[derive(Clone)]
pub struct Escrow {
    pub arg_ty: TypeTag,
    pub ret_ty: TypeTag,
    pub escrows: EscrowMap,
    pub code: Box<dyn ContractCode>,
}

/// The ordered escrow map a frame owns. Keyed by entry ID; `BTreeMap` so
/// open-escrow reporting and audit output are deterministic.
#[derive(Clone, Default)]
pub struct EscrowMap {
    entries: BTreeMap<EntryId, Escrow>,
}

impl EscrowMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: EntryId, escrow: Escrow) {
        self.entries.insert(entry, escrow);
    }

    pub fn remove(&mut self, entry: &EntryId) -> Option<Escrow> {
        self.entries.remove(entry)
    }

    pub fn contains(&self, entry: &EntryId) -> bool {
        self.entries.contains_key(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry IDs currently resident, in order.
    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.entries.keys().copied().collect()
    }
}
