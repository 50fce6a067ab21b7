//! Per-server function tables.
//!
//! Populated while the server is being built and read-only once it serves, so
//! lookups need no locking.

use crate::error::{Result, RpcError};
use crate::handler::Handler;
use crate::protocol::RequestKind;
use std::collections::BTreeMap;

/// Which table a function lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Single-response functions.
    Call,
    /// Streaming and fire-and-forget functions.
    Stream,
}

impl Table {
    /// The table serving requests of `kind`, if any.
    pub fn for_kind(kind: &RequestKind) -> Option<Table> {
        match kind {
            RequestKind::Call => Some(Table::Call),
            RequestKind::Start | RequestKind::Notify => Some(Table::Stream),
            RequestKind::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Call => "call",
            Table::Stream => "stream",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered function: its type-erased entry point plus the names of its
/// input and output types.
pub struct Entry<C> {
    pub handler: Handler<C>,
    pub input: &'static str,
    pub output: &'static str,
}

impl<C> Clone for Entry<C> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            input: self.input,
            output: self.output,
        }
    }
}

impl<C> std::fmt::Debug for Entry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl<C> Entry<C> {
    pub fn new(handler: Handler<C>, input: &'static str, output: &'static str) -> Self {
        Self {
            handler,
            input,
            output,
        }
    }

    /// An entry whose types are only known to the handler itself.
    pub fn untyped(handler: Handler<C>) -> Self {
        Self::new(handler, "?", "?")
    }
}

/// Summary of one registered function, for introspection and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub table: Table,
    pub name: String,
    pub input: &'static str,
    pub output: &'static str,
}

/// The two function tables of one server.
pub struct Registry<C> {
    calls: BTreeMap<String, Entry<C>>,
    streams: BTreeMap<String, Entry<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            calls: BTreeMap::new(),
            streams: BTreeMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, table: Table) -> &BTreeMap<String, Entry<C>> {
        match table {
            Table::Call => &self.calls,
            Table::Stream => &self.streams,
        }
    }

    /// Register `entry` under `name`, replacing and returning any previous
    /// entry of the same table and name.
    pub fn register(
        &mut self,
        table: Table,
        name: impl Into<String>,
        entry: Entry<C>,
    ) -> Option<Entry<C>> {
        let map = match table {
            Table::Call => &mut self.calls,
            Table::Stream => &mut self.streams,
        };
        map.insert(name.into(), entry)
    }

    /// Find the function serving a request of `kind` named `function`.
    pub fn lookup(&self, kind: &RequestKind, function: &str) -> Result<&Entry<C>> {
        let table = Table::for_kind(kind).ok_or(RpcError::MethodNotFound)?;
        self.table(table)
            .get(function)
            .ok_or_else(|| RpcError::FunctionNotFound(function.to_string()))
    }

    /// Every registered function, call table first, each table by name.
    pub fn entries(&self) -> Vec<EntryInfo> {
        [Table::Call, Table::Stream]
            .into_iter()
            .flat_map(|table| {
                self.table(table).iter().map(move |(name, entry)| EntryInfo {
                    table,
                    name: name.clone(),
                    input: entry.input,
                    output: entry.output,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len() + self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
