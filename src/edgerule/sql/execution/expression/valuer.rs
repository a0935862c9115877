//! Valuer composition.
//!
//! A [`MultiValuer`] is an ordered list of lookup sources built for a single
//! evaluation call. Names resolve against the first source that knows them:
//! row fields and metadata, then window-range pseudo fields, then wildcard
//! expansion. Function tables are consulted by the evaluator between the
//! window range and the wildcard, through the [`FunctionRegistry`](super::FunctionRegistry).

use crate::edgerule::sql::execution::collection::WindowRange;
use crate::edgerule::sql::execution::types::{FieldValue, StreamRecord};
use std::collections::HashMap;

/// A source that can resolve column, metadata and wildcard references
pub trait Valuer {
    /// Resolve a column, optionally restricted to one stream
    fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue>;

    /// Resolve a metadata key; `*` returns the whole metadata map
    fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue>;

    /// All fields of the row, or of one stream's part of it
    fn all(&self, _stream: Option<&str>) -> Option<HashMap<String, FieldValue>> {
        None
    }
}

/// Data that aggregate functions are evaluated over
pub trait AggregateData {
    /// One valuer per row of the group, in input order
    fn aggregate_rows(&self) -> Vec<&dyn Valuer>;
}

impl Valuer for StreamRecord {
    fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        StreamRecord::value(self, key, stream)
    }

    fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        StreamRecord::meta(self, key, stream)
    }

    fn all(&self, stream: Option<&str>) -> Option<HashMap<String, FieldValue>> {
        match stream {
            Some(s) if s != self.emitter => None,
            _ => Some(self.to_map()),
        }
    }
}

/// One entry of a valuer chain
#[derive(Clone, Copy)]
pub enum ValuerSource<'a> {
    /// Fields and metadata of a row
    Row(&'a dyn Valuer),
    /// `window_start` and `window_end`
    WindowRange(&'a WindowRange),
    /// `*` and `stream.*` expansion
    Wildcard(&'a dyn Valuer),
}

/// Priority-ordered chain of lookup sources
#[derive(Clone, Default)]
pub struct MultiValuer<'a> {
    sources: Vec<ValuerSource<'a>>,
}

impl<'a> MultiValuer<'a> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// The standard chain for evaluating against one row: row, window range, wildcard
    pub fn for_row(row: &'a dyn Valuer, window_range: Option<&'a WindowRange>) -> Self {
        Self::new()
            .with_row(row)
            .with_window_range(window_range)
            .with_wildcard(row)
    }

    pub fn with_row(mut self, row: &'a dyn Valuer) -> Self {
        self.sources.push(ValuerSource::Row(row));
        self
    }

    pub fn with_window_range(mut self, window_range: Option<&'a WindowRange>) -> Self {
        if let Some(range) = window_range {
            self.sources.push(ValuerSource::WindowRange(range));
        }
        self
    }

    pub fn with_wildcard(mut self, row: &'a dyn Valuer) -> Self {
        self.sources.push(ValuerSource::Wildcard(row));
        self
    }

    pub fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        self.sources.iter().find_map(|source| match source {
            ValuerSource::Row(row) => row.value(key, stream),
            _ => None,
        })
    }

    pub fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        self.sources.iter().find_map(|source| match source {
            ValuerSource::Row(row) => row.meta(key, stream),
            _ => None,
        })
    }

    /// Window-bound pseudo functions such as `window_start()`
    pub fn func_value(&self, name: &str) -> Option<FieldValue> {
        self.sources.iter().find_map(|source| match source {
            ValuerSource::WindowRange(range) => range.func_value(name),
            _ => None,
        })
    }

    pub fn wildcard(&self, stream: Option<&str>) -> Option<HashMap<String, FieldValue>> {
        self.sources.iter().find_map(|source| match source {
            ValuerSource::Wildcard(row) => row.all(stream),
            _ => None,
        })
    }

    /// The window range of the chain, if one was attached
    pub fn window_range(&self) -> Option<&'a WindowRange> {
        self.sources.iter().find_map(|source| match source {
            ValuerSource::WindowRange(range) => Some(*range),
            _ => None,
        })
    }
}
