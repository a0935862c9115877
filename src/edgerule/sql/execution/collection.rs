//! Row and collection variants that flow between operators.
//!
//! A single record travels as [`StreamData::Record`]. Once a window closes, its
//! rows travel as a [`WindowBatch`]; joining turns that into a [`JoinResult`], and
//! grouping turns either into a [`GroupedSet`]. Every collection variant
//! implements [`Collection`] so that operators share iteration, index filtering
//! and flattening.

use crate::edgerule::sql::ast::DEFAULT_STREAM;
use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::expression::valuer::{AggregateData, Valuer};
use crate::edgerule::sql::execution::types::{AffiliateRow, FieldValue, PickColumn, StreamRecord};
use std::collections::{HashMap, HashSet};

/// Emitter reported by a join tuple
pub const JOIN_EMITTER: &str = "$$JOIN";

/// Half-open time interval `[start, end)` in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRange {
    pub start: i64,
    pub end: i64,
}

impl WindowRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Resolve `window_start` / `window_end`
    pub fn func_value(&self, name: &str) -> Option<FieldValue> {
        match name.to_lowercase().as_str() {
            "window_start" => Some(FieldValue::Integer(self.start)),
            "window_end" => Some(FieldValue::Integer(self.end)),
            _ => None,
        }
    }
}

/// A mutable row inside the pipeline: a record, a join tuple or a group
pub trait TupleRow: Valuer {
    fn emitter(&self) -> &str;

    fn as_valuer(&self) -> &dyn Valuer;

    /// Store a calculated column
    fn set(&mut self, col: &str, value: FieldValue);

    fn append_alias(&mut self, alias: &str, value: FieldValue);

    fn to_map(&self) -> HashMap<String, FieldValue>;

    /// Prune the row to the requested projection shape
    fn pick(&mut self, all_wildcard: bool, cols: &[PickColumn], wildcard_emitters: &HashSet<String>);
}

impl TupleRow for StreamRecord {
    fn emitter(&self) -> &str {
        &self.emitter
    }

    fn as_valuer(&self) -> &dyn Valuer {
        self
    }

    fn set(&mut self, col: &str, value: FieldValue) {
        StreamRecord::set(self, col, value)
    }

    fn append_alias(&mut self, alias: &str, value: FieldValue) {
        self.affiliate.append_alias(alias, value)
    }

    fn to_map(&self) -> HashMap<String, FieldValue> {
        StreamRecord::to_map(self)
    }

    fn pick(&mut self, all_wildcard: bool, cols: &[PickColumn], wildcard_emitters: &HashSet<String>) {
        StreamRecord::pick(self, all_wildcard, cols, wildcard_emitters)
    }
}

/// Rows of several streams combined by a join, one constituent per stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinTuple {
    pub rows: Vec<StreamRecord>,
    pub affiliate: AffiliateRow,
}

impl JoinTuple {
    pub fn new(rows: Vec<StreamRecord>) -> Self {
        Self {
            rows,
            affiliate: AffiliateRow::default(),
        }
    }

    /// Constituent row emitted by `stream`
    pub fn row_for(&self, stream: &str) -> Option<&StreamRecord> {
        self.rows.iter().find(|row| row.emitter == stream)
    }

    fn lookup(
        &self,
        key: &str,
        stream: Option<&str>,
        get: impl Fn(&StreamRecord) -> Option<FieldValue>,
    ) -> Option<FieldValue> {
        match stream {
            Some(s) if s != DEFAULT_STREAM => self.row_for(s).and_then(get),
            _ => {
                let found = self.rows.iter().find_map(&get);
                if found.is_none() {
                    log::trace!("Key {} not found in any joined row", key);
                }
                found
            }
        }
    }
}

impl Valuer for JoinTuple {
    fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        if let Some(v) = self.affiliate.value(key, stream) {
            return Some(v);
        }
        self.lookup(key, stream, |row| row.value(key, None))
    }

    fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        self.lookup(key, stream, |row| row.meta(key, None))
    }

    fn all(&self, stream: Option<&str>) -> Option<HashMap<String, FieldValue>> {
        match stream {
            Some(s) => self.row_for(s).map(StreamRecord::to_map),
            None => Some(TupleRow::to_map(self)),
        }
    }
}

impl TupleRow for JoinTuple {
    fn emitter(&self) -> &str {
        JOIN_EMITTER
    }

    fn as_valuer(&self) -> &dyn Valuer {
        self
    }

    fn set(&mut self, col: &str, value: FieldValue) {
        self.affiliate.set(col, value)
    }

    fn append_alias(&mut self, alias: &str, value: FieldValue) {
        self.affiliate.append_alias(alias, value)
    }

    /// Merge constituents from last to first so the leftmost stream wins on collisions
    fn to_map(&self) -> HashMap<String, FieldValue> {
        let mut map = HashMap::new();
        for row in self.rows.iter().rev() {
            map.extend(row.to_map());
        }
        self.affiliate.merge_into(&mut map);
        map
    }

    fn pick(&mut self, all_wildcard: bool, cols: &[PickColumn], wildcard_emitters: &HashSet<String>) {
        let cols = self.affiliate.pick(cols);
        if all_wildcard {
            return;
        }
        if cols.is_empty() {
            self.rows
                .retain(|row| wildcard_emitters.contains(&row.emitter));
            return;
        }
        for row in self.rows.iter_mut() {
            if wildcard_emitters.contains(&row.emitter) {
                continue;
            }
            row.pick(false, &cols, wildcard_emitters);
        }
    }
}

/// A member of a group: grouping works over plain records and join tuples alike
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Record(StreamRecord),
    Join(JoinTuple),
}

impl Row {
    fn as_tuple_row(&self) -> &dyn TupleRow {
        match self {
            Row::Record(record) => record,
            Row::Join(tuple) => tuple,
        }
    }

    fn as_tuple_row_mut(&mut self) -> &mut dyn TupleRow {
        match self {
            Row::Record(record) => record,
            Row::Join(tuple) => tuple,
        }
    }
}

impl Valuer for Row {
    fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        self.as_tuple_row().value(key, stream)
    }

    fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        self.as_tuple_row().meta(key, stream)
    }

    fn all(&self, stream: Option<&str>) -> Option<HashMap<String, FieldValue>> {
        self.as_tuple_row().all(stream)
    }
}

impl TupleRow for Row {
    fn emitter(&self) -> &str {
        self.as_tuple_row().emitter()
    }

    fn as_valuer(&self) -> &dyn Valuer {
        self
    }

    fn set(&mut self, col: &str, value: FieldValue) {
        self.as_tuple_row_mut().set(col, value)
    }

    fn append_alias(&mut self, alias: &str, value: FieldValue) {
        self.as_tuple_row_mut().append_alias(alias, value)
    }

    fn to_map(&self) -> HashMap<String, FieldValue> {
        self.as_tuple_row().to_map()
    }

    fn pick(&mut self, all_wildcard: bool, cols: &[PickColumn], wildcard_emitters: &HashSet<String>) {
        self.as_tuple_row_mut()
            .pick(all_wildcard, cols, wildcard_emitters)
    }
}

/// A row that stands for a whole group: it resolves plain columns against the
/// group's first row and exposes every row to aggregate functions
pub trait CollectionRow: TupleRow + AggregateData {
    fn as_aggregate(&self) -> &dyn AggregateData;
}

/// Rows sharing one group key
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupedRows {
    pub rows: Vec<Row>,
    pub window_range: Option<WindowRange>,
    pub affiliate: AffiliateRow,
}

/// Ordered rows of one closed window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowBatch {
    pub rows: Vec<StreamRecord>,
    pub window_range: Option<WindowRange>,
    pub affiliate: AffiliateRow,
}

impl WindowBatch {
    pub fn new(rows: Vec<StreamRecord>, window_range: Option<WindowRange>) -> Self {
        Self {
            rows,
            window_range,
            affiliate: AffiliateRow::default(),
        }
    }

    /// Rows emitted by one source stream
    pub fn rows_by_emitter(&self, emitter: &str) -> Vec<&StreamRecord> {
        self.rows.iter().filter(|r| r.emitter == emitter).collect()
    }
}

/// Output of the join operator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinResult {
    pub tuples: Vec<JoinTuple>,
    pub window_range: Option<WindowRange>,
    pub affiliate: AffiliateRow,
}

impl JoinResult {
    pub fn new(tuples: Vec<JoinTuple>, window_range: Option<WindowRange>) -> Self {
        Self {
            tuples,
            window_range,
            affiliate: AffiliateRow::default(),
        }
    }
}

/// Output of the group-by operator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupedSet {
    pub groups: Vec<GroupedRows>,
    pub window_range: Option<WindowRange>,
}

// Each collection doubles as a single aggregate row over all of its content.
macro_rules! impl_collection_row {
    ($ty:ty, $rows:ident) => {
        impl Valuer for $ty {
            fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
                if let Some(v) = self.affiliate.value(key, stream) {
                    return Some(v);
                }
                self.$rows.first().and_then(|row| row.value(key, stream))
            }

            fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
                self.$rows.first().and_then(|row| row.meta(key, stream))
            }

            fn all(&self, _stream: Option<&str>) -> Option<HashMap<String, FieldValue>> {
                Some(TupleRow::to_map(self))
            }
        }

        impl TupleRow for $ty {
            fn emitter(&self) -> &str {
                self.$rows
                    .first()
                    .map(|row| TupleRow::emitter(row))
                    .unwrap_or("")
            }

            fn as_valuer(&self) -> &dyn Valuer {
                self
            }

            fn set(&mut self, col: &str, value: FieldValue) {
                self.affiliate.set(col, value)
            }

            fn append_alias(&mut self, alias: &str, value: FieldValue) {
                self.affiliate.append_alias(alias, value)
            }

            fn to_map(&self) -> HashMap<String, FieldValue> {
                let mut map = self
                    .$rows
                    .first()
                    .map(|row| TupleRow::to_map(row))
                    .unwrap_or_default();
                self.affiliate.merge_into(&mut map);
                map
            }

            fn pick(
                &mut self,
                all_wildcard: bool,
                cols: &[PickColumn],
                wildcard_emitters: &HashSet<String>,
            ) {
                let cols = self.affiliate.pick(cols);
                if let Some(first) = self.$rows.first_mut() {
                    first.pick(all_wildcard, &cols, wildcard_emitters);
                }
            }
        }

        impl AggregateData for $ty {
            fn aggregate_rows(&self) -> Vec<&dyn Valuer> {
                self.$rows.iter().map(|row| row as &dyn Valuer).collect()
            }
        }

        impl CollectionRow for $ty {
            fn as_aggregate(&self) -> &dyn AggregateData {
                self
            }
        }
    };
}

impl_collection_row!(GroupedRows, rows);
impl_collection_row!(WindowBatch, rows);
impl_collection_row!(JoinResult, tuples);

/// Operations shared by every multi-row variant
pub trait Collection {
    /// Number of rows (or groups, for a grouped set)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn window_range(&self) -> Option<&WindowRange>;

    /// Visit every row mutably; rows for which `visit` returns `false` are removed
    fn range_mut(
        &mut self,
        visit: &mut dyn FnMut(usize, &mut dyn TupleRow) -> Result<bool, SqlError>,
    ) -> Result<(), SqlError>;

    /// Visit every group read-only. Ungrouped collections form a single group.
    fn group_range(
        &self,
        visit: &mut dyn FnMut(usize, &dyn CollectionRow) -> Result<(), SqlError>,
    ) -> Result<(), SqlError>;

    /// Keep only the rows (or groups) at `indices`, preserving order
    fn filter_indices(&mut self, indices: &[usize]);

    /// Flatten each row (or group) for the sink boundary
    fn to_row_maps(&self) -> Vec<HashMap<String, FieldValue>>;
}

fn range_rows<T: TupleRow>(
    rows: &mut Vec<T>,
    visit: &mut dyn FnMut(usize, &mut dyn TupleRow) -> Result<bool, SqlError>,
) -> Result<(), SqlError> {
    let mut keep = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter_mut().enumerate() {
        keep.push(visit(index, row)?);
    }
    let mut flags = keep.into_iter();
    rows.retain(|_| flags.next().unwrap_or(true));
    Ok(())
}

fn keep_indices<T>(items: &mut Vec<T>, indices: &[usize]) {
    let wanted: HashSet<usize> = indices.iter().copied().collect();
    let mut position = 0;
    items.retain(|_| {
        let keep = wanted.contains(&position);
        position += 1;
        keep
    });
}

impl Collection for WindowBatch {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn window_range(&self) -> Option<&WindowRange> {
        self.window_range.as_ref()
    }

    fn range_mut(
        &mut self,
        visit: &mut dyn FnMut(usize, &mut dyn TupleRow) -> Result<bool, SqlError>,
    ) -> Result<(), SqlError> {
        range_rows(&mut self.rows, visit)
    }

    fn group_range(
        &self,
        visit: &mut dyn FnMut(usize, &dyn CollectionRow) -> Result<(), SqlError>,
    ) -> Result<(), SqlError> {
        visit(0, self)
    }

    fn filter_indices(&mut self, indices: &[usize]) {
        keep_indices(&mut self.rows, indices)
    }

    fn to_row_maps(&self) -> Vec<HashMap<String, FieldValue>> {
        self.rows.iter().map(StreamRecord::to_map).collect()
    }
}

impl Collection for JoinResult {
    fn len(&self) -> usize {
        self.tuples.len()
    }

    fn window_range(&self) -> Option<&WindowRange> {
        self.window_range.as_ref()
    }

    fn range_mut(
        &mut self,
        visit: &mut dyn FnMut(usize, &mut dyn TupleRow) -> Result<bool, SqlError>,
    ) -> Result<(), SqlError> {
        range_rows(&mut self.tuples, visit)
    }

    fn group_range(
        &self,
        visit: &mut dyn FnMut(usize, &dyn CollectionRow) -> Result<(), SqlError>,
    ) -> Result<(), SqlError> {
        visit(0, self)
    }

    fn filter_indices(&mut self, indices: &[usize]) {
        keep_indices(&mut self.tuples, indices)
    }

    fn to_row_maps(&self) -> Vec<HashMap<String, FieldValue>> {
        self.tuples.iter().map(TupleRow::to_map).collect()
    }
}

impl Collection for GroupedSet {
    fn len(&self) -> usize {
        self.groups.len()
    }

    fn window_range(&self) -> Option<&WindowRange> {
        self.window_range.as_ref()
    }

    fn range_mut(
        &mut self,
        visit: &mut dyn FnMut(usize, &mut dyn TupleRow) -> Result<bool, SqlError>,
    ) -> Result<(), SqlError> {
        range_rows(&mut self.groups, visit)
    }

    fn group_range(
        &self,
        visit: &mut dyn FnMut(usize, &dyn CollectionRow) -> Result<(), SqlError>,
    ) -> Result<(), SqlError> {
        for (index, group) in self.groups.iter().enumerate() {
            visit(index, group)?;
        }
        Ok(())
    }

    fn filter_indices(&mut self, indices: &[usize]) {
        keep_indices(&mut self.groups, indices)
    }

    fn to_row_maps(&self) -> Vec<HashMap<String, FieldValue>> {
        self.groups.iter().map(TupleRow::to_map).collect()
    }
}

/// Data handed from one operator to the next
#[derive(Debug, Clone, PartialEq)]
pub enum StreamData {
    Record(StreamRecord),
    Window(WindowBatch),
    Join(JoinResult),
    Grouped(GroupedSet),
    /// An upstream failure, forwarded untouched by every operator
    Error(SqlError),
}

impl StreamData {
    /// Short name of the variant, used in logs and structural errors
    pub fn kind(&self) -> &'static str {
        match self {
            StreamData::Record(_) => "record",
            StreamData::Window(_) => "window batch",
            StreamData::Join(_) => "join result",
            StreamData::Grouped(_) => "grouped set",
            StreamData::Error(_) => "error",
        }
    }

    pub fn as_collection(&self) -> Option<&dyn Collection> {
        match self {
            StreamData::Window(batch) => Some(batch),
            StreamData::Join(result) => Some(result),
            StreamData::Grouped(set) => Some(set),
            StreamData::Record(_) | StreamData::Error(_) => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut dyn Collection> {
        match self {
            StreamData::Window(batch) => Some(batch),
            StreamData::Join(result) => Some(result),
            StreamData::Grouped(set) => Some(set),
            StreamData::Record(_) | StreamData::Error(_) => None,
        }
    }

    /// Flatten into plain field maps for the sink, or surface the carried error
    pub fn into_sink_output(self) -> Result<Vec<HashMap<String, FieldValue>>, SqlError> {
        match self {
            StreamData::Record(record) => Ok(vec![record.to_map()]),
            StreamData::Error(err) => Err(err),
            other => Ok(other
                .as_collection()
                .map(|c| c.to_row_maps())
                .unwrap_or_default()),
        }
    }
}
