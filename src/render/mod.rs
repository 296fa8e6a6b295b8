use crate::record::{collection::SortCriterion, Record, RecordId};

pub mod memory;

/// Opaque reference to a rendered row, handed out by a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowHandle(usize);

impl RowHandle {
    pub fn new(key: usize) -> Self {
        Self(key)
    }

    pub fn key(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub keep_scroll_position: bool,
}

/// A rendered row. `data` is the record as it came from the collection,
/// without any local edits on top of it.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: Option<RecordId>,
    pub index: usize,
    pub handle: RowHandle,
    pub data: Record,
}

/// Everything the grid needs from whatever draws its rows.
pub trait Renderer: Send + Sync {
    /// Draw `record` before the `before` row, or at the end when `before` is
    /// `None`.
    fn insert_row(
        &self,
        record: &Record,
        id: Option<&RecordId>,
        before: Option<RowHandle>,
        index: usize,
        options: &RenderOptions,
    ) -> RowHandle;

    /// Take a row off screen. With `cleanup_only` the row is being discarded
    /// as part of a larger teardown.
    fn remove_row(&self, handle: RowHandle, cleanup_only: bool);

    /// Row drawn directly after `handle` and anything nested under it.
    fn next_sibling(&self, handle: RowHandle) -> Option<RowHandle>;

    fn highlight_row(&self, _handle: RowHandle) {}

    fn adjust_row_indices(&self, _from: RowHandle) {}

    /// Where the first row goes when no row has been drawn yet.
    fn first_row_sibling(&self) -> Option<RowHandle> {
        None
    }

    fn is_attached(&self, _handle: RowHandle) -> bool {
        true
    }

    /// Find the row currently drawn for a record.
    fn find_row(&self, _id: &RecordId) -> Option<RowHandle> {
        None
    }

    /// Ask for more rows, the visible window got too small.
    fn process_scroll(&self) {}

    /// Order rows when the grid has no collection to sort.
    fn sort_without_collection(&self, _criteria: &[SortCriterion]) {}
}

/// Rows in view order. A `None` entry stands in for a record that is part of
/// the view but was never drawn.
#[derive(Debug, Clone, Default)]
pub struct RowSequence {
    rows: Vec<Option<Row>>,
}

impl RowSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index).and_then(Option::as_mut)
    }

    pub fn is_rendered(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn rendered_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    pub fn placeholder_count(&self) -> usize {
        self.rows.len() - self.rendered_count()
    }

    /// Remove the entry at `index`. Returns `None` if the index is past the end.
    pub fn remove(&mut self, index: usize) -> Option<Option<Row>> {
        if index < self.rows.len() {
            Some(self.rows.remove(index))
        } else {
            None
        }
    }

    /// Splice an entry in at `index`, appending when the index is past the end.
    /// Returns the position the entry landed at.
    pub fn insert(&mut self, index: usize, row: Option<Row>) -> usize {
        let index = index.min(self.rows.len());
        self.rows.insert(index, row);
        index
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(Some(row));
    }

    pub fn position_of(&self, handle: RowHandle) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.as_ref().map_or(false, |row| row.handle == handle))
    }

    pub fn find(&self, id: &RecordId) -> Option<&Row> {
        self.rows
            .iter()
            .flatten()
            .find(|row| row.id.as_ref() == Some(id))
    }

    /// Rewrite the index of every row from `from` onward to match its
    /// position, offset by `start`.
    pub fn renumber_from(&mut self, from: usize, start: usize) {
        for (position, row) in self.rows.iter_mut().enumerate().skip(from) {
            if let Some(row) = row {
                row.index = start + position;
            }
        }
    }

    pub fn clear(&mut self) -> Vec<Row> {
        self.rows.drain(..).flatten().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Row>> {
        self.rows.iter().map(Option::as_ref)
    }

    pub fn ids(&self) -> Vec<Option<RecordId>> {
        self.rows
            .iter()
            .map(|row| row.as_ref().and_then(|row| row.id.clone()))
            .collect()
    }
}
