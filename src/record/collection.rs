use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::{Change, Patch, Record, RecordId};

/// Callback invoked by an observable collection for every change to its view.
pub type Observer = Arc<dyn Fn(Change) + Send + Sync + 'static>;

/// One key of a multi-key sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub attribute: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortCriterion {
    pub fn ascending(attribute: impl ToString) -> Self {
        Self {
            attribute: attribute.to_string(),
            descending: false,
        }
    }

    pub fn descending(attribute: impl ToString) -> Self {
        Self {
            attribute: attribute.to_string(),
            descending: true,
        }
    }
}

/// Result of fetching a collection. Some collections know the total number of
/// records before all of them are delivered.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub records: Vec<Record>,
    pub total: Option<usize>,
}

impl Fetched {
    pub fn new(records: Vec<Record>) -> Self {
        let total = Some(records.len());
        Self { records, total }
    }
}

/// Live observation of a collection. The observer is unhooked when the
/// subscription is removed or dropped.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync + 'static>>,
}

impl Subscription {
    pub fn new<F: FnOnce() + Send + Sync + 'static>(remove: F) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn remove(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.remove.is_some())
            .finish()
    }
}

/// The record store a grid is bound to. Implementations own the data; the
/// grid only keeps a reference to the base collection and the views derived
/// from it.
pub trait Collection: Send + Sync {
    fn get(&self, id: &RecordId) -> BoxFuture<'_, anyhow::Result<Option<Record>>>;

    fn put(&self, record: Record) -> BoxFuture<'_, anyhow::Result<()>>;

    fn identity(&self, record: &Record) -> Option<RecordId> {
        record.get("id").and_then(RecordId::from_value)
    }

    /// Derive a new view ordered by `attribute`. How repeated calls compose is
    /// up to the collection.
    fn sort(&self, attribute: &str, descending: bool) -> Arc<dyn Collection>;

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Fetched>>;

    /// Start observing the collection. Collections that can't report changes
    /// return `None`.
    fn observe(&self, _observer: Observer) -> Option<Subscription> {
        None
    }

    /// Merge local edits into a record before it is saved. Collections whose
    /// records know how to merge themselves override this.
    fn apply_patch(&self, record: &mut Record, patch: &Patch) {
        record.apply(patch);
    }
}
