use std::sync::Arc;

use anyhow::Context;
use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    record::{collection::Collection, Patch, RecordId},
    render::RenderOptions,
    trap::GridError,
};

use super::Grid;

/// Local edits keyed by record, in the order records were first edited.
pub type DirtyMap = IndexMap<RecordId, Patch>;

impl Grid {
    /// Record a local edit of one field. Edits to the same field replace each
    /// other.
    pub fn update_dirty(
        &self,
        id: impl Into<RecordId>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let id = id.into();
        let field = field.into();
        tracing::trace!(grid = %self.name(), %id, %field, "updating dirty field");
        self.inner
            .state
            .lock()
            .dirty
            .entry(id)
            .or_default()
            .set(field, value);
    }

    #[deprecated(note = "use `update_dirty` instead")]
    pub fn set_dirty(
        &self,
        id: impl Into<RecordId>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.update_dirty(id, field, value);
    }

    pub fn dirty(&self) -> DirtyMap {
        self.inner.state.lock().dirty.clone()
    }

    pub fn is_dirty(&self, id: &RecordId) -> bool {
        self.inner.state.lock().dirty.contains_key(id)
    }

    pub fn is_updating(&self, id: &RecordId) -> bool {
        self.inner.state.lock().updating.contains(id)
    }

    /// Write every record edited so far back to the collection, one record at
    /// a time. A record leaves the dirty map once its put is confirmed, along
    /// with any edit made to it while the put was running. Stops at the first
    /// record that fails; it and every record after it stay dirty.
    pub async fn save(&self) -> anyhow::Result<()> {
        let (collection, pending) = {
            let state = self.inner.state.lock();
            if state.dirty.is_empty() {
                return Ok(());
            }
            let Some(collection) = state.collection.clone() else {
                anyhow::bail!(
                    "Grid '{}' has edits but no collection to save them to",
                    self.name()
                );
            };
            let pending = state
                .dirty
                .iter()
                .map(|(id, patch)| (id.clone(), patch.clone()))
                .collect::<Vec<_>>();
            (collection, pending)
        };
        tracing::debug!(grid = %self.name(), records = pending.len(), "saving");

        for (id, patch) in pending {
            if let Err(err) = self.save_record(&collection, &id, &patch).await {
                tracing::warn!(grid = %self.name(), %id, "save stopped: {:#}", err);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn save_record(
        &self,
        collection: &Arc<dyn Collection>,
        id: &RecordId,
        patch: &Patch,
    ) -> anyhow::Result<()> {
        let cached = if self.inner.config.get_before_put {
            None
        } else {
            self.row_data(id)
        };
        let mut record = match cached {
            Some(record) => record,
            None => collection
                .get(id)
                .await
                .with_context(|| format!("Failed to get record {} before saving it", id))?
                .with_context(|| format!("Record {} no longer exists", id))?,
        };

        collection.apply_patch(&mut record, patch);
        let setters = {
            let mut state = self.inner.state.lock();
            state.updating.insert(id.clone());
            state.setters.clone()
        };
        setters.apply(&mut record);

        let result = collection.put(record).await;

        let mut state = self.inner.state.lock();
        state.updating.remove(id);
        result.with_context(|| format!("Failed to save record {}", id))?;

        state.dirty.shift_remove(id);
        tracing::trace!(grid = %self.name(), %id, "saved record");
        Ok(())
    }

    /// Drop every local edit and draw the rows again without them.
    pub async fn revert(&self) -> Result<usize, GridError> {
        self.inner.state.lock().dirty.clear();
        tracing::debug!(grid = %self.name(), "reverted edits");
        let options = RenderOptions {
            keep_scroll_position: self.inner.config.keep_scroll_position,
        };
        self.refresh(options).await
    }
}
