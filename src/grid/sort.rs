use std::sync::Arc;

use crate::{
    record::{
        collection::{Collection, SortCriterion},
        Change,
    },
    render::RenderOptions,
    trap::GridError,
};

use super::Grid;

impl Grid {
    /// Bind the grid to a new collection. Local edits belonged to the old
    /// collection, so they are dropped.
    pub async fn set_collection(
        &self,
        collection: Option<Arc<dyn Collection>>,
    ) -> Result<usize, GridError> {
        {
            let mut state = self.inner.state.lock();
            state.collection = collection;
            state.dirty.clear();
        }
        self.rebuild().await
    }

    /// Replace the sort criteria. Without a collection the renderer decides
    /// how to order what it has.
    pub async fn set_sort(&self, criteria: Vec<SortCriterion>) -> Result<usize, GridError> {
        let has_collection = {
            let mut state = self.inner.state.lock();
            state.sort = criteria;
            state.collection.is_some()
        };
        if !has_collection {
            let criteria = self.sort();
            self.inner.renderer.sort_without_collection(&criteria);
        }
        self.rebuild().await
    }

    /// Tear down the current view and its observation, sort the base
    /// collection once per criterion and observe the result before drawing
    /// it.
    async fn rebuild(&self) -> Result<usize, GridError> {
        {
            let mut state = self.inner.state.lock();
            if let Some(subscription) = state.subscription.take() {
                subscription.remove();
            }
            state.sorted = None;
            state.generation += 1;
            state.loading = None;

            let Some(base) = state.collection.clone() else {
                tracing::debug!(grid = %self.name(), "no collection, skipping render");
                return Ok(0);
            };
            let sorted = state.sort.iter().fold(base, |view, criterion| {
                view.sort(&criterion.attribute, criterion.descending)
            });

            let grid = Arc::downgrade(&self.inner);
            state.subscription = sorted.observe(Arc::new(move |change: Change| {
                if let Some(inner) = grid.upgrade() {
                    Grid { inner }.on_notification(change);
                }
            }));
            tracing::debug!(
                grid = %self.name(),
                criteria = state.sort.len(),
                observed = state.subscription.is_some(),
                "rebuilt sorted view"
            );
            state.sorted = Some(sorted);
        }
        let options = RenderOptions {
            keep_scroll_position: self.inner.config.keep_scroll_position,
        };
        self.refresh(options).await
    }
}
