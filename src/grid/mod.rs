mod builder;
mod columns;
mod dirty;
mod reconcile;
mod sort;

use std::{collections::HashSet, future::Future, sync::Arc};

use parking_lot::Mutex;

pub use builder::GridBuilder;
pub use columns::{Column, ColumnSetters, Setter};
pub use dirty::DirtyMap;

use crate::{
    config::GridConfig,
    record::{
        collection::{Collection, SortCriterion, Subscription},
        Record, RecordId,
    },
    render::{RenderOptions, Renderer, Row, RowHandle, RowSequence},
    trap::{Cancelled, Emitter, Event, EventKind, Fault, GridError, Trap},
};

#[derive(Default)]
struct State {
    collection: Option<Arc<dyn Collection>>,
    sort: Vec<SortCriterion>,
    sorted: Option<Arc<dyn Collection>>,
    subscription: Option<Subscription>,
    rows: RowSequence,
    start: usize,
    dirty: DirtyMap,
    updating: HashSet<RecordId>,
    setters: ColumnSetters,
    generation: u64,
    /// Generation of the refresh waiting on its fetch. Notifications are
    /// dropped meanwhile, the fetch result already contains them.
    loading: Option<u64>,
    showing_no_data: bool,
    events: Vec<EventKind>,
}

impl State {
    fn identity(&self, record: &Record) -> Option<RecordId> {
        self.collection
            .as_ref()
            .and_then(|collection| collection.identity(record))
    }

    fn no_data(&mut self, message: &str) {
        if !message.is_empty() && !self.showing_no_data {
            self.showing_no_data = true;
            self.events.push(EventKind::NoData(message.to_string()));
        }
    }
}

struct Inner {
    config: GridConfig,
    renderer: Arc<dyn Renderer>,
    trap: Trap,
    state: Mutex<State>,
}

/// A list of rows kept in sync with a sorted, observed collection, along with
/// the local edits made to those rows. Cloning a grid hands out another
/// reference to the same grid.
#[derive(Clone)]
pub struct Grid {
    inner: Arc<Inner>,
}

impl Grid {
    pub fn new(config: GridConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self::with_emitter(config, renderer, Emitter::new())
    }

    pub fn with_emitter(config: GridConfig, renderer: Arc<dyn Renderer>, emitter: Emitter) -> Self {
        let state = State {
            sort: config.sort.clone(),
            ..State::default()
        };
        Self {
            inner: Arc::new(Inner {
                trap: Trap::new(&config.name, emitter),
                config,
                renderer,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn builder(renderer: Arc<dyn Renderer>) -> GridBuilder {
        GridBuilder::new(renderer)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &GridConfig {
        &self.inner.config
    }

    pub fn emitter(&self) -> &Emitter {
        self.inner.trap.emitter()
    }

    pub fn trap(&self) -> &Trap {
        &self.inner.trap
    }

    pub fn collection(&self) -> Option<Arc<dyn Collection>> {
        self.inner.state.lock().collection.clone()
    }

    pub fn sorted_view(&self) -> Option<Arc<dyn Collection>> {
        self.inner.state.lock().sorted.clone()
    }

    pub fn sort(&self) -> Vec<SortCriterion> {
        self.inner.state.lock().sort.clone()
    }

    pub fn rows(&self) -> RowSequence {
        self.inner.state.lock().rows.clone()
    }

    /// Data the row for `id` was drawn from, without local edits.
    pub fn row_data(&self, id: &RecordId) -> Option<Record> {
        self.inner.state.lock().rows.find(id).map(|row| row.data.clone())
    }

    pub fn observer_count(&self) -> usize {
        usize::from(self.inner.state.lock().subscription.is_some())
    }

    pub fn guard<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, GridError>
    where
        E: Into<Fault>,
    {
        self.inner.trap.guard(op)
    }

    pub async fn guard_async<T, E, Fut>(&self, fut: Fut) -> Result<T, GridError>
    where
        E: Into<Fault>,
        Fut: Future<Output = Result<T, E>>,
    {
        self.inner.trap.guard_async(fut).await
    }

    pub async fn track_error<T, E1, E2, Fut>(
        &self,
        op: impl FnOnce() -> Result<Fut, E1>,
    ) -> Result<T, GridError>
    where
        E1: Into<Fault>,
        E2: Into<Fault>,
        Fut: Future<Output = Result<T, E2>>,
    {
        self.inner.trap.track_error(op).await
    }

    fn emit_events(&self, events: Vec<EventKind>) {
        for kind in events {
            self.inner.trap.emitter().emit(&Event::new(self.name(), kind));
        }
    }

    /// Draw a record, showing any local edits on top of it unless the record
    /// is being saved right now.
    fn render_row(
        &self,
        state: &mut State,
        record: Record,
        before: Option<RowHandle>,
        index: usize,
        options: &RenderOptions,
    ) -> Row {
        let id = state.identity(&record);
        let overlay = id
            .as_ref()
            .filter(|id| !state.updating.contains(*id))
            .and_then(|id| state.dirty.get(id))
            .map(|patch| record.overlay(patch));
        let shown = overlay.as_ref().unwrap_or(&record);
        let handle = self
            .inner
            .renderer
            .insert_row(shown, id.as_ref(), before, index, options);
        tracing::trace!(grid = %self.name(), id = ?id, index, "rendered row");
        if state.showing_no_data {
            state.showing_no_data = false;
            state.events.push(EventKind::RowsAvailable);
        }
        Row {
            id,
            index,
            handle,
            data: record,
        }
    }

    /// Throw away the drawn rows and draw the sorted view again. Does nothing
    /// without a sorted view. A refresh that is overtaken by another one
    /// resolves with a cancellation, which is never reported.
    pub async fn refresh(&self, options: RenderOptions) -> Result<usize, GridError> {
        let (view, generation) = {
            let mut state = self.inner.state.lock();
            let Some(view) = state.sorted.clone() else {
                return Ok(0);
            };
            state.generation += 1;
            state.loading = Some(state.generation);
            for row in state.rows.clear() {
                self.inner.renderer.remove_row(row.handle, true);
            }
            state.start = 0;
            (view, state.generation)
        };
        tracing::debug!(grid = %self.name(), generation, "refreshing");
        self.emit_events(vec![EventKind::Loading(
            self.inner.config.loading_message.clone(),
        )]);

        let fetched = view.fetch().await;

        let (count, total, events) = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                drop(state);
                if let Err(err) = fetched {
                    tracing::trace!(grid = %self.name(), generation, "superseded fetch failed: {:#}", err);
                }
                let superseded = anyhow::Error::new(Cancelled).context("refresh was superseded");
                return Err(self.inner.trap.emit_error(superseded));
            }
            state.loading = None;
            let fetched = match fetched {
                Ok(fetched) => fetched,
                Err(err) => {
                    drop(state);
                    return Err(self.inner.trap.emit_error(err));
                }
            };
            let start = state.start;
            for (position, record) in fetched.records.into_iter().enumerate() {
                let row = self.render_row(&mut state, record, None, start + position, &options);
                state.rows.push(row);
            }
            let count = state.rows.len();
            if count == 0 {
                state.no_data(&self.inner.config.no_data_message);
            }
            (count, fetched.total, std::mem::take(&mut state.events))
        };
        tracing::debug!(grid = %self.name(), count, total = ?total, "refreshed");
        self.emit_events(events);
        Ok(count)
    }

    /// Hook for collections that announce writes without being observed. A
    /// write while nothing observes the grid forces a refresh so observation
    /// gets set up now that there is data.
    pub async fn handle_store_notify(
        &self,
        record: Option<&Record>,
        existing_id: Option<&RecordId>,
    ) -> Result<usize, GridError> {
        tracing::trace!(grid = %self.name(), existing_id = ?existing_id, "store notified");
        if record.is_some() && self.observer_count() < 1 {
            let options = RenderOptions {
                keep_scroll_position: true,
            };
            return self.refresh(options).await;
        }
        Ok(0)
    }

    /// Stop observing the collection and drop every drawn row.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        if let Some(subscription) = state.subscription.take() {
            subscription.remove();
        }
        for row in state.rows.clear() {
            self.inner.renderer.remove_row(row.handle, true);
        }
        state.sorted = None;
        // a refresh still waiting on its fetch must not draw anything
        state.generation += 1;
        state.loading = None;
        tracing::debug!(grid = %self.name(), "destroyed");
    }
}
