use std::sync::Arc;

use crate::{config::GridConfig, record::collection::Collection, render::Renderer, trap::Emitter};

use super::{Column, Grid};

/// Assemble a grid and draw its first rows.
pub struct GridBuilder {
    config: GridConfig,
    renderer: Arc<dyn Renderer>,
    collection: Option<Arc<dyn Collection>>,
    columns: Vec<Column>,
    parent: Option<Emitter>,
}

impl GridBuilder {
    pub(crate) fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            config: GridConfig::default(),
            renderer,
            collection: None,
            columns: Vec::new(),
            parent: None,
        }
    }

    pub fn config(mut self, config: GridConfig) -> Self {
        self.config = config;
        self
    }

    pub fn collection(mut self, collection: Arc<dyn Collection>) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    /// Events raised by the grid bubble up to `parent`. Listen there to hear
    /// about failures during the first render.
    pub fn parent(mut self, parent: Emitter) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Build the grid. When a collection was given the first render has
    /// finished by the time this returns; a failed render was already
    /// reported through the grid's events.
    pub async fn build(self) -> Grid {
        let emitter = match self.parent {
            Some(parent) => Emitter::with_parent(parent),
            None => Emitter::new(),
        };
        let grid = Grid::with_emitter(self.config, self.renderer, emitter);
        grid.configure_columns(&self.columns);
        if let Some(collection) = self.collection {
            // the trap already raised an event for it
            if let Err(err) = grid.set_collection(Some(collection)).await {
                tracing::debug!(grid = %grid.name(), "first render failed: {}", err);
            }
        }
        grid
    }
}
