use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::record::Record;

use super::Grid;

/// Transform run on a record right before it is saved. Returning a value
/// assigns it to the column's field; the record may also be changed directly.
pub type Setter = Arc<dyn Fn(&mut Record) -> Option<Value> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Column {
    pub field: String,
    pub label: String,
    set: Option<Setter>,
}

impl Column {
    pub fn new(field: impl ToString) -> Self {
        let field = field.to_string();
        Self {
            label: field.clone(),
            field,
            set: None,
        }
    }

    pub fn label(mut self, label: impl ToString) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn setter<F>(mut self, set: F) -> Self
    where
        F: Fn(&mut Record) -> Option<Value> + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("field", &self.field)
            .field("label", &self.label)
            .field("set", &self.set.is_some())
            .finish()
    }
}

/// Setters of every configured column that has one, keyed by field.
#[derive(Clone, Default)]
pub struct ColumnSetters(IndexMap<String, Setter>);

impl ColumnSetters {
    fn register(&mut self, column: &Column) {
        if let Some(set) = &column.set {
            self.0.insert(column.field.clone(), set.clone());
        }
    }

    pub fn apply(&self, record: &mut Record) {
        for (field, set) in self.0.iter() {
            if let Some(value) = set(record) {
                record.set(field.clone(), value);
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Grid {
    /// Replace the column configuration. Setters from the previous
    /// configuration are forgotten.
    pub fn configure_columns(&self, columns: &[Column]) {
        let mut setters = ColumnSetters::default();
        for column in columns {
            setters.register(column);
        }
        tracing::debug!(grid = %self.name(), setters = setters.len(), "configured columns");
        self.inner.state.lock().setters = setters;
    }

    pub fn column_setters(&self) -> ColumnSetters {
        self.inner.state.lock().setters.clone()
    }
}
