use std::{cmp::Ordering, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use slab::Slab;

use crate::trap::Cancelled;

use super::{
    collection::{Collection, Fetched, Observer, SortCriterion, Subscription},
    Change, Record, RecordId,
};

/// A failure to inject into one of the collection operations.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Fail as soon as the operation is polled.
    Immediate(String),
    /// Yield back to the scheduler once, then fail.
    Deferred(String),
    /// Fail with the cancellation tag.
    Cancelled,
}

impl Failure {
    async fn raise(self) -> anyhow::Error {
        match self {
            Failure::Immediate(message) => anyhow::Error::msg(message),
            Failure::Deferred(message) => {
                tokio::task::yield_now().await;
                anyhow::Error::msg(message)
            }
            Failure::Cancelled => Cancelled.into(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CallLog {
    pub gets: Vec<RecordId>,
    pub puts: Vec<Record>,
    pub fetches: usize,
}

#[derive(Default)]
struct Store {
    records: IndexMap<RecordId, Record>,
    observers: Slab<(Vec<SortCriterion>, Observer)>,
    fetch_failure: Option<Failure>,
    get_failures: Vec<(Option<RecordId>, Failure)>,
    put_failures: Vec<(Option<RecordId>, Failure)>,
    defer_fetches: bool,
    page_size: Option<usize>,
    log: CallLog,
}

impl Store {
    fn view(&self, criteria: &[SortCriterion]) -> Vec<RecordId> {
        let mut ids = self.records.keys().cloned().collect::<Vec<_>>();
        // Vec::sort_by is stable, records that compare equal keep insertion order
        ids.sort_by(|a, b| {
            let a = &self.records[a];
            let b = &self.records[b];
            for criterion in criteria {
                let order = compare_values(a.get(&criterion.attribute), b.get(&criterion.attribute));
                let order = if criterion.descending {
                    order.reverse()
                } else {
                    order
                };
                if order.is_ne() {
                    return order;
                }
            }
            Ordering::Equal
        });
        ids
    }

    fn views(&self) -> Vec<(Observer, Vec<RecordId>)> {
        self.observers
            .iter()
            .map(|(_, (criteria, observer))| (observer.clone(), self.view(criteria)))
            .collect()
    }

    fn failure_for(failures: &[(Option<RecordId>, Failure)], id: &RecordId) -> Option<Failure> {
        failures
            .iter()
            .find(|(target, _)| target.as_ref().map_or(true, |target| target == id))
            .map(|(_, failure)| failure.clone())
    }
}

/// Ordering used when sorting records on a field. Missing fields and nulls sort
/// first, then booleans, numbers and strings.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// An in memory collection. Every view created through [`Collection::sort`]
/// shares the same records, so writes through any view are seen by all of
/// them. Earlier sort criteria are more significant than later ones.
#[derive(Clone)]
pub struct MemoryCollection {
    store: Arc<Mutex<Store>>,
    criteria: Vec<SortCriterion>,
    id_property: Arc<String>,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::with_id_property("id")
    }

    pub fn with_id_property(id_property: impl ToString) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            criteria: Vec::new(),
            id_property: Arc::new(id_property.to_string()),
        }
    }

    /// Build a collection from json objects. Fails if any item is not an
    /// object or has no identity.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> anyhow::Result<Self> {
        let collection = Self::new();
        for value in values {
            collection.add(Record::try_from(value)?)?;
        }
        Ok(collection)
    }

    pub fn criteria(&self) -> &[SortCriterion] {
        &self.criteria
    }

    fn require_identity(&self, record: &Record) -> anyhow::Result<RecordId> {
        match self.identity(record) {
            Some(id) => Ok(id),
            None => anyhow::bail!(
                "Record is missing its identity property '{}'",
                self.id_property
            ),
        }
    }

    /// Add or replace a record and notify every observer of the change.
    pub fn add(&self, record: Record) -> anyhow::Result<RecordId> {
        let id = self.require_identity(&record)?;
        let notifications = {
            let mut store = self.store.lock();
            let before = store.views();
            let existed = store.records.insert(id.clone(), record.clone()).is_some();
            let after = store.views();
            before
                .into_iter()
                .zip(after)
                .filter_map(|((observer, before), (_, after))| {
                    let previous_index = before.iter().position(|other| other == &id);
                    let new_index = after.iter().position(|other| other == &id);
                    let change = if existed {
                        Change::updated(record.clone(), previous_index, new_index)
                    } else {
                        Change::added(record.clone(), new_index?)
                    };
                    Some((observer, change))
                })
                .collect::<Vec<_>>()
        };
        for (observer, change) in notifications {
            observer(change);
        }
        Ok(id)
    }

    /// Remove a record and notify every observer that could see it.
    pub fn remove(&self, id: &RecordId) -> Option<Record> {
        let (record, notifications) = {
            let mut store = self.store.lock();
            let before = store.views();
            let record = store.records.shift_remove(id)?;
            let notifications = before
                .into_iter()
                .filter_map(|(observer, before)| {
                    let previous_index = before.iter().position(|other| other == id)?;
                    Some((observer, Change::removed(record.clone(), previous_index)))
                })
                .collect::<Vec<_>>();
            (record, notifications)
        };
        for (observer, change) in notifications {
            observer(change);
        }
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.store.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities of every record, in insertion order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.store.lock().records.keys().cloned().collect()
    }

    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.store.lock().records.get(id).cloned()
    }

    pub fn observer_count(&self) -> usize {
        self.store.lock().observers.len()
    }

    pub fn calls(&self) -> CallLog {
        self.store.lock().log.clone()
    }

    pub fn fail_fetch(&self, failure: Option<Failure>) {
        self.store.lock().fetch_failure = failure;
    }

    /// Fail `get` for one record, or for every record when `id` is `None`.
    pub fn fail_get(&self, id: Option<RecordId>, failure: Failure) {
        self.store.lock().get_failures.push((id, failure));
    }

    /// Fail `put` for one record, or for every record when `id` is `None`.
    pub fn fail_put(&self, id: Option<RecordId>, failure: Failure) {
        self.store.lock().put_failures.push((id, failure));
    }

    pub fn clear_failures(&self) {
        let mut store = self.store.lock();
        store.fetch_failure = None;
        store.get_failures.clear();
        store.put_failures.clear();
    }

    /// Make every fetch yield to the scheduler once before it resolves.
    pub fn defer_fetches(&self, defer: bool) {
        self.store.lock().defer_fetches = defer;
    }

    /// Deliver at most `size` records per fetch. The fetch still reports the
    /// total size of the view.
    pub fn page_fetches(&self, size: Option<usize>) {
        self.store.lock().page_size = size;
    }
}

impl Collection for MemoryCollection {
    fn get(&self, id: &RecordId) -> BoxFuture<'_, anyhow::Result<Option<Record>>> {
        let id = id.clone();
        async move {
            let (failure, record) = {
                let mut store = self.store.lock();
                store.log.gets.push(id.clone());
                (
                    Store::failure_for(&store.get_failures, &id),
                    store.records.get(&id).cloned(),
                )
            };
            if let Some(failure) = failure {
                return Err(failure.raise().await);
            }
            Ok(record)
        }
        .boxed()
    }

    fn put(&self, record: Record) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            let id = self.require_identity(&record)?;
            let failure = {
                let mut store = self.store.lock();
                store.log.puts.push(record.clone());
                Store::failure_for(&store.put_failures, &id)
            };
            if let Some(failure) = failure {
                return Err(failure.raise().await);
            }
            self.add(record)?;
            Ok(())
        }
        .boxed()
    }

    fn identity(&self, record: &Record) -> Option<RecordId> {
        record.get(&self.id_property).and_then(RecordId::from_value)
    }

    fn sort(&self, attribute: &str, descending: bool) -> Arc<dyn Collection> {
        let mut criteria = self.criteria.clone();
        criteria.push(SortCriterion {
            attribute: attribute.to_string(),
            descending,
        });
        Arc::new(Self {
            store: self.store.clone(),
            criteria,
            id_property: self.id_property.clone(),
        })
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Fetched>> {
        async move {
            let (failure, defer) = {
                let mut store = self.store.lock();
                store.log.fetches += 1;
                (store.fetch_failure.clone(), store.defer_fetches)
            };
            if defer {
                tokio::task::yield_now().await;
            }
            if let Some(failure) = failure {
                return Err(failure.raise().await);
            }
            let store = self.store.lock();
            let view = store.view(&self.criteria);
            let records = view
                .iter()
                .take(store.page_size.unwrap_or(usize::MAX))
                .map(|id| store.records[id].clone())
                .collect::<Vec<_>>();
            Ok(Fetched {
                records,
                total: Some(view.len()),
            })
        }
        .boxed()
    }

    fn observe(&self, observer: Observer) -> Option<Subscription> {
        let key = self
            .store
            .lock()
            .observers
            .insert((self.criteria.clone(), observer));
        let store = Arc::downgrade(&self.store);
        Some(Subscription::new(move || {
            if let Some(store) = store.upgrade() {
                let mut store = store.lock();
                if store.observers.contains(key) {
                    store.observers.remove(key);
                }
            }
        }))
    }
}
