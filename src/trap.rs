use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use slab::Slab;

use crate::record::collection::Subscription;

/// Tag for failures of operations that were superseded on purpose. A failure
/// carrying this tag anywhere in its chain is never reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

pub fn is_cancelled(error: &anyhow::Error) -> bool {
    error.downcast_ref::<Cancelled>().is_some()
        || error.chain().any(|cause| {
            cause.is::<Cancelled>()
                || cause
                    .downcast_ref::<GridError>()
                    .map_or(false, GridError::is_cancelled)
        })
}

/// Any failure a guarded operation can produce, including bare messages and
/// errors a grid already reported.
#[derive(Debug)]
pub enum Fault {
    Error(anyhow::Error),
    Grid(GridError),
}

impl From<anyhow::Error> for Fault {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<GridError>() {
            Ok(error) => Self::Grid(error),
            Err(error) => Self::Error(error),
        }
    }
}

impl From<String> for Fault {
    fn from(value: String) -> Self {
        Self::Error(anyhow::Error::msg(value))
    }
}

impl From<&str> for Fault {
    fn from(value: &str) -> Self {
        Self::Error(anyhow::Error::msg(value.to_string()))
    }
}

impl From<Cancelled> for Fault {
    fn from(value: Cancelled) -> Self {
        Self::Error(value.into())
    }
}

impl From<GridError> for Fault {
    fn from(value: GridError) -> Self {
        Self::Grid(value)
    }
}

/// A failure reported by a grid, with a reference back to the grid it
/// happened in.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{host}: {error:#}")]
pub struct GridError {
    pub host: String,
    error: Arc<anyhow::Error>,
    reported: bool,
}

impl GridError {
    pub fn new(host: impl ToString, error: anyhow::Error) -> Self {
        Self {
            host: host.to_string(),
            error: Arc::new(error),
            reported: false,
        }
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    pub fn is_cancelled(&self) -> bool {
        is_cancelled(&self.error)
    }

    /// Whether a trap already handled this error, by raising an event for it
    /// or by dropping it as a cancellation.
    pub fn is_reported(&self) -> bool {
        self.reported
    }
}

#[derive(Debug, Clone)]
pub enum EventKind {
    Error(GridError),
    /// A refresh started and rows are being fetched.
    Loading(String),
    /// The grid has no rows to show.
    NoData(String),
    /// A row appeared after the grid reported it had no rows.
    RowsAvailable,
}

/// Signal raised on a grid's emitter. Listeners may cancel the default action
/// of a cancelable event.
#[derive(Debug)]
pub struct Event {
    pub host: String,
    pub kind: EventKind,
    pub cancelable: bool,
    pub bubbles: bool,
    cancelled: AtomicBool,
}

impl Event {
    pub fn new(host: impl ToString, kind: EventKind) -> Self {
        Self {
            host: host.to_string(),
            kind,
            cancelable: false,
            bubbles: true,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }

    pub fn cancel(&self) {
        if self.cancelable {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<&GridError> {
        match &self.kind {
            EventKind::Error(error) => Some(error),
            _ => None,
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Observer list events are published on. Events that bubble continue to the
/// parent emitter after every local listener ran.
#[derive(Clone, Default)]
pub struct Emitter {
    listeners: Arc<Mutex<Slab<Listener>>>,
    parent: Option<Box<Emitter>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Emitter) -> Self {
        Self {
            listeners: Arc::default(),
            parent: Some(Box::new(parent)),
        }
    }

    pub fn listen<F: Fn(&Event) + Send + Sync + 'static>(&self, listener: F) -> Subscription {
        let key = self.listeners.lock().insert(Arc::new(listener));
        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                let mut listeners = listeners.lock();
                if listeners.contains(key) {
                    listeners.remove(key);
                }
            }
        })
    }

    /// Publish an event. Returns `false` if a listener cancelled it.
    pub fn emit(&self, event: &Event) -> bool {
        let listeners = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(event);
        }
        if event.bubbles {
            if let Some(parent) = &self.parent {
                parent.emit(event);
            }
        }
        !event.is_cancelled()
    }
}

/// Turns every failure of a guarded operation, synchronous or not, into one
/// error event on the host's emitter.
#[derive(Clone)]
pub struct Trap {
    host: String,
    emitter: Emitter,
}

impl Trap {
    pub fn new(host: impl ToString, emitter: Emitter) -> Self {
        Self {
            host: host.to_string(),
            emitter,
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Report a failure. Cancellations are dropped silently, anything else is
    /// raised as a cancelable error event and logged unless a listener
    /// cancelled it. Errors that were already reported pass through.
    pub fn emit_error(&self, fault: impl Into<Fault>) -> GridError {
        let mut error = match fault.into() {
            Fault::Grid(error) if error.reported => return error,
            Fault::Grid(error) => error,
            Fault::Error(error) => GridError::new(&self.host, error),
        };
        error.reported = true;
        if error.is_cancelled() {
            tracing::trace!(host = %self.host, "suppressed cancelled operation");
            return error;
        }
        let event = Event::new(&self.host, EventKind::Error(error.clone())).cancelable();
        if self.emitter.emit(&event) {
            tracing::error!(host = %self.host, "{:#}", error.error());
        }
        error
    }

    pub fn guard<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, GridError>
    where
        E: Into<Fault>,
    {
        op().map_err(|err| self.emit_error(err))
    }

    pub async fn guard_async<T, E, Fut>(&self, fut: Fut) -> Result<T, GridError>
    where
        E: Into<Fault>,
        Fut: Future<Output = Result<T, E>>,
    {
        fut.await.map_err(|err| self.emit_error(err))
    }

    /// Guard an operation that may fail before it produces its future, or
    /// through the future itself. Both kinds of failure are reported the same
    /// way.
    pub async fn track_error<T, E1, E2, Fut>(
        &self,
        op: impl FnOnce() -> Result<Fut, E1>,
    ) -> Result<T, GridError>
    where
        E1: Into<Fault>,
        E2: Into<Fault>,
        Fut: Future<Output = Result<T, E2>>,
    {
        let fut = self.guard(op)?;
        self.guard_async(fut).await
    }
}
