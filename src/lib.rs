//! Keep an ordered list of rendered rows in step with a sorted, observed
//! collection, and hold local edits to those rows until they are saved.
//!
//! A [`Grid`] sorts its base [`Collection`] into a view, draws the view through
//! a [`Renderer`], patches the drawn rows as the view reports changes, overlays
//! local edits on every row it draws and writes those edits back one record at
//! a time. Failures of guarded operations are reported as [`Event`]s.

mod config;
mod grid;
mod record;
mod render;
mod trap;

pub use config::GridConfig;
pub use grid::{Column, ColumnSetters, DirtyMap, Grid, GridBuilder, Setter};
pub use record::collection::{Collection, Fetched, Observer, SortCriterion, Subscription};
pub use record::memory::{compare_values, CallLog, Failure, MemoryCollection};
pub use record::{Change, ChangeKind, Patch, Record, RecordId};
pub use render::memory::{MemoryRenderer, Node, RenderLog};
pub use render::{RenderOptions, Renderer, Row, RowHandle, RowSequence};
pub use trap::{is_cancelled, Cancelled, Emitter, Event, EventKind, Fault, GridError, Trap};
