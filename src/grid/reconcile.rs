use crate::{
    record::{Change, ChangeKind, Record},
    render::{RenderOptions, Row, RowHandle},
};

use super::{Grid, State};

impl Grid {
    /// Patch the drawn rows for one change reported by the observed view.
    /// Changes must be handed over in the order the view reported them.
    pub fn on_notification(&self, change: Change) {
        let Change {
            kind,
            record,
            previous_index,
            new_index,
        } = change;
        tracing::debug!(
            grid = %self.name(),
            ?kind,
            ?previous_index,
            ?new_index,
            "reconciling change"
        );

        let events = {
            let mut state = self.inner.state.lock();
            if let Some(generation) = state.loading {
                tracing::trace!(grid = %self.name(), generation, "refresh pending, dropping change");
                return;
            }
            let moved = previous_index != new_index;
            let mut removed: Option<Row> = None;
            let mut successor: Option<RowHandle> = None;

            if let Some(from) = previous_index {
                if kind == ChangeKind::Remove || kind == ChangeKind::Update {
                    let (row, next) = self.remove_at(&mut state, from, moved);
                    removed = row;
                    successor = next;
                }
            }

            if let Some(to) = new_index {
                if kind != ChangeKind::Remove {
                    self.insert_at(&mut state, record, to, removed.as_ref());
                }
            }

            if let Some(lowest) = [previous_index, new_index].into_iter().flatten().min() {
                let start = state.start;
                state.rows.renumber_from(lowest, start);
            }
            if moved {
                if let Some(successor) = successor {
                    self.inner.renderer.adjust_row_indices(successor);
                }
            }
            std::mem::take(&mut state.events)
        };
        self.emit_events(events);
    }

    /// Take the entry at `from` out of the sequence. Returns the removed row
    /// if one was drawn there, and the row that followed it.
    fn remove_at(
        &self,
        state: &mut State,
        from: usize,
        moved: bool,
    ) -> (Option<Row>, Option<RowHandle>) {
        let renderer = &self.inner.renderer;
        let Some(Some(row)) = state.rows.remove(from) else {
            return (None, None);
        };
        if !renderer.is_attached(row.handle) {
            return (Some(row), None);
        }

        let mut successor = None;
        if let Some(next) = state.rows.get_mut(from) {
            if moved {
                next.index = next.index.saturating_sub(1);
            }
            successor = Some(next.handle);
        }
        renderer.remove_row(row.handle, false);

        // an update in place draws the row again right away
        if moved {
            let rendered = state.rows.rendered_count();
            if rendered == 0 {
                state.no_data(&self.inner.config.no_data_message);
            }
            if rendered < self.inner.config.fill_threshold {
                renderer.process_scroll();
            }
        }
        (Some(row), successor)
    }

    fn insert_at(&self, state: &mut State, record: Record, to: usize, removed: Option<&Row>) {
        let renderer = &self.inner.renderer;
        let in_window = state.rows.is_empty()
            || state.rows.is_rendered(to)
            || to.checked_sub(1).map_or(false, |before| state.rows.is_rendered(before));
        if !in_window {
            tracing::trace!(grid = %self.name(), to, "change outside of drawn rows");
            state.rows.insert(to, None);
            return;
        }
        // only an empty sequence lets `to` point past the end
        let to = to.min(state.rows.len());

        let mut anchor = if state.rows.is_empty() {
            renderer.first_row_sibling()
        } else if let Some(row) = state.rows.get(to) {
            Some(row.handle)
        } else {
            to.checked_sub(1)
                .and_then(|before| state.rows.get(before))
                .and_then(|row| renderer.next_sibling(row.handle))
        };

        if let (Some(removed), Some(handle)) = (removed, anchor) {
            let same_record = state
                .rows
                .position_of(handle)
                .and_then(|position| state.rows.get(position))
                .map_or(false, |row| row.id.is_some() && row.id == removed.id);
            if same_record {
                anchor = renderer.next_sibling(handle);
            }
        }

        if let Some(handle) = anchor {
            if !renderer.is_attached(handle) {
                anchor = self.resolve_detached(state, handle);
            }
        }

        let options = RenderOptions {
            keep_scroll_position: self.inner.config.keep_scroll_position,
        };
        let index = state.start + to;
        let row = self.render_row(state, record, anchor, index, &options);
        let handle = row.handle;
        state.rows.insert(to, Some(row));
        renderer.highlight_row(handle);
    }

    /// Find the row that replaced a detached one by looking it up through
    /// its record. The sequence is pointed at the new row.
    fn resolve_detached(&self, state: &mut State, handle: RowHandle) -> Option<RowHandle> {
        let position = state.rows.position_of(handle)?;
        let row = state.rows.get_mut(position)?;
        let id = row.id.clone()?;
        let replacement = self.inner.renderer.find_row(&id)?;
        row.handle = replacement;
        Some(replacement)
    }
}
