use parking_lot::Mutex;
use slab::Slab;

use crate::record::{collection::SortCriterion, Record, RecordId};

use super::{RenderOptions, RowHandle, Renderer};

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Option<RecordId>,
    pub record: Record,
    pub index: usize,
    pub parent: Option<RowHandle>,
}

#[derive(Debug, Default, Clone)]
pub struct RenderLog {
    pub inserted: Vec<RowHandle>,
    pub removed: Vec<(RowHandle, bool)>,
    pub highlighted: Vec<RowHandle>,
    pub adjusted: Vec<RowHandle>,
    pub scroll_requests: usize,
    pub collectionless_sorts: Vec<Vec<SortCriterion>>,
}

#[derive(Default)]
struct Surface {
    nodes: Slab<Node>,
    order: Vec<RowHandle>,
    first_sibling: Option<RowHandle>,
    log: RenderLog,
}

impl Surface {
    fn position(&self, handle: RowHandle) -> Option<usize> {
        self.order.iter().position(|other| *other == handle)
    }

    fn is_descendant(&self, node: RowHandle, ancestor: RowHandle) -> bool {
        let mut current = self.nodes.get(node.key()).and_then(|node| node.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(parent.key()).and_then(|node| node.parent);
        }
        false
    }

    fn attach(&mut self, node: Node, before: Option<RowHandle>) -> RowHandle {
        let handle = RowHandle::new(self.nodes.insert(node));
        let position = before
            .and_then(|before| self.position(before))
            .unwrap_or(self.order.len());
        self.order.insert(position, handle);
        handle
    }
}

/// Renderer that keeps rows in a flat list instead of drawing them. Rows can
/// carry nested child rows, which are placed directly after their parent.
#[derive(Default)]
pub struct MemoryRenderer {
    surface: Mutex<Surface>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the drawn top level rows, in the order they are drawn.
    pub fn rendered_ids(&self) -> Vec<Option<RecordId>> {
        let surface = self.surface.lock();
        surface
            .order
            .iter()
            .filter_map(|handle| surface.nodes.get(handle.key()))
            .filter(|node| node.parent.is_none())
            .map(|node| node.id.clone())
            .collect()
    }

    /// Every drawn row, nested rows included, in the order they are drawn.
    pub fn order(&self) -> Vec<RowHandle> {
        self.surface.lock().order.clone()
    }

    pub fn node(&self, handle: RowHandle) -> Option<Node> {
        self.surface.lock().nodes.get(handle.key()).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.surface.lock().order.len()
    }

    pub fn log(&self) -> RenderLog {
        self.surface.lock().log.clone()
    }

    pub fn set_first_sibling(&self, handle: Option<RowHandle>) {
        self.surface.lock().first_sibling = handle;
    }

    /// Draw a row nested under `parent`, after any children it already has.
    pub fn insert_child(&self, parent: RowHandle, record: Record) -> Option<RowHandle> {
        let mut surface = self.surface.lock();
        let mut position = surface.position(parent)? + 1;
        while position < surface.order.len() && surface.is_descendant(surface.order[position], parent) {
            position += 1;
        }
        let before = surface.order.get(position).copied();
        let index = surface.nodes.get(parent.key())?.index;
        let node = Node {
            id: None,
            record,
            index,
            parent: Some(parent),
        };
        Some(surface.attach(node, before))
    }

    /// Draw a fresh copy of a row in its place and detach the old one.
    pub fn redraw(&self, handle: RowHandle) -> Option<RowHandle> {
        let mut surface = self.surface.lock();
        let position = surface.position(handle)?;
        let node = surface.nodes.get(handle.key())?.clone();
        let replacement = RowHandle::new(surface.nodes.insert(node));
        surface.order[position] = replacement;
        Some(replacement)
    }
}

impl Renderer for MemoryRenderer {
    fn insert_row(
        &self,
        record: &Record,
        id: Option<&RecordId>,
        before: Option<RowHandle>,
        index: usize,
        _options: &RenderOptions,
    ) -> RowHandle {
        let mut surface = self.surface.lock();
        let node = Node {
            id: id.cloned(),
            record: record.clone(),
            index,
            parent: None,
        };
        let handle = surface.attach(node, before);
        surface.log.inserted.push(handle);
        handle
    }

    fn remove_row(&self, handle: RowHandle, cleanup_only: bool) {
        let mut surface = self.surface.lock();
        surface.log.removed.push((handle, cleanup_only));
        let children = surface
            .order
            .iter()
            .copied()
            .filter(|other| *other == handle || surface.is_descendant(*other, handle))
            .collect::<Vec<_>>();
        surface.order.retain(|other| !children.contains(other));
    }

    fn next_sibling(&self, handle: RowHandle) -> Option<RowHandle> {
        let surface = self.surface.lock();
        let position = surface.position(handle)?;
        surface.order[position + 1..]
            .iter()
            .copied()
            .find(|other| !surface.is_descendant(*other, handle))
    }

    fn highlight_row(&self, handle: RowHandle) {
        self.surface.lock().log.highlighted.push(handle);
    }

    fn adjust_row_indices(&self, from: RowHandle) {
        let mut surface = self.surface.lock();
        surface.log.adjusted.push(from);
        let Some(position) = surface.position(from) else {
            return;
        };
        let Some(mut index) = surface.nodes.get(from.key()).map(|node| node.index) else {
            return;
        };
        let order = surface.order[position + 1..].to_vec();
        for handle in order {
            if let Some(node) = surface.nodes.get_mut(handle.key()) {
                if node.parent.is_none() {
                    index += 1;
                    node.index = index;
                }
            }
        }
    }

    fn first_row_sibling(&self) -> Option<RowHandle> {
        self.surface.lock().first_sibling
    }

    fn is_attached(&self, handle: RowHandle) -> bool {
        self.surface.lock().position(handle).is_some()
    }

    fn find_row(&self, id: &RecordId) -> Option<RowHandle> {
        let surface = self.surface.lock();
        surface.order.iter().copied().find(|handle| {
            surface
                .nodes
                .get(handle.key())
                .map_or(false, |node| node.id.as_ref() == Some(id))
        })
    }

    fn process_scroll(&self) {
        self.surface.lock().log.scroll_requests += 1;
    }

    fn sort_without_collection(&self, criteria: &[SortCriterion]) {
        self.surface
            .lock()
            .log
            .collectionless_sorts
            .push(criteria.to_vec());
    }
}
