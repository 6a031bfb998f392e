use std::collections::BTreeMap;

use crate::overlay::domain::overlay_surface::{DisplaySize, NodeId, OverlayNode, OverlaySurface};

/// Retained overlay scene kept in memory.
///
/// Nodes are ordered by insertion. `revision` increments on every change so
/// a presenter can redraw only when the scene actually moved.
pub struct SceneOverlaySurface {
    size: DisplaySize,
    nodes: BTreeMap<NodeId, OverlayNode>,
    next_id: u64,
    revision: u64,
}

impl SceneOverlaySurface {
    pub fn new(size: DisplaySize) -> Self {
        Self {
            size,
            nodes: BTreeMap::new(),
            next_id: 0,
            revision: 0,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &OverlayNode)> {
        self.nodes.iter()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// One line per node, for terminal presentation.
    pub fn describe(&self) -> Vec<String> {
        self.nodes
            .values()
            .map(|node| match node {
                OverlayNode::Highlight(r) => format!(
                    "[box] x={:.0} y={:.0} w={:.0} h={:.0}",
                    r.x, r.y, r.width, r.height
                ),
                OverlayNode::Label(l) => {
                    format!("[label] ({:.0}, {:.0}) {}", l.x, l.y, l.text)
                }
            })
            .collect()
    }
}

impl OverlaySurface for SceneOverlaySurface {
    fn displayed_size(&self) -> DisplaySize {
        self.size
    }

    fn set_displayed_size(&mut self, size: DisplaySize) {
        self.size = size;
    }

    fn append(&mut self, node: OverlayNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        self.revision += 1;
        id
    }

    fn remove(&mut self, id: NodeId) {
        if self.nodes.remove(&id).is_some() {
            self.revision += 1;
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
