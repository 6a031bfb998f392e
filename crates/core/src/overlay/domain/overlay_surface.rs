use super::annotation::{LabelPlacement, ScreenRect};

/// Handle to a node appended to an overlay surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Rendered size of the live view on screen, in display pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A positioned visual element layered over the live view.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayNode {
    Highlight(ScreenRect),
    Label(LabelPlacement),
}

/// Rendering capability the detection loop draws through: reads the
/// displayed geometry of the live view and manages overlay nodes on it.
pub trait OverlaySurface: Send {
    fn displayed_size(&self) -> DisplaySize;

    /// The live view was laid out at a new size.
    fn set_displayed_size(&mut self, size: DisplaySize);

    fn append(&mut self, node: OverlayNode) -> NodeId;

    /// Removes a node. Unknown ids are ignored.
    fn remove(&mut self, id: NodeId);

    /// Number of nodes currently on the surface.
    fn node_count(&self) -> usize;
}
