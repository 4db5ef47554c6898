//! The seam between the engine and whatever renders the mirror.

use crate::error::Error;
use crate::model::{DocumentSnapshot, Node};
use crate::numbering::ListMarkers;
use crate::pagination::{FlowedContent, PageConstraints};

/// Where a mirror is mounted. Hosts may pass their own; otherwise the surface
/// creates one and the engine removes it on destroy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MountPoint {
    pub id: String,
}

impl MountPoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub trait MeasureSurface {
    fn create_mount(&mut self) -> MountPoint;

    /// Attach the mirror to `mount`. Measurement is unavailable before this.
    fn attach(&mut self, mount: &MountPoint);

    fn is_attached(&self) -> bool;

    /// Lay out the whole document in one continuous flow.
    /// `None` while the surface is not attached.
    fn measure(
        &mut self,
        doc: &DocumentSnapshot,
        markers: &ListMarkers,
        page: &PageConstraints,
    ) -> Option<FlowedContent>;

    /// Height of a detached fragment (a header or footer part) at `width_px`.
    fn measure_fragment(&mut self, nodes: &[Node], context: &DocumentSnapshot, width_px: f32)
    -> Result<f32, Error>;

    fn text_width_px(&self, text: &str, font_size_pt: f32, family: Option<&str>) -> f32;

    /// Remove scaffolding created by [`MeasureSurface::create_mount`].
    fn remove_mount(&mut self, mount: &MountPoint);

    fn teardown(&mut self);
}
