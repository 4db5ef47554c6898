//! The layout package: the immutable output of one pagination pass.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::header_footer::{HeaderFooterKind, HeaderFooterSummary, SectionMetrics};
use crate::model::DocumentSnapshot;
use crate::units::Units;

pub const LAYOUT_SCHEMA_VERSION: u32 = 1;

/// Identifies the snapshot a package was computed from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub revision: u64,
    pub fingerprint: u64,
}

impl DocumentVersion {
    pub fn of(revision: u64, doc: &DocumentSnapshot) -> Self {
        let mut hasher = DefaultHasher::new();
        match serde_json::to_string(doc) {
            Ok(text) => text.hash(&mut hasher),
            Err(e) => log::debug!("snapshot fingerprint unavailable: {e}"),
        }
        Self {
            revision,
            fingerprint: hasher.finish(),
        }
    }
}

/// `null` (or a missing value) reads back as NaN, which marks an invalid break.
fn lenient_f32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
}

fn nan() -> f32 {
    f32::NAN
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakInfo {
    /// Flow offset at which this page's content begins.
    pub start_offset_px: f32,
    /// Flow offset at which the next page's content begins.
    pub end_offset_px: f32,
    /// Document position of the first content on the page.
    pub pos: u32,
    /// Raw measured top of the first content on the page.
    #[serde(default = "nan", deserialize_with = "lenient_f32")]
    pub top: f32,
    /// Bottom of the last content that fitted on the page.
    #[serde(default = "nan", deserialize_with = "lenient_f32")]
    pub fitted_bottom: f32,
}

impl BreakInfo {
    pub fn is_valid(&self) -> bool {
        self.top.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub page_height_px: f32,
    #[serde(default)]
    pub page_width_px: Option<f32>,
    pub margin_top_px: f32,
    pub margin_right_px: f32,
    pub margin_bottom_px: f32,
    pub margin_left_px: f32,
    pub content_height_px: f32,
    #[serde(default)]
    pub content_width_px: Option<f32>,
    pub header_height_px: f32,
    pub footer_height_px: f32,
    pub page_gap_px: f32,
    pub spacing_after_px: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotBounds {
    pub top_px: f32,
    pub left_px: f32,
    pub right_px: f32,
    pub height_px: f32,
    /// Room inside the page margin before the slot starts pushing the body.
    pub max_height_px: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub kind: Option<HeaderFooterKind>,
    pub measured_height_px: f32,
    pub reserved_height_px: f32,
    pub slot: SlotBounds,
    #[serde(default)]
    pub metrics: Option<SectionMetrics>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderFooterAreas {
    pub header: HeaderFooterData,
    pub footer: HeaderFooterData,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentArea {
    /// Page-local offset where the body begins (below the header band).
    pub start_px: f32,
    /// Page-local offset where the body ends (above the footer band).
    pub end_px: f32,
    pub usable_height_px: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_index: usize,
    #[serde(rename = "break")]
    pub break_info: BreakInfo,
    pub metrics: PageMetrics,
    pub header_footer_areas: HeaderFooterAreas,
    pub page_top_offset_px: f32,
    pub page_gap_px: f32,
    pub content_area: ContentArea,
    #[serde(default)]
    pub spacing_segments: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRect {
    pub top_px: f32,
    pub left_px: f32,
    pub width_px: f32,
    pub height_px: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSegmentPart {
    pub page_index: usize,
    pub absolute_top_px: f32,
    pub absolute_bottom_px: f32,
    /// Relative to the page's content origin.
    pub top_px: f32,
    pub bottom_px: f32,
    pub height_px: f32,
    pub offset_within_field_px: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSegment {
    pub pos: u32,
    pub node_size: u32,
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
    pub rect: FieldRect,
    pub segments: Vec<FieldSegmentPart>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LayoutOrigin {
    #[default]
    Measured,
    Override {
        #[serde(default)]
        source: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPackage {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub document: DocumentVersion,
    #[serde(default)]
    pub units: Units,
    pub pages: Vec<Page>,
    #[serde(default)]
    pub field_segments: Vec<FieldSegment>,
    #[serde(default)]
    pub header_footer_summary: Option<HeaderFooterSummary>,
    #[serde(default)]
    pub origin: LayoutOrigin,
}

impl LayoutPackage {
    pub fn empty(document: DocumentVersion) -> Self {
        Self {
            schema_version: LAYOUT_SCHEMA_VERSION,
            document,
            units: Units::default(),
            pages: Vec::new(),
            field_segments: Vec::new(),
            header_footer_summary: None,
            origin: LayoutOrigin::Measured,
        }
    }

    /// Breaks of the pages whose boundary was actually measured.
    pub fn page_breaks(&self) -> Vec<BreakInfo> {
        self.pages
            .iter()
            .filter(|p| p.break_info.is_valid())
            .map(|p| p.break_info.clone())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloneTier {
    Structural,
    Serialized,
    /// Shares nested data with the source.
    Shallow,
}

/// Copy `value` with the first tier that works: `structural`, then a JSON
/// round trip, then sharing the `Arc`. Never fails.
pub fn snapshot_with_fallback<T>(value: &Arc<T>, structural: impl FnOnce(&T) -> T) -> (Arc<T>, CloneTier)
where
    T: Serialize + DeserializeOwned,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| structural(value))) {
        Ok(copy) => return (Arc::new(copy), CloneTier::Structural),
        Err(_) => log::warn!("structural clone panicked, falling back to JSON round trip"),
    }
    match serde_json::to_value(&**value).and_then(serde_json::from_value) {
        Ok(copy) => return (Arc::new(copy), CloneTier::Serialized),
        Err(e) => log::warn!("JSON round trip failed ({e}), sharing the original"),
    }
    (Arc::clone(value), CloneTier::Shallow)
}

pub fn snapshot_layout(layout: &Arc<LayoutPackage>) -> (Arc<LayoutPackage>, CloneTier) {
    snapshot_with_fallback(layout, LayoutPackage::clone)
}
