//! Header/footer variants: measurement, and per-page selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{DocumentSnapshot, Node};
use crate::pagination::{PageConstraints, PageQuery};
use crate::surface::MeasureSurface;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderFooterKind {
    Default,
    First,
    Even,
    Odd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotRole {
    Header,
    Footer,
}

/// One header or footer part (`word/header1.xml` ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterSection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub role: SlotRole,
    pub kind: HeaderFooterKind,
    #[serde(default)]
    pub content: Vec<Node>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterDefinitions {
    /// `w:titlePg`: the first page uses the `first` variant.
    #[serde(default)]
    pub title_page: bool,
    /// `w:evenAndOddHeaders` from settings.xml.
    #[serde(default)]
    pub even_and_odd: bool,
    #[serde(default)]
    pub sections: Vec<HeaderFooterSection>,
}

/// Supplies header/footer definitions to the engine.
pub trait HeaderFooterRepository {
    fn definitions(&self) -> Result<HeaderFooterDefinitions, Error>;
}

impl HeaderFooterRepository for HeaderFooterDefinitions {
    fn definitions(&self) -> Result<HeaderFooterDefinitions, Error> {
        Ok(self.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetrics {
    pub id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    pub role: SlotRole,
    pub kind: HeaderFooterKind,
    /// Distance from the page edge.
    pub offset_px: f32,
    pub content_height_px: f32,
    pub effective_height_px: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantMap {
    pub title_page: bool,
    pub even_and_odd: bool,
    pub ids: BTreeMap<HeaderFooterKind, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantLookup {
    pub header: VariantMap,
    pub footer: VariantMap,
}

impl VariantLookup {
    pub fn for_role(&self, role: SlotRole) -> &VariantMap {
        match role {
            SlotRole::Header => &self.header,
            SlotRole::Footer => &self.footer,
        }
    }

    fn for_role_mut(&mut self, role: SlotRole) -> &mut VariantMap {
        match role {
            SlotRole::Header => &mut self.header,
            SlotRole::Footer => &mut self.footer,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distances {
    pub header_px: f32,
    pub footer_px: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterSummary {
    pub section_metrics_by_id: BTreeMap<String, SectionMetrics>,
    pub variant_lookup: VariantLookup,
    pub content_width_px: f32,
    pub distances_px: Distances,
}

impl HeaderFooterSummary {
    pub fn is_empty(&self) -> bool {
        self.section_metrics_by_id.is_empty()
    }
}

/// Measure every variant in `definitions` at the page's content width.
///
/// A variant that fails to measure is logged and left out of the metrics;
/// it still occupies its slot in the lookup so pages that select it get a
/// zero-height placeholder instead of falling through to another variant.
pub fn measure_header_footer_sections(
    definitions: &HeaderFooterDefinitions,
    context: &DocumentSnapshot,
    surface: &mut dyn MeasureSurface,
    page: &PageConstraints,
) -> HeaderFooterSummary {
    let content_width_px = page.content_width_px().unwrap_or(0.0);
    let mut summary = HeaderFooterSummary {
        content_width_px,
        distances_px: Distances {
            header_px: page.header_distance_px,
            footer_px: page.footer_distance_px,
        },
        ..Default::default()
    };
    for role in [SlotRole::Header, SlotRole::Footer] {
        let map = summary.variant_lookup.for_role_mut(role);
        map.title_page = definitions.title_page;
        map.even_and_odd = definitions.even_and_odd;
    }

    for section in &definitions.sections {
        let registered = match section.kind {
            HeaderFooterKind::Default => true,
            HeaderFooterKind::First => definitions.title_page,
            HeaderFooterKind::Even | HeaderFooterKind::Odd => definitions.even_and_odd,
        };
        if !registered {
            log::debug!(
                "{:?} {:?} part {} is not used by this section",
                section.kind,
                section.role,
                section.id
            );
            continue;
        }
        summary
            .variant_lookup
            .for_role_mut(section.role)
            .ids
            .insert(section.kind, section.id.clone());

        let height = match surface.measure_fragment(&section.content, context, content_width_px) {
            Ok(h) if h.is_finite() && h >= 0.0 => h,
            Ok(h) => {
                log::warn!("{:?} {} measured a bogus height {h}, skipping", section.role, section.id);
                continue;
            }
            Err(e) => {
                log::warn!("failed to measure {:?} {}: {e}", section.role, section.id);
                continue;
            }
        };
        let offset_px = match section.role {
            SlotRole::Header => page.header_distance_px,
            SlotRole::Footer => page.footer_distance_px,
        };
        summary.section_metrics_by_id.insert(
            section.id.clone(),
            SectionMetrics {
                id: section.id.clone(),
                section_id: section.section_id.clone(),
                role: section.role,
                kind: section.kind,
                offset_px,
                content_height_px: height,
                effective_height_px: offset_px + height,
            },
        );
    }
    log::debug!(
        "measured {} header/footer variants at {content_width_px:.1}px",
        summary.section_metrics_by_id.len()
    );
    summary
}

/// The header or footer that applies to one page.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSlot {
    pub role: SlotRole,
    /// Variant selected by page position, even when nothing is registered
    /// for it.
    pub kind: Option<HeaderFooterKind>,
    pub id: Option<String>,
    pub metrics: Option<SectionMetrics>,
    pub height_px: f32,
}

impl ResolvedSlot {
    pub fn placeholder(role: SlotRole, kind: Option<HeaderFooterKind>) -> Self {
        Self {
            role,
            kind,
            id: None,
            metrics: None,
            height_px: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedHeaderFooter {
    pub header: ResolvedSlot,
    pub footer: ResolvedSlot,
}

impl ResolvedHeaderFooter {
    pub fn none() -> Self {
        Self {
            header: ResolvedSlot::placeholder(SlotRole::Header, None),
            footer: ResolvedSlot::placeholder(SlotRole::Footer, None),
        }
    }
}

/// Which variant Word shows on `page_index`.
///
/// With `titlePg` the first page always uses `first`, and an unregistered
/// `first` part means a blank slot. With `evenAndOddHeaders` even page
/// numbers use `even` and odd ones use `odd`, or `default` when no `odd`
/// part exists.
pub fn variant_for_page(map: &VariantMap, page_index: usize) -> HeaderFooterKind {
    if page_index == 0 && map.title_page {
        return HeaderFooterKind::First;
    }
    if map.even_and_odd {
        let page_number = page_index + 1;
        if page_number % 2 == 0 {
            return HeaderFooterKind::Even;
        }
        if map.ids.contains_key(&HeaderFooterKind::Odd) {
            return HeaderFooterKind::Odd;
        }
    }
    HeaderFooterKind::Default
}

fn resolve_slot(
    role: SlotRole,
    map: &VariantMap,
    metrics: &BTreeMap<String, SectionMetrics>,
    page_index: usize,
) -> ResolvedSlot {
    let kind = variant_for_page(map, page_index);
    let Some(id) = map.ids.get(&kind) else {
        return ResolvedSlot::placeholder(role, Some(kind));
    };
    let Some(m) = metrics.get(id) else {
        // Registered but never measured.
        let mut slot = ResolvedSlot::placeholder(role, Some(kind));
        slot.id = Some(id.clone());
        return slot;
    };
    ResolvedSlot {
        role,
        kind: Some(kind),
        id: Some(id.clone()),
        height_px: m.content_height_px,
        metrics: Some(m.clone()),
    }
}

pub fn resolve_header_footer_for_page(
    lookup: &VariantLookup,
    metrics: &BTreeMap<String, SectionMetrics>,
    page_index: usize,
    query: PageQuery,
) -> ResolvedHeaderFooter {
    if query.is_last_page {
        // Word has no last-page variant; the flag only matters to hosts
        // that plug in their own resolver.
        log::trace!("resolving header/footer for last page {page_index}");
    }
    ResolvedHeaderFooter {
        header: resolve_slot(SlotRole::Header, &lookup.header, metrics, page_index),
        footer: resolve_slot(SlotRole::Footer, &lookup.footer, metrics, page_index),
    }
}

/// Height a slot pushes into the body: the part of `distance + height` that
/// does not fit inside the page margin.
pub fn reserved_height(distance_px: f32, height_px: f32, margin_px: f32) -> f32 {
    (distance_px + height_px - margin_px).max(0.0)
}
