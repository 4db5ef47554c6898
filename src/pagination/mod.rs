//! Page-break generation over a continuously flowed document.

mod flow;
mod table;
mod text_flow;

pub use flow::{BreakInside, FlowBlock, FlowBuilder, FlowKind, FlowedContent, ForcedBreak, MeasuredField};
pub use table::auto_fit_columns;
pub use text_flow::{DEFAULT_FONT_SIZE_PT, TextFlowSurface};

use crate::header_footer::{ResolvedHeaderFooter, ResolvedSlot, SlotRole, reserved_height};
use crate::layout::{BreakInfo, ContentArea, HeaderFooterAreas, HeaderFooterData, Page, PageMetrics, SlotBounds};
use crate::model::{PageStyle, SectionBreakType};
use crate::units::inches_to_px;

pub const DEFAULT_PAGE_GAP_PX: f32 = 20.0;
pub const BREAK_TOLERANCE_PX: f32 = 1.0;
pub const MAX_BREAK_PROBES: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarginsPx {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

/// Page box in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageConstraints {
    pub page_height_px: f32,
    pub page_width_px: Option<f32>,
    pub margins: MarginsPx,
    pub header_distance_px: f32,
    pub footer_distance_px: f32,
}

impl PageConstraints {
    pub fn from_style(style: &PageStyle) -> Self {
        let m = &style.margins;
        Self {
            page_height_px: inches_to_px(style.height_in),
            page_width_px: Some(inches_to_px(style.width_in)),
            margins: MarginsPx {
                top: inches_to_px(m.top),
                right: inches_to_px(m.right),
                bottom: inches_to_px(m.bottom),
                left: inches_to_px(m.left),
            },
            header_distance_px: inches_to_px(m.header),
            footer_distance_px: inches_to_px(m.footer),
        }
    }

    pub fn content_width_px(&self) -> Option<f32> {
        self.page_width_px
            .map(|w| (w - self.margins.left - self.margins.right).max(0.0))
    }
}

impl Default for PageConstraints {
    fn default() -> Self {
        Self::from_style(&PageStyle::default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub is_last_page: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BreakOptions {
    pub tolerance_px: f32,
    pub max_probes: usize,
    pub page_gap_px: f32,
    pub page_top_offset_px: f32,
    /// Report an exhausted break search at `warn` instead of `debug`.
    pub dev_diagnostics: bool,
}

impl Default for BreakOptions {
    fn default() -> Self {
        Self {
            tolerance_px: BREAK_TOLERANCE_PX,
            max_probes: MAX_BREAK_PROBES,
            page_gap_px: DEFAULT_PAGE_GAP_PX,
            page_top_offset_px: 0.0,
            dev_diagnostics: cfg!(debug_assertions),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Cursor {
    idx: usize,
    offset: f32,
}

#[derive(Clone, Debug)]
struct Fit {
    next: Cursor,
    fitted_bottom: f32,
    reached_end: bool,
    forced: Option<ForcedBreak>,
    spacing: Vec<u32>,
}

/// Split `flow` into pages.
///
/// `resolve` answers which header/footer applies to a page; its reserved
/// heights shrink that page's usable height. When the flow is `None` (the
/// surface is not attached yet) there are no pages at all.
pub fn generate_pages(
    flow: Option<&FlowedContent>,
    page: &PageConstraints,
    options: &BreakOptions,
    resolve: &mut dyn FnMut(usize, PageQuery) -> ResolvedHeaderFooter,
) -> Vec<Page> {
    let Some(flow) = flow else {
        return Vec::new();
    };
    let generator = Generator { flow, page, options };
    let mut pages = generator.run(resolve);
    finalize_pages(&mut pages, options);
    pages
}

struct Generator<'a> {
    flow: &'a FlowedContent,
    page: &'a PageConstraints,
    options: &'a BreakOptions,
}

impl Generator<'_> {
    fn run(&self, resolve: &mut dyn FnMut(usize, PageQuery) -> ResolvedHeaderFooter) -> Vec<Page> {
        let mut pages = Vec::new();
        let mut cursor = Cursor { idx: 0, offset: 0.0 };

        loop {
            let page_index = pages.len();
            let mut hf = resolve(page_index, PageQuery { is_last_page: false });
            let usable = self.usable_height(&hf);
            let mut fit = self.fit(cursor, usable);

            if fit.reached_end {
                let last = resolve(page_index, PageQuery { is_last_page: true });
                let last_usable = self.usable_height(&last);
                if (last_usable - usable).abs() > self.options.tolerance_px {
                    fit = self.fit(cursor, last_usable);
                }
                // A refit that no longer reaches the end leaves this page
                // non-last; the overflow starts the real last page.
                if fit.reached_end {
                    hf = last;
                }
            }

            let done = fit.reached_end;
            let forced = fit.forced;
            let next = fit.next;
            pages.push(self.build_page(page_index, cursor, fit, hf));
            if done {
                break;
            }

            if let Some(ForcedBreak::Section(parity @ (SectionBreakType::OddPage | SectionBreakType::EvenPage))) =
                forced
            {
                // The next page number is page_index + 2.
                let next_is_odd = (page_index + 2) % 2 == 1;
                let wants_odd = parity == SectionBreakType::OddPage;
                if next_is_odd != wants_odd {
                    let blank_index = pages.len();
                    log::debug!("inserting blank page {blank_index} for {parity:?} section break");
                    let hf = resolve(blank_index, PageQuery { is_last_page: false });
                    pages.push(self.blank_page(blank_index, next, hf));
                }
            }

            if next.idx <= cursor.idx && next.offset <= cursor.offset {
                // fit() always consumes something; this only guards against a
                // corrupt flow (blocks running backwards).
                log::warn!("page break made no progress at block {}, stopping", cursor.idx);
                break;
            }
            cursor = next;
        }
        pages
    }

    fn usable_height(&self, hf: &ResolvedHeaderFooter) -> f32 {
        let page = self.page;
        let header = reserved_height(page.header_distance_px, hf.header.height_px, page.margins.top);
        let footer = reserved_height(page.footer_distance_px, hf.footer.height_px, page.margins.bottom);
        (page.page_height_px - page.margins.top - page.margins.bottom - header - footer).max(0.0)
    }

    fn fit(&self, cursor: Cursor, usable: f32) -> Fit {
        let blocks = &self.flow.blocks;
        let tolerance = self.options.tolerance_px;
        let limit = cursor.offset + usable;
        let mut fitted_bottom = cursor.offset;
        let mut placed_any = false;
        let mut spacing = Vec::new();

        let mut i = cursor.idx;
        while i < blocks.len() {
            let block = &blocks[i];
            if let Some(kind) = block.forced_break() {
                match kind {
                    ForcedBreak::Section(SectionBreakType::Continuous) => {}
                    ForcedBreak::BeforeParagraph if !placed_any => {}
                    _ => {
                        spacing.push(block.pos);
                        let offset = if block.top.is_finite() {
                            block.top.max(cursor.offset)
                        } else {
                            fitted_bottom
                        };
                        return Fit {
                            next: Cursor { idx: i + 1, offset },
                            fitted_bottom,
                            reached_end: false,
                            forced: Some(kind),
                            spacing,
                        };
                    }
                }
                i += 1;
                continue;
            }
            if !block.is_measured() {
                i += 1;
                continue;
            }
            if block.bottom <= limit + tolerance {
                fitted_bottom = fitted_bottom.max(block.bottom);
                placed_any = true;
                i += 1;
                continue;
            }
            if !placed_any && !self.splits_at(block, cursor, limit) {
                // Nothing fits at all: take the unit anyway.
                log::debug!("block at pos {} is taller than the page, placing it whole", block.pos);
                fitted_bottom = fitted_bottom.max(block.bottom);
                placed_any = true;
                i += 1;
                continue;
            }
            return self.overflow(cursor, i, limit, fitted_bottom, spacing);
        }

        Fit {
            next: Cursor {
                idx: blocks.len(),
                offset: self.flow.height_px.max(fitted_bottom),
            },
            fitted_bottom,
            reached_end: true,
            forced: None,
            spacing,
        }
    }

    /// An `Auto` block that starts above `limit` is cut there.
    fn splits_at(&self, block: &FlowBlock, cursor: Cursor, limit: f32) -> bool {
        block.inside == BreakInside::Auto && limit > block.top.max(cursor.offset) + self.options.tolerance_px
    }

    fn overflow(&self, cursor: Cursor, idx: usize, limit: f32, fitted_bottom: f32, spacing: Vec<u32>) -> Fit {
        let blocks = &self.flow.blocks;
        let block = &blocks[idx];

        if self.splits_at(block, cursor, limit) {
            return Fit {
                next: Cursor { idx, offset: limit },
                fitted_bottom: limit,
                reached_end: false,
                forced: None,
                spacing,
            };
        }

        let break_at = match self.chain_start(cursor.idx, idx) {
            Some(start) if start > cursor.idx && self.has_content_before(cursor.idx, start) => start,
            Some(_) => idx,
            None => {
                crate::dev_warn!(
                    self.options.dev_diagnostics;
                    "break search exhausted {} probes at pos {}, breaking at the overflow",
                    self.options.max_probes,
                    block.pos
                );
                idx
            }
        };

        let first = &blocks[break_at];
        let offset = if first.top.is_finite() {
            first.top.max(cursor.offset)
        } else {
            fitted_bottom
        };
        let fitted_bottom = blocks[cursor.idx..break_at]
            .iter()
            .filter(|b| b.is_measured() && b.forced_break().is_none())
            .map(|b| b.bottom)
            .fold(cursor.offset, f32::max);
        Fit {
            next: Cursor { idx: break_at, offset },
            fitted_bottom,
            reached_end: false,
            forced: None,
            spacing,
        }
    }

    fn has_content_before(&self, from: usize, to: usize) -> bool {
        self.flow.blocks[from..to]
            .iter()
            .any(|b| b.is_measured() && b.forced_break().is_none())
    }

    /// First block of the chain containing `idx`, no earlier than `lower`.
    ///
    /// Gallops backwards to bracket the chain boundary, then bisects.
    /// `None` if that takes more than `max_probes` comparisons.
    fn chain_start(&self, lower: usize, idx: usize) -> Option<usize> {
        let blocks = &self.flow.blocks;
        let chain = blocks[idx].chain;
        let max_probes = self.options.max_probes;
        let mut probes = 0;

        let mut hi = idx;
        let mut step = 1;
        let mut lo = loop {
            if hi == lower {
                return Some(lower);
            }
            probes += 1;
            if probes > max_probes {
                return None;
            }
            let j = hi.saturating_sub(step).max(lower);
            if blocks[j].chain == chain {
                if j == lower {
                    return Some(lower);
                }
                hi = j;
                step *= 2;
            } else {
                break j;
            }
        };

        // blocks[lo] is outside the chain, blocks[hi] inside.
        while hi - lo > 1 {
            probes += 1;
            if probes > max_probes {
                return None;
            }
            let mid = lo + (hi - lo) / 2;
            if blocks[mid].chain == chain {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Some(hi)
    }

    fn start_of(&self, cursor: Cursor) -> (u32, f32) {
        match self.flow.blocks.get(cursor.idx) {
            Some(block) if block.top.is_finite() && cursor.offset > block.top => (block.pos, cursor.offset),
            Some(block) => (block.pos, block.top),
            None => (self.flow.end_pos, cursor.offset),
        }
    }

    fn build_page(&self, page_index: usize, cursor: Cursor, fit: Fit, hf: ResolvedHeaderFooter) -> Page {
        let (pos, top) = self.start_of(cursor);
        let break_info = BreakInfo {
            start_offset_px: cursor.offset,
            end_offset_px: fit.next.offset,
            pos,
            top,
            fitted_bottom: fit.fitted_bottom,
        };
        page_shell(self.page, self.options, page_index, break_info, &hf, fit.spacing)
    }

    fn blank_page(&self, page_index: usize, at: Cursor, hf: ResolvedHeaderFooter) -> Page {
        let (pos, _) = self.start_of(at);
        let break_info = BreakInfo {
            start_offset_px: at.offset,
            end_offset_px: at.offset,
            pos,
            top: at.offset,
            fitted_bottom: at.offset,
        };
        page_shell(self.page, self.options, page_index, break_info, &hf, Vec::new())
    }
}

fn slot_data(slot: &ResolvedSlot, page: &PageConstraints) -> HeaderFooterData {
    let (distance, margin) = match slot.role {
        SlotRole::Header => (page.header_distance_px, page.margins.top),
        SlotRole::Footer => (page.footer_distance_px, page.margins.bottom),
    };
    let top = match slot.role {
        SlotRole::Header => distance,
        SlotRole::Footer => page.page_height_px - distance - slot.height_px,
    };
    HeaderFooterData {
        id: slot.id.clone(),
        section_id: slot.metrics.as_ref().and_then(|m| m.section_id.clone()),
        kind: slot.kind,
        measured_height_px: slot.height_px,
        reserved_height_px: reserved_height(distance, slot.height_px, margin),
        slot: SlotBounds {
            top_px: top,
            left_px: page.margins.left,
            right_px: page.margins.right,
            height_px: slot.height_px,
            max_height_px: (margin - distance).max(0.0),
        },
        metrics: slot.metrics.clone(),
    }
}

fn page_shell(
    page: &PageConstraints,
    options: &BreakOptions,
    page_index: usize,
    break_info: BreakInfo,
    hf: &ResolvedHeaderFooter,
    spacing_segments: Vec<u32>,
) -> Page {
    let header = slot_data(&hf.header, page);
    let footer = slot_data(&hf.footer, page);

    let start_px = page.margins.top + header.reserved_height_px;
    let end_px = (page.page_height_px - page.margins.bottom - footer.reserved_height_px).max(start_px);
    let content_area = ContentArea {
        start_px,
        end_px,
        usable_height_px: end_px - start_px,
    };

    let mut spacing_segments = spacing_segments;
    spacing_segments.push(break_info.pos);
    spacing_segments.sort_unstable();
    spacing_segments.dedup();

    Page {
        page_index,
        metrics: PageMetrics {
            page_height_px: page.page_height_px,
            page_width_px: page.page_width_px,
            margin_top_px: page.margins.top,
            margin_right_px: page.margins.right,
            margin_bottom_px: page.margins.bottom,
            margin_left_px: page.margins.left,
            content_height_px: content_area.usable_height_px,
            content_width_px: page.content_width_px(),
            header_height_px: header.reserved_height_px,
            footer_height_px: footer.reserved_height_px,
            page_gap_px: options.page_gap_px,
            spacing_after_px: 0.0,
        },
        break_info,
        header_footer_areas: HeaderFooterAreas { header, footer },
        page_top_offset_px: 0.0,
        page_gap_px: options.page_gap_px,
        content_area,
        spacing_segments,
    }
}

/// Visual chrome: where each page sits in the scrolled view and how much
/// space separates it from the next.
fn finalize_pages(pages: &mut [Page], options: &BreakOptions) {
    let next_headers: Vec<f32> = pages
        .iter()
        .skip(1)
        .map(|p| p.header_footer_areas.header.measured_height_px)
        .chain(std::iter::once(0.0))
        .collect();

    for (i, (page, next_header)) in pages.iter_mut().zip(next_headers).enumerate() {
        page.metrics.spacing_after_px =
            page.header_footer_areas.footer.measured_height_px + next_header + options.page_gap_px;
        page.page_top_offset_px = options.page_top_offset_px + i as f32 * (page.metrics.page_height_px + options.page_gap_px);
        page.page_index = i;
    }
}
