//! Built-in measurement surface: greedy word wrap over font advance widths.

use crate::error::Error;
use crate::fonts::{FontBook, FontMetrics};
use crate::layout::FieldRect;
use crate::model::{DocumentSnapshot, Inline, LineSpacing, Node, Paragraph, ParagraphAttrs, Run, index_positions};
use crate::numbering::{ListMarker, ListMarkers};
use crate::surface::{MeasureSurface, MountPoint};
use crate::units::{pt_to_px, px_to_pt};

use super::PageConstraints;
use super::flow::{BreakInside, FlowBuilder, FlowKind, FlowedContent, ForcedBreak, MeasuredField};
use super::table;

pub const DEFAULT_FONT_SIZE_PT: f32 = 11.0;
const DEFAULT_TAB_INTERVAL: f32 = 36.0; // 0.5 inches
const DEFAULT_CONTENT_WIDTH_PT: f32 = 468.0;

fn resolve_line_h(ls: LineSpacing, font_size: f32, tallest_lhr: Option<f32>) -> f32 {
    match ls {
        LineSpacing::Auto(mult) => tallest_lhr
            .map(|ratio| font_size * ratio * mult)
            .unwrap_or(font_size * 1.2 * mult),
        LineSpacing::Exact(pts) => pts,
        LineSpacing::AtLeast(min_pts) => {
            let natural = tallest_lhr
                .map(|ratio| font_size * ratio)
                .unwrap_or(font_size * 1.2);
            natural.max(min_pts)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct LineBox {
    /// Char offset into the paragraph content where the line starts.
    pub offset: u32,
    pub height_pt: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) enum Piece {
    Line(LineBox),
    PageBreak { offset: u32 },
}

pub(super) struct ParagraphLayout {
    pub pieces: Vec<Piece>,
    pub space_before_pt: f32,
    pub space_after_pt: f32,
    pub contextual: bool,
    pub keep_next: bool,
    pub keep_lines: bool,
    pub widow_control: bool,
    pub page_break_before: bool,
}

impl ParagraphLayout {
    pub fn height_pt(&self) -> f32 {
        self.pieces
            .iter()
            .map(|p| match p {
                Piece::Line(line) => line.height_pt,
                Piece::PageBreak { .. } => 0.0,
            })
            .sum()
    }
}

/// Words of `text` with their char offsets.
fn words(text: &str) -> Vec<(u32, &str)> {
    let mut out = Vec::new();
    let mut start: Option<(u32, usize)> = None;
    for (ci, (bi, ch)) in text.char_indices().enumerate() {
        if ch.is_whitespace() {
            if let Some((sc, sb)) = start.take() {
                out.push((sc, &text[sb..bi]));
            }
        } else if start.is_none() {
            start = Some((ci as u32, bi));
        }
    }
    if let Some((sc, sb)) = start {
        out.push((sc, &text[sb..]));
    }
    out
}

/// Line-filling state for one paragraph, in points.
struct Wrapper {
    max_width: f32,
    first_extra: f32,
    line_h: f32,
    grows: bool,
    pieces: Vec<Piece>,
    lines_done: usize,
    line_offset: u32,
    line_tall: f32,
    x: f32,
    has_content: bool,
}

impl Wrapper {
    fn line_max(&self) -> f32 {
        if self.lines_done == 0 {
            self.max_width + self.first_extra
        } else {
            self.max_width
        }
    }

    fn break_line(&mut self, next_offset: u32) {
        self.pieces.push(Piece::Line(LineBox {
            offset: self.line_offset,
            height_pt: self.line_tall,
        }));
        self.lines_done += 1;
        self.line_offset = next_offset;
        self.line_tall = self.line_h;
        self.x = 0.0;
        self.has_content = false;
    }

    fn place(&mut self, offset: u32, width: f32, space_before: Option<f32>, height: f32) {
        let proposed = match space_before {
            Some(space_w) if self.has_content => self.x + space_w,
            _ => self.x,
        };
        if self.has_content && proposed + width > self.line_max() {
            self.break_line(offset);
        } else {
            self.x = proposed;
        }
        if !self.has_content && self.x == 0.0 {
            self.line_offset = offset;
        }
        self.x += width;
        self.has_content = true;
        if self.grows {
            self.line_tall = self.line_tall.max(height);
        }
    }

    fn tab(&mut self, offset: u32) {
        let next_stop = ((self.x / DEFAULT_TAB_INTERVAL).floor() + 1.0) * DEFAULT_TAB_INTERVAL;
        if self.has_content && next_stop > self.line_max() {
            self.break_line(offset);
        }
        self.x = next_stop.min(self.line_max());
        self.has_content = true;
    }

    fn finish(mut self) -> Vec<Piece> {
        self.pieces.push(Piece::Line(LineBox {
            offset: self.line_offset,
            height_pt: self.line_tall,
        }));
        self.pieces
    }
}

/// Flow position while walking block content.
pub(super) struct FlowState {
    pub builder: FlowBuilder,
    /// Pixels from the top of the flow.
    pub y: f32,
    pub prev_space_after_pt: f32,
    /// Style of the previous paragraph when it had contextual spacing.
    pub prev_contextual_style: Option<Option<String>>,
    pub keep_with_next: bool,
}

impl FlowState {
    fn new() -> Self {
        Self {
            builder: FlowBuilder::new(),
            y: 0.0,
            prev_space_after_pt: 0.0,
            prev_contextual_style: None,
            keep_with_next: false,
        }
    }

    /// Spacing carried into a non-paragraph block.
    pub fn take_gap(&mut self) {
        self.y += pt_to_px(self.prev_space_after_pt);
        self.prev_space_after_pt = 0.0;
        self.prev_contextual_style = None;
    }

    fn reset_after_break(&mut self) {
        self.prev_space_after_pt = 0.0;
        self.prev_contextual_style = None;
        self.keep_with_next = false;
    }
}

pub struct TextFlowSurface {
    fonts: FontBook,
    mount: Option<MountPoint>,
    attached: bool,
    created_mounts: u32,
}

impl Default for TextFlowSurface {
    fn default() -> Self {
        Self::new(FontBook::new())
    }
}

impl TextFlowSurface {
    pub fn new(fonts: FontBook) -> Self {
        Self {
            fonts,
            mount: None,
            attached: false,
            created_mounts: 0,
        }
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn mount(&self) -> Option<&MountPoint> {
        self.mount.as_ref()
    }

    pub(super) fn run_metrics(&self, run: &Run, attrs: &ParagraphAttrs) -> (&FontMetrics, f32) {
        let size = run
            .font_size_pt
            .unwrap_or_else(|| attrs.font_size_pt.resolve(DEFAULT_FONT_SIZE_PT));
        let family = run
            .font_family
            .as_deref()
            .or_else(|| attrs.font_family.value().map(String::as_str));
        let metrics = self
            .fonts
            .get(family, run.bold.is_on(false), run.italic.is_on(false));
        (metrics, size)
    }

    /// Wrap a paragraph into lines at `width_pt`.
    pub(super) fn layout_paragraph(
        &self,
        doc: &DocumentSnapshot,
        para: &Paragraph,
        marker: Option<&ListMarker>,
        width_pt: f32,
    ) -> ParagraphLayout {
        let attrs = doc.effective_attrs(para);
        let para_size = attrs.font_size_pt.resolve(DEFAULT_FONT_SIZE_PT);
        let para_family = attrs.font_family.value().map(String::as_str);

        let (font_size, tallest_lhr) = para
            .content
            .iter()
            .filter_map(|inline| match inline {
                Inline::Run(run) => Some(self.run_metrics(run, &attrs)),
                _ => None,
            })
            .fold(None, |best: Option<(f32, Option<f32>)>, (metrics, size)| match best {
                Some((best_size, _)) if best_size >= size => best,
                _ => Some((size, metrics.line_h_ratio)),
            })
            .unwrap_or_else(|| (para_size, self.fonts.get(para_family, false, false).line_h_ratio));
        let spacing = attrs.line_spacing.resolve(LineSpacing::Auto(1.0));
        let line_h = resolve_line_h(spacing, font_size, tallest_lhr);

        let indent_left = attrs
            .indent_left_pt
            .value()
            .copied()
            .or(marker.map(|m| m.indent_left_pt))
            .unwrap_or(0.0);
        let hanging = attrs
            .indent_hanging_pt
            .value()
            .copied()
            .or(marker.map(|m| m.indent_hanging_pt))
            .unwrap_or(0.0);
        let first_line = attrs.indent_first_line_pt.resolve(0.0);
        let indent_right = attrs.indent_right_pt.resolve(0.0);
        let max_width = (width_pt - indent_left - indent_right).max(1.0);

        let mut wrapper = Wrapper {
            max_width,
            first_extra: hanging - first_line,
            line_h,
            grows: !matches!(spacing, LineSpacing::Exact(_)),
            pieces: Vec::new(),
            lines_done: 0,
            line_offset: 0,
            line_tall: line_h,
            x: 0.0,
            has_content: false,
        };
        if let Some(marker) = marker {
            // The label sits in the hanging area; text starts at the indent
            // unless the label is wider.
            let label_w = self
                .fonts
                .get(para_family, false, false)
                .word_width(&marker.text, para_size);
            wrapper.first_extra = 0.0;
            wrapper.x = (label_w - hanging).max(0.0);
        }

        let mut offset = 0u32;
        let mut prev_ended_with_ws = false;
        let mut prev_space_w = 0.0f32;
        for inline in &para.content {
            match inline {
                Inline::Run(run) => {
                    let (metrics, size) = self.run_metrics(run, &attrs);
                    let space_w = metrics.space_width(size);
                    let starts_with_ws = run.text.starts_with(char::is_whitespace);
                    for (i, (word_offset, word)) in words(&run.text).into_iter().enumerate() {
                        let need_space = i > 0 || starts_with_ws || prev_ended_with_ws;
                        let effective_space_w = if i > 0 || starts_with_ws {
                            space_w
                        } else {
                            prev_space_w
                        };
                        wrapper.place(
                            offset + word_offset,
                            metrics.word_width(word, size),
                            need_space.then_some(effective_space_w),
                            line_h,
                        );
                    }
                    if !run.text.is_empty() {
                        prev_ended_with_ws = run.text.ends_with(char::is_whitespace);
                        prev_space_w = space_w;
                    }
                }
                Inline::Tab => {
                    wrapper.tab(offset);
                    prev_ended_with_ws = false;
                }
                Inline::LineBreak => {
                    wrapper.break_line(offset + 1);
                    prev_ended_with_ws = false;
                }
                Inline::PageBreak => {
                    wrapper.break_line(offset + 1);
                    wrapper.pieces.push(Piece::PageBreak { offset });
                    prev_ended_with_ws = false;
                }
                Inline::Image(img) => {
                    let need_space = prev_ended_with_ws.then_some(prev_space_w);
                    wrapper.place(offset, img.width_pt, need_space, img.height_pt);
                    prev_ended_with_ws = false;
                }
            }
            offset += match inline {
                Inline::Run(run) => run.text.chars().count() as u32,
                _ => 1,
            };
        }

        ParagraphLayout {
            pieces: wrapper.finish(),
            space_before_pt: attrs.space_before_pt.resolve(0.0),
            space_after_pt: attrs.space_after_pt.resolve(0.0),
            contextual: attrs.contextual_spacing.is_on(false),
            keep_next: attrs.keep_next.is_on(false),
            keep_lines: attrs.keep_lines.is_on(false),
            widow_control: attrs.widow_control.is_on(true),
            page_break_before: attrs.page_break_before.is_on(false),
        }
    }

    fn flow_paragraph(
        &self,
        doc: &DocumentSnapshot,
        para: &Paragraph,
        pos: u32,
        markers: &ListMarkers,
        width_pt: f32,
        state: &mut FlowState,
    ) {
        let layout = self.layout_paragraph(doc, para, markers.get(&pos), width_pt);

        if layout.page_break_before {
            state.builder.push_break(pos, state.y, ForcedBreak::BeforeParagraph);
            state.reset_after_break();
        }

        let same_style_contextual =
            layout.contextual && state.prev_contextual_style.as_ref() == Some(&para.style);
        let gap = if same_style_contextual {
            0.0
        } else {
            state.prev_space_after_pt.max(layout.space_before_pt)
        };
        state.y += pt_to_px(gap);

        // Split into runs of lines separated by inline page breaks.
        let mut segment: Vec<LineBox> = Vec::new();
        for piece in &layout.pieces {
            match *piece {
                Piece::Line(line) => segment.push(line),
                Piece::PageBreak { offset } => {
                    push_lines(&layout, pos, &segment, state);
                    segment.clear();
                    state.builder.push_break(pos + 1 + offset, state.y, ForcedBreak::Page);
                    state.keep_with_next = false;
                }
            }
        }
        push_lines(&layout, pos, &segment, state);

        state.prev_space_after_pt = layout.space_after_pt;
        state.prev_contextual_style = layout.contextual.then(|| para.style.clone());
        state.keep_with_next = layout.keep_next;
    }

    fn flow_nodes(
        &self,
        doc: &DocumentSnapshot,
        nodes: &[Node],
        markers: &ListMarkers,
        width_pt: f32,
    ) -> FlowState {
        let mut state = FlowState::new();
        for (span, node) in index_positions(nodes).into_iter().zip(nodes) {
            let pos = span.pos;
            match node {
                Node::Paragraph(para) => self.flow_paragraph(doc, para, pos, markers, width_pt, &mut state),
                Node::Table(t) => table::flow_table(self, doc, markers, t, pos, width_pt, &mut state),
                Node::Image(img) => {
                    state.take_gap();
                    let top = state.y;
                    let bottom = top + pt_to_px(img.height_pt);
                    let join = std::mem::take(&mut state.keep_with_next);
                    state
                        .builder
                        .push(pos, top, bottom, BreakInside::Avoid, FlowKind::Image, join);
                    state.y = bottom;
                }
                Node::Field(field) => {
                    state.take_gap();
                    let height_px = if field.height_px.is_finite() {
                        field.height_px.max(0.0)
                    } else {
                        f32::NAN
                    };
                    let join = std::mem::take(&mut state.keep_with_next);
                    state.builder.push_field(
                        MeasuredField {
                            pos,
                            node_size: span.node_size,
                            attrs: field.attrs.clone(),
                            rect: FieldRect {
                                top_px: state.y,
                                left_px: 0.0,
                                width_px: pt_to_px(width_pt),
                                height_px,
                            },
                        },
                        join,
                    );
                    if height_px.is_finite() {
                        state.y += height_px;
                    }
                }
                Node::PageBreak => {
                    state.builder.push_break(pos, state.y, ForcedBreak::Page);
                    state.reset_after_break();
                }
                Node::SectionBreak(sb) => {
                    state
                        .builder
                        .push_break(pos, state.y, ForcedBreak::Section(sb.break_type));
                    state.reset_after_break();
                }
            }
        }
        state
    }
}

/// Emit line blocks, chaining them per keepLines / widow control.
fn push_lines(layout: &ParagraphLayout, para_pos: u32, lines: &[LineBox], state: &mut FlowState) {
    let n = lines.len();
    for (j, line) in lines.iter().enumerate() {
        let join = if j == 0 {
            std::mem::take(&mut state.keep_with_next)
        } else if layout.keep_lines {
            true
        } else if layout.widow_control {
            // Two lines minimum at either end of the paragraph.
            n <= 3 || j == 1 || j == n - 1
        } else {
            false
        };
        let top = state.y;
        let bottom = top + pt_to_px(line.height_pt);
        state.builder.push(
            para_pos + 1 + line.offset,
            top,
            bottom,
            BreakInside::Avoid,
            FlowKind::Line,
            join,
        );
        state.y = bottom;
    }
}

impl MeasureSurface for TextFlowSurface {
    fn create_mount(&mut self) -> MountPoint {
        self.created_mounts += 1;
        MountPoint::new(format!("layout-mirror-{}", self.created_mounts))
    }

    fn attach(&mut self, mount: &MountPoint) {
        log::debug!("mirror attached to {}", mount.id);
        self.mount = Some(mount.clone());
        self.attached = true;
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn measure(
        &mut self,
        doc: &DocumentSnapshot,
        markers: &ListMarkers,
        page: &PageConstraints,
    ) -> Option<FlowedContent> {
        if !self.attached {
            log::debug!("measure requested before the mirror attached");
            return None;
        }
        let width_pt = page
            .content_width_px()
            .map(px_to_pt)
            .unwrap_or(DEFAULT_CONTENT_WIDTH_PT);
        let state = self.flow_nodes(doc, &doc.content, markers, width_pt);
        Some(state.builder.finish(state.y, doc.content_size()))
    }

    fn measure_fragment(
        &mut self,
        nodes: &[Node],
        context: &DocumentSnapshot,
        width_px: f32,
    ) -> Result<f32, Error> {
        if !(width_px.is_finite() && width_px > 0.0) {
            return Err(Error::Measurement(format!("unusable fragment width {width_px}")));
        }
        let state = self.flow_nodes(context, nodes, &ListMarkers::new(), px_to_pt(width_px));
        if !state.y.is_finite() {
            return Err(Error::Measurement("fragment height is not finite".to_string()));
        }
        Ok(state.y)
    }

    fn text_width_px(&self, text: &str, font_size_pt: f32, family: Option<&str>) -> f32 {
        pt_to_px(self.fonts.get(family, false, false).word_width(text, font_size_pt))
    }

    fn remove_mount(&mut self, mount: &MountPoint) {
        if self.mount.as_ref() == Some(mount) {
            self.mount = None;
            self.attached = false;
        }
        log::debug!("removed mirror mount {}", mount.id);
    }

    fn teardown(&mut self) {
        self.attached = false;
        self.mount = None;
    }
}
