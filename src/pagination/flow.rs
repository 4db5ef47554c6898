use crate::layout::FieldRect;
use crate::model::SectionBreakType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakInside {
    /// May be cut at any offset (fields).
    Auto,
    /// Atomic: lines, rows, images.
    Avoid,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ForcedBreak {
    Page,
    /// `w:pageBreakBefore`; a no-op when the paragraph already starts a page.
    BeforeParagraph,
    Section(SectionBreakType),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlowKind {
    Line,
    TableRow,
    Image,
    Field,
    Break(ForcedBreak),
}

/// One vertical slice of the flowed document.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowBlock {
    pub pos: u32,
    pub top: f32,
    pub bottom: f32,
    /// Blocks sharing a chain id should stay on one page. Non-decreasing in
    /// flow order.
    pub chain: u32,
    pub inside: BreakInside,
    pub kind: FlowKind,
}

impl FlowBlock {
    pub fn is_measured(&self) -> bool {
        self.top.is_finite() && self.bottom.is_finite()
    }

    pub fn forced_break(&self) -> Option<ForcedBreak> {
        match self.kind {
            FlowKind::Break(kind) => Some(kind),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeasuredField {
    pub pos: u32,
    pub node_size: u32,
    pub attrs: serde_json::Map<String, serde_json::Value>,
    /// Flow coordinates.
    pub rect: FieldRect,
}

/// A document laid out as one endless page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowedContent {
    pub blocks: Vec<FlowBlock>,
    pub fields: Vec<MeasuredField>,
    pub height_px: f32,
    pub end_pos: u32,
}

/// Appends blocks and hands out chain ids.
#[derive(Default)]
pub struct FlowBuilder {
    blocks: Vec<FlowBlock>,
    fields: Vec<MeasuredField>,
    next_chain: u32,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a block. With `join` it extends the chain of the previous block.
    pub fn push(&mut self, pos: u32, top: f32, bottom: f32, inside: BreakInside, kind: FlowKind, join: bool) {
        let chain = if join && !self.blocks.is_empty() {
            self.next_chain - 1
        } else {
            self.next_chain += 1;
            self.next_chain - 1
        };
        self.blocks.push(FlowBlock {
            pos,
            top,
            bottom,
            chain,
            inside,
            kind,
        });
    }

    pub fn push_break(&mut self, pos: u32, y: f32, kind: ForcedBreak) {
        self.push(pos, y, y, BreakInside::Avoid, FlowKind::Break(kind), false);
    }

    pub fn push_field(&mut self, field: MeasuredField, join: bool) {
        let top = field.rect.top_px;
        let bottom = top + field.rect.height_px;
        self.push(field.pos, top, bottom, BreakInside::Auto, FlowKind::Field, join);
        self.fields.push(field);
    }

    pub fn finish(self, height_px: f32, end_pos: u32) -> FlowedContent {
        FlowedContent {
            blocks: self.blocks,
            fields: self.fields,
            height_px,
            end_pos,
        }
    }
}
