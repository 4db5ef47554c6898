use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::header_footer::HeaderFooterDefinitions;
use crate::numbering::NumberingDefinitions;

/// An attribute that OOXML can leave unset, explicitly clear, or set.
///
/// `Absent` inherits from the paragraph style chain. `Null` stops inheritance
/// and falls back to the built-in default. `Value` wins outright.
#[derive(Clone, Debug, PartialEq)]
pub enum TriState<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for TriState<T> {
    fn default() -> Self {
        TriState::Absent
    }
}

impl<T> TriState<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, TriState::Absent)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TriState::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Clone> TriState<T> {
    pub fn or_inherit(&self, parent: &TriState<T>) -> TriState<T> {
        match self {
            TriState::Absent => parent.clone(),
            other => other.clone(),
        }
    }
}

impl<T: Copy> TriState<T> {
    pub fn resolve(&self, default: T) -> T {
        match self {
            TriState::Value(v) => *v,
            TriState::Absent | TriState::Null => default,
        }
    }
}

impl TriState<OnOff> {
    pub fn is_on(&self, default: bool) -> bool {
        self.resolve(OnOff(default)).0
    }
}

impl<T: Serialize> Serialize for TriState<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TriState::Value(v) => serializer.serialize_some(v),
            TriState::Absent | TriState::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for TriState<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Missing fields never reach here: `#[serde(default)]` yields Absent.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => TriState::Value(v),
            None => TriState::Null,
        })
    }
}

/// WML on/off value. Accepts booleans, numbers, and the string spellings
/// Word and its converters emit (`"true"`, `"0"`, `"off"` ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OnOff(pub bool);

impl Serialize for OnOff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.0)
    }
}

struct OnOffVisitor;

impl Visitor<'_> for OnOffVisitor {
    type Value = OnOff;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a boolean, 0/1, or an on/off string")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<OnOff, E> {
        Ok(OnOff(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<OnOff, E> {
        Ok(OnOff(v != 0))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<OnOff, E> {
        Ok(OnOff(v != 0))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<OnOff, E> {
        match v {
            "true" | "1" | "on" => Ok(OnOff(true)),
            "false" | "0" | "off" | "" => Ok(OnOff(false)),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for OnOff {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OnOffVisitor)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "camelCase")]
pub enum LineSpacing {
    Auto(f32),    // multiplier (e.g. 1.0 = single, 1.15 = default)
    Exact(f32),   // fixed height in points
    AtLeast(f32), // minimum height in points
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionBreakType {
    NextPage,
    Continuous,
    OddPage,
    EvenPage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberingRef {
    pub num_id: u32,
    #[serde(default)]
    pub level: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParagraphAttrs {
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub space_before_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub space_after_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub line_spacing: TriState<LineSpacing>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub indent_left_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub indent_right_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub indent_hanging_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub indent_first_line_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub font_size_pt: TriState<f32>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub font_family: TriState<String>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub keep_next: TriState<OnOff>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub keep_lines: TriState<OnOff>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub page_break_before: TriState<OnOff>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub widow_control: TriState<OnOff>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub contextual_spacing: TriState<OnOff>,
    #[serde(skip_serializing_if = "TriState::is_absent")]
    pub numbering: TriState<NumberingRef>,
}

impl ParagraphAttrs {
    /// Fill every absent attribute from `parent`.
    pub fn inherit(&self, parent: &ParagraphAttrs) -> ParagraphAttrs {
        ParagraphAttrs {
            space_before_pt: self.space_before_pt.or_inherit(&parent.space_before_pt),
            space_after_pt: self.space_after_pt.or_inherit(&parent.space_after_pt),
            line_spacing: self.line_spacing.or_inherit(&parent.line_spacing),
            indent_left_pt: self.indent_left_pt.or_inherit(&parent.indent_left_pt),
            indent_right_pt: self.indent_right_pt.or_inherit(&parent.indent_right_pt),
            indent_hanging_pt: self.indent_hanging_pt.or_inherit(&parent.indent_hanging_pt),
            indent_first_line_pt: self
                .indent_first_line_pt
                .or_inherit(&parent.indent_first_line_pt),
            font_size_pt: self.font_size_pt.or_inherit(&parent.font_size_pt),
            font_family: self.font_family.or_inherit(&parent.font_family),
            keep_next: self.keep_next.or_inherit(&parent.keep_next),
            keep_lines: self.keep_lines.or_inherit(&parent.keep_lines),
            page_break_before: self.page_break_before.or_inherit(&parent.page_break_before),
            widow_control: self.widow_control.or_inherit(&parent.widow_control),
            contextual_spacing: self.contextual_spacing.or_inherit(&parent.contextual_spacing),
            numbering: self.numbering.or_inherit(&parent.numbering),
        }
    }

    /// The list this paragraph belongs to. `numId` 0 removes numbering.
    pub fn list_ref(&self) -> Option<NumberingRef> {
        self.numbering.value().copied().filter(|r| r.num_id != 0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<String>,
    #[serde(default)]
    pub attrs: ParagraphAttrs,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub text: String,
    #[serde(default, skip_serializing_if = "TriState::is_absent")]
    pub bold: TriState<OnOff>,
    #[serde(default, skip_serializing_if = "TriState::is_absent")]
    pub italic: TriState<OnOff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size_pt: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

impl Run {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: TriState::Absent,
            italic: TriState::Absent,
            font_size_pt: None,
            font_family: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inline {
    Run(Run),
    Tab,
    LineBreak,
    PageBreak,
    Image(InlineImage),
}

impl Inline {
    fn size(&self) -> u32 {
        match self {
            Inline::Run(run) => run.text.chars().count() as u32,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub attrs: ParagraphAttrs,
    #[serde(default)]
    pub content: Vec<Inline>,
}

impl Paragraph {
    pub fn content_size(&self) -> u32 {
        self.content.iter().map(Inline::size).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CellMargins {
    pub top_pt: f32,
    pub left_pt: f32,
    pub bottom_pt: f32,
    pub right_pt: f32,
}

impl Default for CellMargins {
    fn default() -> Self {
        Self {
            top_pt: 0.0,
            left_pt: 5.4,
            bottom_pt: 0.0,
            right_pt: 5.4,
        }
    }
}

fn one() -> u16 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_pt: Option<f32>,
    #[serde(default = "one")]
    pub grid_span: u16,
    #[serde(default)]
    pub content: Vec<Paragraph>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_pt: Option<f32>,
    #[serde(default)]
    pub height_exact: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub col_widths_pt: Vec<f32>,
    #[serde(default)]
    pub cell_margins: CellMargins,
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// A document-anchored embedded region (e.g. an HTML block) whose height is
/// known to the host and which may be split visually across pages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
    pub height_px: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBreak {
    pub break_type: SectionBreakType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Paragraph(Paragraph),
    Table(Table),
    Image(Image),
    Field(Field),
    PageBreak,
    SectionBreak(SectionBreak),
}

impl Node {
    pub fn node_size(&self) -> u32 {
        match self {
            Node::Paragraph(p) => p.content_size() + 2,
            Node::Table(t) => {
                t.rows
                    .iter()
                    .map(|row| {
                        row.cells
                            .iter()
                            .map(|c| c.content.iter().map(|p| p.content_size() + 2).sum::<u32>() + 2)
                            .sum::<u32>()
                            + 2
                    })
                    .sum::<u32>()
                    + 2
            }
            Node::Image(_) | Node::Field(_) | Node::PageBreak | Node::SectionBreak(_) => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMargins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
    pub header: f32,
    pub footer: f32,
}

/// Page box as the document declares it, in inches.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStyle {
    pub width_in: f32,
    pub height_in: f32,
    pub margins: PageMargins,
}

impl Default for PageStyle {
    fn default() -> Self {
        // US Letter, 1in margins, 0.5in header/footer distance
        Self {
            width_in: 8.5,
            height_in: 11.0,
            margins: PageMargins {
                top: 1.0,
                right: 1.0,
                bottom: 1.0,
                left: 1.0,
                header: 0.5,
                footer: 0.5,
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_style: Option<PageStyle>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, ParagraphStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numbering: Option<NumberingDefinitions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_footers: Option<HeaderFooterDefinitions>,
    #[serde(default)]
    pub content: Vec<Node>,
}

const MAX_STYLE_DEPTH: usize = 16;

impl DocumentSnapshot {
    /// Paragraph attributes after walking the `basedOn` chain.
    pub fn effective_attrs(&self, para: &Paragraph) -> ParagraphAttrs {
        let mut attrs = para.attrs.clone();
        let mut next = para.style.as_deref();
        let mut depth = 0;
        while let Some(id) = next {
            if depth >= MAX_STYLE_DEPTH {
                log::debug!("style chain for {id:?} exceeds {MAX_STYLE_DEPTH} levels, truncating");
                break;
            }
            let Some(style) = self.styles.get(id) else {
                break;
            };
            attrs = attrs.inherit(&style.attrs);
            next = style.based_on.as_deref();
            depth += 1;
        }
        attrs
    }

    /// Content size of the whole document (positions run `0..=content_size`).
    pub fn content_size(&self) -> u32 {
        self.content.iter().map(Node::node_size).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeSpan {
    pub pos: u32,
    pub node_size: u32,
}

/// Positions of the top-level nodes, in document order.
pub fn index_positions(content: &[Node]) -> Vec<NodeSpan> {
    let mut pos = 0;
    content
        .iter()
        .map(|node| {
            let node_size = node.node_size();
            let span = NodeSpan { pos, node_size };
            pos += node_size;
            span
        })
        .collect()
}

/// Call `f(pos, paragraph)` for every paragraph in document order, including
/// paragraphs nested in table cells.
pub fn visit_paragraphs<'a>(content: &'a [Node], mut f: impl FnMut(u32, &'a Paragraph)) {
    let mut pos = 0;
    for node in content {
        match node {
            Node::Paragraph(p) => f(pos, p),
            Node::Table(t) => {
                let mut row_pos = pos + 1;
                for row in &t.rows {
                    let mut cell_pos = row_pos + 1;
                    for cell in &row.cells {
                        let mut para_pos = cell_pos + 1;
                        for p in &cell.content {
                            f(para_pos, p);
                            para_pos += p.content_size() + 2;
                        }
                        cell_pos = para_pos + 1;
                    }
                    row_pos = cell_pos + 1;
                }
            }
            _ => {}
        }
        pos += node.node_size();
    }
}
