#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::{fs, io};

use docxide_layout::Error;
use docxide_layout::header_footer::{HeaderFooterDefinitions, HeaderFooterKind, HeaderFooterSection, SlotRole};
use docxide_layout::model::{
    DocumentSnapshot, Field, Inline, Node, NumberingRef, PageMargins, PageStyle, Paragraph, ParagraphAttrs, Run,
    SectionBreak, SectionBreakType, TriState, index_positions,
};
use docxide_layout::layout::FieldRect;
use docxide_layout::numbering::ListMarkers;
use docxide_layout::pagination::{
    BreakInside, FlowBuilder, FlowKind, FlowedContent, ForcedBreak, MarginsPx, MeasuredField, PageConstraints,
};
use docxide_layout::surface::{MeasureSurface, MountPoint};
use docxide_layout::units::pt_to_px;

/// Height of one body paragraph under [`BlockSurface`].
pub const LINE_PX: f32 = 48.0;
/// Height of one header/footer paragraph under [`BlockSurface`].
pub const FRAGMENT_LINE_PX: f32 = 20.0;
pub const CHAR_PX: f32 = 7.0;

/// 8in x 10in with 1in margins and 0.5in header/footer distance:
/// 768 x 960 px, 768 px of body, room for 16 [`LINE_PX`] lines.
pub fn test_page_style() -> PageStyle {
    PageStyle {
        width_in: 8.0,
        height_in: 10.0,
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

/// A 1000 px page with 100 px margins and 50 px header/footer distance.
pub fn square_page() -> PageConstraints {
    PageConstraints {
        page_height_px: 1000.0,
        page_width_px: Some(800.0),
        margins: MarginsPx {
            top: 100.0,
            right: 100.0,
            bottom: 100.0,
            left: 100.0,
        },
        header_distance_px: 50.0,
        footer_distance_px: 50.0,
    }
}

pub fn para(text: &str) -> Paragraph {
    Paragraph {
        style: None,
        attrs: ParagraphAttrs::default(),
        content: vec![Inline::Run(Run::text(text))],
    }
}

pub fn p(text: &str) -> Node {
    Node::Paragraph(para(text))
}

pub fn list_item(text: &str, num_id: u32, level: u8) -> Node {
    let mut paragraph = para(text);
    paragraph.attrs.numbering = TriState::Value(NumberingRef { num_id, level });
    Node::Paragraph(paragraph)
}

pub fn field(height_px: f32) -> Node {
    Node::Field(Field {
        attrs: serde_json::Map::new(),
        height_px,
    })
}

pub fn section_break(break_type: SectionBreakType) -> Node {
    Node::SectionBreak(SectionBreak { break_type })
}

pub fn paragraphs(n: usize) -> Vec<Node> {
    (0..n).map(|i| p(&format!("paragraph {i}"))).collect()
}

pub fn doc(content: Vec<Node>) -> DocumentSnapshot {
    DocumentSnapshot {
        page_style: Some(test_page_style()),
        content,
        ..Default::default()
    }
}

pub fn hf_section(id: &str, role: SlotRole, kind: HeaderFooterKind, lines: usize) -> HeaderFooterSection {
    HeaderFooterSection {
        id: id.to_string(),
        section_id: None,
        role,
        kind,
        content: paragraphs(lines),
    }
}

pub fn header_footers(sections: Vec<HeaderFooterSection>) -> HeaderFooterDefinitions {
    HeaderFooterDefinitions {
        title_page: false,
        even_and_odd: false,
        sections,
    }
}

/// Independent atomic lines of `height` px, stacked from 0.
pub fn stacked_lines(count: usize, height: f32) -> FlowedContent {
    let mut builder = FlowBuilder::new();
    for i in 0..count {
        let top = i as f32 * height;
        builder.push(i as u32 * 10, top, top + height, BreakInside::Avoid, FlowKind::Line, false);
    }
    builder.finish(count as f32 * height, count as u32 * 10)
}

/// Calls made on a [`BlockSurface`], shared with the test after the surface
/// is boxed into an engine.
#[derive(Default)]
pub struct SurfaceLog {
    /// When false, `attach` records the mount but the surface stays detached.
    pub renderable: Cell<bool>,
    pub created: Cell<u32>,
    pub attaches: Cell<u32>,
    pub measures: Cell<u32>,
    pub fragments: Cell<u32>,
    pub removed: RefCell<Vec<String>>,
    pub teardowns: Cell<u32>,
}

impl SurfaceLog {
    pub fn new(renderable: bool) -> Rc<Self> {
        let log = Self::default();
        log.renderable.set(renderable);
        Rc::new(log)
    }
}

/// Deterministic geometry: every body paragraph is one [`LINE_PX`] line,
/// header/footer paragraphs are [`FRAGMENT_LINE_PX`], fields keep their
/// declared height. A header/footer field with no finite height fails to
/// measure.
pub struct BlockSurface {
    pub log: Rc<SurfaceLog>,
    attached: bool,
}

impl BlockSurface {
    pub fn new(log: Rc<SurfaceLog>) -> Self {
        Self { log, attached: false }
    }
}

impl MeasureSurface for BlockSurface {
    fn create_mount(&mut self) -> MountPoint {
        self.log.created.set(self.log.created.get() + 1);
        MountPoint::new(format!("block-mirror-{}", self.log.created.get()))
    }

    fn attach(&mut self, _mount: &MountPoint) {
        self.log.attaches.set(self.log.attaches.get() + 1);
        if self.log.renderable.get() {
            self.attached = true;
        }
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn measure(
        &mut self,
        doc: &DocumentSnapshot,
        _markers: &ListMarkers,
        _page: &PageConstraints,
    ) -> Option<FlowedContent> {
        if !self.attached {
            return None;
        }
        self.log.measures.set(self.log.measures.get() + 1);
        let mut builder = FlowBuilder::new();
        let mut y = 0.0f32;
        for (span, node) in index_positions(&doc.content).into_iter().zip(&doc.content) {
            match node {
                Node::Paragraph(_) | Node::Table(_) => {
                    builder.push(span.pos + 1, y, y + LINE_PX, BreakInside::Avoid, FlowKind::Line, false);
                    y += LINE_PX;
                }
                Node::Image(img) => {
                    let h = pt_to_px(img.height_pt);
                    builder.push(span.pos, y, y + h, BreakInside::Avoid, FlowKind::Image, false);
                    y += h;
                }
                Node::Field(f) => {
                    builder.push_field(
                        MeasuredField {
                            pos: span.pos,
                            node_size: span.node_size,
                            attrs: f.attrs.clone(),
                            rect: FieldRect {
                                top_px: y,
                                left_px: 0.0,
                                width_px: 576.0,
                                height_px: f.height_px,
                            },
                        },
                        false,
                    );
                    if f.height_px.is_finite() {
                        y += f.height_px;
                    }
                }
                Node::PageBreak => builder.push_break(span.pos, y, ForcedBreak::Page),
                Node::SectionBreak(sb) => builder.push_break(span.pos, y, ForcedBreak::Section(sb.break_type)),
            }
        }
        Some(builder.finish(y, doc.content_size()))
    }

    fn measure_fragment(
        &mut self,
        nodes: &[Node],
        _context: &DocumentSnapshot,
        _width_px: f32,
    ) -> Result<f32, Error> {
        self.log.fragments.set(self.log.fragments.get() + 1);
        let mut height = 0.0;
        for node in nodes {
            match node {
                Node::Field(f) if !f.height_px.is_finite() => {
                    return Err(Error::Measurement("field has no height".to_string()));
                }
                Node::Field(f) => height += f.height_px,
                _ => height += FRAGMENT_LINE_PX,
            }
        }
        Ok(height)
    }

    fn text_width_px(&self, text: &str, _font_size_pt: f32, _family: Option<&str>) -> f32 {
        text.chars().count() as f32 * CHAR_PX
    }

    fn remove_mount(&mut self, mount: &MountPoint) {
        self.log.removed.borrow_mut().push(mount.id.clone());
    }

    fn teardown(&mut self) {
        self.log.teardowns.set(self.log.teardowns.get() + 1);
        self.attached = false;
    }
}

pub fn assert_close(actual: f32, expected: f32, what: &str) {
    assert!(
        (actual - expected).abs() < 0.01,
        "{what}: expected {expected}, got {actual}"
    );
}

fn load_skiplist() -> HashSet<String> {
    let path = Path::new("tests/fixtures/SKIPLIST");
    let Ok(content) = fs::read_to_string(path) else {
        return HashSet::new();
    };
    content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect()
}

pub fn group_name(fixture: &Path) -> String {
    fixture
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

/// Display name for tables: group/case
pub fn display_name(fixture: &Path) -> String {
    let case = fixture.file_name().unwrap().to_string_lossy();
    format!("{}/{}", group_name(fixture), case)
}

/// Discover fixtures. Filter with DOCXIDE_CASE (case name) and DOCXIDE_GROUP (folder name).
pub fn discover_fixtures() -> io::Result<Vec<PathBuf>> {
    let fixtures_dir = Path::new("tests/fixtures");
    let case_filter = std::env::var("DOCXIDE_CASE").ok();
    let group_filter = std::env::var("DOCXIDE_GROUP").ok();
    let skiplist = load_skiplist();
    let mut fixtures: Vec<PathBuf> = Vec::new();
    for group_entry in fs::read_dir(fixtures_dir)? {
        let group = group_entry?.path();
        if !group.is_dir() {
            continue;
        }
        let gname = group.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if let Some(ref gf) = group_filter
            && gname != gf.as_str()
        {
            continue;
        }
        for entry in fs::read_dir(&group)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if let Some(ref filter) = case_filter {
                if name == filter.as_str() {
                    fixtures.push(path);
                }
            } else if !skiplist.contains(name) && !skiplist.contains(gname) {
                fixtures.push(path);
            }
        }
    }
    fixtures.sort();
    Ok(fixtures)
}
