//! Host-side defaults read from a DOCX package: the final section's page box
//! and header/footer parts, `evenAndOddHeaders`, and list definitions.

mod numbering;

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

use crate::error::Error;
use crate::header_footer::{HeaderFooterDefinitions, HeaderFooterKind, HeaderFooterSection, SlotRole};
use crate::model::{
    DocumentSnapshot, Inline, Node, NumberingRef, OnOff, PageMargins, PageStyle, Paragraph, ParagraphAttrs, Run,
    TriState,
};
use crate::numbering::NumberingDefinitions;
use crate::units::{twips_to_inches, twips_to_pt};

pub(super) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(super) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WML_NS))
}

pub(super) fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

pub(super) fn wml_bool(parent: roxmltree::Node, name: &str) -> Option<bool> {
    wml(parent, name).map(|n| {
        n.attribute((WML_NS, "val"))
            .is_none_or(|v| v != "0" && v != "false" && v != "off")
    })
}

pub(super) fn twips_attr(node: roxmltree::Node, attr: &str) -> Option<f32> {
    node.attribute((WML_NS, attr)).and_then(|v| v.parse::<f32>().ok())
}

fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

fn read_zip_text<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut content = String::new();
    zip.by_name(name).ok()?.read_to_string(&mut content).ok()?;
    Some(content)
}

/// Everything the engine takes from the package rather than from the live
/// document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackageDefaults {
    pub page_style: PageStyle,
    pub numbering: NumberingDefinitions,
    pub header_footers: HeaderFooterDefinitions,
}

impl PackageDefaults {
    /// Fill the parts of `doc` it leaves unset.
    pub fn apply_to(&self, doc: &mut DocumentSnapshot) {
        if doc.page_style.is_none() {
            doc.page_style = Some(self.page_style);
        }
        if doc.numbering.is_none() && !self.numbering.instances.is_empty() {
            doc.numbering = Some(self.numbering.clone());
        }
        if doc.header_footers.is_none() && !self.header_footers.sections.is_empty() {
            doc.header_footers = Some(self.header_footers.clone());
        }
    }
}

pub fn read_package_defaults(path: &Path) -> Result<PackageDefaults, Error> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", e, path.display()),
        )),
        _ => Error::Io(e),
    })?;
    read_package(file)
}

pub fn read_package_defaults_bytes(data: &[u8]) -> Result<PackageDefaults, Error> {
    read_package(std::io::Cursor::new(data))
}

fn read_package<R: Read + Seek>(reader: R) -> Result<PackageDefaults, Error> {
    let mut zip =
        zip::ZipArchive::new(reader).map_err(|_| Error::InvalidDocx("file is not a ZIP archive".into()))?;

    let numbering = numbering::parse_numbering(&mut zip);
    let rels = parse_relationships(&mut zip);
    let even_and_odd = parse_even_and_odd(&mut zip);

    let mut xml_content = String::new();
    zip.by_name("word/document.xml")
        .map_err(|_| Error::InvalidDocx("missing word/document.xml (is this a DOCX file?)".into()))?
        .read_to_string(&mut xml_content)?;

    let xml = roxmltree::Document::parse(&xml_content)?;
    let body = wml(xml.root_element(), "body").ok_or_else(|| Error::InvalidDocx("missing w:body".into()))?;

    // The body-level sectPr describes the last (usually only) section.
    let (page_style, mut header_footers) = match body.children().filter(|n| is_wml(*n, "sectPr")).last() {
        Some(sect) => parse_section_properties(sect, &rels, &mut zip),
        None => {
            log::debug!("document has no body sectPr, using default page style");
            (PageStyle::default(), HeaderFooterDefinitions::default())
        }
    };
    header_footers.even_and_odd = even_and_odd;

    log::debug!(
        "package defaults: {:.2}x{:.2}in, {} list instances, {} header/footer parts",
        page_style.width_in,
        page_style.height_in,
        numbering.instances.len(),
        header_footers.sections.len()
    );
    Ok(PackageDefaults {
        page_style,
        numbering,
        header_footers,
    })
}

fn parse_even_and_odd<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> bool {
    let Some(xml_content) = read_zip_text(zip, "word/settings.xml") else {
        return false;
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        log::warn!("word/settings.xml is not well-formed, ignoring");
        return false;
    };
    wml_bool(xml.root_element(), "evenAndOddHeaders").unwrap_or(false)
}

fn inches_attr(node: Option<roxmltree::Node>, attr: &str, default: f32) -> f32 {
    node.and_then(|n| twips_attr(n, attr))
        .map(twips_to_inches)
        .unwrap_or(default)
}

fn parse_section_properties<R: Read + Seek>(
    sect_node: roxmltree::Node,
    rels: &HashMap<String, String>,
    zip: &mut zip::ZipArchive<R>,
) -> (PageStyle, HeaderFooterDefinitions) {
    let pg_sz = wml(sect_node, "pgSz");
    let pg_mar = wml(sect_node, "pgMar");
    let defaults = PageStyle::default();
    let page_style = PageStyle {
        width_in: inches_attr(pg_sz, "w", defaults.width_in),
        height_in: inches_attr(pg_sz, "h", defaults.height_in),
        margins: PageMargins {
            top: inches_attr(pg_mar, "top", defaults.margins.top),
            right: inches_attr(pg_mar, "right", defaults.margins.right),
            bottom: inches_attr(pg_mar, "bottom", defaults.margins.bottom),
            left: inches_attr(pg_mar, "left", defaults.margins.left),
            header: inches_attr(pg_mar, "header", defaults.margins.header),
            footer: inches_attr(pg_mar, "footer", defaults.margins.footer),
        },
    };

    let mut definitions = HeaderFooterDefinitions {
        title_page: wml_bool(sect_node, "titlePg").unwrap_or(false),
        even_and_odd: false,
        sections: Vec::new(),
    };

    for child in sect_node.children() {
        let role = match child.tag_name().name() {
            "headerReference" => SlotRole::Header,
            "footerReference" => SlotRole::Footer,
            _ => continue,
        };
        let kind = match child.attribute((WML_NS, "type")).unwrap_or("default") {
            "first" => HeaderFooterKind::First,
            "even" => HeaderFooterKind::Even,
            _ => HeaderFooterKind::Default,
        };
        let Some(target) = child.attribute((REL_NS, "id")).and_then(|rid| rels.get(rid)) else {
            log::debug!("{role:?} reference without a resolvable relationship");
            continue;
        };
        let zip_path = target
            .strip_prefix('/')
            .map(String::from)
            .unwrap_or_else(|| format!("word/{}", target));
        let Some(xml_text) = read_zip_text(zip, &zip_path) else {
            log::warn!("{role:?} part {zip_path} is missing from the package");
            continue;
        };
        let content = match parse_header_footer_xml(&xml_text) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("failed to parse {zip_path}: {e}");
                continue;
            }
        };
        let id = zip_path
            .rsplit_once('/')
            .map(|(_, file)| file)
            .unwrap_or(&zip_path)
            .trim_end_matches(".xml")
            .to_string();
        definitions.sections.push(HeaderFooterSection {
            id,
            section_id: None,
            role,
            kind,
            content,
        });
    }

    (page_style, definitions)
}

fn collect_block_nodes<'a>(parent: roxmltree::Node<'a, 'a>) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(collect_block_nodes(content));
            }
        } else {
            nodes.push(child);
        }
    }
    nodes
}

/// A header or footer part as plain paragraphs.
fn parse_header_footer_xml(xml_content: &str) -> Result<Vec<Node>, Error> {
    let xml = roxmltree::Document::parse(xml_content)?;
    let mut content = Vec::new();
    for node in collect_block_nodes(xml.root_element()) {
        if is_wml(node, "p") {
            content.push(Node::Paragraph(parse_paragraph(node)));
        } else if is_wml(node, "tbl") {
            // Tables in headers are flattened: each cell paragraph stacks.
            for p in node.descendants().filter(|n| is_wml(*n, "p")) {
                content.push(Node::Paragraph(parse_paragraph(p)));
            }
        }
    }
    Ok(content)
}

fn parse_paragraph(node: roxmltree::Node) -> Paragraph {
    let ppr = wml(node, "pPr");
    let mut attrs = ParagraphAttrs::default();
    if let Some(spacing) = ppr.and_then(|n| wml(n, "spacing")) {
        if let Some(before) = twips_attr(spacing, "before") {
            attrs.space_before_pt = TriState::Value(twips_to_pt(before));
        }
        if let Some(after) = twips_attr(spacing, "after") {
            attrs.space_after_pt = TriState::Value(twips_to_pt(after));
        }
    }
    if let Some(ind) = ppr.and_then(|n| wml(n, "ind")) {
        if let Some(left) = twips_attr(ind, "left").or_else(|| twips_attr(ind, "start")) {
            attrs.indent_left_pt = TriState::Value(twips_to_pt(left));
        }
        if let Some(right) = twips_attr(ind, "right").or_else(|| twips_attr(ind, "end")) {
            attrs.indent_right_pt = TriState::Value(twips_to_pt(right));
        }
    }
    if let Some(num_pr) = ppr.and_then(|n| wml(n, "numPr"))
        && let Some(num_id) = wml_attr(num_pr, "numId").and_then(|v| v.parse::<u32>().ok())
    {
        let level = wml_attr(num_pr, "ilvl")
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0);
        attrs.numbering = TriState::Value(NumberingRef { num_id, level });
    }

    let mut content = Vec::new();
    for run in node.descendants().filter(|n| is_wml(*n, "r")) {
        let rpr = wml(run, "rPr");
        let font_size_pt = rpr
            .and_then(|n| wml_attr(n, "sz"))
            .and_then(|v| v.parse::<f32>().ok())
            .map(|hp| hp / 2.0);
        let font_family = rpr
            .and_then(|n| wml(n, "rFonts"))
            .and_then(|n| n.attribute((WML_NS, "ascii")))
            .map(str::to_string);
        let on_off = |name: &str| match rpr.and_then(|n| wml_bool(n, name)) {
            Some(v) => TriState::Value(OnOff(v)),
            None => TriState::Absent,
        };
        let (bold, italic) = (on_off("b"), on_off("i"));

        for child in run.children() {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match child.tag_name().name() {
                "t" => {
                    let text = child.text().unwrap_or("");
                    if text.is_empty() {
                        continue;
                    }
                    content.push(Inline::Run(Run {
                        text: text.to_string(),
                        bold: bold.clone(),
                        italic: italic.clone(),
                        font_size_pt,
                        font_family: font_family.clone(),
                    }));
                }
                "tab" => content.push(Inline::Tab),
                "br" => match child.attribute((WML_NS, "type")) {
                    Some("page") => content.push(Inline::PageBreak),
                    _ => content.push(Inline::LineBreak),
                },
                _ => {}
            }
        }
    }

    Paragraph {
        style: ppr.and_then(|n| wml_attr(n, "pStyle")).map(str::to_string),
        attrs,
        content,
    }
}

fn parse_rels_xml(xml_content: &str) -> HashMap<String, String> {
    let mut rels = HashMap::new();
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        return rels;
    };
    for node in xml.root_element().children() {
        if node.tag_name().name() == "Relationship"
            && let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target"))
        {
            rels.insert(id.to_string(), target.to_string());
        }
    }
    rels
}

fn parse_relationships<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> HashMap<String, String> {
    let Some(xml_content) = read_zip_text(zip, "word/_rels/document.xml.rels") else {
        return HashMap::new();
    };
    parse_rels_xml(&xml_content)
}
