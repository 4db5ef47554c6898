use std::collections::BTreeMap;
use std::io::{Read, Seek};

use crate::model::TriState;
use crate::numbering::{AbstractNumbering, LevelDefinition, NumberingDefinitions, NumberingInstance};
use crate::units::twips_to_pt;

use super::{WML_NS, read_zip_text, twips_attr, wml, wml_attr};

fn parse_level(lvl: roxmltree::Node) -> LevelDefinition {
    let num_fmt = wml_attr(lvl, "numFmt").unwrap_or("bullet").to_string();
    let lvl_text = wml_attr(lvl, "lvlText").unwrap_or("").to_string();
    let start = wml_attr(lvl, "start")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1);
    let restart = match wml(lvl, "lvlRestart") {
        None => TriState::Absent,
        Some(node) => match node.attribute((WML_NS, "val")).and_then(|v| v.parse::<u8>().ok()) {
            Some(v) => TriState::Value(v),
            None => TriState::Null,
        },
    };
    let ind = wml(lvl, "pPr").and_then(|ppr| wml(ppr, "ind"));
    let indent_left_pt = ind
        .and_then(|n| twips_attr(n, "left").or_else(|| twips_attr(n, "start")))
        .map(twips_to_pt)
        .unwrap_or(0.0);
    let indent_hanging_pt = ind
        .and_then(|n| twips_attr(n, "hanging"))
        .map(twips_to_pt)
        .unwrap_or(0.0);
    LevelDefinition {
        start,
        restart,
        num_fmt,
        lvl_text,
        indent_left_pt,
        indent_hanging_pt,
    }
}

pub(super) fn parse_numbering<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> NumberingDefinitions {
    let mut definitions = NumberingDefinitions::default();

    let Some(xml_content) = read_zip_text(zip, "word/numbering.xml") else {
        return definitions;
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        log::warn!("word/numbering.xml is not well-formed, ignoring lists");
        return definitions;
    };

    for node in xml.root_element().children() {
        if node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "abstractNum" => {
                let Some(abs_id) = node
                    .attribute((WML_NS, "abstractNumId"))
                    .and_then(|v| v.parse::<u32>().ok())
                else {
                    continue;
                };
                let mut levels = BTreeMap::new();
                for lvl in node.children() {
                    if lvl.tag_name().name() != "lvl" || lvl.tag_name().namespace() != Some(WML_NS) {
                        continue;
                    }
                    let Some(ilvl) = lvl
                        .attribute((WML_NS, "ilvl"))
                        .and_then(|v| v.parse::<u8>().ok())
                    else {
                        continue;
                    };
                    levels.insert(ilvl, parse_level(lvl));
                }
                definitions.abstracts.insert(abs_id, AbstractNumbering { levels });
            }
            "num" => {
                let Some(num_id) = node
                    .attribute((WML_NS, "numId"))
                    .and_then(|v| v.parse::<u32>().ok())
                else {
                    continue;
                };
                let Some(abstract_id) = wml_attr(node, "abstractNumId").and_then(|v| v.parse::<u32>().ok()) else {
                    continue;
                };
                let start_overrides = node
                    .children()
                    .filter(|n| n.tag_name().name() == "lvlOverride" && n.tag_name().namespace() == Some(WML_NS))
                    .filter_map(|ovr| {
                        let ilvl = ovr.attribute((WML_NS, "ilvl"))?.parse::<u8>().ok()?;
                        let start = wml_attr(ovr, "startOverride")?.parse::<u32>().ok()?;
                        Some((ilvl, start))
                    })
                    .collect();
                definitions.instances.insert(
                    num_id,
                    NumberingInstance {
                        abstract_id,
                        start_overrides,
                    },
                );
            }
            _ => {}
        }
    }

    definitions
}
