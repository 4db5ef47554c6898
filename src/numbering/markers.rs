use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{DocumentSnapshot, visit_paragraphs};

use super::{LevelDefinition, NumId, NumberingCounterStore};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMarker {
    pub pos: u32,
    pub num_id: NumId,
    pub level: u8,
    pub value: u32,
    /// Counter of every level from 0 down to `level`, e.g. `[2, 3, 1]`.
    pub path: Vec<u32>,
    pub text: String,
    pub indent_left_pt: f32,
    pub indent_hanging_pt: f32,
}

/// Markers keyed by the position of the paragraph that carries them.
pub type ListMarkers = BTreeMap<u32, ListMarker>;

/// Number every list paragraph of `doc`, in document order.
///
/// The store is cleared first and left out of cache mode afterwards: counters
/// from a previous document version must never leak into this pass.
pub fn assign_list_markers(doc: &DocumentSnapshot, store: &mut NumberingCounterStore) -> ListMarkers {
    store.disable_cache();
    store.clear();

    let mut markers = ListMarkers::new();
    let Some(defs) = doc.numbering.as_ref() else {
        return markers;
    };

    store.enable_cache();
    visit_paragraphs(&doc.content, |pos, para| {
        let attrs = doc.effective_attrs(para);
        let Some(list) = attrs.list_ref() else {
            return;
        };
        let (Some(abstract_id), Some(levels)) = (defs.abstract_id(list.num_id), defs.levels(list.num_id))
        else {
            log::debug!("paragraph at {pos} references unknown numId {}", list.num_id);
            return;
        };
        let Some(def) = levels.get(&list.level) else {
            return;
        };

        for &lvl in levels.keys() {
            if !store.has_start_settings(list.num_id, lvl)
                && let Some(settings) = defs.start_settings(list.num_id, lvl)
            {
                store.set_start_settings(list.num_id, lvl, settings.start, settings.restart);
            }
        }

        let value = store.calculate_counter(list.num_id, list.level, pos, abstract_id);
        store.set_counter(list.num_id, list.level, pos, value, abstract_id);
        let mut path = store.get_ancestors_path(list.num_id, list.level, pos);
        path.push(value);

        markers.insert(
            pos,
            ListMarker {
                pos,
                num_id: list.num_id,
                level: list.level,
                value,
                text: render_label(def, &path, levels),
                path,
                indent_left_pt: def.indent_left_pt,
                indent_hanging_pt: def.indent_hanging_pt,
            },
        );
    });
    store.disable_cache();

    markers
}

/// Expand `lvlText` (`"%1.%2."`) with the counters in `path`.
pub fn render_label(def: &LevelDefinition, path: &[u32], levels: &BTreeMap<u8, LevelDefinition>) -> String {
    if def.num_fmt == "bullet" {
        let text = normalize_bullet_text(&def.lvl_text);
        return if text.is_empty() { "\u{2022}".to_string() } else { text };
    }

    let mut label = def.lvl_text.clone();
    for lvl_idx in 0..9u8 {
        let placeholder = format!("%{}", lvl_idx + 1);
        if !label.contains(&placeholder) {
            continue;
        }
        let lvl_def = levels.get(&lvl_idx);
        let counter = path
            .get(lvl_idx as usize)
            .copied()
            .unwrap_or_else(|| lvl_def.map(|d| d.start).unwrap_or(1));
        let fmt = lvl_def.map(|d| d.num_fmt.as_str()).unwrap_or("decimal");
        label = label.replace(&placeholder, &format_number(counter, fmt));
    }
    label
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut result = String::new();
    for &(value, numeral) in TABLE {
        while n >= value {
            result.push_str(numeral);
            n -= value;
        }
    }
    result
}

fn alphabetic(value: u32, base: u8) -> String {
    if value == 0 {
        return String::new();
    }
    let mut n = value - 1;
    let mut result = String::new();
    loop {
        result.insert(0, (base + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

pub fn format_number(value: u32, num_fmt: &str) -> String {
    match num_fmt {
        "decimal" => value.to_string(),
        "decimalZero" => format!("{value:02}"),
        "lowerLetter" => alphabetic(value, b'a'),
        "upperLetter" => alphabetic(value, b'A'),
        "lowerRoman" => to_roman(value),
        "upperRoman" => to_roman(value).to_uppercase(),
        "none" => String::new(),
        _ => value.to_string(),
    }
}

fn normalize_bullet_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if (0xF000..=0xF0FF).contains(&cp) {
                symbol_pua_to_unicode(cp).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// Symbol/Wingdings private-use code points that show up in `lvlText`.
fn symbol_pua_to_unicode(cp: u32) -> Option<char> {
    let sym = cp - 0xF000;
    let mapped = match sym {
        0xB7 => '\u{2022}',
        0xA7 => '\u{25A0}',
        0xA8 => '\u{25CB}',
        0xD8 => '\u{2666}',
        0x76 => '\u{221A}',
        _ => return char::from_u32(sym),
    };
    Some(mapped)
}
