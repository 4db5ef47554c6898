use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use ttf_parser::Face;

use crate::error::Error;

/// Advance widths and vertical metrics for one face.
#[derive(Clone, Debug)]
pub struct FontMetrics {
    /// WinAnsi chars 32..=255, in 1000-units.
    widths_1000: Vec<f32>,
    char_widths_1000: Option<HashMap<char, f32>>,
    pub line_h_ratio: Option<f32>,
    pub ascender_ratio: Option<f32>,
}

impl FontMetrics {
    pub fn helvetica() -> Self {
        Self {
            widths_1000: helvetica_widths(),
            char_widths_1000: None,
            line_h_ratio: None,
            ascender_ratio: None,
        }
    }

    /// Read metrics out of TrueType/OpenType data.
    pub fn from_font_data(data: &[u8], face_index: u32) -> Result<Self, Error> {
        let face = Face::parse(data, face_index).map_err(|e| Error::Font(format!("{e}")))?;
        let units = face.units_per_em() as f32;
        let width_of = |ch: char| {
            face.glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|adv| adv as f32 / units * 1000.0)
        };

        let widths_1000: Vec<f32> = (32u8..=255u8)
            .map(|b| width_of(winansi_to_char(b)).unwrap_or(0.0))
            .collect();

        // Outside WinAnsi only the common typographic ranges are worth a table.
        let mut char_widths = HashMap::new();
        for ch in ('\u{0100}'..='\u{024F}').chain('\u{2000}'..='\u{206F}').chain('\u{25A0}'..='\u{25FF}') {
            if let Some(w) = width_of(ch) {
                char_widths.insert(ch, w);
            }
        }

        let line_gap = face.line_gap() as f32;
        Ok(Self {
            widths_1000,
            char_widths_1000: Some(char_widths),
            line_h_ratio: Some((face.ascender() as f32 - face.descender() as f32 + line_gap) / units),
            ascender_ratio: Some(face.ascender() as f32 / units),
        })
    }

    pub fn load(path: &Path, face_index: u32) -> Result<Self, Error> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and dropped before returning.
        let data = unsafe { Mmap::map(&file)? };
        let t0 = std::time::Instant::now();
        let metrics = Self::from_font_data(&data, face_index)?;
        log::debug!(
            "loaded font metrics from {} in {:.1}ms",
            path.display(),
            t0.elapsed().as_secs_f64() * 1000.0
        );
        Ok(metrics)
    }

    pub fn char_width_1000(&self, ch: char) -> f32 {
        if let Some(map) = &self.char_widths_1000
            && let Some(&w) = map.get(&ch)
        {
            return w;
        }
        match char_to_winansi(ch) {
            0 if ch.is_control() => 0.0,
            // Unmapped glyph: an average lowercase advance.
            0 => self.widths_1000[(b'n' - 32) as usize],
            byte if byte >= 32 => self.widths_1000[(byte - 32) as usize],
            _ => 0.0,
        }
    }

    pub fn word_width(&self, word: &str, font_size: f32) -> f32 {
        word.chars()
            .map(|ch| self.char_width_1000(ch) * font_size / 1000.0)
            .sum()
    }

    pub fn space_width(&self, font_size: f32) -> f32 {
        self.char_width_1000(' ') * font_size / 1000.0
    }
}

/// Metrics by `(lowercase family, bold, italic)`, Helvetica for the rest.
pub struct FontBook {
    faces: HashMap<(String, bool, bool), FontMetrics>,
    fallback: FontMetrics,
}

impl Default for FontBook {
    fn default() -> Self {
        Self {
            faces: HashMap::new(),
            fallback: FontMetrics::helvetica(),
        }
    }
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, family: &str, bold: bool, italic: bool, metrics: FontMetrics) {
        self.faces
            .insert((primary_font_name(family).to_lowercase(), bold, italic), metrics);
    }

    pub fn register_file(&mut self, family: &str, path: &Path) -> Result<(), Error> {
        let file = File::open(path)?;
        // SAFETY: read-only mapping, dropped at the end of this call.
        let data = unsafe { Mmap::map(&file)? };
        let face = Face::parse(&data, 0).map_err(|e| Error::Font(format!("{}: {e}", path.display())))?;
        let (bold, italic) = (face.is_bold(), face.is_italic());
        let metrics = FontMetrics::from_font_data(&data, 0)?;
        log::debug!("registered {family} bold={bold} italic={italic} from {}", path.display());
        self.register(family, bold, italic, metrics);
        Ok(())
    }

    /// Tries each `;`-separated candidate, then the regular face of the first.
    pub fn get(&self, family: Option<&str>, bold: bool, italic: bool) -> &FontMetrics {
        let Some(family) = family else {
            return &self.fallback;
        };
        for candidate in family.split(';').map(str::trim) {
            if let Some(m) = self.faces.get(&(candidate.to_lowercase(), bold, italic)) {
                return m;
            }
        }
        self.faces
            .get(&(primary_font_name(family).to_lowercase(), false, false))
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

pub fn primary_font_name(name: &str) -> &str {
    name.split(';').next().unwrap_or(name).trim()
}

/// Windows-1252 (WinAnsi) byte to Unicode char mapping.
/// Bytes 0x80-0x9F are remapped; all others map directly to their Unicode codepoint.
fn winansi_to_char(byte: u8) -> char {
    match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        _ => byte as char,
    }
}

/// Map a single Unicode char to its WinAnsi byte, or 0 if unmappable.
fn char_to_winansi(c: char) -> u8 {
    match c as u32 {
        0x0020..=0x007F => c as u8,
        0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => 0,
    }
}

/// Approximate Helvetica widths at 1000 units/em for WinAnsi chars 32..=255.
fn helvetica_widths() -> Vec<f32> {
    (32u8..=255u8)
        .map(|b| match b {
            32 => 278.0,                          // space
            33..=47 => 333.0,                     // punctuation
            48..=57 => 556.0,                     // digits
            58..=64 => 333.0,                     // more punctuation
            73 | 74 => 278.0,                     // I J (narrow uppercase)
            77 => 833.0,                          // M (wide)
            65..=90 => 667.0,                     // uppercase A-Z (average)
            91..=96 => 333.0,                     // brackets etc.
            102 | 105 | 106 | 108 | 116 => 278.0, // narrow lowercase: f i j l t
            109 | 119 => 833.0,                   // m w (wide)
            97..=122 => 556.0,                    // lowercase a-z (average)
            _ => 556.0,
        })
        .collect()
}
