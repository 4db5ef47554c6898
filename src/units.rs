use serde::{Deserialize, Serialize};

/// All layout geometry is expressed in CSS pixels at this resolution.
pub const DPI: f32 = 96.0;

const POINTS_PER_INCH: f32 = 72.0;
const TWIPS_PER_INCH: f32 = 1440.0;

pub fn inches_to_px(inches: f32) -> f32 {
    inches * DPI
}

pub fn pt_to_px(pt: f32) -> f32 {
    pt * DPI / POINTS_PER_INCH
}

pub fn px_to_pt(px: f32) -> f32 {
    px * POINTS_PER_INCH / DPI
}

/// Twentieths of a point, the unit of most WordprocessingML lengths.
pub fn twips_to_px(twips: f32) -> f32 {
    twips * DPI / TWIPS_PER_INCH
}

pub fn twips_to_inches(twips: f32) -> f32 {
    twips / TWIPS_PER_INCH
}

pub fn twips_to_pt(twips: f32) -> f32 {
    twips / 20.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Units {
    pub unit: String,
    pub dpi: f32,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            unit: "px".to_string(),
            dpi: DPI,
        }
    }
}
