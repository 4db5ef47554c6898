//! Projects measured fields onto pages as page-clipped segments.

use crate::layout::{FieldSegment, FieldSegmentPart, Page};
use crate::pagination::MeasuredField;

/// One segment per page a field overlaps, in page order.
///
/// Page `i` owns the flow range `[break.startOffsetPx, break.endOffsetPx)`.
/// Segment tops are relative to the page's content origin; absolute values
/// are in the stacked-pages view (`pageTopOffsetPx` + content start).
pub fn project_field_segments(fields: &[MeasuredField], pages: &[Page]) -> Vec<FieldSegment> {
    fields
        .iter()
        .filter_map(|field| {
            let top = field.rect.top_px;
            let bottom = top + field.rect.height_px;
            if !(top.is_finite() && bottom.is_finite()) {
                log::debug!("field at {} has no measured geometry", field.pos);
                return None;
            }
            let segments = pages
                .iter()
                .filter_map(|page| segment_on_page(page, top, bottom))
                .collect();
            Some(FieldSegment {
                pos: field.pos,
                node_size: field.node_size,
                attrs: field.attrs.clone(),
                rect: field.rect.clone(),
                segments,
            })
        })
        .collect()
}

fn segment_on_page(page: &Page, field_top: f32, field_bottom: f32) -> Option<FieldSegmentPart> {
    let start = page.break_info.start_offset_px;
    let end = page.break_info.end_offset_px;
    let top = field_top.max(start);
    let bottom = field_bottom.min(end);
    if bottom - top <= 0.0 {
        return None;
    }
    let origin = page.page_top_offset_px + page.content_area.start_px;
    Some(FieldSegmentPart {
        page_index: page.page_index,
        absolute_top_px: origin + (top - start),
        absolute_bottom_px: origin + (bottom - start),
        top_px: top - start,
        bottom_px: bottom - start,
        height_px: bottom - top,
        offset_within_field_px: top - field_top,
    })
}
