use crate::model::{DocumentSnapshot, Inline, Table};
use crate::numbering::ListMarkers;
use crate::units::pt_to_px;

use super::flow::{BreakInside, FlowKind};
use super::text_flow::{FlowState, TextFlowSurface};

fn grid_columns(table: &Table) -> usize {
    table
        .rows
        .iter()
        .map(|row| row.cells.iter().map(|c| c.grid_span.max(1) as usize).sum::<usize>())
        .max()
        .unwrap_or(0)
}

/// Auto-fit column widths so that the longest non-breakable word in each column
/// fits within the cell (including padding). Columns that need more space grow;
/// other columns shrink proportionally. Total width is preserved.
pub fn auto_fit_columns(
    surface: &TextFlowSurface,
    doc: &DocumentSnapshot,
    table: &Table,
    available_pt: f32,
) -> Vec<f32> {
    let mut widths = if table.col_widths_pt.is_empty() {
        let ncols = grid_columns(table);
        if ncols == 0 {
            return Vec::new();
        }
        vec![available_pt / ncols as f32; ncols]
    } else {
        table.col_widths_pt.clone()
    };
    let ncols = widths.len();
    let padding = table.cell_margins.left_pt + table.cell_margins.right_pt;

    let mut min_widths = vec![0.0f32; ncols];
    for row in &table.rows {
        let mut grid_col = 0usize;
        for cell in &row.cells {
            let span = cell.grid_span.max(1) as usize;
            if grid_col >= ncols || span > 1 {
                grid_col += span;
                continue;
            }
            for para in &cell.content {
                let attrs = doc.effective_attrs(para);
                for inline in &para.content {
                    let Inline::Run(run) = inline else {
                        continue;
                    };
                    let (metrics, size) = surface.run_metrics(run, &attrs);
                    for word in run.text.split_whitespace() {
                        let ww = metrics.word_width(word, size) + padding;
                        min_widths[grid_col] = min_widths[grid_col].max(ww);
                    }
                }
            }
            grid_col += span;
        }
    }

    let total: f32 = widths.iter().sum();

    // Expand columns that need it, track how much extra space is needed
    let mut extra_needed: f32 = 0.0;
    let mut shrinkable: f32 = 0.0;
    for (w, &min_w) in widths.iter_mut().zip(&min_widths) {
        if min_w > *w {
            extra_needed += min_w - *w;
            *w = min_w;
        } else {
            shrinkable += *w - min_w;
        }
    }

    if extra_needed > 0.0 && shrinkable > 0.0 {
        let factor = extra_needed.min(shrinkable) / shrinkable;
        for (w, &min_w) in widths.iter_mut().zip(&min_widths) {
            if *w > min_w {
                *w -= (*w - min_w) * factor;
            }
        }
        // Normalize to preserve total
        let new_total: f32 = widths.iter().sum();
        if new_total > 0.0 && (new_total - total).abs() > 0.01 {
            let scale = total / new_total;
            for w in &mut widths {
                *w *= scale;
            }
        }
    }

    widths
}

/// Emit one atomic block per row.
pub(super) fn flow_table(
    surface: &TextFlowSurface,
    doc: &DocumentSnapshot,
    markers: &ListMarkers,
    table: &Table,
    pos: u32,
    width_pt: f32,
    state: &mut FlowState,
) {
    let cm = &table.cell_margins;
    let col_widths = auto_fit_columns(surface, doc, table, width_pt);
    state.take_gap();

    let mut row_pos = pos + 1;
    for row in &table.rows {
        let mut cell_pos = row_pos + 1;
        let mut grid_col = 0usize;
        let mut content_h: f32 = 0.0;

        for cell in &row.cells {
            let span = cell.grid_span.max(1) as usize;
            let end = col_widths.len().min(grid_col + span);
            let col_w = col_widths
                .get(grid_col..end)
                .map(|cols| cols.iter().sum::<f32>())
                .unwrap_or(0.0)
                .max(cell.width_pt.unwrap_or(0.0));
            grid_col += span;
            let inner_w = (col_w - cm.left_pt - cm.right_pt).max(1.0);

            let mut para_pos = cell_pos + 1;
            let mut cell_h = 0.0f32;
            let mut prev_after = 0.0f32;
            for (k, para) in cell.content.iter().enumerate() {
                let layout = surface.layout_paragraph(doc, para, markers.get(&para_pos), inner_w);
                let gap = if k == 0 {
                    layout.space_before_pt
                } else {
                    prev_after.max(layout.space_before_pt)
                };
                cell_h += gap + layout.height_pt();
                prev_after = layout.space_after_pt;
                para_pos += para.content_size() + 2;
            }
            content_h = content_h.max(cell_h);
            cell_pos = para_pos + 1;
        }

        let natural = content_h + cm.top_pt + cm.bottom_pt;
        let height_pt = match (row.height_pt, row.height_exact) {
            (Some(h), true) => h,
            (Some(h), false) => natural.max(h),
            (None, _) => natural,
        };
        let top = state.y;
        let bottom = top + pt_to_px(height_pt);
        let join = std::mem::take(&mut state.keep_with_next);
        state
            .builder
            .push(row_pos, top, bottom, BreakInside::Avoid, FlowKind::TableRow, join);
        state.y = bottom;
        row_pos = cell_pos + 1;
    }
}
