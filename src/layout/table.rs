//! Table layout
//!
//! Column widths come from two passes: every column is measured for its
//! natural width (widest unwrapped cell) and minimum width (widest word),
//! then the naturals are scaled to fill the content width. Columns that
//! would shrink below their minimum are pinned there and the rest share
//! what is left. Rows are atomic; the header row repeats on every page the
//! table spans.

use crate::assets::{FontHandle, Shaper};
use crate::error::LayoutError;
use crate::model::TableBlock;
use crate::theme::{TableStyle, TextStyle, Theme};

use super::text::{LineBreaker, ShapedLine};
use super::tree::{PlacedPrimitive, Rule};
use super::{place_line, LineBox, Paginator, Resolver};

const EPSILON: f64 = 1e-9;

/// Final column widths for `natural` and `minimum` widths within `available`.
///
/// When even the minimums do not fit, the minimums are returned and the
/// table overflows the content area.
pub fn column_widths(natural: &[f64], minimum: &[f64], available: f64) -> Vec<f64> {
    let count = natural.len();
    if count == 0 {
        return Vec::new();
    }
    let min_total: f64 = minimum.iter().sum();
    if min_total >= available {
        return minimum.to_vec();
    }
    if natural.iter().sum::<f64>() <= EPSILON {
        return vec![available / count as f64; count];
    }

    let mut pinned = vec![false; count];
    loop {
        let pinned_width: f64 = (0..count).filter(|&i| pinned[i]).map(|i| minimum[i]).sum();
        let free: Vec<usize> = (0..count).filter(|&i| !pinned[i]).collect();
        if free.is_empty() {
            return minimum.to_vec();
        }
        let remaining = available - pinned_width;
        let free_natural: f64 = free.iter().map(|&i| natural[i]).sum();

        if free_natural <= EPSILON {
            let share = remaining / free.len() as f64;
            return (0..count)
                .map(|i| if pinned[i] { minimum[i] } else { share })
                .collect();
        }

        let scale = remaining / free_natural;
        let mut changed = false;
        for &i in &free {
            if natural[i] * scale < minimum[i] - EPSILON {
                pinned[i] = true;
                changed = true;
            }
        }
        if !changed {
            return (0..count)
                .map(|i| if pinned[i] { minimum[i] } else { natural[i] * scale })
                .collect();
        }
    }
}

/// Natural and minimum width of one cell's text, without padding
fn measure_cell(shaper: &Shaper<'_>, size: f64, text: &str) -> (f64, f64) {
    let natural = text
        .split('\n')
        .map(|paragraph| {
            let collapsed = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
            shaper.measure(&collapsed, size)
        })
        .fold(0.0, f64::max);
    let minimum = text
        .split_whitespace()
        .map(|word| shaper.measure(word, size))
        .fold(0.0, f64::max);
    (natural, minimum)
}

struct CellFont<'t> {
    style: &'t TextStyle,
    font: FontHandle,
}

impl<'t> CellFont<'t> {
    fn resolve(theme: &'t Theme, style: &str, resolver: &Resolver<'_>) -> Result<Self, LayoutError> {
        let style = theme.style(style)?;
        let font = resolver.font(&style.font)?;
        Ok(Self { style, font })
    }
}

struct LaidRow<'t> {
    cells: Vec<Vec<ShapedLine>>,
    height: f64,
    cell_font: &'t CellFont<'t>,
}

fn shaper_of(font: &FontHandle) -> Result<Shaper<'_>, LayoutError> {
    font.shaper().map_err(|reason| LayoutError::UnusableFont {
        name: font.name().to_string(),
        reason,
    })
}

fn lay_row<'t>(
    cells: &[String],
    widths: &[f64],
    cell_font: &'t CellFont<'t>,
    shaper: &Shaper<'_>,
    padding: f64,
) -> LaidRow<'t> {
    let size = cell_font.style.size;
    let cells: Vec<Vec<ShapedLine>> = cells
        .iter()
        .zip(widths)
        .map(|(text, width)| {
            let inner = (width - 2.0 * padding).max(size / 1000.0);
            LineBreaker::new(shaper, size, inner).break_text(text)
        })
        .collect();
    let max_lines = cells.iter().map(Vec::len).max().unwrap_or(1);
    LaidRow {
        height: max_lines as f64 * cell_font.style.line_pitch() + 2.0 * padding,
        cells,
        cell_font,
    }
}

/// Lay out a table block at the paginator's cursor
pub(super) fn place_table(
    paginator: &mut Paginator,
    block: &TableBlock,
    theme: &Theme,
    resolver: &Resolver<'_>,
) -> Result<(), LayoutError> {
    let column_count = block.columns.len();
    if column_count == 0 {
        return Err(LayoutError::EmptyTable);
    }
    for (index, row) in block.rows.iter().enumerate() {
        if row.len() != column_count {
            return Err(LayoutError::RaggedTable {
                row: index,
                found: row.len(),
                expected: column_count,
            });
        }
    }

    let table_style = theme.table;
    let padding = table_style.cell_padding;
    let cell_font = CellFont::resolve(theme, &block.cell_style, resolver)?;
    let header_font = CellFont::resolve(theme, &block.header_style, resolver)?;
    let cell_shaper = shaper_of(&cell_font.font)?;
    let header_shaper = shaper_of(&header_font.font)?;

    // pass 1: natural and minimum widths
    let mut natural = vec![2.0 * padding; column_count];
    let mut minimum = vec![2.0 * padding; column_count];
    let mut measure = |shaper: &Shaper<'_>, size: f64, row: &[String]| {
        for (column, text) in row.iter().enumerate() {
            let (nat, min) = measure_cell(shaper, size, text);
            natural[column] = natural[column].max(nat + 2.0 * padding);
            minimum[column] = minimum[column].max(min + 2.0 * padding);
        }
    };
    if block.show_header {
        measure(&header_shaper, header_font.style.size, &block.columns);
    }
    for row in &block.rows {
        measure(&cell_shaper, cell_font.style.size, row);
    }

    // pass 2: fit to the content width
    let content = paginator.content();
    let widths = column_widths(&natural, &minimum, content.width);

    let header = block
        .show_header
        .then(|| lay_row(&block.columns, &widths, &header_font, &header_shaper, padding));
    let rows: Vec<LaidRow<'_>> = block
        .rows
        .iter()
        .map(|row| lay_row(row, &widths, &cell_font, &cell_shaper, padding))
        .collect();

    paginator.space(table_style.space_before);

    let first_height = header.as_ref().map_or(0.0, |h| h.height)
        + rows.first().map_or(0.0, |r| r.height);
    paginator.ensure(first_height)?;

    let mut segment_open = false;
    if let Some(header) = &header {
        emit_row(paginator, header, &widths, &table_style);
        segment_open = true;
    }

    for row in &rows {
        if !paginator.fits(row.height) && !paginator.at_top() {
            if segment_open {
                close_segment(paginator, &widths, &table_style);
            }
            paginator.new_page()?;
            if let Some(header) = &header {
                emit_row(paginator, header, &widths, &table_style);
            }
        }
        emit_row(paginator, row, &widths, &table_style);
        segment_open = true;
    }

    if segment_open {
        close_segment(paginator, &widths, &table_style);
    }
    paginator.space(table_style.space_after);
    Ok(())
}

fn emit_row(paginator: &mut Paginator, row: &LaidRow<'_>, widths: &[f64], style: &TableStyle) {
    let content = paginator.content();
    let top = paginator.cursor();
    let total: f64 = widths.iter().sum();
    let padding = style.cell_padding;
    let text_style = row.cell_font.style;

    if style.border_width > 0.0 {
        paginator.push(PlacedPrimitive::Rule(Rule::horizontal(
            content.x,
            top,
            total,
            style.border_width,
            style.border_color,
        )));
        let mut x = content.x;
        for width in std::iter::once(&0.0).chain(widths.iter()) {
            x += width;
            paginator.push(PlacedPrimitive::Rule(Rule::vertical(
                x,
                top,
                row.height,
                style.border_width,
                style.border_color,
            )));
        }
    }

    let mut x = content.x;
    for (lines, width) in row.cells.iter().zip(widths) {
        let line_box = LineBox {
            x: x + padding,
            width: width - 2.0 * padding,
        };
        let mut line_top = top + padding;
        for line in lines {
            if let Some(run) = place_line(&row.cell_font.font, text_style, text_style.align, line, line_box, line_top) {
                paginator.push(PlacedPrimitive::Text(run));
            }
            line_top += text_style.line_pitch();
        }
        x += width;
    }

    paginator.advance(row.height);
}

fn close_segment(paginator: &mut Paginator, widths: &[f64], style: &TableStyle) {
    if style.border_width <= 0.0 {
        return;
    }
    let content = paginator.content();
    let y = paginator.cursor();
    paginator.push(PlacedPrimitive::Rule(Rule::horizontal(
        content.x,
        y,
        widths.iter().sum(),
        style.border_width,
        style.border_color,
    )));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_widths_grow_proportionally() {
        let widths = column_widths(&[50.0, 150.0], &[20.0, 20.0], 400.0);
        assert_close(&widths, &[100.0, 300.0]);
    }

    #[test]
    fn test_widths_shrink_proportionally() {
        let widths = column_widths(&[200.0, 600.0], &[20.0, 20.0], 400.0);
        assert_close(&widths, &[100.0, 300.0]);
    }

    #[test]
    fn test_widths_pin_minimum() {
        // scaling by 0.5 would put column 0 at 40, below its minimum of 60
        let widths = column_widths(&[80.0, 720.0], &[60.0, 30.0], 400.0);
        assert_close(&widths, &[60.0, 340.0]);
        assert!((widths.iter().sum::<f64>() - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_widths_overflow_uses_minimums() {
        let widths = column_widths(&[300.0, 300.0], &[250.0, 250.0], 400.0);
        assert_close(&widths, &[250.0, 250.0]);
    }

    #[test]
    fn test_widths_empty_columns_share_equally() {
        let widths = column_widths(&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0], 300.0);
        assert_close(&widths, &[100.0, 100.0, 100.0]);
    }
}
