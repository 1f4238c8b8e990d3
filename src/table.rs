use crate::format::{PLACEHOLDER, normalize, pad};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

pub type Row = Vec<String>;

const BORDER: Color = Color::Rgb(140, 156, 178);
const HEADER: Color = Color::Rgb(52, 211, 153);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub label: &'static str,
    pub width: usize,
}

impl ColumnSpec {
    pub const fn new(label: &'static str, width: usize) -> Self {
        Self {
            label,
            width: if width == 0 { 1 } else { width },
        }
    }
}

/// A rendered bordered table, one `Line` per terminal row.
#[derive(Debug, Clone)]
pub struct TableLines {
    lines: Vec<Line<'static>>,
    width: usize,
    body_rows: usize,
}

impl TableLines {
    pub fn lines(&self) -> &[Line<'static>] {
        &self.lines
    }

    pub fn height(&self) -> usize {
        self.lines.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn body_rows(&self) -> usize {
        self.body_rows
    }
}

pub fn table_width(columns: &[ColumnSpec]) -> usize {
    1 + columns.iter().map(|column| column.width + 3).sum::<usize>()
}

/// Builds the top/header/divider/body/footer lines for `rows`.
///
/// An empty `rows` slice yields exactly one placeholder body row.
pub fn render_table<T>(
    columns: &[ColumnSpec],
    rows: &[T],
    cells: impl Fn(&T) -> Row,
    highlight: Option<usize>,
) -> TableLines {
    let border_style = Style::default().fg(BORDER);
    let mut lines = Vec::with_capacity(rows.len().max(1) + 4);

    lines.push(Line::styled(border(columns, '┌', '┬', '┐'), border_style));
    lines.push(cell_line(
        columns,
        columns.iter().map(|column| column.label.to_string()).collect(),
        Style::default().fg(HEADER).add_modifier(Modifier::BOLD),
        border_style,
    ));
    lines.push(Line::styled(border(columns, '├', '┼', '┤'), border_style));

    if rows.is_empty() {
        let placeholder = columns.iter().map(|_| PLACEHOLDER.to_string()).collect();
        lines.push(cell_line(columns, placeholder, Style::default(), border_style));
    } else {
        for (index, row) in rows.iter().enumerate() {
            let style = if highlight == Some(index) {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            };
            lines.push(cell_line(columns, cells(row), style, border_style));
        }
    }

    lines.push(Line::styled(border(columns, '└', '┴', '┘'), border_style));

    TableLines {
        lines,
        width: table_width(columns),
        body_rows: rows.len().max(1),
    }
}

/// Writes `lines` starting at `(x, y)`; rows outside `area` are skipped one by one.
pub fn draw_lines(buf: &mut Buffer, area: Rect, x: u16, y: u16, lines: &[Line<'_>]) -> usize {
    let area = area.intersection(buf.area);
    if area.is_empty() || x >= area.right() || x < area.left() {
        return 0;
    }

    let mut drawn = 0usize;
    for (offset, line) in lines.iter().enumerate() {
        let Ok(offset) = u16::try_from(offset) else {
            break;
        };
        let Some(row) = y.checked_add(offset) else {
            break;
        };
        if row < area.top() || row >= area.bottom() {
            continue;
        }
        buf.set_line(x, row, line, area.right() - x);
        drawn += 1;
    }
    drawn
}

fn border(columns: &[ColumnSpec], left: char, middle: char, right: char) -> String {
    let mut out = String::new();
    out.push(left);
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            out.push(middle);
        }
        out.extend(std::iter::repeat_n('─', column.width + 2));
    }
    out.push(right);
    out
}

fn cell_line(
    columns: &[ColumnSpec],
    cells: Row,
    cell_style: Style,
    border_style: Style,
) -> Line<'static> {
    let mut spans = Vec::with_capacity(columns.len() * 2 + 1);
    spans.push(Span::styled("│", border_style));
    for (index, column) in columns.iter().enumerate() {
        let value = cells
            .get(index)
            .map(|cell| normalize(cell))
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        spans.push(Span::styled(
            format!(" {} ", pad(&value, column.width)),
            cell_style,
        ));
        spans.push(Span::styled("│", border_style));
    }
    Line::from(spans)
}
