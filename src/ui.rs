// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Rendering.
//!
//! Results are laid out as a flat list of rows: one header row per section,
//! then item rows (one item per row in the list layout, `grid_columns` items
//! per row in the grid layout). Row math is kept pure so scrolling can be
//! tested without a terminal.

use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use image::DynamicImage;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
};
use ratatui_image::Image;

use crate::app::App;
use crate::artwork::LayoutMode;
use crate::model::ItemId;
use crate::scope::{MediaKind, SearchScope};
use crate::store::Snapshot;

/// Terminal rows used by one list entry.
pub const LIST_ROW_HEIGHT: u16 = 3;
/// Terminal columns used by a list entry's thumbnail.
const LIST_THUMB_COLS: u16 = 6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Row {
    Header(MediaKind),
    /// Items `first..first + ids.len()` of section `section`.
    Items {
        section: usize,
        first: usize,
        ids: Vec<ItemId>,
    },
}

pub fn build_rows(snapshot: &Snapshot, layout: LayoutMode, columns: usize) -> Vec<Row> {
    let per_row = match layout {
        LayoutMode::List => 1,
        LayoutMode::Grid => columns.max(1),
    };
    let mut rows = Vec::new();
    for (section, s) in snapshot.sections.iter().enumerate() {
        rows.push(Row::Header(s.kind));
        for (i, chunk) in s.ids.chunks(per_row).enumerate() {
            rows.push(Row::Items {
                section,
                first: i * per_row,
                ids: chunk.to_vec(),
            });
        }
    }
    rows
}

pub fn row_height(row: &Row, layout: LayoutMode, grid_cell_rows: u16) -> u16 {
    match (row, layout) {
        (Row::Header(_), _) => 1,
        (Row::Items { .. }, LayoutMode::List) => LIST_ROW_HEIGHT,
        (Row::Items { .. }, LayoutMode::Grid) => grid_cell_rows,
    }
}

/// Index of the row holding the `index`-th item (in section order).
pub fn row_of_item(rows: &[Row], index: usize) -> Option<usize> {
    let mut seen = 0;
    for (i, row) in rows.iter().enumerate() {
        if let Row::Items { ids, .. } = row {
            if index < seen + ids.len() {
                return Some(i);
            }
            seen += ids.len();
        }
    }
    None
}

/// New top row so that rows `first..=last` fit in `viewport`, moving as little as possible.
pub fn scroll_offset(heights: &[u16], offset: usize, first: usize, last: usize, viewport: u16) -> usize {
    if heights.is_empty() {
        return 0;
    }
    let last = last.min(heights.len() - 1);
    let mut top = offset.min(first).min(last);
    while top < last && span_height(&heights[top..=last]) > u32::from(viewport) {
        top += 1;
    }
    top
}

fn span_height(heights: &[u16]) -> u32 {
    heights.iter().map(|&h| u32::from(h)).sum()
}

/// Rows starting at `offset` that fit in `viewport`. The first row is always
/// included, even if it is taller than the viewport.
pub fn visible_range(heights: &[u16], offset: usize, viewport: u16) -> Range<usize> {
    let start = offset.min(heights.len());
    let mut used = 0u32;
    let mut end = start;
    while end < heights.len() {
        let h = u32::from(heights[end]);
        if end > start && used + h > u32::from(viewport) {
            break;
        }
        used += h;
        end += 1;
    }
    start..end
}

pub struct Areas {
    pub tabs: Rect,
    pub input: Rect,
    pub results: Rect,
    pub status: Rect,
}

pub fn areas(area: Rect) -> Areas {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Scope bar
            Constraint::Length(3), // Search input
            Constraint::Min(1),    // Results
            Constraint::Length(1), // Status bar
        ])
        .split(area);
    Areas {
        tabs: chunks[0],
        input: chunks[1],
        results: chunks[2],
        status: chunks[3],
    }
}

fn grid_cells(area: Rect, columns: usize) -> Rc<[Rect]> {
    let columns = columns.max(1) as u32;
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints((0..columns).map(|_| Constraint::Ratio(1, columns)))
        .split(area)
}

/// What one item needs for drawing, detached from the store.
pub struct Tile {
    pub id: ItemId,
    pub name: String,
    pub artist: String,
    pub image: Arc<DynamicImage>,
}

pub fn draw(frame: &mut Frame, app: &mut App) {
    let areas = areas(frame.area());
    render_scope_bar(frame, app, areas.tabs);
    render_search_input(frame, app, areas.input);
    render_results(frame, app, areas.results);
    render_status_bar(frame, app, areas.status);
}

fn render_scope_bar(frame: &mut Frame, app: &App, area: Rect) {
    let tabs = Tabs::new(SearchScope::ALL.iter().map(|s| s.title()))
        .select(app.scope.index())
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn render_search_input(frame: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::styled("▌ ", Style::default().fg(Color::Yellow)),
        Span::styled(app.input.as_str(), Style::default().fg(Color::White)),
        Span::styled("█", Style::default().fg(Color::White)),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" iTunes Search ");
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
    if app.browser.store().is_empty() {
        let text = if app.browser.is_searching() {
            "Searching…"
        } else if app.browser.live().term.trim().is_empty() {
            "Type to search movies, music, apps and books"
        } else {
            "No results"
        };
        let para = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        frame.render_widget(para, area);
        return;
    }

    let selected = app.selected_id();
    let mut y = area.y;
    for (row, height) in app.visible_rows(area.height) {
        let remaining = area.bottom().saturating_sub(y);
        if remaining == 0 {
            break;
        }
        let rect = Rect::new(area.x, y, area.width, height.min(remaining));
        match row {
            Row::Header(kind) => render_section_header(frame, kind, rect),
            Row::Items { ids, .. } => match app.layout {
                LayoutMode::List => {
                    if let Some(tile) = ids.first().and_then(|id| app.tile(*id)) {
                        let is_selected = selected == Some(tile.id);
                        render_list_entry(frame, app, &tile, is_selected, rect);
                    }
                }
                LayoutMode::Grid => {
                    let cells = grid_cells(rect, app.grid_columns());
                    for (id, cell) in ids.iter().zip(cells.iter()) {
                        if let Some(tile) = app.tile(*id) {
                            let is_selected = selected == Some(tile.id);
                            render_grid_cell(frame, app, &tile, is_selected, *cell);
                        }
                    }
                }
            },
        }
        y = y.saturating_add(height);
    }
}

fn render_section_header(frame: &mut Frame, kind: MediaKind, area: Rect) {
    let line = Line::from(vec![
        Span::styled("── ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            kind.title(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_list_entry(frame: &mut Frame, app: &mut App, tile: &Tile, selected: bool, area: Rect) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(LIST_THUMB_COLS),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(area);

    if selected {
        frame.render_widget(
            Paragraph::new(vec![Line::from("▌"); area.height as usize])
                .style(Style::default().fg(Color::Yellow)),
            cols[0],
        );
    }
    render_thumbnail(frame, app, tile, cols[1]);

    let name_style = if selected {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let lines = vec![
        Line::from(Span::styled(tile.name.as_str(), name_style)),
        Line::from(Span::styled(
            tile.artist.as_str(),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines), cols[3]);
}

fn render_grid_cell(frame: &mut Frame, app: &mut App, tile: &Tile, selected: bool, area: Rect) {
    let border = if selected { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);
    render_thumbnail(frame, app, tile, rows[0]);
    frame.render_widget(
        Paragraph::new(tile.name.as_str())
            .style(Style::default().fg(Color::White))
            .alignment(Alignment::Center),
        rows[1],
    );
}

fn render_thumbnail(frame: &mut Frame, app: &mut App, tile: &Tile, area: Rect) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    if let Some(protocol) = app.protocol(tile.id, &tile.image, area) {
        frame.render_widget(Image::new(protocol), area);
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(34)])
        .split(area);
    frame.render_widget(
        Paragraph::new(app.status_text()).style(Style::default().fg(Color::White)),
        cols[0],
    );
    frame.render_widget(
        Paragraph::new("Tab scope  ^G layout  Esc quit")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Right),
        cols[1],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Section;

    fn ids(range: Range<u64>) -> Vec<ItemId> {
        range.map(ItemId).collect()
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            sections: vec![
                Section {
                    kind: MediaKind::Movies,
                    ids: ids(1..3),
                },
                Section {
                    kind: MediaKind::Apps,
                    ids: ids(10..15),
                },
            ],
        }
    }

    #[test]
    fn test_list_rows() {
        let rows = build_rows(&snapshot(), LayoutMode::List, 3);
        assert_eq!(rows.len(), 2 + 2 + 5);
        assert_eq!(rows[0], Row::Header(MediaKind::Movies));
        assert_eq!(
            rows[2],
            Row::Items {
                section: 0,
                first: 1,
                ids: vec![ItemId(2)]
            }
        );
        assert_eq!(rows[3], Row::Header(MediaKind::Apps));
    }

    #[test]
    fn test_grid_rows_chunk_by_columns() {
        let rows = build_rows(&snapshot(), LayoutMode::Grid, 3);
        assert_eq!(
            rows,
            vec![
                Row::Header(MediaKind::Movies),
                Row::Items {
                    section: 0,
                    first: 0,
                    ids: ids(1..3)
                },
                Row::Header(MediaKind::Apps),
                Row::Items {
                    section: 1,
                    first: 0,
                    ids: ids(10..13)
                },
                Row::Items {
                    section: 1,
                    first: 3,
                    ids: ids(13..15)
                },
            ]
        );
        assert_eq!(row_height(&rows[0], LayoutMode::Grid, 10), 1);
        assert_eq!(row_height(&rows[1], LayoutMode::Grid, 10), 10);
        assert_eq!(row_height(&rows[1], LayoutMode::List, 10), LIST_ROW_HEIGHT);
    }

    #[test]
    fn test_row_of_item_skips_headers() {
        let rows = build_rows(&snapshot(), LayoutMode::Grid, 3);
        assert_eq!(row_of_item(&rows, 0), Some(1));
        assert_eq!(row_of_item(&rows, 1), Some(1));
        assert_eq!(row_of_item(&rows, 2), Some(3));
        assert_eq!(row_of_item(&rows, 5), Some(4));
        assert_eq!(row_of_item(&rows, 7), None);
    }

    #[test]
    fn test_visible_range() {
        let heights = [1, 3, 3, 1, 3];
        assert_eq!(visible_range(&heights, 0, 7), 0..3);
        assert_eq!(visible_range(&heights, 1, 7), 1..4);
        assert_eq!(visible_range(&heights, 4, 7), 4..5);
        // Oversized first row is still shown.
        assert_eq!(visible_range(&[20, 1], 0, 5), 0..1);
        assert_eq!(visible_range(&[], 0, 5), 0..0);
    }

    #[test]
    fn test_scroll_offset_moves_minimally() {
        let heights = [1, 3, 3, 1, 3, 3];
        // Already visible: unchanged.
        assert_eq!(scroll_offset(&heights, 0, 2, 2, 7), 0);
        // Scrolling down to row 4 (with its header at 3).
        assert_eq!(scroll_offset(&heights, 0, 3, 4, 7), 2);
        // Scrolling back up.
        assert_eq!(scroll_offset(&heights, 4, 1, 1, 7), 1);
        assert_eq!(scroll_offset(&[], 3, 0, 0, 7), 0);
    }
}
