// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Application state and orchestration.
//!
//! `App` owns:
//! - the `Browser` (search, results, artwork loads)
//! - the query input, selected scope, and list/grid layout
//! - the selection and scroll offset over the current rows
//! - a per-item cache of encoded terminal image protocols
//!
//! Methods never block; network work happens on the browser's pools.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use image::DynamicImage;
use log::debug;
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::Rect;
use ratatui_image::Resize;
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol;

use crate::artwork::{LayoutMode, SlotKey};
use crate::browser::Browser;
use crate::config::Config;
use crate::model::ItemId;
use crate::scope::SearchScope;
use crate::store::{ChangeKind, SnapshotDiff, StoreChange};
use crate::ui::{self, Row, Tile};

/// Items skipped by PageUp / PageDown.
const PAGE_ITEMS: isize = 10;

struct CachedProtocol {
    source: Arc<DynamicImage>,
    size: (u16, u16),
    protocol: Protocol,
}

pub struct App {
    pub browser: Browser,
    pub input: String,
    pub scope: SearchScope,
    pub layout: LayoutMode,
    /// Selected item, as an index into the items in section order.
    pub selected: usize,
    /// First visible row.
    pub offset: usize,
    pub should_quit: bool,
    pub picker: Picker,
    grid_columns: usize,
    grid_cell_rows: u16,
    changes: Receiver<StoreChange>,
    rows: Vec<Row>,
    heights: Vec<u16>,
    last_diff: Option<SnapshotDiff>,
    protocols: HashMap<ItemId, CachedProtocol>,
}

impl App {
    pub fn new(mut browser: Browser, config: &Config, picker: Picker) -> Self {
        let changes = browser.subscribe();
        Self {
            browser,
            input: String::new(),
            scope: SearchScope::All,
            layout: LayoutMode::List,
            selected: 0,
            offset: 0,
            should_quit: false,
            picker,
            grid_columns: config.grid_columns,
            grid_cell_rows: config.grid_cell_rows,
            changes,
            rows: Vec::new(),
            heights: Vec::new(),
            last_diff: None,
            protocols: HashMap::new(),
        }
    }

    /// Set the query and search immediately, skipping the debounce.
    pub fn search_now(&mut self, term: &str, scope: SearchScope, now: Instant) {
        self.input = term.to_string();
        self.scope = scope;
        self.browser.on_query_changed(term, scope, now);
        self.browser.trigger_search();
    }

    fn query_changed(&mut self, now: Instant) {
        self.browser.on_query_changed(&self.input, self.scope, now);
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('u') if ctrl => {
                self.input.clear();
                self.query_changed(now);
            }
            KeyCode::Char('g') if ctrl => self.toggle_layout(),
            KeyCode::Char(c) if !ctrl => {
                self.input.push(c);
                self.query_changed(now);
            }
            KeyCode::Backspace => {
                if self.input.pop().is_some() {
                    self.query_changed(now);
                }
            }
            KeyCode::Tab => {
                self.scope = self.scope.next();
                self.query_changed(now);
            }
            KeyCode::BackTab => {
                self.scope = self.scope.prev();
                self.query_changed(now);
            }
            KeyCode::Down => self.move_by(self.vertical_step()),
            KeyCode::Up => self.move_by(-self.vertical_step()),
            KeyCode::Right if self.layout == LayoutMode::Grid => self.move_by(1),
            KeyCode::Left if self.layout == LayoutMode::Grid => self.move_by(-1),
            KeyCode::PageDown => self.move_by(PAGE_ITEMS),
            KeyCode::PageUp => self.move_by(-PAGE_ITEMS),
            KeyCode::Home => self.go_first(),
            KeyCode::End => self.go_last(),
            _ => {}
        }
    }

    fn vertical_step(&self) -> isize {
        match self.layout {
            LayoutMode::List => 1,
            LayoutMode::Grid => self.grid_columns as isize,
        }
    }

    /// Drain browser work and store notifications. Returns true if a redraw is needed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut dirty = self.browser.poll(now);
        while let Ok(change) = self.changes.try_recv() {
            match &change.kind {
                ChangeKind::Replaced => {
                    self.selected = 0;
                    self.offset = 0;
                    self.protocols.clear();
                }
                ChangeKind::Appended(ids) => debug!("{} items appended", ids.len()),
                ChangeKind::Patched(_) => {}
            }
            let diff = change.diff();
            if !diff.is_empty() && diff.reconfigured.is_empty() {
                self.last_diff = Some(diff);
            }
            dirty = true;
        }
        if dirty {
            self.rebuild_rows();
        }
        dirty
    }

    fn rebuild_rows(&mut self) {
        let snapshot = self.browser.store().snapshot();
        self.rows = ui::build_rows(&snapshot, self.layout, self.grid_columns);
        self.heights = self
            .rows
            .iter()
            .map(|r| ui::row_height(r, self.layout, self.grid_cell_rows))
            .collect();
        let count = snapshot.item_count();
        self.selected = self.selected.min(count.saturating_sub(1));
        self.offset = self.offset.min(self.rows.len().saturating_sub(1));
    }

    pub fn toggle_layout(&mut self) {
        self.layout = self.layout.toggle();
        self.offset = 0;
        self.protocols.clear();
        self.rebuild_rows();
    }

    pub fn grid_columns(&self) -> usize {
        self.grid_columns
    }

    pub fn item_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| match r {
                Row::Items { ids, .. } => ids.len(),
                Row::Header(_) => 0,
            })
            .sum()
    }

    pub fn move_by(&mut self, delta: isize) {
        let count = self.item_count();
        if delta == 0 || count == 0 {
            return;
        }
        self.selected = self.selected.saturating_add_signed(delta).min(count - 1);
    }

    pub fn go_first(&mut self) {
        self.selected = 0;
    }

    pub fn go_last(&mut self) {
        self.selected = self.item_count().saturating_sub(1);
    }

    pub fn selected_id(&self) -> Option<ItemId> {
        self.rows
            .iter()
            .filter_map(|r| match r {
                Row::Items { ids, .. } => Some(ids),
                Row::Header(_) => None,
            })
            .flatten()
            .nth(self.selected)
            .copied()
    }

    /// Scroll so the selection (and its section header, when adjacent) is visible.
    fn scroll_into_view(&mut self, viewport: u16) {
        let Some(target) = ui::row_of_item(&self.rows, self.selected) else {
            self.offset = 0;
            return;
        };
        let first = match target.checked_sub(1).map(|i| &self.rows[i]) {
            Some(Row::Header(_)) if self.offset >= target => target - 1,
            _ => target,
        };
        self.offset = ui::scroll_offset(&self.heights, self.offset, first, target, viewport);
    }

    /// Rows to draw in a viewport of `viewport` lines, with their heights.
    pub fn visible_rows(&mut self, viewport: u16) -> Vec<(Row, u16)> {
        self.scroll_into_view(viewport);
        ui::visible_range(&self.heights, self.offset, viewport)
            .map(|i| (self.rows[i].clone(), self.heights[i]))
            .collect()
    }

    /// Ask for artwork of every item about to be drawn in `results`.
    pub fn prepare_visible(&mut self, results: Rect) {
        for (row, _) in self.visible_rows(results.height) {
            if let Row::Items {
                section,
                first,
                ids,
            } = row
            {
                for (i, id) in ids.into_iter().enumerate() {
                    let slot = SlotKey::new(self.layout, section, first + i);
                    self.browser.load_image_if_needed(slot, id);
                }
            }
        }
    }

    pub fn tile(&self, id: ItemId) -> Option<Tile> {
        let item = self.browser.store().item(id)?;
        Some(Tile {
            id,
            name: item.name.clone(),
            artist: item.artist.clone(),
            image: self.browser.artwork_for(item),
        })
    }

    /// Encoded image for `id` sized to `area`. Re-encoded when the source image
    /// (placeholder → artwork) or the area changes.
    pub fn protocol(&mut self, id: ItemId, image: &Arc<DynamicImage>, area: Rect) -> Option<&Protocol> {
        let size = (area.width, area.height);
        let fresh = self
            .protocols
            .get(&id)
            .is_some_and(|c| c.size == size && Arc::ptr_eq(&c.source, image));
        if !fresh {
            match self
                .picker
                .new_protocol(image.as_ref().clone(), area, Resize::Fit(None))
            {
                Ok(protocol) => {
                    self.protocols.insert(
                        id,
                        CachedProtocol {
                            source: Arc::clone(image),
                            size,
                            protocol,
                        },
                    );
                }
                Err(e) => {
                    debug!("image protocol for item {id} failed: {e:?}");
                    self.protocols.remove(&id);
                    return None;
                }
            }
        }
        self.protocols.get(&id).map(|c| &c.protocol)
    }

    pub fn status_text(&self) -> String {
        let count = self.item_count();
        let mut status = if count == 0 {
            String::from("no results")
        } else {
            format!("[{}/{}]", self.selected + 1, count)
        };
        let sections = self
            .rows
            .iter()
            .filter(|r| matches!(r, Row::Header(_)))
            .count();
        if sections > 0 {
            status.push_str(&format!(" in {sections} sections"));
        }
        status.push_str(match self.layout {
            LayoutMode::List => " | list",
            LayoutMode::Grid => " | grid",
        });
        if let Some(diff) = &self.last_diff
            && !diff.inserted_items.is_empty()
        {
            status.push_str(&format!(" | +{}", diff.inserted_items.len()));
        }
        if self.browser.is_searching() {
            status.push_str(" | searching…");
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::tests::GatedImages;
    use crate::gateway::{FetchError, SearchGateway, SearchQuery};
    use crate::model::StoreItem;
    use crate::scope::MediaKind;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Movies: ids 1..=2, Apps: ids 10..=14, nothing else. Terms containing
    /// "broken" get artwork URLs that always fail.
    struct StaticSearch;

    impl SearchGateway for StaticSearch {
        fn fetch_items(&self, query: &SearchQuery) -> Result<Vec<StoreItem>, FetchError> {
            let (kind, ids) = match query.media {
                MediaKind::Movies => ("feature-movie", 1..=2),
                MediaKind::Apps => ("software", 10..=14),
                _ => return Ok(Vec::new()),
            };
            Ok(ids
                .map(|id| {
                    let url = if query.term.contains("broken") {
                        format!("https://img/broken-{id}.png")
                    } else {
                        format!("https://img/{id}.png")
                    };
                    StoreItem::new(id, format!("{} {id}", query.term), "artist", kind)
                        .with_artwork_url(url)
                })
                .collect())
        }
    }

    fn create_test_app() -> App {
        create_test_app_with(Arc::default())
    }

    fn create_test_app_with(images: Arc<GatedImages>) -> App {
        let config = Config::default();
        let browser = Browser::new(&config, Arc::new(StaticSearch), images).unwrap();
        App::new(browser, &config, Picker::from_fontsize((8, 16)))
    }

    fn settle(app: &mut App) {
        let deadline = Instant::now() + Duration::from_secs(5);
        app.poll(Instant::now());
        while app.browser.has_work_in_flight() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
            app.poll(Instant::now());
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn searched_app() -> App {
        let mut app = create_test_app();
        app.search_now("cat", SearchScope::All, Instant::now());
        settle(&mut app);
        app
    }

    #[test]
    fn test_typing_debounces_search() {
        let mut app = create_test_app();
        let t0 = Instant::now();
        for c in ['c', 'a', 't'] {
            app.handle_key(key(KeyCode::Char(c)), t0);
        }
        assert_eq!(app.input, "cat");
        assert!(app.browser.is_searching());
        assert!(!app.poll(t0));
        assert_eq!(app.item_count(), 0);

        app.poll(t0 + Duration::from_millis(300));
        settle(&mut app);
        assert_eq!(app.item_count(), 7);
        assert_eq!(app.browser.store().snapshot().titles(), vec!["Movies", "Apps"]);
    }

    #[test]
    fn test_scope_keys_cycle() {
        let mut app = create_test_app();
        let now = Instant::now();
        app.handle_key(key(KeyCode::Tab), now);
        assert_eq!(app.scope, SearchScope::Movies);
        app.handle_key(key(KeyCode::BackTab), now);
        app.handle_key(key(KeyCode::BackTab), now);
        assert_eq!(app.scope, SearchScope::Books);
        assert_eq!(app.browser.live().scope, SearchScope::Books);
    }

    #[test]
    fn test_edit_keys() {
        let mut app = create_test_app();
        let now = Instant::now();
        app.handle_key(key(KeyCode::Char('d')), now);
        app.handle_key(key(KeyCode::Char('o')), now);
        app.handle_key(key(KeyCode::Backspace), now);
        assert_eq!(app.input, "d");
        app.handle_key(ctrl('u'), now);
        assert_eq!(app.input, "");
        assert_eq!(app.browser.live().term, "");
    }

    #[test]
    fn test_quit_keys() {
        let mut app = create_test_app();
        app.handle_key(ctrl('c'), Instant::now());
        assert!(app.should_quit);

        let mut app = create_test_app();
        app.handle_key(key(KeyCode::Esc), Instant::now());
        assert!(app.should_quit);
    }

    #[test]
    fn test_selection_clamps() {
        let mut app = searched_app();
        assert_eq!(app.selected_id(), Some(ItemId(1)));
        app.move_by(-3);
        assert_eq!(app.selected, 0);
        app.handle_key(key(KeyCode::Down), Instant::now());
        app.handle_key(key(KeyCode::Down), Instant::now());
        assert_eq!(app.selected_id(), Some(ItemId(10)));
        app.handle_key(key(KeyCode::End), Instant::now());
        assert_eq!(app.selected_id(), Some(ItemId(14)));
        app.handle_key(key(KeyCode::PageDown), Instant::now());
        assert_eq!(app.selected, 6);
        app.handle_key(key(KeyCode::Home), Instant::now());
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_grid_moves_by_row() {
        let mut app = searched_app();
        app.handle_key(ctrl('g'), Instant::now());
        assert_eq!(app.layout, LayoutMode::Grid);
        app.handle_key(key(KeyCode::Down), Instant::now());
        assert_eq!(app.selected, 3);
        app.handle_key(key(KeyCode::Left), Instant::now());
        assert_eq!(app.selected, 2);
    }

    #[test]
    fn test_new_search_resets_selection() {
        let mut app = searched_app();
        app.go_last();
        app.search_now("dog", SearchScope::Apps, Instant::now());
        settle(&mut app);
        assert_eq!(app.selected, 0);
        assert_eq!(app.item_count(), 5);
        assert_eq!(app.tile(ItemId(10)).unwrap().name, "dog 10");
    }

    #[test]
    fn test_visible_rows_follow_selection() {
        let mut app = searched_app();
        // Header + 2 list rows fit in 7 lines.
        let rows = app.visible_rows(7);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].0, Row::Header(MediaKind::Movies));

        app.go_last();
        let rows = app.visible_rows(7);
        assert!(rows.iter().any(|(r, _)| matches!(
            r,
            Row::Items { ids, .. } if ids == &vec![ItemId(14)]
        )));
    }

    #[test]
    fn test_prepare_visible_loads_only_visible_artwork() {
        let mut app = searched_app();
        app.prepare_visible(Rect::new(0, 0, 40, 7));
        assert!(!app.browser.is_idle());
        settle(&mut app);

        let loaded: Vec<u64> = app
            .browser
            .store()
            .items()
            .iter()
            .filter(|i| i.artwork.is_some())
            .map(|i| i.id.0)
            .collect();
        assert_eq!(loaded, vec![1, 2]);
    }

    #[test]
    fn test_redraws_do_not_refetch_failed_artwork() {
        let images = Arc::new(GatedImages::default());
        let mut app = create_test_app_with(Arc::clone(&images));
        app.search_now("broken", SearchScope::All, Instant::now());
        settle(&mut app);

        let area = Rect::new(0, 0, 40, 7);
        app.prepare_visible(area);
        settle(&mut app);
        assert_eq!(images.fetches.load(Ordering::SeqCst), 2);

        // Selection moves within the visible rows
        for delta in [1, -1] {
            app.move_by(delta);
            app.prepare_visible(area);
            settle(&mut app);
        }
        assert_eq!(images.fetches.load(Ordering::SeqCst), 2);
        assert!(app.browser.store().items().iter().all(|i| i.artwork.is_none()));
    }

    #[test]
    fn test_status_text() {
        let app = create_test_app();
        assert_eq!(app.status_text(), "no results | list");

        let app = searched_app();
        assert!(app.status_text().starts_with("[1/7] in 2 sections | list | +"));
    }
}
