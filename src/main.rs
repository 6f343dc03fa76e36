// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Application entry point and event loop.
//!
//! This module:
//! - parses CLI args (initial term, scope, layout, headless `--print`)
//! - sets up file logging so log lines never land on the TUI
//! - runs the main input loop and decides when to redraw
//!
//! All result state lives in `Browser` (see `src/browser.rs`); this loop only
//! feeds it input and time.

mod app;
mod artwork;
mod browser;
mod config;
mod debounce;
mod gateway;
mod model;
mod scope;
mod search;
mod store;
mod ui;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, Event, KeyEventKind};
use ratatui::layout::Rect;
use ratatui_image::picker::Picker;

use crate::app::App;
use crate::browser::Browser;
use crate::config::Config;
use crate::gateway::ItunesClient;
use crate::scope::SearchScope;
use crate::store::ResultStore;

/// Longest sleep between loop iterations while nothing is pending.
const IDLE_TICK: Duration = Duration::from_millis(250);
/// Sleep between iterations while fetches are in flight.
const BUSY_TICK: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "tunescope", about = "Browse the iTunes Store from the terminal")]
struct Cli {
    /// Initial search term
    term: Option<String>,

    /// Search scope: all, movies, music, apps, books
    #[arg(short, long, value_parser = parse_scope, default_value = "all")]
    scope: SearchScope,

    /// Start in the grid layout
    #[arg(long)]
    grid: bool,

    /// Print grouped results for TERM to stdout and exit
    #[arg(long)]
    print: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

fn parse_scope(s: &str) -> Result<SearchScope, String> {
    SearchScope::parse(s)
        .ok_or_else(|| format!("unknown scope {s:?} (expected all, movies, music, apps or books)"))
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Log to the configured file. Logging is disabled if the file cannot be opened.
fn init_logging(config: &Config, debug: bool) {
    let default = if debug || config.debug { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(Env::new().filter_or("TUNESCOPE_LOG", default));
    match config.log_path().and_then(|p| open_log_file(&p)) {
        Some(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.filter_level(log::LevelFilter::Off);
        }
    }
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();
    init_logging(&config, cli.debug);

    let browser = build_browser(&config)?;

    if cli.print {
        let Some(term) = cli.term.as_deref().filter(|t| !t.trim().is_empty()) else {
            anyhow::bail!("--print needs a search term");
        };
        return print_results(browser, term, cli.scope);
    }

    init_terminal()?;
    let result = run(browser, &config, &cli);
    restore_terminal();

    result
}

/// One HTTP client serves both search and artwork requests.
fn build_browser(config: &Config) -> Result<Browser> {
    let client = Arc::new(ItunesClient::new(&config.endpoint, config.request_timeout())?);
    Browser::new(config, client.clone(), client)
}

/// Run one search to completion and print the grouping.
fn print_results(mut browser: Browser, term: &str, scope: SearchScope) -> Result<()> {
    browser.on_query_changed(term, scope, Instant::now());
    browser.trigger_search();
    browser.poll(Instant::now());
    while browser.has_work_in_flight() {
        std::thread::sleep(BUSY_TICK);
        browser.poll(Instant::now());
    }
    let mut out = io::stdout().lock();
    write_grouping(&mut out, browser.store())?;
    Ok(())
}

fn write_grouping(out: &mut impl Write, store: &ResultStore) -> io::Result<()> {
    let snapshot = store.snapshot();
    if snapshot.is_empty() {
        return writeln!(out, "No results");
    }
    for section in &snapshot.sections {
        writeln!(out, "{} ({})", section.title(), section.ids.len())?;
        for item in section.ids.iter().filter_map(|id| store.item(*id)) {
            writeln!(out, "  {:>10}  {} / {}", item.id.0, item.name, item.artist)?;
        }
    }
    Ok(())
}

fn run(browser: Browser, config: &Config, cli: &Cli) -> Result<()> {
    let picker = Picker::from_query_stdio().unwrap_or_else(|_| Picker::from_fontsize((8, 16)));
    let mut app = App::new(browser, config, picker);
    if cli.grid {
        app.toggle_layout();
    }
    match cli.term.as_deref() {
        Some(term) => app.search_now(term, cli.scope, Instant::now()),
        None => app.scope = cli.scope,
    }
    info!("started: scope={} layout={:?}", app.scope.title(), app.layout);

    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let mut needs_draw = true;

    loop {
        // Merge finished fetches and fire the debounce if due
        if app.poll(Instant::now()) {
            needs_draw = true;
        }

        // Process all pending events first (drain the queue)
        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key, Instant::now());
                    needs_draw = true;
                }
                Event::Resize(..) => needs_draw = true,
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }

        if needs_draw {
            let size = terminal.size()?;
            let results = ui::areas(Rect::new(0, 0, size.width, size.height)).results;
            app.prepare_visible(results);
            terminal.draw(|frame| ui::draw(frame, &mut app))?;
            needs_draw = false;
        }

        // Wait for next event, the debounce deadline, or worker results.
        let max = if app.browser.is_idle() { IDLE_TICK } else { BUSY_TICK };
        event::poll(app.browser.next_wakeup(Instant::now(), max))?;
    }

    Ok(())
}

fn init_terminal() -> io::Result<()> {
    use ratatui::crossterm::{
        cursor::Hide,
        execute,
        terminal::{Clear, ClearType, EnterAlternateScreen, enable_raw_mode},
    };

    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen, Clear(ClearType::All), Hide)?;
    Ok(())
}

fn restore_terminal() {
    use ratatui::crossterm::{
        cursor::Show,
        execute,
        terminal::{LeaveAlternateScreen, disable_raw_mode},
    };

    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoreItem;
    use crate::scope::MediaKind;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["tunescope"]).unwrap();
        assert_eq!(cli.term, None);
        assert_eq!(cli.scope, SearchScope::All);
        assert!(!cli.grid);
        assert!(!cli.print);
    }

    #[test]
    fn test_cli_parses_term_and_scope() {
        let cli = Cli::try_parse_from(["tunescope", "cat", "--scope", "movies", "--grid"]).unwrap();
        assert_eq!(cli.term.as_deref(), Some("cat"));
        assert_eq!(cli.scope, SearchScope::Movies);
        assert!(cli.grid);
    }

    #[test]
    fn test_cli_rejects_unknown_scope() {
        let result = Cli::try_parse_from(["tunescope", "cat", "--scope", "podcasts"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_print_mode() {
        let cli = Cli::try_parse_from(["tunescope", "--print", "cat", "-s", "apps"]).unwrap();
        assert!(cli.print);
        assert_eq!(cli.scope, SearchScope::Apps);
    }

    #[test]
    fn test_build_browser_shares_one_client() {
        let browser = build_browser(&Config::default()).unwrap();
        assert!(browser.store().is_empty());
        assert!(browser.is_idle());
    }

    #[test]
    fn test_write_grouping() {
        let mut store = ResultStore::new();
        let mut podcast = StoreItem::new(3, "Cat Talk", "Host", "podcast");
        podcast.origin = Some(MediaKind::Music);
        store.replace_all(vec![
            StoreItem::new(1, "Cat App", "Dev", "software"),
            podcast,
            StoreItem::new(2, "Cats", "Director", "feature-movie"),
        ]);

        let mut out = Vec::new();
        write_grouping(&mut out, &store).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Movies (1)");
        assert!(lines[1].ends_with("2  Cats / Director"));
        assert_eq!(lines[2], "Music (1)");
        assert_eq!(lines[4], "Apps (1)");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_write_grouping_empty() {
        let mut out = Vec::new();
        write_grouping(&mut out, &ResultStore::new()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No results\n");
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = std::env::temp_dir().join(format!("tunescope_log_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("tunescope.log");
        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
