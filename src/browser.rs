// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Single owner of all search and presentation state.
//!
//! The `Browser` lives on the coordinating thread. Network work runs on the
//! search and artwork pools and comes back over channels, drained by `poll`.
//! Every mutation of the result store therefore happens here, one at a time.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use image::DynamicImage;
use log::{debug, info, warn};

use crate::artwork::{ArtworkGateway, ArtworkLoader, ArtworkState, SlotKey, placeholder_image};
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::gateway::{ImageSource, SearchGateway};
use crate::model::{ItemId, ItemPatch, StoreItem};
use crate::scope::SearchScope;
use crate::search::{ScopeResult, SearchTicket, SearchWorker};
use crate::store::{ResultStore, StoreChange};

/// Live search input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    pub term: String,
    pub scope: SearchScope,
}

pub struct Browser {
    live: Query,
    debouncer: Debouncer<Query>,
    search: SearchWorker,
    ticket: Option<SearchTicket>,
    store: ResultStore,
    artwork: ArtworkLoader,
    placeholder: Arc<DynamicImage>,
}

impl Browser {
    pub fn new(
        config: &Config,
        search: Arc<dyn SearchGateway>,
        images: Arc<dyn ImageSource>,
    ) -> anyhow::Result<Self> {
        let gateway = Arc::new(ArtworkGateway::new(
            images,
            config.artwork_cache_size,
            config.thumbnail_size,
            config.filter(),
        ));
        Ok(Self {
            live: Query::default(),
            debouncer: Debouncer::new(config.debounce()),
            search: SearchWorker::new(search, config.search_threads, config.result_limit)?,
            ticket: None,
            store: ResultStore::new(),
            artwork: ArtworkLoader::new(gateway, config.image_threads)?,
            placeholder: placeholder_image(config.thumbnail_size.min(64)),
        })
    }

    pub fn live(&self) -> &Query {
        &self.live
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn subscribe(&mut self) -> Receiver<StoreChange> {
        self.store.subscribe()
    }

    /// Record new input and (re)start the quiet interval.
    pub fn on_query_changed(&mut self, term: &str, scope: SearchScope, now: Instant) {
        self.live = Query {
            term: term.to_string(),
            scope,
        };
        self.debouncer.schedule(self.live.clone(), now);
    }

    /// Start a search for the live term and scope right away.
    pub fn trigger_search(&mut self) {
        self.debouncer.cancel();
        self.artwork.cancel_all();

        let term = self.live.term.trim();
        if term.is_empty() {
            self.search.cancel();
            self.ticket = None;
            self.store.replace_all(Vec::new());
            debug!("empty term: results cleared");
            return;
        }

        self.store.replace_all(Vec::new());
        let ticket = self.search.start(term, self.live.scope);
        info!(
            "searching {:?} in {}",
            ticket.term,
            ticket.scope.title()
        );
        self.ticket = Some(ticket);
    }

    /// Drain the debouncer and both worker channels. Returns true if the store changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;

        if self.debouncer.take_ready(now).is_some() {
            self.trigger_search();
            changed = true;
        }

        while let Some(result) = self.search.try_recv() {
            changed |= self.merge(result);
        }
        if self.search.in_flight() == 0
            && let Some(ticket) = self.ticket.take()
            && self.search.is_current(&ticket)
        {
            info!(
                "search {:?} done: {} items in {} sections",
                ticket.term,
                self.store.len(),
                self.store.snapshot().sections.len()
            );
        }

        while let Some(result) = self.artwork.try_recv() {
            let waiting = self.artwork.accept(&result);
            if waiting.is_empty() {
                debug!("artwork {} superseded", result.url);
                continue;
            }
            match &result.outcome {
                Ok(artwork) => {
                    debug!("artwork {} loaded for {} slots", artwork.url, waiting.len());
                    for (_, item) in waiting {
                        // List and grid slots may wait on the same item
                        let patched = self.store.item(item).is_some_and(|i| {
                            i.artwork.as_ref().is_some_and(|a| a.same_pixels(artwork))
                        });
                        if patched {
                            continue;
                        }
                        changed |= self
                            .store
                            .patch_single_item(item, ItemPatch::artwork(artwork.clone()));
                    }
                }
                Err(e) if e.is_cancelled() => debug!("artwork {} cancelled", result.url),
                Err(e) => warn!("artwork {} failed: {e}", result.url),
            }
        }

        changed
    }

    fn merge(&mut self, result: ScopeResult) -> bool {
        let ScopeResult {
            ticket,
            kind,
            outcome,
        } = result;
        let mut items = match outcome {
            Ok(items) => items,
            Err(e) if e.is_cancelled() => {
                debug!("{} fetch for {:?} cancelled", kind.title(), ticket.term);
                return false;
            }
            Err(e) => {
                warn!("{} fetch for {:?} failed: {e}", kind.title(), ticket.term);
                return false;
            }
        };
        if let Some(reason) =
            ticket.stale_reason(self.search.generation(), &self.live.term, self.live.scope, kind)
        {
            debug!(
                "discarding {} results for {:?}: {reason:?}",
                kind.title(),
                ticket.term
            );
            return false;
        }
        for item in &mut items {
            item.origin = Some(kind);
        }
        debug!("{} returned {} items for {:?}", kind.title(), items.len(), ticket.term);
        self.store.append_and_resection(items);
        true
    }

    /// Called when `slot` is about to display item `id`.
    ///
    /// Cached artwork is patched into the store immediately.
    pub fn load_image_if_needed(&mut self, slot: SlotKey, id: ItemId) -> ArtworkState {
        let (state, needs_patch) = {
            let Some(item) = self.store.item(id) else {
                self.artwork.release(slot);
                return ArtworkState::Placeholder;
            };
            let state = self.artwork.load_image_if_needed(slot, item);
            let needs_patch = matches!(
                &state,
                ArtworkState::Ready(art) if item.artwork.as_ref().is_none_or(|a| !a.same_pixels(art))
            );
            (state, needs_patch)
        };
        if needs_patch && let ArtworkState::Ready(art) = &state {
            self.store.patch_single_item(id, ItemPatch::artwork(art.clone()));
        }
        state
    }

    /// Image to draw for `item`: loaded artwork, cached artwork, or the placeholder.
    pub fn artwork_for(&self, item: &StoreItem) -> Arc<DynamicImage> {
        if let Some(artwork) = &item.artwork {
            return Arc::clone(&artwork.image);
        }
        match &item.artwork_url {
            Some(url) => self.artwork.gateway().cached_or(url, &self.placeholder),
            None => Arc::clone(&self.placeholder),
        }
    }

    /// True while any fetch (search or artwork) has not reported back.
    pub fn has_work_in_flight(&self) -> bool {
        self.search.in_flight() > 0 || self.artwork.in_flight() > 0
    }

    pub fn is_idle(&self) -> bool {
        !self.debouncer.is_pending() && !self.has_work_in_flight()
    }

    pub fn is_searching(&self) -> bool {
        self.debouncer.is_pending() || self.search.in_flight() > 0
    }

    /// How long the event loop may sleep before the next debounce deadline.
    pub fn next_wakeup(&self, now: Instant, max: Duration) -> Duration {
        self.debouncer
            .remaining(now)
            .map_or(max, |remaining| remaining.min(max))
    }
}
