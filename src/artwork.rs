// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Artwork fetching and lazy per-position loading.
//!
//! - `ArtworkCache`: LRU of decoded thumbnails keyed by URL
//! - `ArtworkGateway`: fetch bytes → decode → shrink → cache
//! - `ArtworkLoader`: tracks at most one in-flight load per on-screen slot,
//!   shares one fetch between slots showing the same URL, and runs fetches on
//!   a dedicated rayon pool
//!
//! Loads are cancelled cooperatively: each fetch carries a flag the worker
//! checks before fetching, and the coordinator only applies a completion to
//! slots whose token is still the one recorded for them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::gateway::{FetchError, ImageSource};
use crate::model::{Artwork, ItemId, StoreItem};

/// LRU cache of decoded artwork.
struct ArtworkCache {
    cache: HashMap<String, Arc<DynamicImage>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ArtworkCache {
    fn new(capacity: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn touch(&mut self, key: &str) {
        if !matches!(self.order.back(), Some(k) if k == key) {
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<DynamicImage>> {
        let img = Arc::clone(self.cache.get(key)?);
        self.touch(key);
        Some(img)
    }

    fn insert(&mut self, key: String, img: Arc<DynamicImage>) {
        if self.cache.contains_key(&key) {
            self.touch(&key);
            self.cache.insert(key, img);
            return;
        }
        if self.cache.len() >= self.capacity {
            // Evict oldest
            if let Some(oldest) = self.order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.cache.insert(key, img);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cache.len()
    }
}

/// Shrink-only target size that fits `orig` inside a `max`×`max` box.
pub fn thumbnail_target(orig: (u32, u32), max: u32) -> (u32, u32) {
    let (orig_w, orig_h) = orig;
    if orig_w <= max && orig_h <= max {
        return (orig_w, orig_h);
    }
    let scale = (max as f64 / orig_w as f64).min(max as f64 / orig_h as f64);
    (
        (orig_w as f64 * scale).floor().max(1.0) as u32,
        (orig_h as f64 * scale).floor().max(1.0) as u32,
    )
}

/// Neutral grey square shown until real artwork arrives.
pub fn placeholder_image(size: u32) -> Arc<DynamicImage> {
    let size = size.max(1);
    Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        size,
        size,
        Rgba([96, 96, 96, 255]),
    )))
}

/// Image fetch gateway with an in-memory cache keyed by URL.
pub struct ArtworkGateway {
    source: Arc<dyn ImageSource>,
    cache: Mutex<ArtworkCache>,
    thumbnail_size: u32,
    filter: FilterType,
}

impl ArtworkGateway {
    pub fn new(
        source: Arc<dyn ImageSource>,
        cache_size: usize,
        thumbnail_size: u32,
        filter: FilterType,
    ) -> Self {
        Self {
            source,
            cache: Mutex::new(ArtworkCache::new(cache_size)),
            thumbnail_size,
            filter,
        }
    }

    fn cached(&self, url: &str) -> Option<Arc<DynamicImage>> {
        // A poisoned cache is still a valid cache; recover the guard.
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(url)
    }

    /// Cached artwork for `url`, if any. Never performs I/O.
    pub fn get_cached(&self, url: &str) -> Option<Artwork> {
        self.cached(url).map(|image| Artwork {
            url: url.to_string(),
            image,
        })
    }

    /// Cached image for `url`, or `placeholder` if it has not been loaded yet.
    pub fn cached_or(&self, url: &str, placeholder: &Arc<DynamicImage>) -> Arc<DynamicImage> {
        self.cached(url).unwrap_or_else(|| Arc::clone(placeholder))
    }

    /// Fetch, decode and cache. Cache hits skip the network.
    pub fn fetch_image(&self, url: &str) -> Result<Artwork, FetchError> {
        if let Some(artwork) = self.get_cached(url) {
            return Ok(artwork);
        }
        let bytes = self.source.fetch_bytes(url)?;
        let image = Arc::new(self.decode(&bytes)?);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Arc::clone(&image));
        Ok(Artwork {
            url: url.to_string(),
            image,
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, FetchError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        let (w, h) = thumbnail_target((decoded.width(), decoded.height()), self.thumbnail_size);
        if (w, h) == (decoded.width(), decoded.height()) {
            Ok(decoded)
        } else {
            Ok(decoded.resize(w, h, self.filter))
        }
    }

    #[cfg(test)]
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Which presentation a slot belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LayoutMode {
    #[default]
    List,
    Grid,
}

impl LayoutMode {
    pub fn toggle(self) -> Self {
        match self {
            LayoutMode::List => LayoutMode::Grid,
            LayoutMode::Grid => LayoutMode::List,
        }
    }
}

/// An on-screen position: the (section, row) index path within one layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub layout: LayoutMode,
    pub section: usize,
    pub row: usize,
}

impl SlotKey {
    pub fn new(layout: LayoutMode, section: usize, row: usize) -> Self {
        Self {
            layout,
            section,
            row,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ArtworkState {
    /// No artwork URL, or the load failed; show the placeholder.
    Placeholder,
    Loading,
    Ready(Artwork),
}

/// The load a slot is waiting on.
struct SlotLoad {
    token: u64,
    item: ItemId,
    url: String,
}

/// One network fetch, shared by every slot showing the same URL.
struct PendingFetch {
    id: u64,
    cancelled: Arc<AtomicBool>,
    waiters: Vec<(SlotKey, u64)>,
}

/// Completion of one artwork fetch.
pub struct ArtworkResult {
    pub url: String,
    fetch: u64,
    pub outcome: Result<Artwork, FetchError>,
}

/// Lazy image load coordinator. Owned by the coordinating thread.
pub struct ArtworkLoader {
    gateway: Arc<ArtworkGateway>,
    pool: rayon::ThreadPool,
    slots: HashMap<SlotKey, SlotLoad>,
    pending: HashMap<String, PendingFetch>,
    // URLs that failed since the last full replacement; not retried
    failed: HashSet<String>,
    next_token: u64,
    result_tx: Sender<ArtworkResult>,
    result_rx: Receiver<ArtworkResult>,
    in_flight: usize,
}

impl ArtworkLoader {
    pub fn new(gateway: Arc<ArtworkGateway>, threads: usize) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("artwork-{i}"))
            .build()?;
        let (result_tx, result_rx) = mpsc::channel();
        Ok(Self {
            gateway,
            pool,
            slots: HashMap::new(),
            pending: HashMap::new(),
            failed: HashSet::new(),
            next_token: 0,
            result_tx,
            result_rx,
            in_flight: 0,
        })
    }

    pub fn gateway(&self) -> &Arc<ArtworkGateway> {
        &self.gateway
    }

    /// Make sure `item`'s artwork is loading for `slot`.
    ///
    /// A slot holds at most one load. Asking again for the item already in
    /// flight is a no-op; asking for a different item cancels the old load.
    /// Slots showing the same URL share one fetch, and a URL that failed stays
    /// a placeholder until `cancel_all`.
    pub fn load_image_if_needed(&mut self, slot: SlotKey, item: &StoreItem) -> ArtworkState {
        if let Some(artwork) = &item.artwork {
            self.release(slot);
            return ArtworkState::Ready(artwork.clone());
        }
        let Some(url) = item.artwork_url.clone() else {
            self.release(slot);
            return ArtworkState::Placeholder;
        };
        if let Some(artwork) = self.gateway.get_cached(&url) {
            self.release(slot);
            return ArtworkState::Ready(artwork);
        }
        if self.failed.contains(&url) {
            self.release(slot);
            return ArtworkState::Placeholder;
        }
        if self.slots.get(&slot).is_some_and(|l| l.item == item.id) {
            return ArtworkState::Loading;
        }
        let previous = self.detach(slot);

        self.next_token += 1;
        let token = self.next_token;
        self.slots.insert(
            slot,
            SlotLoad {
                token,
                item: item.id,
                url: url.clone(),
            },
        );
        match self.pending.get_mut(&url) {
            Some(fetch) => fetch.waiters.push((slot, token)),
            None => self.spawn(url, slot, token),
        }

        if let Some(old_url) = previous {
            self.prune(&old_url);
        }
        ArtworkState::Loading
    }

    fn spawn(&mut self, url: String, slot: SlotKey, token: u64) {
        self.next_token += 1;
        let id = self.next_token;
        let cancelled = Arc::new(AtomicBool::new(false));
        self.pending.insert(
            url.clone(),
            PendingFetch {
                id,
                cancelled: Arc::clone(&cancelled),
                waiters: vec![(slot, token)],
            },
        );
        self.in_flight += 1;

        let gateway = Arc::clone(&self.gateway);
        let result_tx = self.result_tx.clone();
        self.pool.spawn(move || {
            let outcome = if cancelled.load(Ordering::SeqCst) {
                Err(FetchError::Cancelled)
            } else {
                gateway.fetch_image(&url)
            };
            let _ = result_tx.send(ArtworkResult {
                url,
                fetch: id,
                outcome,
            });
        });
    }

    /// Forget `slot`'s load without touching the shared fetch. Returns its URL.
    fn detach(&mut self, slot: SlotKey) -> Option<String> {
        let old = self.slots.remove(&slot)?;
        if let Some(fetch) = self.pending.get_mut(&old.url) {
            fetch.waiters.retain(|&(s, t)| !(s == slot && t == old.token));
        }
        Some(old.url)
    }

    /// Cancel the fetch for `url` once no slot waits on it.
    fn prune(&mut self, url: &str) {
        if self.pending.get(url).is_some_and(|f| f.waiters.is_empty())
            && let Some(fetch) = self.pending.remove(url)
        {
            fetch.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Cancel the load recorded for `slot`, if any.
    pub fn release(&mut self, slot: SlotKey) {
        if let Some(url) = self.detach(slot) {
            self.prune(&url);
        }
    }

    /// Cancel every in-flight load (full result replacement).
    pub fn cancel_all(&mut self) {
        self.slots.clear();
        for (_, fetch) in self.pending.drain() {
            fetch.cancelled.store(true, Ordering::SeqCst);
        }
        self.failed.clear();
    }

    /// Slots and items still waiting on `result`, in request order.
    ///
    /// Empty if the fetch was superseded. Clears the accepted slots and
    /// remembers a failed URL so it is not fetched again.
    pub fn accept(&mut self, result: &ArtworkResult) -> Vec<(SlotKey, ItemId)> {
        if self.pending.get(&result.url).is_none_or(|f| f.id != result.fetch) {
            return Vec::new();
        }
        let Some(fetch) = self.pending.remove(&result.url) else {
            return Vec::new();
        };
        if matches!(&result.outcome, Err(e) if !e.is_cancelled()) {
            self.failed.insert(result.url.clone());
        }
        let mut accepted = Vec::with_capacity(fetch.waiters.len());
        for (slot, token) in fetch.waiters {
            if self.slots.get(&slot).is_some_and(|l| l.token == token)
                && let Some(load) = self.slots.remove(&slot)
            {
                accepted.push((slot, load.item));
            }
        }
        accepted
    }

    pub fn try_recv(&mut self) -> Option<ArtworkResult> {
        let result = self.result_rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(result)
    }

    /// Fetches spawned but not yet received, including superseded ones.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Slots with a live (not superseded) load.
    #[cfg(test)]
    pub fn active_slots(&self) -> usize {
        self.slots.len()
    }
}
