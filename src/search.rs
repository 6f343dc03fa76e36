// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Scoped search fan-out.
//!
//! `start` issues one job per concrete media kind on a rayon pool. Each job
//! reports exactly once over a channel, as soon as it finishes, so partial
//! results can be merged progressively. A generation epoch is bumped on every
//! start/cancel; jobs of an older generation skip the request if they have not
//! begun and report `Cancelled` if they were superseded while waiting on I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use log::debug;

use crate::gateway::{FetchError, SearchGateway, SearchQuery};
use crate::model::StoreItem;
use crate::scope::{MediaKind, SearchScope};

/// Generation counter. Incremented to invalidate in-flight searches.
struct SearchEpoch(AtomicU64);

impl SearchEpoch {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// The term/scope/generation a search was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchTicket {
    pub generation: u64,
    pub term: String,
    pub scope: SearchScope,
}

/// Why a completed scope result was not merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// A newer search was started or the search was cancelled.
    Superseded,
    TermChanged,
    ScopeChanged,
}

impl SearchTicket {
    /// Staleness check against the live generation, term, and scope.
    pub fn stale_reason(
        &self,
        generation: u64,
        term: &str,
        scope: SearchScope,
        kind: MediaKind,
    ) -> Option<StaleReason> {
        if self.generation != generation {
            Some(StaleReason::Superseded)
        } else if self.term != term.trim() {
            Some(StaleReason::TermChanged)
        } else if !scope.accepts(kind) {
            Some(StaleReason::ScopeChanged)
        } else {
            None
        }
    }
}

/// One scope's contribution to a search.
pub struct ScopeResult {
    pub ticket: SearchTicket,
    pub kind: MediaKind,
    pub outcome: Result<Vec<StoreItem>, FetchError>,
}

pub struct SearchWorker {
    gateway: Arc<dyn SearchGateway>,
    pool: rayon::ThreadPool,
    epoch: Arc<SearchEpoch>,
    limit: u32,
    result_tx: Sender<ScopeResult>,
    result_rx: Receiver<ScopeResult>,
    in_flight: usize,
}

impl SearchWorker {
    pub fn new(gateway: Arc<dyn SearchGateway>, threads: usize, limit: u32) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("search-{i}"))
            .build()?;
        let (result_tx, result_rx) = mpsc::channel();
        Ok(Self {
            gateway,
            pool,
            epoch: Arc::new(SearchEpoch::new()),
            limit,
            result_tx,
            result_rx,
            in_flight: 0,
        })
    }

    /// Start a new search, superseding any live one.
    pub fn start(&mut self, term: &str, scope: SearchScope) -> SearchTicket {
        let generation = self.epoch.increment();
        let ticket = SearchTicket {
            generation,
            term: term.trim().to_string(),
            scope,
        };
        for kind in scope.kinds() {
            let query = SearchQuery::new(ticket.term.clone(), kind, self.limit);
            let ticket = ticket.clone();
            let gateway = Arc::clone(&self.gateway);
            let epoch = Arc::clone(&self.epoch);
            let result_tx = self.result_tx.clone();
            self.in_flight += 1;
            self.pool.spawn(move || {
                let outcome = if epoch.current() != generation {
                    Err(FetchError::Cancelled)
                } else {
                    let fetched = gateway.fetch_items(&query);
                    if epoch.current() != generation {
                        Err(FetchError::Cancelled)
                    } else {
                        fetched
                    }
                };
                let _ = result_tx.send(ScopeResult {
                    ticket,
                    kind,
                    outcome,
                });
            });
        }
        debug!(
            "search #{generation} started: term={:?} scope={}",
            ticket.term,
            scope.title()
        );
        ticket
    }

    /// Invalidate the live search. Jobs still running report `Cancelled`.
    pub fn cancel(&mut self) {
        let generation = self.epoch.increment();
        debug!("search generation advanced to #{generation} by cancel");
    }

    pub fn generation(&self) -> u64 {
        self.epoch.current()
    }

    pub fn is_current(&self, ticket: &SearchTicket) -> bool {
        ticket.generation == self.epoch.current()
    }

    pub fn try_recv(&mut self) -> Option<ScopeResult> {
        let result = self.result_rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(result)
    }

    /// Jobs spawned but not yet received, including superseded ones.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
