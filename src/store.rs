// Copyright 2025 Tomoki Hayashi
// MIT License (https://opensource.org/licenses/MIT)

//! Result presentation model.
//!
//! `ResultStore` owns the result set and its section grouping. It has exactly
//! three mutators (`replace_all`, `append_and_resection`, `patch_single_item`);
//! each one recomputes the snapshot and publishes a `StoreChange` carrying the
//! old and new snapshots so views can diff and animate only what changed.
//!
//! The store is not `Sync`; it lives on the coordinating thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::model::{ItemId, ItemPatch, StoreItem};
use crate::scope::MediaKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub kind: MediaKind,
    pub ids: Vec<ItemId>,
}

impl Section {
    pub fn title(&self) -> &'static str {
        self.kind.title()
    }
}

/// Section grouping: non-empty buckets in fixed Movies, Music, Apps, Books order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub sections: Vec<Section>,
}

impl Snapshot {
    /// Group items by media kind. Items keep their relative order within a bucket.
    pub fn group(items: &[StoreItem]) -> Self {
        let mut buckets: [Vec<ItemId>; 4] = Default::default();
        for item in items {
            if let Some(kind) = item.media_kind() {
                buckets[kind as usize].push(item.id);
            }
        }
        let sections = MediaKind::ALL
            .into_iter()
            .zip(buckets)
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(kind, ids)| Section { kind, ids })
            .collect();
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.ids.len()).sum()
    }

    #[cfg(test)]
    pub fn section(&self, kind: MediaKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    #[cfg(test)]
    pub fn titles(&self) -> Vec<&'static str> {
        self.sections.iter().map(Section::title).collect()
    }

    fn ids(&self) -> HashSet<ItemId> {
        self.sections.iter().flat_map(|s| s.ids.iter().copied()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Replaced,
    Appended(Vec<ItemId>),
    Patched(ItemId),
}

/// Published after every mutation.
#[derive(Clone, Debug)]
pub struct StoreChange {
    pub old: Arc<Snapshot>,
    pub new: Arc<Snapshot>,
    pub kind: ChangeKind,
}

impl StoreChange {
    pub fn diff(&self) -> SnapshotDiff {
        let mut diff = SnapshotDiff::between(&self.old, &self.new);
        if let ChangeKind::Patched(id) = self.kind {
            diff.reconfigured.push(id);
        }
        diff
    }
}

/// Minimal difference between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub inserted_sections: Vec<MediaKind>,
    pub removed_sections: Vec<MediaKind>,
    pub inserted_items: Vec<ItemId>,
    pub removed_items: Vec<ItemId>,
    pub reconfigured: Vec<ItemId>,
}

impl SnapshotDiff {
    pub fn between(old: &Snapshot, new: &Snapshot) -> Self {
        let old_kinds: Vec<MediaKind> = old.sections.iter().map(|s| s.kind).collect();
        let new_kinds: Vec<MediaKind> = new.sections.iter().map(|s| s.kind).collect();
        let old_ids = old.ids();
        let new_ids = new.ids();

        Self {
            inserted_sections: new_kinds
                .iter()
                .copied()
                .filter(|k| !old_kinds.contains(k))
                .collect(),
            removed_sections: old_kinds
                .iter()
                .copied()
                .filter(|k| !new_kinds.contains(k))
                .collect(),
            inserted_items: ordered_ids(new, |id| !old_ids.contains(id)),
            removed_items: ordered_ids(old, |id| !new_ids.contains(id)),
            reconfigured: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted_sections.is_empty()
            && self.removed_sections.is_empty()
            && self.inserted_items.is_empty()
            && self.removed_items.is_empty()
            && self.reconfigured.is_empty()
    }
}

fn ordered_ids(snapshot: &Snapshot, keep: impl Fn(&ItemId) -> bool) -> Vec<ItemId> {
    snapshot
        .sections
        .iter()
        .flat_map(|s| s.ids.iter().copied())
        .filter(|id| keep(id))
        .collect()
}

#[derive(Default)]
pub struct ResultStore {
    items: Vec<StoreItem>,
    index: HashMap<ItemId, usize>,
    snapshot: Arc<Snapshot>,
    subscribers: Vec<Sender<StoreChange>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view. Dropping the receiver unsubscribes it.
    pub fn subscribe(&mut self) -> Receiver<StoreChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    #[cfg(test)]
    pub fn items(&self) -> &[StoreItem] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&StoreItem> {
        self.index.get(&id).map(|&i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the whole result set.
    pub fn replace_all(&mut self, items: Vec<StoreItem>) {
        self.items.clear();
        self.index.clear();
        self.insert_or_update(items);
        self.publish(ChangeKind::Replaced);
    }

    /// Append a batch (one scope's results) and regroup.
    /// An item whose id is already present overwrites it in place.
    pub fn append_and_resection(&mut self, items: Vec<StoreItem>) {
        let ids = self.insert_or_update(items);
        self.publish(ChangeKind::Appended(ids));
    }

    /// Patch one entry. Returns `false` if the id is not in the result set.
    pub fn patch_single_item(&mut self, id: ItemId, patch: ItemPatch) -> bool {
        let Some(&i) = self.index.get(&id) else {
            return false;
        };
        if patch.is_empty() {
            return true;
        }
        patch.apply(&mut self.items[i]);
        self.publish(ChangeKind::Patched(id));
        true
    }

    fn insert_or_update(&mut self, items: Vec<StoreItem>) -> Vec<ItemId> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = item.id;
            match self.index.get(&id) {
                Some(&i) => self.items[i] = item,
                None => {
                    self.index.insert(id, self.items.len());
                    self.items.push(item);
                }
            }
            ids.push(id);
        }
        ids
    }

    fn publish(&mut self, kind: ChangeKind) {
        let old = std::mem::replace(&mut self.snapshot, Arc::new(Snapshot::group(&self.items)));
        let change = StoreChange {
            old,
            new: Arc::clone(&self.snapshot),
            kind,
        };
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}
