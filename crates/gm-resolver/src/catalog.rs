//! Latest known identifiers per resource kind.
//!
//! Each kind holds an immutable `Vec` behind an `ArcSwap`. Readers take a
//! snapshot without locking; writers build the new listing off to the side
//! and swap it in whole, so a reader sees either the old or the new set.
//!
//! Writes to one kind go through a single writer lock and are ordered by
//! [`CatalogWrite`] tickets taken before the listing request is issued. A
//! listing older than the installed one is discarded, so the last-issued
//! listing wins regardless of which request returns first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;

use gm_protocol::{MatchResult, QueryResult, ResourceIdentifier, ResourceKind};

use crate::fuzzy::FuzzyResolver;

/// External listing call backing the catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Enumerate every known resource of `kind`, in backend order.
    async fn list_resources(&self, kind: ResourceKind) -> QueryResult<Vec<ResourceIdentifier>>;
}

/// Ordering ticket for one catalog write. Take it with
/// [`ResourceCatalog::issue`] before sending the listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogWrite {
    kind: ResourceKind,
    generation: u64,
}

impl CatalogWrite {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

struct Slot {
    snapshot: ArcSwap<Vec<ResourceIdentifier>>,
    issued: AtomicU64,
    /// Generation of the installed snapshot.
    writer: Mutex<u64>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            issued: AtomicU64::new(0),
            writer: Mutex::new(0),
        }
    }

    /// Caller holds the slot's writer lock.
    fn store(
        &self,
        installed: &mut u64,
        ticket: CatalogWrite,
        listing: Vec<ResourceIdentifier>,
    ) -> Arc<Vec<ResourceIdentifier>> {
        let kind = ticket.kind;
        if ticket.generation <= *installed {
            tracing::debug!(
                kind = %kind,
                generation = ticket.generation,
                installed = *installed,
                "discarding listing older than installed snapshot"
            );
            return self.snapshot.load_full();
        }
        let before = listing.len();
        let listing: Vec<_> = listing.into_iter().filter(|r| r.kind == kind).collect();
        if listing.len() != before {
            tracing::warn!(
                kind = %kind,
                dropped = before - listing.len(),
                "dropped identifiers of another kind from catalog listing"
            );
        }
        let snapshot = Arc::new(listing);
        self.snapshot.store(Arc::clone(&snapshot));
        *installed = ticket.generation;
        tracing::debug!(kind = %kind, count = snapshot.len(), "catalog snapshot installed");
        snapshot
    }
}

/// In-memory snapshot of known identifiers, rebuilt from scratch on restart.
pub struct ResourceCatalog {
    slots: [Slot; 4],
    resolver: FuzzyResolver,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::with_resolver(FuzzyResolver::default())
    }

    pub fn with_resolver(resolver: FuzzyResolver) -> Self {
        Self {
            slots: [Slot::empty(), Slot::empty(), Slot::empty(), Slot::empty()],
            resolver,
        }
    }

    fn slot(&self, kind: ResourceKind) -> &Slot {
        &self.slots[kind.index()]
    }

    /// Current snapshot for `kind`. Never blocks on a write in progress.
    pub fn snapshot(&self, kind: ResourceKind) -> Arc<Vec<ResourceIdentifier>> {
        self.slot(kind).snapshot.load_full()
    }

    pub fn is_empty(&self, kind: ResourceKind) -> bool {
        self.slot(kind).snapshot.load().is_empty()
    }

    /// Reserve the next write position for `kind`.
    pub fn issue(&self, kind: ResourceKind) -> CatalogWrite {
        let generation = self.slot(kind).issued.fetch_add(1, Ordering::SeqCst) + 1;
        CatalogWrite { kind, generation }
    }

    /// Install a listing fetched elsewhere and return the resulting snapshot.
    ///
    /// Entries of another kind are dropped. If a later-issued listing is
    /// already installed, this one is discarded.
    pub async fn install(
        &self,
        ticket: CatalogWrite,
        listing: Vec<ResourceIdentifier>,
    ) -> Arc<Vec<ResourceIdentifier>> {
        let slot = self.slot(ticket.kind);
        let mut installed = slot.writer.lock().await;
        slot.store(&mut installed, ticket, listing)
    }

    /// Fetch a listing from `source` without touching the cached snapshot.
    pub async fn list(
        &self,
        kind: ResourceKind,
        source: &dyn CatalogSource,
    ) -> QueryResult<Vec<ResourceIdentifier>> {
        source.list_resources(kind).await
    }

    /// Re-issue the listing call and atomically replace the snapshot.
    ///
    /// Holds the writer lock for the whole call. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh(
        &self,
        kind: ResourceKind,
        source: &dyn CatalogSource,
    ) -> QueryResult<Arc<Vec<ResourceIdentifier>>> {
        let slot = self.slot(kind);
        let mut installed = slot.writer.lock().await;
        let ticket = self.issue(kind);
        let listing = source.list_resources(kind).await?;
        Ok(slot.store(&mut installed, ticket, listing))
    }

    /// Exact identifier lookup in the current snapshot.
    pub fn lookup(&self, kind: ResourceKind, id: &str) -> Option<ResourceIdentifier> {
        self.slot(kind)
            .snapshot
            .load()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Resolve free text against the current snapshot for `kind`.
    pub fn resolve(&self, kind: ResourceKind, text: &str) -> MatchResult {
        let snapshot = self.snapshot(kind);
        self.resolver.resolve(text, &snapshot)
    }
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::new()
    }
}
