//! Resource reference resolution for GcpMon.
//!
//! Provides the deterministic fuzzy resolver that maps an operator's free-text
//! reference onto known identifiers, and the `ResourceCatalog` that holds the
//! latest listing per resource kind as atomically swapped snapshots.

pub mod catalog;
pub mod fuzzy;

pub use catalog::{CatalogSource, CatalogWrite, ResourceCatalog};
pub use fuzzy::{ACCEPT_THRESHOLD, DEFINITE_MARGIN, FuzzyResolver, normalize_reference};
