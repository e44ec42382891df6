//! Query resolution

use crate::model::Blob;
use crate::store::{hop_spine, IndexStore};

/// All blobs visible at `commit`, optionally restricted to those defining
/// `symbol`.
///
/// Builds the commit's hop spine and delegates the set predicates to the
/// store. A commit that was never indexed has a one-element spine and
/// resolves to an empty result.
pub fn search<S: IndexStore>(
    store: &S,
    commit: &str,
    symbol: Option<&str>,
) -> crate::Result<Vec<Blob>> {
    let spine = hop_spine(store, commit)?;
    store.search(&spine, symbol)
}
