//! Multi-device sync simulation.
//!
//! Stands in for the sync layer: commits one page lacks are copied from
//! another together with every object their trees reach, then added as
//! commits received from sync.

use crate::fixtures::TestPage;
use folio_btree::get_object_ids;
use folio_core::{Commit, CoreResult};
use std::collections::BTreeSet;
use tracing::debug;

/// Copies every commit of `from` that `to` lacks, with the objects those
/// commits reach. Returns the number of commits copied.
///
/// Commits are sent parents first, as the sync layer does. The resolver of
/// `to` is notified but not driven; call [`TestPage::settle`] afterwards.
///
/// # Errors
///
/// Returns the first error reading from `from` or writing to `to`.
pub fn sync_commits(from: &TestPage, to: &TestPage) -> CoreResult<usize> {
    let missing: Vec<Commit> = from
        .store
        .commits()
        .into_iter()
        .filter(|commit| !to.store.contains_commit(&commit.id()))
        .collect();
    if missing.is_empty() {
        return Ok(0);
    }

    let roots: Vec<_> = missing.iter().map(Commit::root_id).collect();
    let objects = from.run(move |graph| -> CoreResult<BTreeSet<_>> {
        let storage = graph.storage();
        let mut reachable = BTreeSet::new();
        for root in roots {
            reachable.extend(get_object_ids(&storage, root)?);
        }
        Ok(reachable)
    })?;

    let mut copied = 0;
    for id in objects {
        if !to.store.objects().contains(&id) {
            let bytes = from.store.objects().get(&id)?;
            to.store.objects().put(&bytes)?;
            copied += 1;
        }
    }

    let count = missing.len();
    debug!(commits = count, objects = copied, "synced page");
    to.run(move |graph| graph.add_commits_from_sync(missing))?;
    Ok(count)
}

/// Syncs every ordered pair of `pages` once, then settles each page.
/// Repeats until a full round copies nothing. Returns the number of rounds
/// that copied something.
///
/// # Errors
///
/// Returns the first sync error.
pub fn sync_until_stable(pages: &[&TestPage]) -> CoreResult<usize> {
    let mut rounds = 0;
    loop {
        let mut copied = 0;
        for from in pages {
            for to in pages {
                if !std::ptr::eq(*from, *to) {
                    copied += sync_commits(from, to)?;
                }
            }
        }
        for page in pages {
            page.settle();
        }
        if copied == 0 {
            return Ok(rounds);
        }
        rounds += 1;
    }
}
