//! Benchmark utilities.

use folio_core::{Commit, CoreResult};
use folio_testkit::TestPage;
use rand::Rng;
use std::collections::BTreeMap;

/// Generate random value bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate the key of entry `index`. Keys sort in index order.
pub fn key(index: usize) -> Vec<u8> {
    format!("key{index:08}").into_bytes()
}

/// Generate page contents of `count` keys with values of `value_size` bytes.
pub fn generate_contents(count: usize, value_size: usize) -> BTreeMap<Vec<u8>, Vec<u8>> {
    (0..count)
        .map(|i| (key(i), random_data(value_size)))
        .collect()
}

/// Adds two branches of `depth` commits each on top of the initial commit
/// of `page` and returns their tips.
///
/// The commits carry no content changes, so the history is built without
/// touching any tree.
///
/// # Errors
///
/// Returns the store's error if the commits are rejected.
pub fn forked_history(page: &TestPage, depth: usize) -> CoreResult<(Commit, Commit)> {
    let initial = page.initial();
    let mut commits = Vec::with_capacity(depth * 2);
    let mut tips = Vec::with_capacity(2);
    let mut timestamp = 0;
    for _ in 0..2 {
        let mut tip = initial.clone();
        for _ in 0..depth {
            timestamp += 1;
            tip = Commit::new(&tip, initial.root_id(), timestamp)?;
            commits.push(tip.clone());
        }
        tips.push(tip);
    }
    page.run(move |graph| graph.add_commits_from_sync(commits))?;
    let right = tips.pop().unwrap_or_else(|| initial.clone());
    let left = tips.pop().unwrap_or(initial);
    Ok((left, right))
}
