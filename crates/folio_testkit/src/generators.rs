//! Property-based test generators using proptest.
//!
//! Provides strategies for page contents, change sets and commit histories.
//! Generated change sets are always sorted by key without duplicates, as
//! tree application requires.

use crate::fixtures::TestPage;
use folio_core::Commit;
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::BTreeMap;

/// Strategy for page keys. The alphabet is small so that generated
/// histories touch the same keys often.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f]{1,3}").expect("Invalid regex")
}

/// Strategy for page values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{0,8}").expect("Invalid regex")
}

/// Strategy for whole page contents.
pub fn contents_strategy(max_keys: usize) -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..=max_keys)
}

/// A change to one key: `Some(value)` puts, `None` deletes.
pub type KeyChange = (String, Option<String>);

/// Strategy for change sets sorted by key with no key repeated.
pub fn change_set_strategy(max_changes: usize) -> impl Strategy<Value = Vec<KeyChange>> {
    prop::collection::btree_map(
        key_strategy(),
        prop::option::weighted(0.75, value_strategy()),
        0..=max_changes,
    )
    .prop_map(|changes| changes.into_iter().collect())
}

/// One step of a generated commit history.
///
/// Indices pick among the commits created by earlier steps, the initial
/// commit included.
#[derive(Debug, Clone)]
pub enum HistoryStep {
    /// Commit a change set on top of an earlier commit.
    Commit {
        /// Parent commit
        parent: Index,
        /// Changes to apply
        changes: Vec<KeyChange>,
    },
    /// Merge two earlier commits, keeping the left content.
    Merge {
        /// Left parent
        left: Index,
        /// Right parent
        right: Index,
    },
}

/// Strategy for history steps. Plain commits are three times as likely as
/// merges.
pub fn history_step_strategy() -> impl Strategy<Value = HistoryStep> {
    prop_oneof![
        3 => (any::<Index>(), change_set_strategy(3))
            .prop_map(|(parent, changes)| HistoryStep::Commit { parent, changes }),
        1 => (any::<Index>(), any::<Index>())
            .prop_map(|(left, right)| HistoryStep::Merge { left, right }),
    ]
}

/// Strategy for commit histories of up to `max_steps` steps.
pub fn history_strategy(max_steps: usize) -> impl Strategy<Value = Vec<HistoryStep>> {
    prop::collection::vec(history_step_strategy(), 1..=max_steps)
}

/// Replays `steps` on `page` and returns every commit, starting with the
/// initial one, in creation order.
///
/// A merge whose two indices pick the same commit is skipped. A change set
/// that leaves the parent's content unchanged adds no commit, so the
/// returned list only holds distinct commits.
pub fn build_history(page: &TestPage, steps: &[HistoryStep]) -> Vec<Commit> {
    let mut commits = vec![page.initial()];
    for step in steps {
        let commit = match step {
            HistoryStep::Commit { parent, changes } => {
                let parent = commits[parent.index(commits.len())].clone();
                let puts: Vec<(&str, &str)> = changes
                    .iter()
                    .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
                    .collect();
                let deletes: Vec<&str> = changes
                    .iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(k, _)| k.as_str())
                    .collect();
                page.commit(&parent, &puts, &deletes)
            }
            HistoryStep::Merge { left, right } => {
                let left = &commits[left.index(commits.len())];
                let right = &commits[right.index(commits.len())];
                if left.id() == right.id() {
                    continue;
                }
                page.merge(left, right, &[])
            }
        };
        if commits.iter().all(|known| known.id() != commit.id()) {
            commits.push(commit);
        }
    }
    commits
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 512,
            max_shrink_iters: 5000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
