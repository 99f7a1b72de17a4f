//! Notification of new commits.
//!
//! The commit graph store notifies its watchers after every addition, in
//! commit order, tagging each batch with where it came from.

use crate::commit::Commit;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Origin of newly added commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    /// Committed on this device.
    Local,
    /// Received from another device.
    Sync,
}

/// Receives new commits from a commit graph store.
pub trait CommitWatcher: Send + Sync {
    /// Called once per addition with the commits that were actually new,
    /// parents before children. Never called with an empty slice.
    fn on_new_commits(&self, commits: &[Commit], source: ChangeSource);
}

/// Registered watchers.
///
/// Watchers are held weakly: dropping a watcher unregisters it.
#[derive(Default)]
pub struct WatcherSet {
    watchers: RwLock<Vec<Weak<dyn CommitWatcher>>>,
}

impl WatcherSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watcher.
    pub fn add(&self, watcher: Weak<dyn CommitWatcher>) {
        self.watchers.write().push(watcher);
    }

    /// Delivers `commits` to every live watcher and forgets dropped ones.
    ///
    /// Must not be called with a store lock held: watchers may call back
    /// into the store.
    pub fn notify(&self, commits: &[Commit], source: ChangeSource) {
        if commits.is_empty() {
            return;
        }
        let live: Vec<Arc<dyn CommitWatcher>> = {
            let mut watchers = self.watchers.write();
            watchers.retain(|watcher| watcher.strong_count() > 0);
            watchers.iter().filter_map(Weak::upgrade).collect()
        };
        for watcher in live {
            watcher.on_new_commits(commits, source);
        }
    }

    /// Returns the number of live watchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watchers
            .read()
            .iter()
            .filter(|watcher| watcher.strong_count() > 0)
            .count()
    }

    /// Returns true if no watcher is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_storage::ObjectId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(usize, ChangeSource)>>);

    impl CommitWatcher for Recorder {
        fn on_new_commits(&self, commits: &[Commit], source: ChangeSource) {
            self.0.lock().push((commits.len(), source));
        }
    }

    fn commit() -> Commit {
        Commit::initial(ObjectId::of(b"empty")).unwrap()
    }

    #[test]
    fn notifies_live_watchers() {
        let set = WatcherSet::new();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn CommitWatcher> = Arc::downgrade(&recorder) as Weak<dyn CommitWatcher>;
        set.add(weak);

        set.notify(&[commit()], ChangeSource::Sync);
        set.notify(&[], ChangeSource::Local);
        assert_eq!(*recorder.0.lock(), vec![(1, ChangeSource::Sync)]);
    }

    #[test]
    fn dropped_watchers_are_forgotten() {
        let set = WatcherSet::new();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn CommitWatcher> = Arc::downgrade(&recorder) as Weak<dyn CommitWatcher>;
        set.add(weak);
        assert_eq!(set.len(), 1);

        drop(recorder);
        set.notify(&[commit()], ChangeSource::Local);
        assert!(set.is_empty());
    }
}
