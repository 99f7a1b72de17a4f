//! The merge resolver: watches a page for divergent heads and merges them.

use crate::ancestor::find_common_ancestor;
use crate::backoff::{BackoffConfig, ExponentialBackoff};
use crate::error::{MergeError, MergeResult};
use crate::strategy::MergeStrategy;
use folio_core::{ChangeSource, Commit, CommitGraphStore, CommitWatcher, SynchronousCommitGraph};
use folio_coroutine::{CoroutineHandler, CoroutineManager, CoroutineService, Dispatcher};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Where the resolver is in its work cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// No pending work.
    Idle,
    /// Listing heads to decide whether a merge is needed.
    CheckingConflicts,
    /// Waiting out a backoff delay before merging merges.
    Delaying,
    /// Finding the common ancestor and running the strategy.
    Merging,
}

/// Whether a re-check may be postponed by the merge storm backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedStatus {
    /// The new commits may themselves be another device's merges.
    MayDelay,
    /// The new commits were made here; merge without waiting.
    DontDelay,
}

impl DelayedStatus {
    /// Folds two pending requests into one. `MayDelay` wins.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        if self == Self::MayDelay || other == Self::MayDelay {
            Self::MayDelay
        } else {
            Self::DontDelay
        }
    }
}

impl From<ChangeSource> for DelayedStatus {
    fn from(source: ChangeSource) -> Self {
        match source {
            ChangeSource::Local => Self::DontDelay,
            ChangeSource::Sync => Self::MayDelay,
        }
    }
}

/// Outcome reported to [`MergeResolver::wait_for_conflict_resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolutionWaitStatus {
    /// The page had a single head; nothing was merged.
    NoConflicts,
    /// Merges were performed before the page reached a single head.
    ConflictsResolved,
}

/// Completion of [`MergeResolver::wait_for_conflict_resolution`].
pub type WaitCallback = Box<dyn FnOnce(ConflictResolutionWaitStatus) + Send + 'static>;

/// Counters of resolver activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Head checks performed.
    pub checks: u64,
    /// Merges computed by the strategy.
    pub merges: u64,
    /// Merges of heads with identical content.
    pub trivial_merges: u64,
    /// Backoff delays started.
    pub delays: u64,
    /// Failed checks or merges.
    pub failures: u64,
}

/// Configuration of a [`MergeResolver`].
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Backoff applied before merging two merge commits from sync.
    pub backoff: BackoffConfig,
}

impl ResolverConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the merge storm backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Result of one pass of the check loop.
enum Step {
    /// A single head remains.
    Resolved,
    /// Several heads, but no strategy to merge them.
    NoStrategy,
    /// Both candidates are merges from sync; wait before merging.
    Delay,
    /// A merge commit was added.
    Merged { trivial: bool, merge_of_merges: bool },
    /// The check or merge failed.
    Failed,
    /// The coroutine was interrupted or the merge cancelled.
    Interrupted,
}

struct Shared {
    state: ResolverState,
    strategy: Option<Arc<dyn MergeStrategy>>,
    strategy_epoch: u64,
    /// Re-check requested while busy.
    pending: Option<DelayedStatus>,
    /// Set when the in-flight merge was cancelled by a strategy change.
    restart: bool,
    closing: bool,
    current: Option<CoroutineHandler>,
    backoff: ExponentialBackoff,
    stats: ResolverStats,
    waiters: Vec<WaitCallback>,
    merged_since_notify: bool,
}

struct ResolverInner {
    store: Arc<dyn CommitGraphStore>,
    dispatcher: Arc<dyn Dispatcher>,
    manager: CoroutineManager,
    shared: Mutex<Shared>,
    this: Weak<ResolverInner>,
}

/// Detects multiple heads on a page and merges them, two at a time, oldest
/// first, until a single head remains.
///
/// The resolver registers itself as a watcher of the store. Every
/// notification requests a head check, which runs as a coroutine started
/// from the dispatcher. Requests arriving while a check or merge is in
/// progress coalesce into one re-check after it. Only one merge runs at a
/// time.
///
/// When both heads to merge are merge commits and the request came from
/// sync, the resolver first waits with exponential backoff, so devices
/// racing to merge the same branches converge instead of merging each
/// other's merges. The backoff resets after any other merge.
///
/// Failures are logged and counted; the next notification re-drives the
/// check. Dropping the resolver interrupts its coroutine and waits for it.
pub struct MergeResolver {
    inner: Arc<ResolverInner>,
}

impl MergeResolver {
    /// Creates a resolver for the page held by `store`, running its
    /// coroutines on `service` and its checks and timers on `dispatcher`.
    ///
    /// No merge happens until a strategy is set.
    #[must_use]
    pub fn new(
        store: Arc<dyn CommitGraphStore>,
        service: Arc<CoroutineService>,
        dispatcher: Arc<dyn Dispatcher>,
        config: ResolverConfig,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| ResolverInner {
            store,
            dispatcher,
            manager: CoroutineManager::new(service),
            shared: Mutex::new(Shared {
                state: ResolverState::Idle,
                strategy: None,
                strategy_epoch: 0,
                pending: None,
                restart: false,
                closing: false,
                current: None,
                backoff: ExponentialBackoff::new(config.backoff),
                stats: ResolverStats::default(),
                waiters: Vec::new(),
                merged_since_notify: false,
            }),
            this: this.clone(),
        });
        let watcher: Weak<dyn CommitWatcher> = inner.this.clone();
        inner.store.watch(watcher);
        Self { inner }
    }

    /// Replaces the merge strategy and re-checks the heads.
    ///
    /// A merge in flight with the previous strategy is cancelled and
    /// restarted with the new one. `None` disables merging.
    pub fn set_strategy(&self, strategy: Option<Arc<dyn MergeStrategy>>) {
        let start = {
            let mut shared = self.inner.shared.lock();
            shared.strategy = strategy;
            shared.strategy_epoch += 1;
            match shared.state {
                ResolverState::Idle => {
                    shared.state = ResolverState::CheckingConflicts;
                    true
                }
                ResolverState::Merging => {
                    debug!("strategy changed, cancelling in-flight merge");
                    shared.restart = true;
                    if let Some(handler) = &shared.current {
                        handler.interrupt();
                    }
                    false
                }
                ResolverState::CheckingConflicts => {
                    shared.pending = shared.pending.or(Some(DelayedStatus::DontDelay));
                    false
                }
                // The timer re-checks with whatever strategy is set then.
                ResolverState::Delaying => false,
            }
        };
        if start {
            self.inner.post_check(DelayedStatus::DontDelay);
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ResolverState {
        self.inner.shared.lock().state
    }

    /// Returns true while a check, delay or merge is outstanding. Uploads
    /// of the page should wait until this is false.
    #[must_use]
    pub fn has_unfinished_merges(&self) -> bool {
        let shared = self.inner.shared.lock();
        shared.state != ResolverState::Idle || shared.pending.is_some()
    }

    /// Returns the activity counters.
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        self.inner.shared.lock().stats.clone()
    }

    /// Calls `callback` once the page has a single head.
    ///
    /// Reports [`ConflictResolutionWaitStatus::ConflictsResolved`] if merges
    /// happened since the previous report, and
    /// [`ConflictResolutionWaitStatus::NoConflicts`] otherwise. Without a
    /// strategy, a diverged page never reports.
    pub fn wait_for_conflict_resolution(&self, callback: WaitCallback) {
        let start = {
            let mut shared = self.inner.shared.lock();
            shared.waiters.push(callback);
            if shared.state == ResolverState::Idle {
                shared.state = ResolverState::CheckingConflicts;
                true
            } else {
                false
            }
        };
        if start {
            self.inner.post_check(DelayedStatus::DontDelay);
        }
    }
}

impl Drop for MergeResolver {
    fn drop(&mut self) {
        self.inner.shared.lock().closing = true;
        self.inner.manager.shutdown();
    }
}

impl CommitWatcher for ResolverInner {
    fn on_new_commits(&self, commits: &[Commit], source: ChangeSource) {
        trace!(commits = commits.len(), ?source, "new commits");
        self.request_check(DelayedStatus::from(source));
    }
}

impl ResolverInner {
    fn request_check(&self, delayed: DelayedStatus) {
        {
            let mut shared = self.shared.lock();
            if shared.closing {
                return;
            }
            if shared.state != ResolverState::Idle {
                shared.pending = Some(shared.pending.map_or(delayed, |p| p.combine(delayed)));
                return;
            }
            shared.state = ResolverState::CheckingConflicts;
        }
        self.post_check(delayed);
    }

    fn post_check(&self, delayed: DelayedStatus) {
        let this = self.this.clone();
        self.dispatcher.post(Box::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.start_check(delayed);
            }
        }));
    }

    fn start_check(self: Arc<Self>, delayed: DelayedStatus) {
        let inner = Arc::clone(&self);
        let started = self
            .manager
            .start_coroutine(move |handler| inner.run(handler, delayed));
        if let Err(e) = started {
            debug!(error = %e, "merge check not started");
            let mut shared = self.shared.lock();
            shared.state = ResolverState::Idle;
            shared.current = None;
        }
    }

    fn run(&self, handler: &CoroutineHandler, mut delayed: DelayedStatus) {
        self.shared.lock().current = Some(handler.clone());
        let graph = SynchronousCommitGraph::new(handler, self.store.as_ref());
        loop {
            let step = self.step(&graph, delayed);
            match self.finish_step(step) {
                Some(next) => delayed = next,
                None => return,
            }
        }
    }

    /// Checks the heads once and merges the two oldest if needed.
    fn step(&self, graph: &SynchronousCommitGraph<'_>, delayed: DelayedStatus) -> Step {
        // Requests made before the heads are listed are covered by this pass.
        let (strategy, epoch, delayed) = {
            let mut shared = self.shared.lock();
            shared.state = ResolverState::CheckingConflicts;
            shared.stats.checks += 1;
            let delayed = shared.pending.take().map_or(delayed, |p| p.combine(delayed));
            (shared.strategy.clone(), shared.strategy_epoch, delayed)
        };

        let heads = match graph.get_head_commits() {
            Ok(heads) => heads,
            Err(e) if e.is_interrupted() => return Step::Interrupted,
            Err(e) => {
                warn!(error = %e, "failed to list heads");
                return Step::Failed;
            }
        };
        let head_count = heads.len();
        let mut heads = heads.into_iter();
        let (Some(left), Some(right)) = (heads.next(), heads.next()) else {
            return Step::Resolved;
        };
        let Some(strategy) = strategy else {
            debug!(heads = head_count, "page diverged but no merge strategy is set");
            return Step::NoStrategy;
        };

        let merge_of_merges = left.is_merge() && right.is_merge();
        if delayed == DelayedStatus::MayDelay && merge_of_merges {
            return Step::Delay;
        }

        self.shared.lock().state = ResolverState::Merging;
        info!(
            heads = head_count,
            left = %left.id().short(),
            right = %right.id().short(),
            "merging heads"
        );
        match self.merge(graph, strategy.as_ref(), epoch, left, right) {
            Ok(trivial) => Step::Merged {
                trivial,
                merge_of_merges,
            },
            Err(e) if e.is_interrupted() => {
                debug!(error = %e, "merge interrupted");
                Step::Interrupted
            }
            Err(e) => {
                warn!(error = %e, status = %e.status(), "merge failed");
                Step::Failed
            }
        }
    }

    /// Merges `left` and `right`, returning true for a trivial merge.
    fn merge(
        &self,
        graph: &SynchronousCommitGraph<'_>,
        strategy: &dyn MergeStrategy,
        epoch: u64,
        left: Commit,
        right: Commit,
    ) -> MergeResult<bool> {
        if left.root_id() == right.root_id() {
            let journal = graph.start_merge_commit(left, right);
            let merge = graph.commit_journal(journal)?;
            debug!(merge = %merge.id().short(), "trivial merge");
            return Ok(true);
        }

        let ancestor = find_common_ancestor(graph, &left, &right)?;
        let journal = strategy.merge(graph, &left, &right, &ancestor)?;
        if self.shared.lock().strategy_epoch != epoch {
            return Err(MergeError::Cancelled);
        }
        let merge = graph.commit_journal(journal)?;
        debug!(
            merge = %merge.id().short(),
            ancestor = %ancestor.id().short(),
            "merge committed"
        );
        Ok(false)
    }

    /// Applies the state transition after a step. Returns the delay status
    /// of the next pass, or `None` when the coroutine should return.
    fn finish_step(&self, step: Step) -> Option<DelayedStatus> {
        let mut shared = self.shared.lock();
        match step {
            Step::Merged {
                trivial,
                merge_of_merges,
            } => {
                if trivial {
                    shared.stats.trivial_merges += 1;
                } else {
                    shared.stats.merges += 1;
                }
                if !merge_of_merges {
                    shared.backoff.reset();
                }
                shared.merged_since_notify = true;
                shared.state = ResolverState::CheckingConflicts;
                Some(shared.pending.take().unwrap_or(DelayedStatus::DontDelay))
            }
            Step::Resolved => {
                if let Some(next) = shared.pending.take() {
                    return Some(next);
                }
                shared.state = ResolverState::Idle;
                shared.current = None;
                let status = if shared.merged_since_notify {
                    ConflictResolutionWaitStatus::ConflictsResolved
                } else {
                    ConflictResolutionWaitStatus::NoConflicts
                };
                shared.merged_since_notify = false;
                let waiters = std::mem::take(&mut shared.waiters);
                drop(shared);
                for waiter in waiters {
                    waiter(status);
                }
                None
            }
            Step::NoStrategy => {
                shared.pending = None;
                shared.state = ResolverState::Idle;
                shared.current = None;
                None
            }
            Step::Failed => {
                shared.stats.failures += 1;
                if let Some(next) = shared.pending.take() {
                    return Some(next);
                }
                shared.state = ResolverState::Idle;
                shared.current = None;
                None
            }
            Step::Delay => {
                let delay = shared.backoff.next_delay();
                shared.stats.delays += 1;
                shared.pending = None;
                shared.state = ResolverState::Delaying;
                shared.current = None;
                drop(shared);
                debug!(delay_ms = delay.as_millis(), "delaying merge of merges");
                self.schedule_delayed_check(delay);
                None
            }
            Step::Interrupted => {
                shared.current = None;
                if shared.closing {
                    return None;
                }
                let restart = std::mem::take(&mut shared.restart);
                if restart || shared.pending.is_some() {
                    let next = shared.pending.take().unwrap_or(DelayedStatus::DontDelay);
                    shared.state = ResolverState::CheckingConflicts;
                    drop(shared);
                    self.post_check(next);
                } else {
                    shared.state = ResolverState::Idle;
                }
                None
            }
        }
    }

    fn schedule_delayed_check(&self, delay: Duration) {
        let this = self.this.clone();
        self.dispatcher.post_delayed(
            delay,
            Box::new(move || {
                let Some(inner) = this.upgrade() else {
                    return;
                };
                {
                    let mut shared = inner.shared.lock();
                    if shared.closing || shared.state != ResolverState::Delaying {
                        return;
                    }
                    // Commits seen during the delay are folded into this check.
                    shared.pending = None;
                    shared.state = ResolverState::CheckingConflicts;
                }
                inner.start_check(DelayedStatus::DontDelay);
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn may_delay_wins_when_requests_coalesce() {
        use DelayedStatus::{DontDelay, MayDelay};
        assert_eq!(DontDelay.combine(DontDelay), DontDelay);
        assert_eq!(DontDelay.combine(MayDelay), MayDelay);
        assert_eq!(MayDelay.combine(DontDelay), MayDelay);
    }

    #[test]
    fn only_synced_commits_may_delay() {
        assert_eq!(
            DelayedStatus::from(ChangeSource::Local),
            DelayedStatus::DontDelay
        );
        assert_eq!(
            DelayedStatus::from(ChangeSource::Sync),
            DelayedStatus::MayDelay
        );
    }

    #[test]
    fn config_builder() {
        let backoff = BackoffConfig::new().with_initial_delay(Duration::from_secs(1));
        let config = ResolverConfig::new().with_backoff(backoff.clone());
        assert_eq!(config.backoff, backoff);
    }
}
