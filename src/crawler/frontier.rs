//! Crawl frontier
//!
//! This module handles:
//! - The queue of URLs waiting to be dispatched, lowest depth first and FIFO
//!   within a depth
//! - Deduplication by normalized URL across queued, in-flight and finished URLs
//! - The re-crawl policy and per-URL execute budget
//! - Waking idle workers when work arrives, when the crawl is exhausted, or
//!   when it is stopped

use crate::config::{CrawlerConfig, RecrawlPolicy};
use crate::state::CrawlStatus;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// A URL handed to a worker
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    /// Normalized URL
    pub url: String,

    /// Link distance from a seed
    pub depth: u32,

    /// Insertion sequence, for FIFO order within a depth
    seq: u64,
}

// Lower depth first, then lower sequence (BinaryHeap pops the greatest)
impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Fetched,
    Failed,
    /// Interrupted by a stop; the URL goes back in the queue
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Queued,
    InFlight,
    Done { failed: bool },
}

#[derive(Debug)]
struct Known {
    slot: Slot,
    depth: u32,
    /// Dispatches so far, across runs
    executions: u32,
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<FrontierEntry>,
    known: HashMap<String, Known>,
    seq: u64,
    in_flight: usize,
    dispatched: u64,
    stopped: bool,
}

impl Inner {
    fn push(&mut self, url: &str, depth: u32) {
        self.seq += 1;
        self.heap.push(FrontierEntry {
            url: url.to_string(),
            depth,
            seq: self.seq,
        });
    }

    fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self.heap.pop()?;
        if let Some(known) = self.known.get_mut(&entry.url) {
            known.slot = Slot::InFlight;
            known.executions = known.executions.saturating_add(1);
        }
        self.in_flight += 1;
        self.dispatched += 1;
        Some(entry)
    }
}

/// Shared, deduplicating work queue
///
/// URLs passed in must already be normalized; the frontier compares them as
/// plain strings.
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    max_depth: u32,
    max_pages: Option<u64>,
    max_execute_count: u32,
    recrawl: RecrawlPolicy,
}

impl Frontier {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            max_depth: config.max_depth,
            max_pages: config.page_budget(),
            max_execute_count: config.max_execute_count.max(1),
            recrawl: config.recrawl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner holds no invariants a panicking holder could break halfway
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a finished URL may be queued again
    fn may_recrawl(&self, failed: bool, executions: u32) -> bool {
        let allowed = match self.recrawl {
            RecrawlPolicy::Never => false,
            RecrawlPolicy::Failed => failed,
            RecrawlPolicy::Always => true,
        };
        allowed && executions < self.max_execute_count
    }

    fn budget_spent(&self, inner: &Inner) -> bool {
        self.max_pages.is_some_and(|max| inner.dispatched >= max)
    }

    /// Queues a URL, running `on_queued` before any worker can take it
    fn insert<E>(
        &self,
        url: &str,
        depth: u32,
        forced: bool,
        on_queued: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        if depth > self.max_depth {
            return Ok(false);
        }

        let mut inner = self.lock();
        if inner.stopped {
            return Ok(false);
        }

        let existing = inner.known.get(url).map(|k| (k.slot, k.executions));
        let queue = match existing {
            None => true,
            Some((Slot::Queued | Slot::InFlight, _)) => false,
            Some((Slot::Done { failed }, executions)) => {
                forced || self.may_recrawl(failed, executions)
            }
        };
        if !queue {
            return Ok(false);
        }

        let known = inner.known.entry(url.to_string()).or_insert(Known {
            slot: Slot::Queued,
            depth,
            executions: 0,
        });
        known.slot = Slot::Queued;
        known.depth = depth;
        inner.push(url, depth);

        // Runs under the lock, so no worker can dispatch the URL yet
        let result = on_queued();
        drop(inner);

        self.notify.notify_waiters();
        result.map(|()| true)
    }

    /// Queues a URL
    ///
    /// # Returns
    ///
    /// `false` if the URL is already queued or in flight, finished and not
    /// eligible for re-crawl, deeper than the max depth, or the frontier is
    /// stopped.
    pub fn add(&self, url: &str, depth: u32) -> bool {
        self.insert(url, depth, false, || Ok::<(), Infallible>(()))
            .unwrap_or_else(|never| match never {})
    }

    /// Queues a URL and records it before it becomes visible to workers
    ///
    /// `on_queued` runs only when the URL is accepted, while the frontier is
    /// still locked. An error from it is returned, but the URL stays queued.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - URL queued and `on_queued` succeeded
    /// * `Ok(false)` - URL rejected, as for `add`
    /// * `Err(E)` - `on_queued` failed
    pub fn add_with<E>(
        &self,
        url: &str,
        depth: u32,
        on_queued: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        self.insert(url, depth, false, on_queued)
    }

    /// Queues a URL even if it already finished
    ///
    /// Never duplicates a queued or in-flight URL.
    pub fn add_forced(&self, url: &str, depth: u32) -> bool {
        self.insert(url, depth, true, || Ok::<(), Infallible>(()))
            .unwrap_or_else(|never| match never {})
    }

    /// Reloads a URL's state from a stored record
    ///
    /// Unvisited and interrupted (`Fetching`) records are queued; finished
    /// records are remembered so rediscovery does not re-queue them, unless
    /// the re-crawl policy and execute budget allow it.
    ///
    /// # Returns
    ///
    /// `true` if the URL was queued
    pub fn restore(&self, url: &str, depth: u32, status: CrawlStatus, execute_count: u32) -> bool {
        let mut inner = self.lock();
        if inner.known.contains_key(url) {
            return false;
        }

        let (done, queue) = match status {
            CrawlStatus::Unvisited | CrawlStatus::Fetching => (None, true),
            CrawlStatus::Fetched => (
                Some(Slot::Done { failed: false }),
                self.may_recrawl(false, execute_count),
            ),
            CrawlStatus::Failed => (
                Some(Slot::Done { failed: true }),
                self.may_recrawl(true, execute_count),
            ),
        };
        let queue = queue && depth <= self.max_depth;

        // An unvisited record beyond the depth limit is left unknown, so a
        // shallower rediscovery can still queue it
        let slot = match (queue, done) {
            (true, _) => Slot::Queued,
            (false, Some(slot)) => slot,
            (false, None) => return false,
        };

        inner.known.insert(
            url.to_string(),
            Known {
                slot,
                depth,
                executions: execute_count,
            },
        );
        if queue {
            inner.push(url, depth);
        }
        queue
    }

    /// Takes the next URL without waiting
    ///
    /// Returns `None` when nothing is queued right now, when stopped, or when
    /// the page budget is spent.
    pub fn try_next(&self) -> Option<FrontierEntry> {
        let mut inner = self.lock();
        if inner.stopped || self.budget_spent(&inner) {
            return None;
        }
        inner.pop()
    }

    /// Takes the next URL, waiting while the queue is empty but work is in flight
    ///
    /// Returns `None` once the frontier is exhausted (nothing queued and
    /// nothing in flight), stopped, or the page budget is spent.
    pub async fn next(&self) -> Option<FrontierEntry> {
        loop {
            // Registered before the check, so a wakeup between check and await is not lost
            let notified = self.notify.notified();

            {
                let mut inner = self.lock();
                if inner.stopped || self.budget_spent(&inner) {
                    return None;
                }
                if let Some(entry) = inner.pop() {
                    return Some(entry);
                }
                if inner.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Records how a dispatched URL ended
    ///
    /// An `Abandoned` URL goes back into the queue at its depth and the
    /// interrupted dispatch is not counted against its execute budget.
    ///
    /// # Returns
    ///
    /// `false` if the URL was not in flight
    pub fn mark_done(&self, url: &str, outcome: Outcome) -> bool {
        let mut inner = self.lock();

        let Some(known) = inner.known.get_mut(url) else {
            return false;
        };
        if known.slot != Slot::InFlight {
            return false;
        }

        let requeue_depth = match outcome {
            Outcome::Fetched => {
                known.slot = Slot::Done { failed: false };
                None
            }
            Outcome::Failed => {
                known.slot = Slot::Done { failed: true };
                None
            }
            Outcome::Abandoned => {
                known.slot = Slot::Queued;
                known.executions = known.executions.saturating_sub(1);
                Some(known.depth)
            }
        };

        if let Some(depth) = requeue_depth {
            inner.push(url, depth);
        }
        inner.in_flight = inner.in_flight.saturating_sub(1);
        drop(inner);

        // Idle workers re-check: this may have been the last in-flight URL
        self.notify.notify_waiters();
        true
    }

    /// Stops the frontier: waiters wake and every later `next` returns `None`
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Number of URLs waiting to be dispatched
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Number of dispatches handed out so far in this process
    pub fn dispatched(&self) -> u64 {
        self.lock().dispatched
    }
}
