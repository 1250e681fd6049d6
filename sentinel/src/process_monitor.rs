use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::event::{CycleReport, WatchEvent};
use crate::matcher::{ProcessMatcher, SeenIdentitySet};
use crate::notifier::NotificationDispatcher;
use crate::process::{Liveness, ProcessRecord, ProcessTable};

/// Loop parameters taken from [`Config`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub watch_new: bool,
    pub label: Option<String>,
    pub subject_template: String,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.interval(),
            watch_new: config.watch.watch_new,
            label: config.watch.label.clone(),
            subject_template: config.subject_template(),
        }
    }
}

/// Why [`ProcessMonitor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Every watched process is gone and no new ones will be discovered.
    NothingToWatch,
    /// The shutdown signal fired between cycles.
    Interrupted,
}

/// Owns the watch set and drives it: every interval each watched process is
/// checked, notifications go out for the ones that ended, and (optionally)
/// newly matching processes are picked up.
pub struct ProcessMonitor<T: ProcessTable> {
    table: T,
    matcher: ProcessMatcher,
    seen: SeenIdentitySet,
    watched: BTreeMap<u32, ProcessRecord>,
    dispatcher: NotificationDispatcher,
    settings: MonitorSettings,
}

impl<T: ProcessTable> ProcessMonitor<T> {
    pub fn new(
        table: T,
        matcher: ProcessMatcher,
        dispatcher: NotificationDispatcher,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            table,
            matcher,
            seen: SeenIdentitySet::new(),
            watched: BTreeMap::new(),
            dispatcher,
            settings,
        }
    }

    /// Continuous discovery needs both the flag and at least one pattern.
    pub fn discovers_new(&self) -> bool {
        self.settings.watch_new && self.matcher.condition_count() > 0
    }

    pub fn watched(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.watched.values()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Populates the watch set from explicit PIDs plus one discovery pass over
    /// the configured patterns.
    pub fn initialize(&mut self, pids: &[u32]) {
        self.watch_pids(pids);
        if self.matcher.condition_count() > 0 {
            self.discover();
        }
    }

    /// Starts watching each PID. Duplicates are ignored and PIDs that are not
    /// running are logged and skipped.
    pub fn watch_pids(&mut self, pids: &[u32]) {
        for &pid in pids {
            if self.watched.contains_key(&pid) {
                continue;
            }
            match ProcessRecord::create(&mut self.table, pid, self.settings.label.as_deref()) {
                Ok(record) => {
                    self.watched.insert(pid, record);
                }
                Err(e) => warn!("{e}"),
            }
        }
    }

    /// Adds every matching process not seen before and returns the new records.
    pub fn discover(&mut self) -> Vec<ProcessRecord> {
        let mut added = Vec::new();
        for pid in self.matcher.matching_new(&mut self.table, &mut self.seen) {
            if self.watched.contains_key(&pid) {
                continue;
            }
            match ProcessRecord::create(&mut self.table, pid, self.settings.label.as_deref()) {
                Ok(record) => {
                    self.watched.insert(pid, record.clone());
                    added.push(record);
                }
                // Exited between the scan and the metadata lookup.
                Err(e) => warn!("Could not watch new process: {e}"),
            }
        }
        added
    }

    /// Runs one check/notify/evict/discover cycle.
    pub async fn poll_once(&mut self) -> CycleReport {
        let mut ended = Vec::new();
        let mut lost = Vec::new();

        for (&pid, record) in &self.watched {
            match record.check_alive(&mut self.table) {
                Ok(Liveness::Alive) => {}
                Ok(Liveness::Ended) => ended.push(pid),
                Err(e) => {
                    error!(pid, "Could not check process, no longer watching it: {e}");
                    lost.push((pid, e));
                }
            }
        }

        let mut dispatched = Vec::with_capacity(ended.len());
        for pid in ended {
            if let Some(record) = self.watched.get(&pid) {
                info!("Process stopped\n{}", record.describe());
                let report = self
                    .dispatcher
                    .dispatch(record, &self.settings.subject_template)
                    .await;
                dispatched.push((pid, report));
            }
        }

        let mut cycle = CycleReport::default();
        for (pid, report) in dispatched {
            if let Some(record) = self.watched.remove(&pid) {
                cycle.events.push(WatchEvent::Ended { record, report });
            }
        }
        for (pid, error) in lost {
            if let Some(record) = self.watched.remove(&pid) {
                cycle.events.push(WatchEvent::Lost { record, error });
            }
        }

        if self.discovers_new() {
            for record in self.discover() {
                info!("Watching new process\n{}", record.describe());
                cycle.events.push(WatchEvent::Discovered(record));
            }
        }
        cycle
    }

    /// Polls until nothing is left to watch or `shutdown` completes. Shutdown
    /// is only observed while sleeping, so a cycle (and its notifications)
    /// always runs to completion.
    pub async fn run<F>(&mut self, shutdown: F) -> LoopExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.watched.is_empty() && !self.discovers_new() {
                return LoopExit::NothingToWatch;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => return LoopExit::Interrupted,
                _ = ticker.tick() => {}
            }

            let cycle = self.poll_once().await;
            for (record, error) in cycle.lost() {
                debug!(pid = record.pid(), "Dropped from watch set: {error}");
            }
            debug!(
                ended = cycle.ended().count(),
                unnotified = cycle.unnotified().count(),
                lost = cycle.lost().count(),
                discovered = cycle.discovered().count(),
                watching = self.watched.len(),
                seen = self.seen.len(),
                "Poll cycle complete"
            );
        }
    }
}
