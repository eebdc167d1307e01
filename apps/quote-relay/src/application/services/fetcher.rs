//! Batch Reference Fetcher
//!
//! Walks the subscription registry and refreshes the reference price store,
//! one symbol at a time, staying under the reference source's rate limits.
//!
//! # Schedule
//!
//! - once at startup (unforced: fresh cached entries are reused)
//! - daily at a configured UTC time of day (forced: everything refetched)
//! - on demand through a [`FetchTrigger`] (unforced, coalesced)
//!
//! # Retry
//!
//! Each symbol gets `max_attempts` attempts. A rate-limited attempt waits
//! `cooldown` before the next one; other transient failures wait the
//! inter-symbol delay. Permanent failures (unknown symbol, malformed data)
//! are not retried. A symbol that runs out of attempts is skipped and the
//! batch moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::application::metrics::{self, FetchOutcome, PersistTarget};
use crate::application::ports::{PersistentStore, ReferenceSource, StoreError};
use crate::application::services::registry::SubscriptionRegistry;
use crate::domain::reference::{ReferenceEntry, ReferencePriceStore, ReferenceSnapshot};
use crate::domain::subscription::Symbol;

// =============================================================================
// Settings
// =============================================================================

/// Batch fetch tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Attempts per symbol, including the first.
    pub max_attempts: u32,
    /// Wait after a rate-limited attempt.
    pub cooldown: Duration,
    /// Delay between network calls for normal batches.
    pub delay: Duration,
    /// Delay between network calls for small batches.
    pub small_batch_delay: Duration,
    /// Batches with fewer symbols than this use `small_batch_delay`.
    pub small_batch_threshold: usize,
    /// Maximum age of a reusable entry. `None` reuses entries forever
    /// unless the run is forced.
    pub ttl: Option<chrono::Duration>,
    /// Daily forced run, UTC.
    pub daily_at: NaiveTime,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(10),
            delay: Duration::from_millis(500),
            small_batch_delay: Duration::from_millis(50),
            small_batch_threshold: 60,
            ttl: None,
            daily_at: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        }
    }
}

impl FetchSettings {
    /// Inter-symbol delay for a batch of `count` symbols.
    #[must_use]
    pub const fn delay_for(&self, count: usize) -> Duration {
        if count < self.small_batch_threshold {
            self.small_batch_delay
        } else {
            self.delay
        }
    }
}

/// Next occurrence of `at` (UTC) strictly after `now`.
#[must_use]
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Deadline of the next daily forced pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    due: DateTime<Utc>,
}

impl DailySchedule {
    /// Schedule starting at `now`, firing daily at `at` (UTC).
    #[must_use]
    pub fn new(now: DateTime<Utc>, at: NaiveTime) -> Self {
        Self {
            at,
            due: next_run_after(now, at),
        }
    }

    /// When the next forced pass is due.
    #[must_use]
    pub const fn due(&self) -> DateTime<Utc> {
        self.due
    }

    /// Whether the forced pass is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due
    }

    /// Time left until the deadline, zero if already due.
    #[must_use]
    pub fn wait(&self, now: DateTime<Utc>) -> Duration {
        (self.due - now).to_std().unwrap_or_default()
    }

    /// Record a forced pass starting at `now` and move to the next day.
    ///
    /// The deadline always advances, even if the timer woke slightly early.
    pub fn mark_forced(&mut self, now: DateTime<Utc>) {
        self.due = next_run_after(now.max(self.due), self.at);
    }
}

// =============================================================================
// Trigger
// =============================================================================

/// Handle for requesting an extra unforced pass.
///
/// Requests made while a pass is running collapse into one follow-up pass.
#[derive(Debug, Clone, Default)]
pub struct FetchTrigger(Arc<Notify>);

impl FetchTrigger {
    /// Create a trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass.
    pub fn request(&self) {
        self.0.notify_one();
    }

    /// Wait for a request.
    pub async fn requested(&self) {
        self.0.notified().await;
    }
}

// =============================================================================
// Report
// =============================================================================

/// Summary of one batch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Symbols fetched and stored.
    pub fetched: Vec<Symbol>,
    /// Symbols skipped because of a fresh cached entry.
    pub skipped_fresh: usize,
    /// Symbols that failed and were skipped.
    pub failed: Vec<Symbol>,
    /// Rate-limited responses seen.
    pub rate_limited: u32,
    /// Whether the cache was written to the store.
    pub persisted: bool,
}

// =============================================================================
// Fetcher
// =============================================================================

/// Rate-limited, retrying batch job that fills the reference price store.
pub struct BatchReferenceFetcher {
    registry: Arc<SubscriptionRegistry>,
    references: Arc<ReferencePriceStore>,
    source: Arc<dyn ReferenceSource>,
    store: Arc<dyn PersistentStore<ReferenceSnapshot>>,
    settings: FetchSettings,
    trigger: FetchTrigger,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for BatchReferenceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchReferenceFetcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BatchReferenceFetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        references: Arc<ReferencePriceStore>,
        source: Arc<dyn ReferenceSource>,
        store: Arc<dyn PersistentStore<ReferenceSnapshot>>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            registry,
            references,
            source,
            store,
            settings,
            trigger: FetchTrigger::new(),
            run_lock: Mutex::new(()),
        }
    }

    /// Trigger for on-demand passes.
    #[must_use]
    pub fn trigger(&self) -> FetchTrigger {
        self.trigger.clone()
    }

    /// Fill the reference store from the persisted cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read or decoded; the store is
    /// left unchanged.
    pub async fn load_from_store(&self) -> Result<usize, StoreError> {
        let snapshot = self.store.load().await?.unwrap_or_default();
        self.references.replace_all(snapshot);
        let count = self.references.len();
        metrics::set_reference_entries(count);
        Ok(count)
    }

    /// Run one pass over the registry.
    ///
    /// With `force` every symbol is refetched; otherwise fresh cached
    /// entries are reused. Passes never overlap.
    pub async fn run_once(&self, force: bool) -> BatchReport {
        let _guard = self.run_lock.lock().await;
        let symbols = self.registry.list();
        let delay = self.settings.delay_for(symbols.len());
        let started_at = Utc::now();
        let mut report = BatchReport::default();
        let mut called_source = false;

        tracing::info!(symbols = symbols.len(), force, "Reference batch started");

        for symbol in symbols.iter() {
            if !force
                && self
                    .references
                    .get(symbol)
                    .is_some_and(|entry| entry.is_fresh(started_at, self.settings.ttl))
            {
                report.skipped_fresh += 1;
                metrics::record_fetch_outcome(FetchOutcome::SkippedFresh);
                continue;
            }

            if called_source {
                tokio::time::sleep(delay).await;
            }
            called_source = true;

            match self.fetch_with_retry(symbol, delay, &mut report).await {
                Some(entry) => {
                    self.references.upsert(entry);
                    report.fetched.push(symbol.clone());
                    metrics::record_fetch_outcome(FetchOutcome::Ok);
                }
                None => {
                    report.failed.push(symbol.clone());
                    metrics::record_fetch_outcome(FetchOutcome::Failed);
                }
            }
        }

        metrics::set_reference_entries(self.references.len());

        if !report.fetched.is_empty() {
            match self.store.save(&self.references.snapshot()).await {
                Ok(()) => report.persisted = true,
                Err(e) => {
                    metrics::record_persist_failure(PersistTarget::References);
                    tracing::error!(error = %e, "Failed to persist reference prices");
                }
            }
        }

        tracing::info!(
            fetched = report.fetched.len(),
            skipped_fresh = report.skipped_fresh,
            failed = report.failed.len(),
            rate_limited = report.rate_limited,
            "Reference batch completed"
        );
        report
    }

    async fn fetch_with_retry(
        &self,
        symbol: &Symbol,
        transient_delay: Duration,
        report: &mut BatchReport,
    ) -> Option<ReferenceEntry> {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let err = match self.source.fetch(symbol).await {
                Ok(entry) => return Some(entry),
                Err(e) => e,
            };

            if err.is_permanent() {
                tracing::warn!(symbol = %symbol, error = %err, "Skipping symbol");
                return None;
            }

            let wait = if err.is_rate_limited() {
                report.rate_limited += 1;
                metrics::record_fetch_outcome(FetchOutcome::RateLimited);
                self.settings.cooldown
            } else {
                transient_delay
            };

            if attempt == max_attempts {
                tracing::warn!(
                    symbol = %symbol,
                    attempts = attempt,
                    error = %err,
                    "Giving up on symbol"
                );
                return None;
            }

            tracing::debug!(
                symbol = %symbol,
                attempt,
                delay_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Reference fetch failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }

        None
    }

    /// Startup pass, then daily forced passes and on-demand passes until
    /// `cancel` fires.
    ///
    /// The daily deadline survives other passes: if it passes while a
    /// startup or triggered pass is running, the forced pass runs as soon
    /// as that pass ends.
    pub async fn run_scheduled(&self, cancel: CancellationToken) {
        let mut schedule = DailySchedule::new(Utc::now(), self.settings.daily_at);
        let mut force = false;

        loop {
            if force {
                schedule.mark_forced(Utc::now());
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                _ = self.run_once(force) => {}
            }

            let now = Utc::now();
            if schedule.is_due(now) {
                tracing::info!(due = %schedule.due(), "Daily reference batch overdue, running now");
                force = true;
                continue;
            }
            tracing::info!(next_run = %schedule.due(), "Next scheduled reference batch");

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(schedule.wait(now)) => force = true,
                () = self.trigger.requested() => force = false,
            }
        }

        tracing::info!("Reference fetcher stopped");
    }

    /// Swap in the persisted cache whenever another writer changes it.
    ///
    /// Returns immediately if the store cannot report changes.
    pub async fn follow_external_changes(&self, cancel: CancellationToken) {
        let Some(mut changes) = self.store.watch() else {
            return;
        };

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    match self.load_from_store().await {
                        Ok(count) => tracing::info!(entries = count, "Reloaded reference prices"),
                        Err(e) => tracing::error!(error = %e, "Ignoring unreadable reference file"),
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
