//! Periodic background sync for connected owners.
//!
//! Every tick, each owner with at least one live sink gets its own sync
//! task. Ticks never wait on those tasks, so a slow owner only delays
//! itself; an owner whose previous run is still going is skipped until it
//! finishes. Newly persisted messages are pushed through the
//! [`Broadcaster`], followed by one summary event.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::broadcaster::Broadcaster;
use crate::config::SyncSettings;
use crate::domain::OwnerId;
use crate::services::{SyncEngine, SyncError};
use crate::storage::OwnerStore;

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub synced: Vec<OwnerId>,
    /// Owners without a live sink.
    pub skipped: Vec<OwnerId>,
    /// Owners whose previous run had not finished.
    pub busy: Vec<OwnerId>,
    pub failed: Vec<(OwnerId, String)>,
    /// Events delivered across all owners, summaries included.
    pub delivered: usize,
}

type JobOutput = (OwnerId, Result<usize, SyncError>);

type Owners = Arc<Mutex<HashSet<OwnerId>>>;

fn lock(owners: &Owners) -> MutexGuard<'_, HashSet<OwnerId>> {
    owners.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks an owner as running; released when the job's future is dropped.
struct InFlight {
    owners: Owners,
    owner: OwnerId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.owners).remove(&self.owner);
    }
}

pub struct Scheduler {
    engine: Arc<SyncEngine>,
    owners: Arc<dyn OwnerStore>,
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    max_results: u32,
    first_sync_limit: usize,
    in_flight: Owners,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        owners: Arc<dyn OwnerStore>,
        broadcaster: Arc<Broadcaster>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            engine,
            owners,
            broadcaster,
            interval: settings.interval(),
            max_results: settings.scheduled_max_results,
            first_sync_limit: settings.first_sync_limit,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the tick period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Token observed by the loop and every per-owner task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        info!("stopping scheduler");
        self.cancel.cancel();
    }

    /// Runs [`run`](Self::run) on a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Ticks until stopped, then waits for the owner tasks still running.
    /// The first tick fires immediately.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = self.interval.as_millis() as u64, "scheduler started");

        let mut jobs = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                    settle(joined);
                }
                _ = ticker.tick() => {
                    let mut report = TickReport::default();
                    let started = self.dispatch(&mut jobs, &mut report).await;
                    debug!(
                        started,
                        skipped = report.skipped.len(),
                        busy = report.busy.len(),
                        "tick dispatched"
                    );
                }
            }
        }

        while let Some(joined) = jobs.join_next().await {
            settle(joined);
        }
        info!("scheduler stopped");
    }

    /// Runs a single tick and waits for the owner tasks it started.
    pub async fn run_once(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut jobs = JoinSet::new();
        self.dispatch(&mut jobs, &mut report).await;

        while let Some(joined) = jobs.join_next().await {
            match settle(joined) {
                Some((owner_id, Ok(delivered))) => {
                    report.delivered += delivered;
                    report.synced.push(owner_id);
                }
                Some((owner_id, Err(e))) => report.failed.push((owner_id, e)),
                None => {}
            }
        }

        report
    }

    /// Starts a job for every connected owner that is not already running.
    /// Returns how many were started.
    async fn dispatch(&self, jobs: &mut JoinSet<JobOutput>, report: &mut TickReport) -> usize {
        let owners = match self.owners.list_all().await {
            Ok(owners) => owners,
            Err(e) => {
                error!(error = %e, "failed to list owners");
                return 0;
            }
        };

        let mut started = 0;
        for owner in owners {
            if !self.broadcaster.has_connection(&owner.id).await {
                report.skipped.push(owner.id);
                continue;
            }
            let Some(guard) = self.claim(&owner.id) else {
                debug!(owner_id = %owner.id, "previous sync still running");
                report.busy.push(owner.id);
                continue;
            };

            let job = OwnerJob {
                engine: self.engine.clone(),
                broadcaster: self.broadcaster.clone(),
                max_results: self.max_results,
                first_sync_limit: self.first_sync_limit,
                cancel: self.cancel.child_token(),
            };
            jobs.spawn(async move {
                let _guard = guard;
                let result = job.run(&owner.id).await;
                (owner.id, result)
            });
            started += 1;
        }
        started
    }

    fn claim(&self, owner_id: &OwnerId) -> Option<InFlight> {
        lock(&self.in_flight)
            .insert(owner_id.clone())
            .then(|| InFlight {
                owners: self.in_flight.clone(),
                owner: owner_id.clone(),
            })
    }
}

/// Logs a finished owner job and flattens its result.
fn settle(joined: Result<JobOutput, JoinError>) -> Option<(OwnerId, Result<usize, String>)> {
    match joined {
        Ok((owner_id, Ok(delivered))) => Some((owner_id, Ok(delivered))),
        Ok((owner_id, Err(e))) => {
            warn!(owner_id = %owner_id, error = %e, "scheduled sync failed");
            Some((owner_id, Err(e.to_string())))
        }
        Err(e) => {
            error!(error = %e, "scheduled sync task panicked");
            None
        }
    }
}

/// One owner's share of a tick.
struct OwnerJob {
    engine: Arc<SyncEngine>,
    broadcaster: Arc<Broadcaster>,
    max_results: u32,
    first_sync_limit: usize,
    cancel: CancellationToken,
}

impl OwnerJob {
    async fn run(&self, owner_id: &OwnerId) -> Result<usize, SyncError> {
        let checkpoint = self.engine.checkpoint(owner_id).await?;
        let first_sync = checkpoint.is_none();

        let outcome = match self
            .engine
            .sync(owner_id, self.max_results, checkpoint.as_deref(), &self.cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(SyncError::Partial(outcome)) => {
                warn!(
                    owner_id = %owner_id,
                    failed = outcome.failures.len(),
                    "scheduled sync partially failed"
                );
                *outcome
            }
            Err(e) => return Err(e),
        };

        let total = outcome.persisted.len();
        if total == 0 {
            return Ok(0);
        }

        let mut persisted = outcome.persisted;
        persisted.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        if first_sync {
            persisted.truncate(self.first_sync_limit);
        }

        let mut delivered = 0;
        for message in &persisted {
            delivered += self.broadcaster.deliver_message(owner_id, message).await;
        }
        delivered += self.broadcaster.deliver_summary(owner_id, total).await;

        info!(owner_id = %owner_id, new = total, first_sync, "pushed new messages");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Credential, Owner};
    use crate::providers::ai::MockInferenceClient;
    use crate::providers::email::{MailboxClient, RawMessage};
    use crate::realtime::{Envelope, EventKind};
    use crate::storage::{CategoryStore, SqliteStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingMailbox {
        messages: Vec<RawMessage>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl MailboxClient for CountingMailbox {
        async fn list_and_fetch(
            &self,
            _credential: &Credential,
            _max_results: u32,
            after_provider_id: Option<&str>,
        ) -> crate::providers::email::Result<Vec<RawMessage>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(crate::providers::email::cursor::after_cursor(
                self.messages.clone(),
                after_provider_id,
                |m| m.provider_id.as_str(),
            ))
        }

        async fn mutate_state(
            &self,
            _credential: &Credential,
            _provider_id: &str,
            _add_labels: &[&str],
            _remove_labels: &[&str],
        ) -> crate::providers::email::Result<()> {
            Ok(())
        }

        async fn delete(
            &self,
            _credential: &Credential,
            _provider_ids: &[String],
        ) -> crate::providers::email::Result<()> {
            Ok(())
        }
    }

    fn raw(id: &str, secs: i64) -> RawMessage {
        RawMessage {
            provider_id: id.to_string(),
            from: "news@example.com".to_string(),
            subject: id.to_string(),
            body: "<p>hi</p>".to_string(),
            body_degraded: false,
            received_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    async fn setup(
        messages: Vec<RawMessage>,
        first_sync_limit: usize,
    ) -> (Scheduler, Arc<Broadcaster>, Arc<CountingMailbox>, OwnerId) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let owner = Owner::new("g-1", "a@example.com", "A", Credential::new("tok"));
        OwnerStore::create(store.as_ref(), &owner).await.unwrap();
        CategoryStore::create(store.as_ref(), &Category::new("Work", "job"))
            .await
            .unwrap();

        let mut inference = MockInferenceClient::new();
        inference
            .expect_classify()
            .returning(|_, categories| Ok(categories[0].name.clone()));
        inference
            .expect_summarize()
            .returning(|_| Ok("summary".to_string()));

        let mailbox = Arc::new(CountingMailbox {
            messages,
            fetches: AtomicUsize::new(0),
        });
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            mailbox.clone(),
            Arc::new(inference),
        ));
        let broadcaster = Arc::new(Broadcaster::with_limits(32, Duration::from_millis(100)));
        let settings = SyncSettings {
            first_sync_limit,
            ..Default::default()
        };
        let scheduler = Scheduler::new(engine, store, broadcaster.clone(), &settings);
        (scheduler, broadcaster, mailbox, owner.id)
    }

    fn drain(receiver: &mut tokio::sync::mpsc::Receiver<String>) -> Vec<Envelope> {
        let mut events = Vec::new();
        while let Ok(raw) = receiver.try_recv() {
            events.push(serde_json::from_str(&raw).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn owners_without_sinks_are_skipped() {
        let (scheduler, _broadcaster, mailbox, owner_id) = setup(vec![raw("a", 1)], 10).await;

        let report = scheduler.run_once().await;

        assert_eq!(report.skipped, vec![owner_id]);
        assert!(report.synced.is_empty());
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_sync_pushes_newest_first_up_to_limit() {
        let messages = vec![raw("a", 1), raw("b", 2), raw("c", 3)];
        let (scheduler, broadcaster, _mailbox, owner_id) = setup(messages, 2).await;
        let mut sub = broadcaster.register(&owner_id).await;

        let report = scheduler.run_once().await;
        assert_eq!(report.synced, vec![owner_id.clone()]);
        assert_eq!(report.delivered, 3);

        let events = drain(&mut sub.receiver);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Connection,
                EventKind::NewEmail,
                EventKind::NewEmail,
                EventKind::EmailSummary,
            ]
        );
        assert_eq!(events[1].data["gmail_id"], "c");
        assert_eq!(events[2].data["gmail_id"], "b");
        assert_eq!(events[3].data["count"], 3);
    }

    #[tokio::test]
    async fn later_ticks_resume_from_checkpoint() {
        let (scheduler, broadcaster, mailbox, owner_id) =
            setup(vec![raw("a", 1), raw("b", 2)], 10).await;
        let mut sub = broadcaster.register(&owner_id).await;

        scheduler.run_once().await;
        drain(&mut sub.receiver);

        let report = scheduler.run_once().await;
        assert_eq!(report.delivered, 0);
        assert!(drain(&mut sub.receiver).is_empty());
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let (scheduler, _broadcaster, _mailbox, _owner_id) = setup(Vec::new(), 10).await;
        let scheduler = Arc::new(scheduler);

        let handle = scheduler.clone().spawn();
        scheduler.stop();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    /// Hangs for the "slow" credential, answers immediately otherwise.
    #[derive(Default)]
    struct StallingMailbox {
        slow_fetches: AtomicUsize,
        fast_fetches: AtomicUsize,
    }

    #[async_trait]
    impl MailboxClient for StallingMailbox {
        async fn list_and_fetch(
            &self,
            credential: &Credential,
            _max_results: u32,
            _after_provider_id: Option<&str>,
        ) -> crate::providers::email::Result<Vec<RawMessage>> {
            if credential.access_token == "slow" {
                self.slow_fetches.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
            } else {
                self.fast_fetches.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Vec::new())
        }

        async fn mutate_state(
            &self,
            _credential: &Credential,
            _provider_id: &str,
            _add_labels: &[&str],
            _remove_labels: &[&str],
        ) -> crate::providers::email::Result<()> {
            Ok(())
        }

        async fn delete(
            &self,
            _credential: &Credential,
            _provider_ids: &[String],
        ) -> crate::providers::email::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stalled_owner_does_not_hold_back_others() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let slow = Owner::new("g-slow", "slow@example.com", "Slow", Credential::new("slow"));
        let fast = Owner::new("g-fast", "fast@example.com", "Fast", Credential::new("fast"));
        OwnerStore::create(store.as_ref(), &slow).await.unwrap();
        OwnerStore::create(store.as_ref(), &fast).await.unwrap();
        CategoryStore::create(store.as_ref(), &Category::new("Work", "job"))
            .await
            .unwrap();

        let mailbox = Arc::new(StallingMailbox::default());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            mailbox.clone(),
            Arc::new(MockInferenceClient::new()),
        ));
        let broadcaster = Arc::new(Broadcaster::with_limits(32, Duration::from_millis(100)));
        let _slow_sub = broadcaster.register(&slow.id).await;
        let _fast_sub = broadcaster.register(&fast.id).await;

        let scheduler = Arc::new(
            Scheduler::new(engine, store, broadcaster, &SyncSettings::default())
                .with_interval(Duration::from_millis(50)),
        );
        let handle = scheduler.clone().spawn();

        tokio::time::sleep(Duration::from_millis(600)).await;
        let fast_runs = mailbox.fast_fetches.load(Ordering::SeqCst);
        assert!(fast_runs >= 3, "fast owner synced {fast_runs} times");
        assert_eq!(mailbox.slow_fetches.load(Ordering::SeqCst), 1);

        scheduler.stop();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_once_skips_owner_already_running() {
        let (scheduler, broadcaster, mailbox, owner_id) = setup(vec![raw("a", 1)], 10).await;
        let _sub = broadcaster.register(&owner_id).await;
        let _held = scheduler.claim(&owner_id).unwrap();

        let report = scheduler.run_once().await;

        assert_eq!(report.busy, vec![owner_id]);
        assert!(report.synced.is_empty());
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 0);
    }
}
