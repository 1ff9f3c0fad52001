//! Poll pipeline and background refresh loop
//!
//! One cycle is credential lookup → token lifecycle → usage fetch → derivation.
//! Cycles are serialized; a manual refresh supersedes a periodic cycle that is
//! still waiting on the usage endpoint.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

use crate::auth::TokenLifecycleManager;
use crate::error::UsageError;
use crate::providers::{UsageFetcher, UsageSnapshot};
use crate::tray::{self, DerivedState};

/// What the presentation layer gets after every cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PollOutcome {
    Success {
        snapshot: UsageSnapshot,
        state: DerivedState,
    },
    NoCredentials,
    FetchFailed,
}

impl PollOutcome {
    fn from_error(err: &UsageError) -> Self {
        if err.is_credential_problem() {
            PollOutcome::NoCredentials
        } else {
            PollOutcome::FetchFailed
        }
    }
}

/// Receives each poll result; implemented by the tray or the CLI host
#[async_trait]
pub trait UsagePresenter: Send + Sync {
    async fn present(&self, outcome: &PollOutcome);
}

pub struct UsagePipeline {
    tokens: Arc<TokenLifecycleManager>,
    fetcher: Arc<dyn UsageFetcher>,
    single_flight: tokio::sync::Mutex<()>,
    latest: RwLock<Option<UsageSnapshot>>,
}

impl UsagePipeline {
    pub fn new(tokens: Arc<TokenLifecycleManager>, fetcher: Arc<dyn UsageFetcher>) -> Self {
        Self {
            tokens,
            fetcher,
            single_flight: tokio::sync::Mutex::new(()),
            latest: RwLock::new(None),
        }
    }

    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }

    /// Last successful snapshot, replaced wholesale by each success
    pub fn latest(&self) -> Option<UsageSnapshot> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }

    pub async fn run_cycle(&self) -> PollOutcome {
        let _guard = self.single_flight.lock().await;

        match self.try_cycle().await {
            Ok(snapshot) => {
                let state = tray::derive(&snapshot);
                if let Ok(mut latest) = self.latest.write() {
                    *latest = Some(snapshot.clone());
                }
                tracing::debug!("Usage updated: tier {:?}", state.tier);
                PollOutcome::Success { snapshot, state }
            }
            Err(err) => {
                if err.is_credential_problem() {
                    tracing::info!("{}", err);
                } else {
                    tracing::warn!("{}", err);
                }
                PollOutcome::from_error(&err)
            }
        }
    }

    async fn try_cycle(&self) -> Result<UsageSnapshot, UsageError> {
        // Run the token step as its own task: if this cycle is cancelled, a refresh
        // that already reached the server still gets persisted.
        let tokens = self.tokens.clone();
        let token = tokio::spawn(async move { tokens.try_get_valid_access_token().await })
            .await
            .map_err(|err| UsageError::TaskAborted(err.to_string()))??;

        Ok(self.fetcher.try_fetch(&token).await?)
    }
}

/// Handle for "Refresh Now"
#[derive(Clone, Default)]
pub struct RefreshTrigger {
    notify: Arc<Notify>,
}

impl RefreshTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Poll immediately, then every `interval` and on each manual request
pub async fn start_refresh_loop(
    pipeline: Arc<UsagePipeline>,
    interval: Duration,
    trigger: RefreshTrigger,
    presenter: Arc<dyn UsagePresenter>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = trigger.requested() => tracing::debug!("Manual refresh requested"),
        }

        // A manual request arriving mid-cycle drops this cycle and starts over.
        let outcome = loop {
            tokio::select! {
                outcome = pipeline.run_cycle() => break outcome,
                _ = trigger.requested() => {
                    tracing::debug!("Poll superseded by manual refresh");
                }
            }
        };

        presenter.present(&outcome).await;
        ticker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::auth::tests::{home_with_credentials, manager, now_ms, oauth_body, FakeRefresher};
    use crate::providers::{FetchError, UsageWindow, WindowKind};
    use crate::tray::AlertTier;

    struct FakeFetcher {
        calls: AtomicUsize,
        utilization: Option<f64>,
        delay: Duration,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn returning(utilization: Option<f64>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                utilization,
                delay: Duration::ZERO,
                tokens_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UsageFetcher for FakeFetcher {
        fn name(&self) -> &'static str {
            "Fake"
        }

        async fn try_fetch(&self, access_token: &str) -> Result<UsageSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens_seen
                .lock()
                .expect("lock")
                .push(access_token.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.utilization {
                Some(utilization) => Ok(UsageSnapshot::new(vec![UsageWindow {
                    kind: WindowKind::FiveHour,
                    utilization,
                    resets_at: None,
                }])),
                None => Err(FetchError::Status(401)),
            }
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        outcomes: Mutex<Vec<PollOutcome>>,
        seen: Notify,
    }

    #[async_trait]
    impl UsagePresenter for RecordingPresenter {
        async fn present(&self, outcome: &PollOutcome) {
            self.outcomes.lock().expect("lock").push(outcome.clone());
            self.seen.notify_one();
        }
    }

    fn pipeline(
        home: &std::path::Path,
        refresher: Arc<FakeRefresher>,
        fetcher: Arc<FakeFetcher>,
    ) -> Arc<UsagePipeline> {
        Arc::new(UsagePipeline::new(Arc::new(manager(home, refresher)), fetcher))
    }

    #[tokio::test]
    async fn success_outcome_carries_derived_state() {
        let (home, _path) =
            home_with_credentials(oauth_body(Some(now_ms() + 3_600_000), Some("rt")));
        let fetcher = Arc::new(FakeFetcher::returning(Some(91.0)));
        let pipeline = pipeline(home.path(), Arc::new(FakeRefresher::ok()), fetcher.clone());

        match pipeline.run_cycle().await {
            PollOutcome::Success { state, .. } => assert_eq!(state.tier, AlertTier::Critical),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fetcher.tokens_seen.lock().expect("lock")[0], "current-access");
        assert!(pipeline.latest().is_some());
    }

    #[tokio::test]
    async fn missing_credentials_never_hit_the_network() {
        let empty = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::returning(Some(10.0)));
        let pipeline = pipeline(empty.path(), Arc::new(FakeRefresher::ok()), fetcher.clone());

        assert_eq!(pipeline.run_cycle().await, PollOutcome::NoCredentials);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.latest().is_none());
    }

    #[tokio::test]
    async fn refresh_and_fetch_failures_are_fetch_failed() {
        let (home, _path) = home_with_credentials(oauth_body(Some(0), Some("rt")));
        let fetcher = Arc::new(FakeFetcher::returning(Some(10.0)));
        let failing = pipeline(home.path(), Arc::new(FakeRefresher::failing()), fetcher.clone());
        assert_eq!(failing.run_cycle().await, PollOutcome::FetchFailed);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

        let (home, _path) =
            home_with_credentials(oauth_body(Some(now_ms() + 3_600_000), Some("rt")));
        let unauthorized = pipeline(
            home.path(),
            Arc::new(FakeRefresher::ok()),
            Arc::new(FakeFetcher::returning(None)),
        );
        assert_eq!(unauthorized.run_cycle().await, PollOutcome::FetchFailed);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_no_credentials() {
        let (home, _path) = home_with_credentials(oauth_body(Some(0), None));
        let pipeline = pipeline(
            home.path(),
            Arc::new(FakeRefresher::ok()),
            Arc::new(FakeFetcher::returning(Some(10.0))),
        );
        assert_eq!(pipeline.run_cycle().await, PollOutcome::NoCredentials);
    }

    #[tokio::test]
    async fn failed_cycle_keeps_previous_snapshot() {
        let (home, path) =
            home_with_credentials(oauth_body(Some(now_ms() + 3_600_000), Some("rt")));
        let pipeline = pipeline(
            home.path(),
            Arc::new(FakeRefresher::ok()),
            Arc::new(FakeFetcher::returning(Some(50.0))),
        );
        pipeline.run_cycle().await;
        let first = pipeline.latest().expect("snapshot");

        std::fs::remove_file(&path).expect("remove");
        assert_eq!(pipeline.run_cycle().await, PollOutcome::NoCredentials);
        assert_eq!(pipeline.latest(), Some(first));
    }

    #[tokio::test]
    async fn concurrent_cycles_share_one_refresh() {
        let (home, _path) = home_with_credentials(oauth_body(Some(0), Some("rt-old")));
        let refresher = Arc::new(FakeRefresher {
            delay: Duration::from_millis(50),
            ..FakeRefresher::ok()
        });
        let fetcher = Arc::new(FakeFetcher::returning(Some(20.0)));
        let pipeline = pipeline(home.path(), refresher.clone(), fetcher.clone());

        let (a, b) = tokio::join!(pipeline.run_cycle(), pipeline.run_cycle());
        assert!(matches!(a, PollOutcome::Success { .. }));
        assert!(matches!(b, PollOutcome::Success { .. }));
        assert_eq!(refresher.calls(), 1);
        let seen = fetcher.tokens_seen.lock().expect("lock").clone();
        assert_eq!(seen, vec!["access-1-from-rt-old", "access-1-from-rt-old"]);
    }

    #[tokio::test]
    async fn loop_polls_immediately_and_on_manual_request() {
        let (home, _path) =
            home_with_credentials(oauth_body(Some(now_ms() + 3_600_000), Some("rt")));
        let fetcher = Arc::new(FakeFetcher::returning(Some(30.0)));
        let pipeline = pipeline(home.path(), Arc::new(FakeRefresher::ok()), fetcher.clone());
        let presenter = Arc::new(RecordingPresenter::default());
        let trigger = RefreshTrigger::new();

        let handle = tokio::spawn(start_refresh_loop(
            pipeline,
            Duration::from_secs(3600),
            trigger.clone(),
            presenter.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), presenter.seen.notified())
            .await
            .expect("initial poll");
        trigger.request();
        tokio::time::timeout(Duration::from_secs(5), presenter.seen.notified())
            .await
            .expect("manual poll");
        handle.abort();

        assert_eq!(presenter.outcomes.lock().expect("lock").len(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn manual_request_supersedes_in_flight_fetch() {
        let (home, _path) =
            home_with_credentials(oauth_body(Some(now_ms() + 3_600_000), Some("rt")));
        let fetcher = Arc::new(FakeFetcher {
            delay: Duration::from_millis(300),
            ..FakeFetcher::returning(Some(30.0))
        });
        let pipeline = pipeline(home.path(), Arc::new(FakeRefresher::ok()), fetcher.clone());
        let presenter = Arc::new(RecordingPresenter::default());
        let trigger = RefreshTrigger::new();

        let handle = tokio::spawn(start_refresh_loop(
            pipeline,
            Duration::from_secs(3600),
            trigger.clone(),
            presenter.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.request();
        tokio::time::timeout(Duration::from_secs(5), presenter.seen.notified())
            .await
            .expect("poll");
        handle.abort();

        // The first fetch was dropped; only the restarted cycle was presented.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(presenter.outcomes.lock().expect("lock").len(), 1);
    }
}
