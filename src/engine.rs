use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::models::{MonitorState, Recipients, Status, StatusSnapshot};
use crate::notifier::Notifier;
use crate::probe::Prober;

pub const ALREADY_RUNNING: &str = "Monitoring is already running";
pub const NOT_RUNNING: &str = "Monitoring was not running";
pub const STOPPED: &str = "🛑 Monitoring stopped";
pub const HOST_REACHABLE: &str = "🟢 Host is reachable";
pub const HOST_UNREACHABLE: &str = "🔴 Host is unreachable";
pub const CONNECTION_RESTORED: &str = "✅ Connection to the host restored!";
pub const CONNECTION_LOST: &str = "⚠️ Host became unreachable!";

pub fn started_message(target: &str) -> String {
    format!("🚀 Connection monitoring started. Host: {}", target)
}

fn transition_message(status: Status) -> &'static str {
    match status {
        Status::Up => CONNECTION_RESTORED,
        Status::Down => CONNECTION_LOST,
    }
}

/// Everything the command path and the ticker both touch.
struct Shared {
    state: MonitorState,
    recipients: Recipients,
}

/// Watches one host and reports reachability changes to the chat.
///
/// A single lock serializes commands and ticks. Replies to `/start` and
/// `/stop` and transition broadcasts are all sent while holding it, so a
/// broadcast can never land after the stop reply. The ticker's abort handle
/// lives outside that lock so shutdown never waits on a stuck broadcast.
pub struct Monitor {
    target: String,
    check_interval: Duration,
    probe_timeout: Duration,
    prober: Arc<dyn Prober>,
    notifier: Notifier,
    shared: Mutex<Shared>,
    ticker: std::sync::Mutex<Option<AbortHandle>>,
}

impl Monitor {
    pub fn new(config: &BotConfig, prober: Arc<dyn Prober>, notifier: Notifier) -> Self {
        Self {
            target: config.target_host.clone(),
            check_interval: config.check_interval(),
            probe_timeout: config.probe_timeout(),
            prober,
            notifier,
            shared: Mutex::new(Shared {
                state: MonitorState::default(),
                recipients: Recipients::new(config.recipient_mode),
            }),
            ticker: std::sync::Mutex::new(None),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub async fn register(&self, chat_id: &str) {
        let mut shared = self.shared.lock().await;
        if shared.recipients.register(chat_id) {
            info!(chat_id, total = shared.recipients.len(), "New notification recipient");
        }
    }

    pub async fn reply(&self, chat_id: &str, text: &str) {
        self.notifier.send(chat_id, text).await;
    }

    pub async fn start(self: &Arc<Self>, chat_id: &str) {
        let mut shared = self.shared.lock().await;
        if shared.state.enabled {
            self.notifier.send(chat_id, ALREADY_RUNNING).await;
            return;
        }

        shared.state.enabled = true;
        self.notifier.send(chat_id, &started_message(&self.target)).await;

        let this = Arc::clone(self);
        let ticker = tokio::spawn(async move { this.run_ticker().await });
        self.replace_ticker(Some(ticker.abort_handle()));
        info!(target_host = %self.target, interval = ?self.check_interval, "Monitoring started");
    }

    pub async fn stop(&self, chat_id: &str) {
        let mut shared = self.shared.lock().await;
        if !shared.state.enabled {
            self.notifier.send(chat_id, NOT_RUNNING).await;
            return;
        }

        shared.state.enabled = false;
        self.replace_ticker(None);
        self.notifier.send(chat_id, STOPPED).await;
        info!(target_host = %self.target, "Monitoring stopped");
    }

    /// One-shot check that ignores and never touches the cached state.
    pub async fn status(&self, chat_id: &str) {
        let text = if self.is_reachable().await { HOST_REACHABLE } else { HOST_UNREACHABLE };
        self.notifier.send(chat_id, text).await;
    }

    async fn is_reachable(&self) -> bool {
        match self.prober.probe(&self.target, self.probe_timeout).await {
            Ok(reachable) => reachable,
            Err(e) => {
                error!(target_host = %self.target, "Status check failed: {}", e);
                false
            }
        }
    }

    async fn run_ticker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        if !self.shared.lock().await.state.enabled {
            return;
        }

        let reachable = match self.prober.probe(&self.target, self.probe_timeout).await {
            Ok(reachable) => reachable,
            Err(e) => {
                error!(target_host = %self.target, "Connection check failed: {}", e);
                return;
            }
        };

        let mut shared = self.shared.lock().await;
        if !shared.state.enabled {
            return;
        }
        let Some(status) = shared.state.record(reachable) else {
            debug!(target_host = %self.target, reachable, "No change");
            return;
        };

        let msg = format!("[CHANGE] {} -> {:?}", self.target, status);
        if status == Status::Down { error!("{}", msg); } else { warn!("{}", msg); }

        let recipients = shared.recipients.list();
        let delivered = self.notifier.broadcast(&recipients, transition_message(status)).await;
        debug!(delivered, total = recipients.len(), "Transition broadcast done");
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let shared = self.shared.lock().await;
        StatusSnapshot {
            target: self.target.clone(),
            monitoring: shared.state.enabled,
            last_known: shared.state.last_known_reachable.into(),
            last_checked: shared.state.last_checked,
            recipient_mode: shared.recipients.mode(),
            recipients: shared.recipients.len(),
        }
    }

    /// Aborts whichever ticker was running before.
    fn replace_ticker(&self, next: Option<AbortHandle>) -> bool {
        let previous = std::mem::replace(
            &mut *self.ticker.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        match previous {
            Some(ticker) => {
                ticker.abort();
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(&self) {
        if self.replace_ticker(None) {
            info!("Monitoring ticker cancelled");
        }
        self.shared.lock().await.state.enabled = false;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RecipientMode;
    use crate::notifier::testing::RecordingTransport;
    use crate::probe::testing::{ScriptedProber, SlowProber};
    use tokio::time::sleep;

    pub(crate) fn config(mode: RecipientMode) -> BotConfig {
        BotConfig {
            bot_name: "pulse_bot".into(),
            bot_token: "123:abc".into(),
            target_host: "10.0.0.5".into(),
            check_interval_secs: 5,
            probe_timeout_ms: 5000,
            recipient_mode: mode,
            use_icmp: false,
            fallback_ports: vec![3389],
            api_port: None,
        }
    }

    pub(crate) fn monitor_with(
        mode: RecipientMode,
        script: impl IntoIterator<Item = Option<bool>>,
    ) -> (Arc<Monitor>, Arc<ScriptedProber>, Arc<RecordingTransport>) {
        let prober = Arc::new(ScriptedProber::new(script));
        let transport = Arc::new(RecordingTransport::default());
        let monitor = Monitor::new(&config(mode), prober.clone(), Notifier::new(transport.clone()));
        (Arc::new(monitor), prober, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_at_start_only_confirms() {
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, [Some(false)]);
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(prober.calls(), 1);
        assert_eq!(transport.texts_to("1"), vec![started_message("10.0.0.5")]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_neither_resets_nor_reschedules() {
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, [Some(true)]);
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;
        monitor.start("1").await;
        sleep(Duration::from_secs(4)).await;

        assert_eq!(prober.calls(), 1);
        assert_eq!(
            transport.texts_to("1"),
            vec![started_message("10.0.0.5"), CONNECTION_RESTORED.to_string(), ALREADY_RUNNING.to_string()]
        );
        assert_eq!(monitor.snapshot().await.last_known, Status::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_notify_only_on_edges() {
        let script = [Some(false), Some(false), Some(true), Some(true), Some(false)];
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, script);
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_secs(21)).await;

        assert_eq!(prober.calls(), 5);
        assert_eq!(
            transport.texts_to("1"),
            vec![started_message("10.0.0.5"), CONNECTION_RESTORED.to_string(), CONNECTION_LOST.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_changes_nothing() {
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, [Some(true), None, Some(true)]);
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_secs(11)).await;

        assert_eq!(prober.calls(), 3);
        assert_eq!(transport.texts_to("1").iter().filter(|t| *t == CONNECTION_RESTORED).count(), 1);
        assert!(!transport.texts_to("1").iter().any(|t| t == CONNECTION_LOST));
        assert!(monitor.snapshot().await.monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_sent_after_stop() {
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, [Some(true)]);
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;
        monitor.stop("1").await;
        prober.set(Some(false));
        sleep(Duration::from_secs(30)).await;

        assert_eq!(prober.calls(), 1);
        assert_eq!(
            transport.texts_to("1"),
            vec![started_message("10.0.0.5"), CONNECTION_RESTORED.to_string(), STOPPED.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_a_check_suppresses_its_result() {
        let prober = Arc::new(SlowProber::new(Duration::from_secs(3), true));
        let transport = Arc::new(RecordingTransport::default());
        let monitor = Arc::new(Monitor::new(
            &config(RecipientMode::Multi),
            prober.clone(),
            Notifier::new(transport.clone()),
        ));
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_secs(1)).await;
        assert_eq!(prober.calls(), 1);
        monitor.stop("1").await;
        sleep(Duration::from_secs(10)).await;

        assert_eq!(prober.calls(), 1);
        assert_eq!(
            transport.texts_to("1"),
            vec![started_message("10.0.0.5"), STOPPED.to_string()]
        );
        assert_eq!(monitor.snapshot().await.last_known, Status::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_does_not_wait_for_a_stuck_broadcast() {
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, [Some(true)]);
        transport.stall_on(CONNECTION_RESTORED);
        monitor.register("1").await;

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(prober.calls(), 1);

        let finished = tokio::time::timeout(Duration::from_secs(1), monitor.shutdown()).await;

        assert!(finished.is_ok());
        assert!(!monitor.snapshot().await.monitoring);
        sleep(Duration::from_secs(20)).await;
        assert_eq!(prober.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_stopped_only_replies() {
        let (monitor, prober, transport) = monitor_with(RecipientMode::Multi, [Some(true)]);
        monitor.register("1").await;

        monitor.stop("1").await;
        monitor.stop("1").await;
        sleep(Duration::from_secs(10)).await;

        assert_eq!(prober.calls(), 0);
        assert_eq!(transport.texts_to("1"), vec![NOT_RUNNING.to_string(), NOT_RUNNING.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_runs_a_single_ticker() {
        let (monitor, prober, _transport) = monitor_with(RecipientMode::Multi, [Some(false)]);

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;
        monitor.stop("1").await;
        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(prober.calls(), 2);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn status_is_idempotent_and_leaves_cache_alone() {
        let (monitor, _prober, transport) = monitor_with(RecipientMode::Multi, [Some(true), Some(true), None]);

        monitor.status("1").await;
        monitor.status("1").await;
        monitor.status("1").await;

        assert_eq!(
            transport.texts_to("1"),
            vec![HOST_REACHABLE.to_string(), HOST_REACHABLE.to_string(), HOST_UNREACHABLE.to_string()]
        );
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.last_known, Status::Down);
        assert!(snapshot.last_checked.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn multi_mode_reaches_every_sender() {
        let (monitor, _prober, transport) = monitor_with(RecipientMode::Multi, [Some(true)]);
        transport.fail_for("2");
        for id in ["1", "2", "3"] {
            monitor.register(id).await;
        }

        monitor.start("3").await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(transport.texts_to("1"), vec![CONNECTION_RESTORED.to_string()]);
        assert_eq!(
            transport.texts_to("3"),
            vec![started_message("10.0.0.5"), CONNECTION_RESTORED.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_mode_reaches_last_sender_only() {
        let (monitor, _prober, transport) = monitor_with(RecipientMode::Single, [Some(true)]);
        monitor.register("1").await;
        monitor.register("2").await;

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(transport.texts_to("1"), vec![started_message("10.0.0.5")]);
        assert_eq!(transport.texts_to("2"), vec![CONNECTION_RESTORED.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_ticker() {
        let (monitor, prober, _transport) = monitor_with(RecipientMode::Multi, [Some(false)]);

        monitor.start("1").await;
        sleep(Duration::from_millis(100)).await;
        monitor.shutdown().await;
        sleep(Duration::from_secs(20)).await;

        assert_eq!(prober.calls(), 1);
        assert!(!monitor.snapshot().await.monitoring);
    }
}
