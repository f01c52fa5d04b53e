/// Idle-timeout supervision for an open session.
///
/// `IdleTracker` is the pure tick-driven state machine; `SessionMonitor`
/// is the async driver that owns the timer, samples activity and closes
/// the session event when the cumulative idle budget runs out.
use crate::config::SessionConfig;
use crate::db::models::LogoutType;
use crate::ledger::EventLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sampled activity position, typically the pointer location
pub type ActivityPoint = (i32, i32);

/// Supplies the current activity position on each tick
pub trait ActivitySampler: Send + Sync {
    fn sample(&self) -> ActivityPoint;
}

/// Monitor state; `LoggedOut` is terminal for the session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Active,
    /// Inactivity observed; carries the accumulated idle time
    Idle { accumulated: Duration },
    LoggedOut,
}

/// Pure idle-accumulation state machine. One call per tick; the logout
/// transition fires exactly once.
#[derive(Debug)]
pub struct IdleTracker {
    check_interval: Duration,
    idle_budget: Duration,
    last_position: Option<ActivityPoint>,
    state: MonitorState,
}

impl IdleTracker {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            check_interval: Duration::from_millis(config.idle_check_interval_ms),
            idle_budget: Duration::from_millis(config.auto_logout_ms),
            last_position: None,
            state: MonitorState::Active,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Feed one tick's activity sample. Returns true on the single
    /// transition into `LoggedOut`; every later tick is ignored.
    pub fn on_tick(&mut self, position: ActivityPoint) -> bool {
        if self.state == MonitorState::LoggedOut {
            return false;
        }

        let unchanged = self.last_position == Some(position);
        self.last_position = Some(position);

        if !unchanged {
            self.state = MonitorState::Active;
            return false;
        }

        let accumulated = match self.state {
            MonitorState::Idle { accumulated } => accumulated + self.check_interval,
            _ => self.check_interval,
        };

        if accumulated >= self.idle_budget {
            self.state = MonitorState::LoggedOut;
            true
        } else {
            self.state = MonitorState::Idle { accumulated };
            false
        }
    }
}

/// Timer-driven supervisor for one session event.
///
/// Runs a single task that owns the tick interval; `stop` signals the
/// task and joins it, so no tick can fire after cancellation returns.
pub struct SessionMonitor {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionMonitor {
    /// Begin supervising `event_id`. On idle-budget exhaustion the event
    /// is closed with `by_inactivity` and the timer stops.
    pub fn start(
        config: SessionConfig,
        sampler: Arc<dyn ActivitySampler>,
        ledger: EventLedger,
        event_id: i64,
    ) -> Self {
        let (cancel, mut cancel_rx) = watch::channel(false);
        let mut tracker = IdleTracker::new(&config);
        let interval = Duration::from_millis(config.idle_check_interval_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {
                        if tracker.on_tick(sampler.sample()) {
                            tracing::info!(event_id, "Idle budget exhausted, logging out");
                            if let Err(e) = ledger.record_logout(event_id, LogoutType::ByInactivity).await {
                                tracing::error!(event_id, "Failed to record inactivity logout: {}", e);
                            }
                            break;
                        }
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    /// Stop supervision before any further tick can be observed. Used on
    /// explicit user logout and when a new session takes over the station.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{LoginType, NewSessionEvent};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn config(interval_ms: u64, budget_ms: u64) -> SessionConfig {
        SessionConfig {
            idle_check_interval_ms: interval_ms,
            auto_logout_ms: budget_ms,
        }
    }

    /// Always reports the same position
    struct StillSampler;

    impl ActivitySampler for StillSampler {
        fn sample(&self) -> ActivityPoint {
            (100, 200)
        }
    }

    /// Reports a new position on every sample
    struct MovingSampler {
        x: AtomicI32,
    }

    impl ActivitySampler for MovingSampler {
        fn sample(&self) -> ActivityPoint {
            (self.x.fetch_add(1, Ordering::SeqCst), 0)
        }
    }

    #[test]
    fn test_tracker_logs_out_exactly_once() {
        let mut tracker = IdleTracker::new(&config(1_000, 5_000));

        // Baseline tick establishes the position
        assert!(!tracker.on_tick((1, 1)));

        // Five consecutive no-activity ticks reach the budget on the fifth
        for _ in 0..4 {
            assert!(!tracker.on_tick((1, 1)));
        }
        assert!(tracker.on_tick((1, 1)));
        assert_eq!(tracker.state(), MonitorState::LoggedOut);

        // A sixth tick after logout produces no further transition
        assert!(!tracker.on_tick((1, 1)));
        assert_eq!(tracker.state(), MonitorState::LoggedOut);
    }

    #[test]
    fn test_tracker_activity_resets_accumulator() {
        let mut tracker = IdleTracker::new(&config(1_000, 3_000));

        assert!(!tracker.on_tick((1, 1)));
        assert!(!tracker.on_tick((1, 1)));
        assert!(!tracker.on_tick((1, 1)));
        assert_eq!(
            tracker.state(),
            MonitorState::Idle {
                accumulated: Duration::from_millis(2_000)
            }
        );

        // Movement drops back to Active with a fresh budget
        assert!(!tracker.on_tick((2, 2)));
        assert_eq!(tracker.state(), MonitorState::Active);

        assert!(!tracker.on_tick((2, 2)));
        assert!(!tracker.on_tick((2, 2)));
        assert!(tracker.on_tick((2, 2)));
    }

    async fn open_event(ledger: &EventLedger) -> i64 {
        ledger
            .record_login(&NewSessionEvent {
                email: "a@b.edu".to_string(),
                device: "Aurora alpha".to_string(),
                login_time: None,
                login_type: LoginType::Local,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_monitor_closes_event_by_inactivity() {
        let pool = db::memory_pool().await;
        db::init_schema(&pool).await.unwrap();
        let ledger = EventLedger::new(pool);
        let event_id = open_event(&ledger).await;

        // Pause only after the fixture is built: sqlx's pool timers misfire
        // under the auto-advancing paused clock during connect.
        tokio::time::pause();
        let monitor = SessionMonitor::start(
            config(1_000, 5_000),
            Arc::new(StillSampler),
            ledger.clone(),
            event_id,
        );

        tokio::time::sleep(Duration::from_millis(5_500)).await;

        // Back on the real clock for the DB assertions: sqlx's pool
        // timeouts fire spuriously while the paused clock auto-advances.
        tokio::time::resume();
        let event = ledger.find_event(event_id).await.unwrap();
        assert_eq!(event.logout_type, LogoutType::ByInactivity);
        assert!(event.logout_time.is_some());

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_monitor_activity_defers_logout() {
        let pool = db::memory_pool().await;
        db::init_schema(&pool).await.unwrap();
        let ledger = EventLedger::new(pool);
        let event_id = open_event(&ledger).await;

        tokio::time::pause();
        let monitor = SessionMonitor::start(
            config(1_000, 5_000),
            Arc::new(MovingSampler { x: AtomicI32::new(0) }),
            ledger.clone(),
            event_id,
        );

        tokio::time::sleep(Duration::from_millis(20_000)).await;
        tokio::time::resume();

        // Constant movement: the event is still open
        let event = ledger.find_event(event_id).await.unwrap();
        assert_eq!(event.logout_type, LogoutType::Pending);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_prevents_any_later_transition() {
        let pool = db::memory_pool().await;
        db::init_schema(&pool).await.unwrap();
        let ledger = EventLedger::new(pool);
        let event_id = open_event(&ledger).await;

        tokio::time::pause();
        let monitor = SessionMonitor::start(
            config(1_000, 5_000),
            Arc::new(StillSampler),
            ledger.clone(),
            event_id,
        );

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        monitor.stop().await;

        // Idle long past the budget: the stopped monitor must not fire
        tokio::time::sleep(Duration::from_millis(60_000)).await;
        tokio::time::resume();
        let event = ledger.find_event(event_id).await.unwrap();
        assert_eq!(event.logout_type, LogoutType::Pending);

        // The user-initiated close still applies normally
        ledger
            .record_logout(event_id, LogoutType::ByUser)
            .await
            .unwrap();
    }
}
