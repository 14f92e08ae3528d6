//! Background token refresh.
//!
//! One task per scheduler watches the session store and keeps at most one timer.
//! When the timer fires it asks the backend for a new token and re-arms; when the
//! session ends the timer is dropped along with any refresh still in flight.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, sleep_until},
};

use crate::{
    auth::AuthApiState,
    session::{Session, SessionStore},
};

/// How long after a token is issued the next refresh happens, absent other information.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(14 * 60);

/// Lower bound for expiry-derived delays, so a tiny `expires_in` cannot spin the loop.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// What to do when a refresh request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and stop refreshing. The session is left to expire server-side.
    Stop,
    /// Retry with exponential backoff; after `max_attempts` consecutive failures the
    /// session is logged out locally.
    Backoff {
        max_attempts: u32,
        base_delay: Duration,
    },
}

/// RefreshPolicy
///
/// Timing for the refresh loop. By default the delay is the fixed 14 minute interval;
/// `use_server_expiry` derives it from the backend's `expires_in` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
    pub use_server_expiry: bool,
    /// How long before the declared expiry to refresh, when `use_server_expiry` is set.
    pub expiry_margin: Duration,
    pub on_failure: FailurePolicy,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            use_server_expiry: false,
            expiry_margin: Duration::from_secs(60),
            on_failure: FailurePolicy::Backoff {
                max_attempts: 3,
                base_delay: Duration::from_secs(30),
            },
        }
    }
}

impl RefreshPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_failure(mut self, on_failure: FailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn from_server_expiry(mut self, margin: Duration) -> Self {
        self.use_server_expiry = true;
        self.expiry_margin = margin;
        self
    }

    /// Delay before refreshing a token the server said lives `expires_in` seconds.
    pub fn delay_for(&self, expires_in: Option<u64>) -> Duration {
        match expires_in {
            Some(secs) if self.use_server_expiry => Duration::from_secs(secs)
                .saturating_sub(self.expiry_margin)
                .max(MIN_REFRESH_DELAY),
            _ => self.interval,
        }
    }

    /// delay_since_issue
    ///
    /// Like `delay_for`, but counted from when the token was issued rather than from
    /// `now`. A session restored from disk is partway through its lifetime already.
    /// Elapsed time is taken in whole seconds and the result never drops below the
    /// minimum delay.
    pub fn delay_since_issue(
        &self,
        expires_in: Option<u64>,
        issued_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Duration {
        let delay = self.delay_for(expires_in);
        let Some(issued_at) = issued_at else {
            return delay;
        };
        let elapsed = u64::try_from((now - issued_at).num_seconds()).unwrap_or(0);
        if elapsed == 0 {
            return delay;
        }
        delay
            .saturating_sub(Duration::from_secs(elapsed))
            .max(MIN_REFRESH_DELAY)
    }

    /// retry_delay
    ///
    /// Delay before the next attempt after `failures` consecutive failures, or `None`
    /// when the policy gives up.
    pub fn retry_delay(&self, failures: u32) -> Option<Duration> {
        match self.on_failure {
            FailurePolicy::Stop => None,
            FailurePolicy::Backoff {
                max_attempts,
                base_delay,
            } => {
                if failures == 0 || failures >= max_attempts {
                    return None;
                }
                let exponent = (failures - 1).min(16);
                Some(base_delay.saturating_mul(1 << exponent))
            }
        }
    }
}

/// Observable state of the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No session, or refreshing has stopped for the current one.
    Idle,
    /// A single timer is pending. `attempt` counts failures in the current cycle.
    Armed { deadline: Instant, attempt: u32 },
    /// A refresh request is in flight.
    Refreshing { attempt: u32 },
}

impl RefreshState {
    pub fn is_armed(&self) -> bool {
        matches!(self, RefreshState::Armed { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            RefreshState::Armed { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Timers currently pending. Never more than one.
    pub fn pending_timers(&self) -> usize {
        usize::from(self.is_armed())
    }
}

/// TokenRefreshScheduler
///
/// Owns the refresh loop's task. `start` spawns it on the current tokio runtime,
/// `stop` (or dropping the scheduler) aborts it.
pub struct TokenRefreshScheduler {
    store: SessionStore,
    auth: AuthApiState,
    policy: RefreshPolicy,
    state: watch::Sender<RefreshState>,
    task: Option<JoinHandle<()>>,
}

impl TokenRefreshScheduler {
    pub fn new(store: SessionStore, auth: AuthApiState, policy: RefreshPolicy) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            store,
            auth,
            policy,
            state,
            task: None,
        }
    }

    /// start
    ///
    /// Spawns the refresh loop. If the store is already authenticated (for example
    /// after rehydration) a timer is armed right away. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let refresh_loop = RefreshLoop {
            store: self.store.clone(),
            auth: self.auth.clone(),
            policy: self.policy,
            state: self.state.clone(),
        };
        self.task = Some(tokio::spawn(refresh_loop.run()));
        tracing::debug!(policy = ?self.policy, "token refresh scheduler started");
    }

    /// stop
    ///
    /// Aborts the loop. The pending timer and any in-flight refresh go with it.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("token refresh scheduler stopped");
        }
        self.state.send_replace(RefreshState::Idle);
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    pub fn pending_timers(&self) -> usize {
        self.state().pending_timers()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }
}

impl Drop for TokenRefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    generation: u64,
    deadline: Instant,
    attempt: u32,
}

impl Timer {
    fn after(generation: u64, delay: Duration, attempt: u32) -> Self {
        Self {
            generation,
            deadline: Instant::now() + delay,
            attempt,
        }
    }
}

struct RefreshLoop {
    store: SessionStore,
    auth: AuthApiState,
    policy: RefreshPolicy,
    state: watch::Sender<RefreshState>,
}

impl RefreshLoop {
    async fn run(self) {
        let mut session_rx = self.store.subscribe();
        // Generation this loop has already armed for; a new one means a new login.
        let mut owned: Option<u64> = None;
        let mut timer: Option<Timer> = None;

        loop {
            let session = session_rx.borrow_and_update().clone();
            if !session.is_authenticated {
                if timer.take().is_some() {
                    tracing::debug!("session ended, refresh timer cancelled");
                }
                owned = None;
            } else if owned != Some(session.generation()) {
                let delay = self.policy.delay_since_issue(
                    session.expires_in,
                    session.issued_at,
                    Utc::now(),
                );
                owned = Some(session.generation());
                timer = Some(Timer::after(session.generation(), delay, 0));
                tracing::info!(generation = session.generation(), ?delay, "refresh timer armed");
            }
            self.publish(timer);

            let Some(armed) = timer else {
                if session_rx.changed().await.is_err() {
                    break;
                }
                continue;
            };

            let fired = tokio::select! {
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
                () = sleep_until(armed.deadline) => true,
            };

            if fired {
                timer = self.refresh(&mut session_rx, armed).await;
            }
        }

        self.state.send_replace(RefreshState::Idle);
    }

    /// One refresh attempt. Returns the next timer, if any.
    async fn refresh(
        &self,
        session_rx: &mut watch::Receiver<Session>,
        armed: Timer,
    ) -> Option<Timer> {
        let generation = armed.generation;
        self.state.send_replace(RefreshState::Refreshing {
            attempt: armed.attempt,
        });
        tracing::debug!(generation, attempt = armed.attempt, "refreshing access token");

        // Dropping the request future when the session goes away cancels it.
        let outcome = tokio::select! {
            result = self.auth.refresh() => Some(result),
            () = session_superseded(session_rx, generation) => None,
        };

        match outcome {
            None => {
                tracing::info!(generation, "session changed during refresh, request abandoned");
                None
            }
            Some(Ok(grant)) => {
                let delay = self.policy.delay_for(grant.expires_in);
                if self.store.apply_refresh(generation, grant) {
                    tracing::info!(generation, ?delay, "access token refreshed");
                    Some(Timer::after(generation, delay, 0))
                } else {
                    tracing::debug!(generation, "refresh result for a stale session discarded");
                    None
                }
            }
            Some(Err(e)) => {
                let failures = armed.attempt + 1;
                match (self.policy.retry_delay(failures), self.policy.on_failure) {
                    (Some(delay), _) => {
                        tracing::warn!(error = %e, failures, ?delay, "token refresh failed, retrying");
                        Some(Timer::after(generation, delay, failures))
                    }
                    (None, FailurePolicy::Stop) => {
                        tracing::warn!(error = %e, "token refresh failed, session will expire");
                        None
                    }
                    (None, FailurePolicy::Backoff { .. }) => {
                        tracing::error!(error = %e, failures, "token refresh kept failing, ending session");
                        self.store.end_session(generation);
                        None
                    }
                }
            }
        }
    }

    fn publish(&self, timer: Option<Timer>) {
        let next = match timer {
            Some(t) => RefreshState::Armed {
                deadline: t.deadline,
                attempt: t.attempt,
            },
            None => RefreshState::Idle,
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Resolves once the session at `generation` has ended or been replaced.
async fn session_superseded(session_rx: &mut watch::Receiver<Session>, generation: u64) {
    let _ = session_rx
        .wait_for(|s| !s.is_authenticated || s.generation() != generation)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_ignores_server_expiry() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.delay_for(Some(60)), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(policy.delay_for(None), DEFAULT_REFRESH_INTERVAL);
    }

    #[test]
    fn server_expiry_policy_subtracts_margin_with_floor() {
        let policy = RefreshPolicy::default().from_server_expiry(Duration::from_secs(60));
        assert_eq!(policy.delay_for(Some(900)), Duration::from_secs(840));
        assert_eq!(policy.delay_for(Some(30)), MIN_REFRESH_DELAY);
        assert_eq!(policy.delay_for(None), DEFAULT_REFRESH_INTERVAL);
    }

    #[test]
    fn delay_counts_from_issue() {
        let now = Utc::now();
        let policy = RefreshPolicy::default();
        let ten_minutes_ago = Some(now - chrono::Duration::seconds(600));

        assert_eq!(policy.delay_since_issue(None, None, now), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(policy.delay_since_issue(None, Some(now), now), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(
            policy.delay_since_issue(None, ten_minutes_ago, now),
            Duration::from_secs(4 * 60)
        );

        let long_ago = Some(now - chrono::Duration::hours(3));
        assert_eq!(policy.delay_since_issue(None, long_ago, now), MIN_REFRESH_DELAY);

        // A clock that went backwards counts as nothing elapsed.
        let future = Some(now + chrono::Duration::seconds(30));
        assert_eq!(policy.delay_since_issue(None, future, now), DEFAULT_REFRESH_INTERVAL);
    }

    #[test]
    fn backoff_doubles_until_attempts_run_out() {
        let policy = RefreshPolicy::default().with_failure(FailurePolicy::Backoff {
            max_attempts: 4,
            base_delay: Duration::from_secs(10),
        });
        assert_eq!(policy.retry_delay(1), Some(Duration::from_secs(10)));
        assert_eq!(policy.retry_delay(2), Some(Duration::from_secs(20)));
        assert_eq!(policy.retry_delay(3), Some(Duration::from_secs(40)));
        assert_eq!(policy.retry_delay(4), None);
    }

    #[test]
    fn stop_policy_never_retries() {
        let policy = RefreshPolicy::default().with_failure(FailurePolicy::Stop);
        assert_eq!(policy.retry_delay(1), None);
    }
}
