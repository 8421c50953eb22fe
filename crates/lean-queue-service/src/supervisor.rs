//! # Server Supervision
//!
//! Runs the HTTP server as a spawned task and restarts it with exponential
//! back-off when it fails transiently or panics. Non-transient failures (bind
//! errors, bad configuration) and an exhausted restart budget end supervision.

use lean_queue_api::ServiceError;
use rand::Rng;
use std::any::Any;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Back-off schedule for server restarts
///
/// # Examples
///
/// ```rust
/// use lean_queue_service::RestartPolicy;
/// use std::time::Duration;
///
/// let policy = RestartPolicy::default().without_jitter();
/// assert_eq!(policy.calculate_delay(0), Duration::from_millis(500));
/// assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Maximum number of consecutive restarts
    pub max_restarts: u32,

    /// Delay before the first restart
    pub initial_delay: Duration,

    /// Maximum delay between restarts
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,

    /// A run lasting at least this long resets the restart count
    pub reset_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
            reset_after: Duration::from_secs(300),
        }
    }
}

impl RestartPolicy {
    pub fn new(
        max_restarts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_restarts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Delay before restart number `attempt` (0-based)
    ///
    /// `initial * multiplier^attempt`, capped at `max_delay`, then jittered.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_secs = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.min(i32::MAX as u32) as i32);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.use_jitter {
            Self::add_jitter(capped_secs, self.jitter_percent)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    /// True while `attempt` restarts have not yet used up the budget
    pub fn should_restart(&self, attempt: u32) -> bool {
        attempt < self.max_restarts
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent.clamp(0.0, 1.0);
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

/// Restarts a server task according to a [`RestartPolicy`]
pub struct Supervisor {
    policy: RestartPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    /// `shutdown` flips to `true` when the process is asked to stop; no
    /// restart is attempted after that.
    pub fn new(policy: RestartPolicy, shutdown: watch::Receiver<bool>) -> Self {
        Self { policy, shutdown }
    }

    /// Run tasks produced by `factory` until one exits cleanly or supervision
    /// gives up
    pub async fn run<F, Fut>(&self, mut factory: F) -> Result<(), ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let mut restarts: u32 = 0;

        loop {
            let started = Instant::now();
            let outcome = tokio::spawn(factory()).await;

            let failure = match outcome {
                Ok(Ok(())) => {
                    info!("Server exited cleanly");
                    return Ok(());
                }
                Ok(Err(e)) if !e.is_transient() => {
                    error!(error = %e, "Server failed with a non-recoverable error");
                    return Err(e);
                }
                Ok(Err(e)) => e,
                Err(join_error) if join_error.is_panic() => ServiceError::ServerFailed {
                    message: format!(
                        "server task panicked: {}",
                        panic_message(join_error.into_panic())
                    ),
                },
                Err(join_error) => {
                    return Err(ServiceError::ServerFailed {
                        message: join_error.to_string(),
                    });
                }
            };

            if *self.shutdown.borrow() {
                warn!(error = %failure, "Server stopped during shutdown; not restarting");
                return Ok(());
            }

            if started.elapsed() >= self.policy.reset_after {
                restarts = 0;
            }

            if !self.policy.should_restart(restarts) {
                error!(
                    error = %failure,
                    restarts,
                    "Restart limit reached; giving up"
                );
                return Err(failure);
            }

            let delay = self.policy.calculate_delay(restarts);
            restarts += 1;
            warn!(
                error = %failure,
                attempt = restarts,
                delay_ms = delay.as_millis() as u64,
                "Server stopped unexpectedly; restarting"
            );

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                Ok(_) = shutdown.wait_for(|stop| *stop) => {
                    info!("Shutdown requested during restart back-off");
                    return Ok(());
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
