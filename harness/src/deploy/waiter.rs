//! Bounded polling until a resource reports ready

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cloud::{DeploymentsApi, ReadinessProbe};
use crate::errors::HarnessError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Wait settings, passed explicitly to every waiting call
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Total time budget
    pub timeout: Duration,

    /// Delay between two polls
    pub interval: Duration,

    /// Also retry non-success HTTP statuses, not only network failures
    pub retry_transport_errors: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20 * 60),
            interval: Duration::from_secs(10),
            retry_transport_errors: false,
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    fn should_retry(&self, err: &HarnessError) -> bool {
        err.is_transient()
            || (self.retry_transport_errors && matches!(err, HarnessError::TransportError { .. }))
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Poll `probe` until it reports true or the timeout elapses
///
/// The probe always runs at least once, and once more at the deadline.
/// Retryable errors back off exponentially from the poll interval; any other
/// error ends the wait immediately.
pub async fn wait_until<P, Fut>(
    what: &str,
    options: &WaitOptions,
    mut probe: P,
) -> Result<WaitOutcome, HarnessError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, HarnessError>>,
{
    let started = Instant::now();
    let deadline = started + options.timeout;
    let cooldown = CooldownOptions {
        base_delay: options.interval,
        max_delay: options.interval.max(Duration::from_secs(60)),
        multiplier: 2.0,
    };
    let mut err_streak = 0u32;

    loop {
        let delay = match probe().await {
            Ok(true) => {
                info!("{} ready after {:?}", what, started.elapsed());
                return Ok(WaitOutcome::Ready);
            }
            Ok(false) => {
                err_streak = 0;
                debug!("{} not ready yet", what);
                options.interval
            }
            Err(e) if options.should_retry(&e) => {
                let delay = calc_exp_backoff(&cooldown, err_streak);
                err_streak += 1;
                warn!("Polling {} failed (attempt {}), retrying: {}", what, err_streak, e);
                delay
            }
            Err(e) => return Err(e),
        };

        let now = Instant::now();
        if now >= deadline {
            warn!("Gave up waiting for {} after {:?}", what, options.timeout);
            return Ok(WaitOutcome::TimedOut);
        }
        sleep(delay.min(deadline - now)).await;
    }
}

/// Like [`wait_until`], with a timeout turned into `DeadlineExceeded`
pub async fn wait_ready<P, Fut>(
    what: &str,
    options: &WaitOptions,
    probe: P,
) -> Result<(), HarnessError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, HarnessError>>,
{
    match wait_until(what, options, probe).await? {
        WaitOutcome::Ready => Ok(()),
        WaitOutcome::TimedOut => Err(HarnessError::DeadlineExceeded {
            what: what.to_string(),
            timeout: options.timeout,
        }),
    }
}

/// Wait until a deployment resource reports `started`
pub async fn wait_for_resource(
    api: &dyn DeploymentsApi,
    probe: ReadinessProbe<'_>,
    options: &WaitOptions,
) -> Result<(), HarnessError> {
    let what = probe.describe();
    info!("Waiting for {}", what);
    wait_ready(&what, options, || probe.is_ready(api)).await
}
