//! Bounded polling of external state.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PollingConfig;

/// Result of one probe
#[derive(Debug)]
pub enum PollStatus<T, E> {
    Ready(T),
    /// Not there yet; does not count as a failure
    Pending,
    /// Counts towards `max_failures`
    Failed(E),
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub max_failures: u32,
}

impl PollSettings {
    /// Waiting for the provider to report a machine state
    pub fn state_wait(config: &PollingConfig) -> Self {
        Self {
            interval: config.state_wait_interval(),
            timeout: Some(config.state_wait_timeout()),
            max_failures: config.state_wait_max_failures,
        }
    }

    /// Waiting for the provider to confirm termination
    pub fn termination_wait(config: &PollingConfig) -> Self {
        Self {
            timeout: Some(config.termination_wait_timeout()),
            ..Self::state_wait(config)
        }
    }

    /// Waiting for hosts to answer a ping; every unanswered round is a failure
    pub fn reachability(config: &PollingConfig) -> Self {
        Self {
            interval: config.ping_interval(),
            timeout: None,
            max_failures: config.ping_max_failures,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E: Display> {
    #[error("Timed out after {elapsed:?} waiting for {name}")]
    Timeout { name: String, elapsed: Duration },

    #[error("Gave up waiting for {name} after {failures} failures: {last_error}")]
    MaxFailures {
        name: String,
        failures: u32,
        last_error: E,
    },
}

/// Probe until ready, sleeping `interval` between probes.
///
/// The probe receives its 1-based round number.
pub async fn poll_until<T, E, F, Fut>(
    name: &str,
    settings: PollSettings,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStatus<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let mut failures = 0;
    let mut round = 0;

    loop {
        round += 1;
        match probe(round).await {
            PollStatus::Ready(value) => {
                debug!(poll = name, round, "Poll condition met");
                return Ok(value);
            }
            PollStatus::Pending => {
                debug!(poll = name, round, "Still waiting");
            }
            PollStatus::Failed(err) => {
                failures += 1;
                warn!(poll = name, round, failures, error = %err, "Poll probe failed");
                if failures >= settings.max_failures {
                    return Err(PollError::MaxFailures {
                        name: name.to_string(),
                        failures,
                        last_error: err,
                    });
                }
            }
        }

        if let Some(timeout) = settings.timeout {
            if started.elapsed() + settings.interval > timeout {
                return Err(PollError::Timeout {
                    name: name.to_string(),
                    elapsed: started.elapsed(),
                });
            }
        }
        tokio::time::sleep(settings.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(timeout: Option<Duration>, max_failures: u32) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(1),
            timeout,
            max_failures,
        }
    }

    #[tokio::test]
    async fn test_ready_after_pending_rounds() {
        let result: Result<u32, PollError<String>> =
            poll_until("state", settings(None, 1), |round| async move {
                if round < 3 {
                    PollStatus::Pending
                } else {
                    PollStatus::Ready(round)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_max_failures_carries_last_error() {
        let result: Result<(), PollError<String>> =
            poll_until("ping", settings(None, 2), |round| async move {
                PollStatus::Failed(format!("round {round}"))
            })
            .await;
        match result {
            Err(PollError::MaxFailures {
                failures,
                last_error,
                ..
            }) => {
                assert_eq!(failures, 2);
                assert_eq!(last_error, "round 2");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_while_pending() {
        let result: Result<(), PollError<String>> = poll_until(
            "state",
            PollSettings {
                interval: Duration::from_millis(5),
                timeout: Some(Duration::from_millis(12)),
                max_failures: 10,
            },
            |_| async { PollStatus::Pending },
        )
        .await;
        assert!(matches!(result, Err(PollError::Timeout { .. })));
    }
}
