//! Polling a submitted request to completion.

use crate::error::CallErrorKind;
use crate::protocol::{RequestId, RequestStatus, ResponseProcessor, Transport};
use candid::Principal;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

///
/// PollingPolicy
///
/// Pacing for `read_state` polling. Each in-flight status multiplies the
/// interval by `backoff`; `backoff` must be finite and non-negative.
///

#[derive(Clone, Debug, PartialEq)]
pub struct PollingPolicy {
    pub interval: Duration,
    pub backoff: f64,
    pub limit: PollLimit,
}

impl PollingPolicy {
    /// Stop after `max` in-flight statuses.
    #[must_use]
    pub fn attempts(max: u32) -> Self {
        Self {
            limit: PollLimit::Attempts(max),
            ..Self::default()
        }
    }

    /// Stop once `max` has elapsed since polling began.
    #[must_use]
    pub fn deadline(max: Duration) -> Self {
        Self {
            limit: PollLimit::Deadline(max),
            ..Self::default()
        }
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff: 1.2,
            limit: PollLimit::Deadline(Duration::from_secs(300)),
        }
    }
}

///
/// PollLimit
///

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollLimit {
    Attempts(u32),
    Deadline(Duration),
}

/// Poll `request_id` until it resolves, rejects, or the policy gives up.
pub(crate) async fn poll_request(
    transport: &dyn Transport,
    processor: &ResponseProcessor<'_>,
    canister_id: &Principal,
    request_id: &RequestId,
    policy: &PollingPolicy,
) -> Result<Vec<u8>, CallErrorKind> {
    let started = Instant::now();
    let mut interval = policy.interval;
    let mut attempts: u32 = 0;

    loop {
        let certificate = transport.read_state(canister_id, request_id).await?;
        match processor.check_status(request_id, &certificate)? {
            RequestStatus::Replied(arg) => return Ok(arg),
            RequestStatus::Rejected(body) => {
                return Err(CallErrorKind::Rejected(
                    processor.certified_rejection(request_id, body),
                ));
            }
            RequestStatus::Done => return Err(CallErrorKind::StatusDoneNoReply),
            state => {
                attempts += 1;
                if exhausted(policy, attempts, started) {
                    return Err(CallErrorKind::PollingExceeded {
                        attempts,
                        elapsed_ms: elapsed_ms(started),
                        last_status: state.label().to_string(),
                    });
                }

                debug!(
                    request_id = %request_id,
                    attempt = attempts,
                    status = state.label(),
                    "request still in flight"
                );
                sleep(interval).await;
                interval = interval.mul_f64(policy.backoff);
            }
        }
    }
}

fn exhausted(policy: &PollingPolicy, attempts: u32, started: Instant) -> bool {
    match policy.limit {
        PollLimit::Attempts(max) => attempts >= max,
        PollLimit::Deadline(max) => started.elapsed() >= max,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_backs_off_toward_a_deadline() {
        let policy = PollingPolicy::default();

        assert_eq!(policy.interval, Duration::from_secs(1));
        assert!((policy.backoff - 1.2).abs() < f64::EPSILON);
        assert_eq!(policy.limit, PollLimit::Deadline(Duration::from_secs(300)));
    }

    #[test]
    fn attempt_limits_trip_on_the_final_attempt() {
        let policy = PollingPolicy::attempts(3);

        assert!(!exhausted(&policy, 2, Instant::now()));
        assert!(exhausted(&policy, 3, Instant::now()));
    }
}
