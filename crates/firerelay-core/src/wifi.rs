//! Wi-Fi association policy.
//!
//! Association is polled at a fixed interval with a bounded number of checks
//! per attempt; failed attempts back off exponentially before the next one.

use embedded_hal_async::delay::DelayNs;
use log::info;

pub const ASSOCIATION_POLL_INTERVAL_MS: u32 = 300;
pub const RETRY_BACKOFF_MIN_SECS: u64 = 2;
pub const RETRY_BACKOFF_MAX_SECS: u64 = 120;

/// Station side of the Wi-Fi stack.
#[allow(async_fn_in_trait)]
pub trait WifiStation {
    type Error: core::fmt::Debug;

    /// Starts association with the given network.
    async fn begin(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    /// True once associated and holding an IPv4 address.
    fn is_connected(&mut self) -> bool;

    /// Drops the current association before a retry.
    async fn reset(&mut self);

    /// Called once per status poll that is still waiting.
    fn on_progress(&mut self) {}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AssociationPolicy {
    pub poll_interval_ms: u32,
    pub max_polls_per_attempt: u32,
    pub max_attempts: u32,
}

impl Default for AssociationPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: ASSOCIATION_POLL_INTERVAL_MS,
            max_polls_per_attempt: 100,
            max_attempts: 6,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WifiAssociationStall {
    pub attempts: u32,
    pub polls: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationStep {
    Connected,
    /// Check status again after the delay.
    PollAgain { delay_ms: u32 },
    /// Give up on this attempt and start another after the delay.
    Retry { delay_ms: u32 },
    Stalled(WifiAssociationStall),
}

/// Pure state for the bounded association loop.
#[derive(Clone, Copy, Debug)]
pub struct AssociationTracker {
    policy: AssociationPolicy,
    attempt: u32,
    polls_in_attempt: u32,
    total_polls: u32,
}

impl AssociationTracker {
    pub const fn new(policy: AssociationPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            polls_in_attempt: 0,
            total_polls: 0,
        }
    }

    /// Marks the start of an association attempt.
    pub fn begin_attempt(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
        self.polls_in_attempt = 0;
    }

    /// Records one status check and returns what to do next.
    pub fn observe(&mut self, connected: bool) -> AssociationStep {
        if connected {
            return AssociationStep::Connected;
        }

        self.polls_in_attempt = self.polls_in_attempt.saturating_add(1);
        self.total_polls = self.total_polls.saturating_add(1);

        if self.polls_in_attempt < self.policy.max_polls_per_attempt.max(1) {
            return AssociationStep::PollAgain {
                delay_ms: self.policy.poll_interval_ms,
            };
        }

        if self.attempt >= self.policy.max_attempts.max(1) {
            return AssociationStep::Stalled(WifiAssociationStall {
                attempts: self.attempt,
                polls: self.total_polls,
            });
        }

        let delay_secs = retry_backoff_secs(self.attempt.saturating_sub(1));
        AssociationStep::Retry {
            delay_ms: (delay_secs * 1_000) as u32,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// 2, 4, 8, 16, 32, 64, 120, 120, ...
pub fn retry_backoff_secs(consecutive_failures: u32) -> u64 {
    let shift = consecutive_failures.min(6);
    RETRY_BACKOFF_MIN_SECS
        .saturating_mul(1u64 << shift)
        .min(RETRY_BACKOFF_MAX_SECS)
}

/// Associates with the network, giving up once the policy is exhausted.
pub async fn associate<S, D>(
    station: &mut S,
    delay: &mut D,
    ssid: &str,
    password: &str,
    policy: AssociationPolicy,
) -> Result<(), WifiAssociationStall>
where
    S: WifiStation,
    D: DelayNs,
{
    let mut tracker = AssociationTracker::new(policy);

    loop {
        tracker.begin_attempt();
        info!("wifi: connecting to {} (attempt {})", ssid, tracker.attempt());
        if let Err(err) = station.begin(ssid, password).await {
            info!("wifi: begin failed: {:?}", err);
        }

        loop {
            match tracker.observe(station.is_connected()) {
                AssociationStep::Connected => return Ok(()),
                AssociationStep::PollAgain { delay_ms } => {
                    station.on_progress();
                    delay.delay_ms(delay_ms).await;
                }
                AssociationStep::Retry { delay_ms } => {
                    info!("wifi: attempt timed out; retrying in {}ms", delay_ms);
                    station.reset().await;
                    delay.delay_ms(delay_ms).await;
                    break;
                }
                AssociationStep::Stalled(stall) => {
                    station.reset().await;
                    return Err(stall);
                }
            }
        }
    }
}
