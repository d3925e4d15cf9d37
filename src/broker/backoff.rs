use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff for broker reconnects
///
/// Delays double from `initial_delay` up to `max_delay`. With no retry limit
/// the sequence just stays at the cap until [`reset`](Self::reset) is called
/// on the next successful connect.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: u64,
    max_delay: u64,
    max_retries: Option<u32>,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: u64, max: u64, retries: Option<u32>) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// 1s doubling to 30s, never gives up
    pub fn for_reconnect() -> Self {
        Self::new(1, 30, None)
    }

    /// Delay for the next attempt, advancing the attempt counter
    pub fn next_delay(&mut self) -> Result<Duration, MaxRetriesExceeded> {
        if let Some(max) = self.max_retries {
            if self.current_attempt >= max {
                return Err(MaxRetriesExceeded);
            }
        }

        let factor = 2_u64.saturating_pow(self.current_attempt.min(32));
        let delay = std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay);
        self.current_attempt = self.current_attempt.saturating_add(1);
        Ok(Duration::from_secs(delay))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay()?;

        log::warn!(
            "⏳ Reconnect attempt {} in {}s",
            self.current_attempt,
            delay.as_secs()
        );

        sleep(delay).await;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}
