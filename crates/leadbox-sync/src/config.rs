use std::time::Duration;

/// Tuning for the inbox synchronizer's pagination and reconnect behavior.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Rows per fetched page.
    pub page_size: usize,
    /// Backoff before the first reconnect attempt.
    pub reconnect_base: Duration,
    /// Ceiling for the backoff delay.
    pub reconnect_max: Duration,
    /// Attempt counter stops growing here, so the delay plateaus.
    pub reconnect_attempt_cap: u32,
    /// How long a reconnect must drag on before the banner is shown.
    /// Keeps near-instant recoveries from flashing the UI.
    pub reconnect_ui_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(15),
            reconnect_attempt_cap: 4,
            reconnect_ui_delay: Duration::from_millis(450),
        }
    }
}

impl SyncConfig {
    /// Delay before reconnect attempt `attempt`: base · 2^attempt, capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .reconnect_base
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.reconnect_max)
    }
}
