use std::time::Duration;

/// Two-tier reconnect delay.
///
/// The first reconnect after a failure waits `short`. Any further failure
/// before a handshake succeeds waits `long`, for as long as it keeps failing.
/// Not exponential.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    short: Duration,
    long: Duration,
    escalated: bool,
}

impl Backoff {
    pub fn new(short: Duration, long: Duration) -> Self {
        Backoff {
            short,
            long,
            escalated: false,
        }
    }

    /// Delay for the reconnect about to be scheduled.
    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.escalated { self.long } else { self.short };
        self.escalated = true;
        delay
    }

    /// A handshake succeeded.
    pub fn reset(&mut self) {
        self.escalated = false;
    }
}
