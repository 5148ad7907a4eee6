use std::time::Duration;

use crate::constants::{RECONNECT_INITIAL_BACKOFF_MS, RECONNECT_MAX_BACKOFF_MS};

/// Exponential backoff between reconnect attempts.
///
/// Used by the serial reader and the peer forwarder.
///
/// ```
/// use std::time::Duration;
/// use cardbridge_core::Backoff;
///
/// let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(250));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt. Doubles up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Delay the next call to [`Backoff::next_delay`] will return.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_INITIAL_BACKOFF_MS),
            Duration::from_millis(RECONNECT_MAX_BACKOFF_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_current_peeks_next_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(backoff.current(), Duration::from_millis(100));

        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.current(), Duration::from_millis(300));
    }

    #[test]
    fn test_default_uses_reconnect_constants() {
        let mut backoff = Backoff::default();
        assert_eq!(
            backoff.next_delay(),
            Duration::from_millis(RECONNECT_INITIAL_BACKOFF_MS)
        );
    }
}
