use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Keeps outbound HID writes at least `min_spacing` apart.
/// Early callers wait; nothing is dropped.
#[derive(Debug, Clone)]
pub struct CommandPacer {
    min_spacing: Duration,
    last_sent: Option<Instant>,
}

impl CommandPacer {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_sent: None,
        }
    }

    /// Earliest moment the next write may go out
    pub fn next_slot(&self) -> Option<Instant> {
        self.last_sent.map(|last| last + self.min_spacing)
    }

    /// Waits until the next write is allowed
    pub async fn ready(&self) {
        if let Some(slot) = self.next_slot() {
            if slot > Instant::now() {
                sleep_until(slot).await;
            }
        }
    }

    pub fn mark_sent(&mut self) {
        self.last_sent = Some(Instant::now());
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Periodic re-send of state a device forgets on its own
#[derive(Debug, Clone)]
pub struct KeepAlive {
    period: Duration,
    last: Option<Instant>,
}

impl KeepAlive {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn start(&mut self) {
        self.last = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.last = None;
    }

    pub fn is_running(&self) -> bool {
        self.last.is_some()
    }

    /// Any write of the kept state counts as a refresh
    pub fn refreshed(&mut self) {
        if self.last.is_some() {
            self.last = Some(Instant::now());
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.last.map(|last| last + self.period)
    }

    pub fn is_due(&self) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_write_waits_out_the_spacing() {
        let mut pacer = CommandPacer::new(Duration::from_millis(250));
        let start = Instant::now();
        pacer.ready().await;
        assert_eq!(Instant::now(), start);
        pacer.mark_sent();

        pacer.ready().await;
        assert!(Instant::now() - start >= Duration::from_millis(250));
        pacer.mark_sent();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let before = Instant::now();
        pacer.ready().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_deadline_moves_with_refresh() {
        let mut keep_alive = KeepAlive::new(Duration::from_secs(4));
        assert!(keep_alive.deadline().is_none());
        keep_alive.refreshed();
        assert!(!keep_alive.is_running());

        keep_alive.start();
        let first = keep_alive.deadline().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        keep_alive.refreshed();
        assert_eq!(keep_alive.deadline().unwrap(), first + Duration::from_secs(1));
        assert!(!keep_alive.is_due());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(keep_alive.is_due());
        keep_alive.stop();
        assert!(!keep_alive.is_due());
    }
}
