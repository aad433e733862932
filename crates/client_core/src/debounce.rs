//! Trailing-edge debounce for search input.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Holds the latest value until `delay` passes without a newer one.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.pending.take() {
            Some((value, deadline)) if now >= deadline => Some(value),
            other => {
                self.pending = other;
                None
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// Forwards a value from `input` only once `delay` has passed with no newer
/// value. A value still pending when `input` closes is dropped.
pub fn debounce<T: Send + 'static>(
    mut input: mpsc::Receiver<T>,
    delay: Duration,
) -> ReceiverStream<T> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(delay);
        loop {
            let deadline = debouncer.deadline();
            tokio::select! {
                next = input.recv() => match next {
                    Some(value) => debouncer.push(value, Instant::now()),
                    None => {
                        if debouncer.cancel().is_some() {
                            trace!("input closed; dropping pending value");
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(value) = debouncer.poll(Instant::now()) {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use tokio::time::{sleep, timeout};
    use tokio_stream::StreamExt;

    use super::*;

    #[test]
    fn poll_waits_for_the_latest_deadline() {
        let start = Instant::now();
        let delay = Duration::from_millis(800);
        let mut debouncer = Debouncer::new(delay);

        debouncer.push("r", start);
        debouncer.push("ru", start + Duration::from_millis(300));

        assert_eq!(debouncer.poll(start + delay), None);
        assert!(debouncer.is_pending());
        assert_eq!(debouncer.poll(start + Duration::from_millis(1100)), Some("ru"));
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(start + Duration::from_millis(5000)), None);
    }

    #[test]
    fn cancel_discards_pending_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::default();
        debouncer.push(1, start);
        assert_eq!(debouncer.deadline(), Some(start + DEFAULT_DEBOUNCE));
        assert_eq!(debouncer.cancel(), Some(1));
        assert_eq!(debouncer.poll(start + DEFAULT_DEBOUNCE), None);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_emits_only_last_value_after_quiet_period() {
        let (tx, rx) = mpsc::channel(8);
        let mut out = debounce(rx, Duration::from_millis(800));
        let start = Instant::now();

        for term in ["r", "ru", "rus", "rust"] {
            tx.send(term).await.expect("send");
            sleep(Duration::from_millis(200)).await;
        }

        let first = out.next().await.expect("debounced value");
        assert_eq!(first, "rust");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1400), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");

        drop(tx);
        assert_eq!(out.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_inputs_each_emit() {
        let (tx, rx) = mpsc::channel(8);
        let mut out = debounce(rx, Duration::from_millis(100));

        tx.send(1).await.expect("send");
        assert_eq!(out.next().await, Some(1));
        tx.send(2).await.expect("send");
        assert_eq!(out.next().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_input_drops_pending_value() {
        let (tx, rx) = mpsc::channel(8);
        let mut out = debounce(rx, Duration::from_millis(800));

        tx.send("pending").await.expect("send");
        drop(tx);

        let next = timeout(Duration::from_secs(5), out.next()).await.expect("stream ends");
        assert_eq!(next, None);
    }
}
