use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// One update from a background job: percent complete, or the failure
/// sentinel. A job emits a non-decreasing percent sequence and ends with
/// either `Percent(100)` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Percent(u8),
    Failed,
}

impl ProgressEvent {
    /// The wire value a polling UI displays: 0-100, or -1 for failure.
    pub fn value(&self) -> i8 {
        match self {
            ProgressEvent::Percent(p) => *p as i8,
            ProgressEvent::Failed => -1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Failed | ProgressEvent::Percent(100))
    }
}

/// Create a single-producer/single-consumer progress channel for one job.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            last: AtomicU8::new(0),
        },
        ProgressReceiver { rx },
    )
}

/// Worker-side handle. Unbounded, so workers never block on a slow poller.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last: AtomicU8,
}

impl ProgressSender {
    /// Emit a percent milestone. Values above 100 are clamped; values below
    /// the last emitted percent are dropped so the consumer always observes
    /// a non-decreasing sequence.
    pub fn percent(&self, pct: u8) {
        let pct = pct.min(100);
        if pct < self.last.load(Ordering::Relaxed) {
            return;
        }
        self.last.store(pct, Ordering::Relaxed);
        // A closed channel means the poller is gone; the worker keeps going.
        let _ = self.tx.send(ProgressEvent::Percent(pct));
    }

    /// Emit the terminal failure sentinel.
    pub fn fail(&self) {
        let _ = self.tx.send(ProgressEvent::Failed);
    }
}

/// Poller-side handle, for a timer-driven consumer on the interactive thread.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Non-blocking read of the next queued event, if any.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued and return the newest event.
    /// Stops at a terminal event so it is never skipped past.
    pub fn drain_latest(&mut self) -> Option<ProgressEvent> {
        let mut latest = None;
        while let Some(ev) = self.try_next() {
            latest = Some(ev);
            if ev.is_terminal() {
                break;
            }
        }
        latest
    }

    /// Await the next event. Mainly useful in tests; the interactive side
    /// should poll with [`ProgressReceiver::watch`] instead.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Poll the channel on a fixed interval, invoking `on_update` for every
    /// observed event, until a terminal event arrives. Returns that terminal
    /// event, or `None` if the worker dropped its sender without one.
    ///
    /// Each tick does only non-blocking reads, so a caller driving a UI from
    /// a single-threaded runtime never stalls on the worker.
    pub async fn watch<F>(mut self, period: Duration, mut on_update: F) -> Option<ProgressEvent>
    where
        F: FnMut(ProgressEvent),
    {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            while let Some(ev) = self.try_next() {
                on_update(ev);
                if ev.is_terminal() {
                    return Some(ev);
                }
            }
            if self.rx.is_closed() && self.rx.is_empty() {
                return None;
            }
        }
    }
}
