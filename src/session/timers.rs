//! Benannte, abbrechbare Timer einer Session
//!
//! Jeder Timer ist ein Task mit `tokio::time::interval`, der seine Art in
//! einen Kanal schreibt. Die Session hält die Handles und bricht sie beim
//! Ende ab.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Sekunden-Takt für Abrechnung und Reaktionen
pub const ELAPSED_TICK: Duration = Duration::from_secs(1);

/// Sekunden-Takt für den Video-Countdown
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    Elapsed,
    VideoCountdown,
    NetworkSample,
}

#[derive(Debug)]
pub struct TimerSet {
    handles: HashMap<TimerKind, JoinHandle<()>>,
    tx: mpsc::UnboundedSender<TimerKind>,
}

impl TimerSet {
    pub fn new(tx: mpsc::UnboundedSender<TimerKind>) -> Self {
        Self {
            handles: HashMap::new(),
            tx,
        }
    }

    /// Startet (oder ersetzt) einen Timer, der erste Tick kommt nach `period`
    pub fn start(&mut self, kind: TimerKind, period: Duration) {
        self.cancel(kind);

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(kind).is_err() {
                    break;
                }
            }
        });

        tracing::debug!("Timer {:?} started ({:?})", kind, period);
        self.handles.insert(kind, handle);
    }

    /// `true` wenn der Timer lief
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.handles.remove(&kind) {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Timer {:?} cancelled", kind);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.handles.contains_key(&kind)
    }

    /// Laufende Timer, sortiert
    pub fn active(&self) -> Vec<TimerKind> {
        let mut kinds: Vec<TimerKind> = self.handles.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.start(TimerKind::Elapsed, Duration::from_secs(1));
        timers.start(TimerKind::NetworkSample, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let mut elapsed = 0;
        let mut samples = 0;
        while let Ok(kind) = rx.try_recv() {
            match kind {
                TimerKind::Elapsed => elapsed += 1,
                TimerKind::NetworkSample => samples += 1,
                TimerKind::VideoCountdown => unreachable!(),
            }
        }
        assert_eq!(elapsed, 10);
        assert_eq!(samples, 1);

        assert!(timers.cancel(TimerKind::Elapsed));
        assert!(!timers.cancel(TimerKind::Elapsed));
        assert_eq!(timers.active(), vec![TimerKind::NetworkSample]);

        timers.cancel_all();
        assert!(timers.active().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.start(TimerKind::VideoCountdown, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        timers.start(TimerKind::VideoCountdown, Duration::from_secs(1));
        assert!(timers.is_running(TimerKind::VideoCountdown));

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        // nur der neue Timer tickt
        assert_eq!(ticks, 1);
    }
}
