//! Netzqualität aus Empfangsstatistiken
//!
//! Alle 10 Sekunden werden die kumulativen Empfangszähler gelesen. Die
//! Verlustrate im Fenster ist verlorene / (empfangene + verlorene) Pakete.

use super::video::NetworkQuality;

/// Kumulative Empfangszähler der Peer-Verbindung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub packets_received: u64,
    pub packets_lost: u64,
}

#[derive(Debug, Clone)]
pub struct NetworkQualitySampler {
    max_loss: f64,
    previous: Option<InboundStats>,
    quality: NetworkQuality,
    last_loss: Option<f64>,
}

impl NetworkQualitySampler {
    pub fn new(max_loss: f64) -> Self {
        Self {
            max_loss,
            previous: None,
            quality: NetworkQuality::Good,
            last_loss: None,
        }
    }

    pub fn quality(&self) -> NetworkQuality {
        self.quality
    }

    /// Verlustrate des letzten vollständigen Fensters
    pub fn last_loss(&self) -> Option<f64> {
        self.last_loss
    }

    /// Neues Fenster beginnen (z.B. beim Einschalten von Video)
    pub fn reset(&mut self) {
        self.previous = None;
        self.quality = NetworkQuality::Good;
        self.last_loss = None;
    }

    /// Verarbeitet eine neue Messung
    pub fn record(&mut self, stats: InboundStats) -> NetworkQuality {
        let Some(previous) = self.previous.replace(stats) else {
            // erste Messung ist nur die Basislinie
            return self.quality;
        };

        let received = stats.packets_received.saturating_sub(previous.packets_received);
        let lost = stats.packets_lost.saturating_sub(previous.packets_lost);
        let total = received + lost;
        if total == 0 {
            return self.quality;
        }

        let loss = lost as f64 / total as f64;
        self.last_loss = Some(loss);
        self.quality = if loss > self.max_loss {
            NetworkQuality::Poor
        } else {
            NetworkQuality::Good
        };

        tracing::debug!("Receive-side packet loss {:.1}% -> {:?}", loss * 100.0, self.quality);
        self.quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(received: u64, lost: u64) -> InboundStats {
        InboundStats {
            packets_received: received,
            packets_lost: lost,
        }
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let mut sampler = NetworkQualitySampler::new(0.10);
        assert_eq!(sampler.record(stats(1000, 500)), NetworkQuality::Good);
        assert_eq!(sampler.last_loss(), None);
    }

    #[test]
    fn test_loss_above_threshold_is_poor() {
        let mut sampler = NetworkQualitySampler::new(0.10);
        sampler.record(stats(1000, 10));

        // 89 empfangen, 11 verloren -> 11%
        assert_eq!(sampler.record(stats(1089, 21)), NetworkQuality::Poor);

        // exakt 10% ist noch gut
        assert_eq!(sampler.record(stats(1179, 31)), NetworkQuality::Good);
    }

    #[test]
    fn test_empty_window_keeps_previous_quality() {
        let mut sampler = NetworkQualitySampler::new(0.10);
        sampler.record(stats(0, 0));
        sampler.record(stats(50, 50));
        assert_eq!(sampler.quality(), NetworkQuality::Poor);
        assert_eq!(sampler.record(stats(50, 50)), NetworkQuality::Poor);

        sampler.reset();
        assert_eq!(sampler.quality(), NetworkQuality::Good);
    }
}
