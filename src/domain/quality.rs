//! Connection quality scoring
//!
//! Derives a bounded 0-100 score from transport statistics: packet loss
//! weighs up to 50 points, round-trip time above 150 ms up to 30 points,
//! and frame rate below 15 fps up to 30 points, floored at 0.

use crate::domain::participant::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RTT above this threshold starts costing points
pub const RTT_THRESHOLD_MS: f64 = 150.0;

/// Frame rate below this threshold starts costing points
pub const FPS_THRESHOLD: f64 = 15.0;

/// Raw transport statistics sampled from one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TransportStats {
    pub packets_received: u64,
    pub packets_lost: u64,
    pub round_trip_time_ms: f64,
    pub frames_per_second: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl TransportStats {
    /// Fraction of inbound packets lost, in [0, 1]
    pub fn loss_ratio(&self) -> f64 {
        if self.packets_received == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_received as f64
        }
    }
}

/// Coarse quality band derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=100 => QualityLevel::Excellent,
            60..=79 => QualityLevel::Good,
            40..=59 => QualityLevel::Fair,
            _ => QualityLevel::Poor,
        }
    }
}

/// One quality sample for one peer connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub participant_id: ParticipantId,
    pub score: u8,
    pub level: QualityLevel,
    pub stats: TransportStats,
    pub sampled_at: DateTime<Utc>,
}

impl QualityReport {
    pub fn sample(participant_id: ParticipantId, stats: TransportStats) -> Self {
        let score = quality_score(&stats);
        Self {
            participant_id,
            score,
            level: QualityLevel::from_score(score),
            stats,
            sampled_at: Utc::now(),
        }
    }
}

/// Bounded quality score in [0, 100]
pub fn quality_score(stats: &TransportStats) -> u8 {
    let mut score = 100.0;

    // Up to 50 points for packet loss
    score -= stats.loss_ratio() * 50.0;

    // Up to 30 points for high latency
    if stats.round_trip_time_ms > RTT_THRESHOLD_MS {
        score -= ((stats.round_trip_time_ms - RTT_THRESHOLD_MS) / 10.0).min(30.0);
    }

    // Up to 30 points for low frame rate
    if stats.frames_per_second > 0.0 && stats.frames_per_second < FPS_THRESHOLD {
        score -= (FPS_THRESHOLD - stats.frames_per_second) * 2.0;
    }

    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> TransportStats {
        TransportStats {
            packets_received: 1000,
            packets_lost: 0,
            round_trip_time_ms: 40.0,
            frames_per_second: 30.0,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    #[test]
    fn clean_connection_scores_full_marks() {
        assert_eq!(quality_score(&stats()), 100);
    }

    #[test]
    fn packet_loss_costs_up_to_fifty_points() {
        let mut s = stats();
        s.packets_lost = 100; // 10% loss
        assert_eq!(quality_score(&s), 95);

        s.packets_lost = 1000; // 100% loss ratio
        assert_eq!(quality_score(&s), 50);
    }

    #[test]
    fn latency_above_threshold_costs_up_to_thirty_points() {
        let mut s = stats();
        s.round_trip_time_ms = 150.0;
        assert_eq!(quality_score(&s), 100);

        s.round_trip_time_ms = 250.0;
        assert_eq!(quality_score(&s), 90);

        s.round_trip_time_ms = 10_000.0;
        assert_eq!(quality_score(&s), 70);
    }

    #[test]
    fn low_frame_rate_costs_up_to_thirty_points() {
        let mut s = stats();
        s.frames_per_second = 10.0;
        assert_eq!(quality_score(&s), 90);

        s.frames_per_second = 1.0;
        assert_eq!(quality_score(&s), 72);
    }

    #[test]
    fn score_is_floored_at_zero() {
        let s = TransportStats {
            packets_received: 10,
            packets_lost: 10,
            round_trip_time_ms: 2000.0,
            frames_per_second: 0.1,
            bytes_sent: 0,
            bytes_received: 0,
        };
        let score = quality_score(&s);
        assert_eq!(score, 0);
        assert_eq!(QualityLevel::from_score(score), QualityLevel::Poor);
    }

    #[test]
    fn levels_band_the_score() {
        assert_eq!(QualityLevel::from_score(85), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(65), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(45), QualityLevel::Fair);
        assert_eq!(QualityLevel::from_score(20), QualityLevel::Poor);
    }
}
