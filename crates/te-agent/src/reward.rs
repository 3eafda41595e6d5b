//! Reward functions
//!
//! [`environment_reward`] is what the training simulation hands back and
//! is the default learning signal. [`weighted_reward`] scores a snapshot
//! from its summary metrics and is only used when the agent is configured
//! with [`te_common::RewardSource::Weighted`].

use statrs::statistics::Statistics;
use te_common::{NetworkStateSnapshot, RewardWeights};

/// Balance reward over raw link utilizations (percent)
///
/// `-(max / 100) - (std / 50)`, with `+0.5` while the hottest link stays
/// under 50% and `-1.0` once it passes 80%. Empty input scores 0.
pub fn environment_reward(link_utilizations: &[f64]) -> f64 {
    if link_utilizations.is_empty() {
        return 0.0;
    }
    let max = link_utilizations
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let std = link_utilizations.iter().population_std_dev();

    let mut reward = -(max / 100.0) - (std / 50.0);
    if max < 50.0 {
        reward += 0.5;
    } else if max > 80.0 {
        reward -= 1.0;
    }
    reward
}

/// Weighted penalty over the snapshot summary, `+1.0` below 50% max load
pub fn weighted_reward(snapshot: &NetworkStateSnapshot, weights: &RewardWeights) -> f64 {
    let mut reward = weights.max_utilization * snapshot.max_link_utilization
        + weights.avg_delay * snapshot.avg_delay
        + weights.packet_loss * snapshot.packet_loss_rate;
    if snapshot.max_link_utilization < 50.0 {
        reward += 1.0;
    }
    reward
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_reward_balanced_low_load() {
        let reward = environment_reward(&[30.0; 12]);
        assert!((reward - (-0.3 + 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_environment_reward_overload() {
        // max 90, std 10 around a mean of 80
        let reward = environment_reward(&[70.0, 90.0]);
        assert!((reward - (-0.9 - 0.2 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_environment_reward_mid_band_has_no_bonus() {
        let reward = environment_reward(&[60.0, 60.0]);
        assert!((reward + 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_reward() {
        let weights = RewardWeights::default();
        let snapshot = NetworkStateSnapshot {
            max_link_utilization: 40.0,
            avg_delay: 2.0,
            packet_loss_rate: 0.5,
            ..Default::default()
        };
        let expected = -40.0 - 1.0 - 1.0 + 1.0;
        assert!((weighted_reward(&snapshot, &weights) - expected).abs() < 1e-12);

        let hot = NetworkStateSnapshot {
            max_link_utilization: 90.0,
            ..Default::default()
        };
        assert!((weighted_reward(&hot, &weights) + 90.0).abs() < 1e-12);
    }
}
