//! Reward combination policies.
//!
//! A policy folds the per-component scores of one run into the scalar
//! reward. The three built-ins cover the `all`, `any` and `weighted`
//! combinations a task can declare; anything else is a named `RewardPolicy`
//! registered with the evaluator at startup.

use std::collections::BTreeMap;

use tandem_contracts::task::RewardComponent;

/// Folds component scores (each in `[0, 1]`) into one reward.
pub trait RewardPolicy: Send + Sync {
    /// Name tasks use in `{"kind": "custom", "name": ...}`.
    fn name(&self) -> &str;

    /// The combined reward. `components` holds exactly the scored basis
    /// components. Results outside `[0, 1]` are clamped by the evaluator.
    fn combine(&self, components: &BTreeMap<RewardComponent, f64>) -> f64;
}

/// Every component must pass: the product of all scores.
pub struct AllPolicy;

impl RewardPolicy for AllPolicy {
    fn name(&self) -> &str {
        "all"
    }

    fn combine(&self, components: &BTreeMap<RewardComponent, f64>) -> f64 {
        components.values().product()
    }
}

/// One passing component is enough: the maximum score.
pub struct AnyPolicy;

impl RewardPolicy for AnyPolicy {
    fn name(&self) -> &str {
        "any"
    }

    fn combine(&self, components: &BTreeMap<RewardComponent, f64>) -> f64 {
        components.values().copied().fold(0.0, f64::max)
    }
}

/// Weighted mean normalized by the total weight of the scored components.
///
/// Components without a weight count as weight 0. When the scored
/// components carry no positive weight at all the reward is 0.
pub struct WeightedPolicy<'a> {
    pub weights: &'a BTreeMap<RewardComponent, f64>,
}

impl RewardPolicy for WeightedPolicy<'_> {
    fn name(&self) -> &str {
        "weighted"
    }

    fn combine(&self, components: &BTreeMap<RewardComponent, f64>) -> f64 {
        let mut total = 0.0;
        let mut weighted = 0.0;
        for (component, score) in components {
            let weight = self.weights.get(component).copied().unwrap_or(0.0).max(0.0);
            total += weight;
            weighted += weight * score;
        }
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }
}
