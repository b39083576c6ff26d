//! Aggregate metrics over many evaluated runs.
//!
//! `pass^k` is the probability that `k` independently drawn trials of the
//! same task all succeed, estimated per task as `C(c, k) / C(n, k)` for `c`
//! successes in `n` trials, then averaged over tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tandem_contracts::run::SimulationRun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub runs: usize,
    pub tasks: usize,
    pub average_reward: f64,
    /// Share of runs with the maximum reward.
    pub success_rate: f64,
    /// `pass^k` for `k` in `1..=min trials per task`.
    pub pass_hat_k: BTreeMap<u32, f64>,
    /// Run count per termination reason string.
    pub terminations: BTreeMap<String, usize>,
}

/// Summarize `runs`. Runs without a reward count as reward 0.
pub fn summarize(runs: &[SimulationRun]) -> Summary {
    let mut per_task: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    let mut terminations: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_reward = 0.0;
    let mut successes = 0usize;

    for run in runs {
        let reward = run.reward.as_ref().map_or(0.0, |r| r.reward);
        let success = run.reward.as_ref().is_some_and(|r| r.is_success());
        total_reward += reward;
        successes += usize::from(success);

        let entry = per_task.entry(run.task_id.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(success);
        *terminations
            .entry(run.termination_reason.as_str().to_string())
            .or_insert(0) += 1;
    }

    let min_trials = per_task.values().map(|(n, _)| *n).min().unwrap_or(0);
    let pass_hat_k = (1..=min_trials)
        .map(|k| {
            let mean = per_task
                .values()
                .map(|&(n, c)| binomial(c, k) / binomial(n, k))
                .sum::<f64>()
                / per_task.len() as f64;
            (k as u32, mean)
        })
        .collect();

    let count = runs.len();
    Summary {
        runs: count,
        tasks: per_task.len(),
        average_reward: if count == 0 { 0.0 } else { total_reward / count as f64 },
        success_rate: if count == 0 { 0.0 } else { successes as f64 / count as f64 },
        pass_hat_k,
        terminations,
    }
}

fn binomial(n: u64, k: u64) -> f64 {
    if k > n {
        return 0.0;
    }
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::binomial;

    #[test]
    fn binomial_values() {
        assert_eq!(binomial(4, 2), 6.0);
        assert_eq!(binomial(3, 0), 1.0);
        assert_eq!(binomial(2, 3), 0.0);
    }
}
