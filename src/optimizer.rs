// src/optimizer.rs
//
// Population-based hyperparameter search. The objective (train a model,
// measure validation accuracy) is non-differentiable with respect to the
// hyperparameters, so the search is gradient-free: each round samples a
// population of candidates uniformly within the configured bounds and
// keeps the single best candidate seen so far. All randomness comes from
// a seeded generator owned by the optimizer, so runs are reproducible.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ParameterBounds {
    pub name: String,
    /// Inclusive lower bound.
    pub low: f64,
    /// Exclusive upper bound.
    pub high: f64,
}

impl ParameterBounds {
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self { name: name.into(), low, high }
    }
}

/// One evaluated point in hyperparameter space.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub params: Vec<f64>,
    pub fitness: f64,
}

pub struct HybridOptimizer {
    bounds: Vec<ParameterBounds>,
    num_agents: usize,
    max_iterations: usize,
    rng: StdRng,
}

impl HybridOptimizer {
    pub fn new(
        bounds: Vec<ParameterBounds>,
        num_agents: usize,
        max_iterations: usize,
        seed: u64,
    ) -> Result<Self> {
        if bounds.is_empty() {
            anyhow::bail!("hyperparameter search needs at least one parameter");
        }
        for b in &bounds {
            if !(b.low < b.high) {
                anyhow::bail!(
                    "bounds for '{}' must satisfy low < high (got [{}, {}))",
                    b.name,
                    b.low,
                    b.high
                );
            }
        }
        if num_agents == 0 {
            anyhow::bail!("population size must be at least 1");
        }
        if max_iterations == 0 {
            anyhow::bail!("iteration count must be at least 1");
        }

        Ok(Self {
            bounds,
            num_agents,
            max_iterations,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Run the search and return the best candidate found. A candidate
    /// whose evaluation returns an error is discarded with a warning;
    /// the search only fails if every single evaluation failed.
    pub fn optimize<F>(&mut self, mut fitness: F) -> Result<Candidate>
    where
        F: FnMut(&[f64]) -> Result<f64>,
    {
        let mut best: Option<Candidate> = None;

        for round in 1..=self.max_iterations {
            let mut evaluated = 0usize;

            for agent in 0..self.num_agents {
                let params = self.sample();
                match fitness(&params) {
                    Ok(score) => {
                        evaluated += 1;
                        if best.as_ref().map_or(true, |b| score > b.fitness) {
                            info!(
                                "🔎 New best in round {}: fitness {:.4} ({})",
                                round,
                                score,
                                self.describe(&params)
                            );
                            best = Some(Candidate { params, fitness: score });
                        }
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ Candidate {} in round {} failed, discarding: {:#}",
                            agent, round, e
                        );
                    }
                }
            }

            match &best {
                Some(b) => info!(
                    "Round {}/{}: {}/{} candidates evaluated, best fitness {:.4}",
                    round, self.max_iterations, evaluated, self.num_agents, b.fitness
                ),
                None => warn!(
                    "Round {}/{}: no candidate evaluated successfully yet",
                    round, self.max_iterations
                ),
            }
        }

        best.ok_or_else(|| anyhow::anyhow!("every candidate evaluation failed — nothing to select"))
    }

    fn sample(&mut self) -> Vec<f64> {
        let rng = &mut self.rng;
        self.bounds
            .iter()
            .map(|b| rng.random_range(b.low..b.high))
            .collect()
    }

    fn describe(&self, params: &[f64]) -> String {
        self.bounds
            .iter()
            .zip(params)
            .map(|(b, v)| format!("{}={:.4}", b.name, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds() -> Vec<ParameterBounds> {
        vec![ParameterBounds::new("x", 0.0, 1.0)]
    }

    #[test]
    fn test_retains_best_across_rounds() {
        // 3 agents over 2 rounds consume exactly these six scores
        let scores = [0.3, 0.7, 0.5, 0.9, 0.2, 0.6];
        let mut next = scores.iter().copied();

        let mut opt = HybridOptimizer::new(unit_bounds(), 3, 2, 1).unwrap();
        let best = opt.optimize(|_| Ok(next.next().unwrap())).unwrap();

        assert_eq!(best.fitness, 0.9);
        assert!(next.next().is_none(), "exactly six evaluations expected");
    }

    #[test]
    fn test_failed_candidates_are_discarded() {
        let mut opt = HybridOptimizer::new(unit_bounds(), 8, 4, 2).unwrap();
        let best = opt
            .optimize(|params| {
                if params[0] > 0.5 {
                    anyhow::bail!("simulated training blow-up");
                }
                Ok(params[0])
            })
            .unwrap();

        assert!(best.params[0] <= 0.5);
        assert_eq!(best.fitness, best.params[0]);
    }

    #[test]
    fn test_all_failures_is_an_error() {
        let mut opt = HybridOptimizer::new(unit_bounds(), 3, 2, 3).unwrap();
        let err = opt
            .optimize(|_| anyhow::bail!("always fails"))
            .unwrap_err();
        assert!(format!("{err}").contains("every candidate"));
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = |seed| {
            let mut opt = HybridOptimizer::new(
                vec![
                    ParameterBounds::new("lr", 1e-4, 1e-1),
                    ParameterBounds::new("batch", 16.0, 64.0),
                ],
                5,
                3,
                seed,
            )
            .unwrap();
            opt.optimize(|p| Ok(p[0] * p[1])).unwrap()
        };

        let a = run(42);
        let b = run(42);
        assert_eq!(a.params, b.params);
        assert_eq!(a.fitness, b.fitness);
    }

    #[test]
    fn test_samples_stay_within_bounds() {
        let mut seen = Vec::new();
        let mut opt = HybridOptimizer::new(
            vec![
                ParameterBounds::new("lr", 1e-4, 1e-1),
                ParameterBounds::new("batch", 16.0, 64.0),
            ],
            6,
            3,
            7,
        )
        .unwrap();
        opt.optimize(|p| {
            seen.push(p.to_vec());
            Ok(p[0])
        })
        .unwrap();

        assert_eq!(seen.len(), 18);
        for p in &seen {
            assert!(p[0] >= 1e-4 && p[0] < 1e-1);
            assert!(p[1] >= 16.0 && p[1] < 64.0);
        }
    }

    #[test]
    fn test_constructor_rejects_bad_input() {
        assert!(HybridOptimizer::new(vec![], 3, 2, 0).is_err());
        assert!(
            HybridOptimizer::new(vec![ParameterBounds::new("x", 1.0, 1.0)], 3, 2, 0).is_err()
        );
        assert!(HybridOptimizer::new(unit_bounds(), 0, 2, 0).is_err());
        assert!(HybridOptimizer::new(unit_bounds(), 3, 0, 0).is_err());
    }
}
