//! Load driver (spec.md §4.9): weighted Scenario dispatch over a set of
//! Suites, each with a Percentage contribution and an optional MaxThreads
//! cap. Grounded on `other_examples/cbaugus-rust_loadtest`'s
//! `executor.rs` shape (per-scenario semaphore, aggregate atomics/counters)
//! adapted from fixed-RPS request firing to weighted whole-Suite picks.

use crate::suite::{Suite, SuiteRunner};
use rand::distributions::{Distribution, WeightedIndex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One weighted entry in a Load document: a Suite plus its share of the
/// total pick rate and an optional concurrency ceiling (`0` = unlimited).
pub struct Scenario {
    pub name: String,
    pub percentage: f64,
    pub max_threads: usize,
    pub suite: Suite,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct ScenarioStats {
    pub picks: u64,
    pub passes: u64,
    pub failures: u64,
}

#[derive(Debug, serde::Serialize)]
pub struct LoadResult {
    pub name: String,
    pub total_picks: u64,
    pub per_scenario: Vec<(String, ScenarioStats)>,
}

struct Counters {
    picks: AtomicU64,
    passes: AtomicU64,
    failures: AtomicU64,
}

/// Runs `iterations` weighted picks across `scenarios`, each pick spawning
/// one `SuiteRunner` instance bounded by that scenario's own `MaxThreads`
/// semaphore (shared across all picks of the same scenario, not global).
pub struct LoadDriver {
    pub name: String,
}

impl LoadDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub async fn run(&self, mut scenarios: Vec<Scenario>, iterations: u64) -> LoadResult {
        let weights: Vec<f64> = scenarios.iter().map(|s| s.percentage.max(0.0)).collect();
        let dist = match WeightedIndex::new(&weights) {
            Ok(d) => d,
            Err(_) => {
                return LoadResult {
                    name: self.name.clone(),
                    total_picks: 0,
                    per_scenario: scenarios
                        .iter()
                        .map(|s| (s.name.clone(), ScenarioStats::default()))
                        .collect(),
                }
            }
        };

        let semaphores: Vec<Arc<Semaphore>> = scenarios
            .iter()
            .map(|s| {
                let permits = if s.max_threads == 0 {
                    Semaphore::MAX_PERMITS
                } else {
                    s.max_threads
                };
                Arc::new(Semaphore::new(permits))
            })
            .collect();

        let counters: Vec<Arc<Counters>> = scenarios
            .iter()
            .map(|_| {
                Arc::new(Counters {
                    picks: AtomicU64::new(0),
                    passes: AtomicU64::new(0),
                    failures: AtomicU64::new(0),
                })
            })
            .collect();

        let mut rng = rand::thread_rng();
        let mut tasks = Vec::new();
        for _ in 0..iterations {
            let index = dist.sample(&mut rng);
            let suite = std::mem::replace(
                &mut scenarios[index].suite,
                Suite {
                    name: String::new(),
                    description: None,
                    setup: Vec::new(),
                    main: Vec::new(),
                    teardown: Vec::new(),
                    variables: Default::default(),
                    keep_cookies: false,
                    verbosity: 0,
                },
            );
            let semaphore = semaphores[index].clone();
            let counter = counters[index].clone();
            tasks.push(tokio::spawn(run_one(suite, semaphore, counter)));
        }

        for task in tasks {
            let _ = task.await;
        }

        let per_scenario = scenarios
            .iter()
            .zip(counters.iter())
            .map(|(scenario, counter)| {
                (
                    scenario.name.clone(),
                    ScenarioStats {
                        picks: counter.picks.load(Ordering::Relaxed),
                        passes: counter.passes.load(Ordering::Relaxed),
                        failures: counter.failures.load(Ordering::Relaxed),
                    },
                )
            })
            .collect::<Vec<_>>();

        let total_picks = per_scenario.iter().map(|(_, s)| s.picks).sum();

        LoadResult {
            name: self.name.clone(),
            total_picks,
            per_scenario,
        }
    }
}

async fn run_one(mut suite: Suite, semaphore: Arc<Semaphore>, counter: Arc<Counters>) {
    let _permit = semaphore.acquire().await.expect("semaphore closed");
    counter.picks.fetch_add(1, Ordering::Relaxed);
    let result = SuiteRunner::new().run(&mut suite).await;
    if result.status == crate::engine::model::Status::Pass {
        counter.passes.fetch_add(1, Ordering::Relaxed);
    } else {
        counter.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_suite(name: &str) -> Suite {
        Suite {
            name: name.to_string(),
            description: None,
            setup: Vec::new(),
            main: Vec::new(),
            teardown: Vec::new(),
            variables: Default::default(),
            keep_cookies: false,
            verbosity: 0,
        }
    }

    #[tokio::test]
    async fn weighted_picks_favor_the_heavier_scenario() {
        let scenarios = vec![
            Scenario {
                name: "heavy".into(),
                percentage: 90.0,
                max_threads: 0,
                suite: empty_suite("heavy"),
            },
            Scenario {
                name: "light".into(),
                percentage: 10.0,
                max_threads: 0,
                suite: empty_suite("light"),
            },
        ];

        let result = LoadDriver::new("load").run(scenarios, 50).await;
        assert_eq!(result.total_picks, 50);
        let heavy_picks = result.per_scenario[0].1.picks;
        let light_picks = result.per_scenario[1].1.picks;
        assert!(heavy_picks > light_picks);
    }

    #[tokio::test]
    async fn max_threads_zero_means_unbounded_concurrency() {
        let scenarios = vec![Scenario {
            name: "only".into(),
            percentage: 100.0,
            max_threads: 0,
            suite: empty_suite("only"),
        }];
        let result = LoadDriver::new("load").run(scenarios, 5).await;
        assert_eq!(result.per_scenario[0].1.picks, 5);
    }
}
