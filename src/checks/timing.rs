use super::{Check, CheckOutcome};
use crate::context::Scope;
use crate::error::{CheckError, ErrorCode};
use crate::engine::model::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Response duration must lie in the half-open interval `(higher_ms,
/// lower_ms]`. A zero bound disables the respective side. `prepare`
/// rejects `higher_ms >= lower_ms` (when both are nonzero) as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTime {
    pub higher_ms: u64,
    pub lower_ms: u64,
}

impl Default for ResponseTime {
    fn default() -> Self {
        Self {
            higher_ms: 0,
            lower_ms: 0,
        }
    }
}

impl Check for ResponseTime {
    fn prepare(&mut self) -> Result<(), CheckError> {
        if self.higher_ms != 0 && self.lower_ms != 0 && self.higher_ms >= self.lower_ms {
            return Err(CheckError::malformed(
                ErrorCode::CHECK_RESPONSE_TIME,
                format!(
                    "Higher ({}) must be less than Lower ({})",
                    self.higher_ms, self.lower_ms
                ),
            ));
        }
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let actual_ms = response.duration.as_millis() as u64;
        let above_floor = self.higher_ms == 0 || actual_ms > self.higher_ms;
        let within_ceiling = self.lower_ms == 0 || actual_ms <= self.lower_ms;
        if above_floor && within_ceiling {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail(format!(
                "duration {actual_ms}ms outside ({}, {}]",
                self.higher_ms, self.lower_ms
            ))
        }
    }

    fn name(&self) -> &'static str {
        "ResponseTime"
    }
}

/// One `"P% <= max"` bound in a `Latency` check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileLimit {
    pub percentile: f64,
    pub max_ms: u64,
}

/// Fires `count` further requests at `url` (bounded by `concurrency`),
/// measures the duration distribution, and checks it against a list of
/// percentile limits. `individual_sessions` gives each worker its own
/// cookie jar rather than sharing one across the whole sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Latency {
    pub url: String,
    pub method: String,
    pub count: usize,
    pub concurrency: usize,
    pub percentiles: Vec<PercentileLimit>,
    pub individual_sessions: bool,
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".into(),
            count: 10,
            concurrency: 4,
            percentiles: Vec::new(),
            individual_sessions: false,
        }
    }
}

impl Check for Latency {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.url = scope.interpolate(&self.url)?;
        self.method = scope.interpolate(&self.method)?;
        Ok(())
    }

    fn execute(&self, _response: &Response) -> CheckOutcome {
        let durations = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(sample(self))
        });
        let durations = match durations {
            Ok(d) => d,
            Err(e) => {
                return CheckOutcome::Error(CheckError::CantCheck(
                    ErrorCode::CHECK_LATENCY,
                    e,
                ))
            }
        };

        let mut sorted: Vec<u64> = durations.iter().map(|d| d.as_millis() as u64).collect();
        sorted.sort_unstable();

        for limit in &self.percentiles {
            let observed = percentile(&sorted, limit.percentile);
            if observed > limit.max_ms {
                return CheckOutcome::Fail(format!(
                    "p{} = {observed}ms exceeds limit {}ms",
                    limit.percentile, limit.max_ms
                ));
            }
        }
        CheckOutcome::Pass
    }

    fn name(&self) -> &'static str {
        "Latency"
    }
}

fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

async fn sample(check: &Latency) -> Result<Vec<Duration>, String> {
    let shared_client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .map_err(|e| e.to_string())?;
    let semaphore = Arc::new(Semaphore::new(check.concurrency.max(1)));
    let mut tasks = Vec::new();

    for _ in 0..check.count {
        let semaphore = semaphore.clone();
        let url = check.url.clone();
        let method = check.method.clone();
        let client = if check.individual_sessions {
            reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .map_err(|e| e.to_string())?
        } else {
            shared_client.clone()
        };
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let start = Instant::now();
            let method = reqwest::Method::from_bytes(method.as_bytes())
                .unwrap_or(reqwest::Method::GET);
            let _ = client.request(method, &url).send().await;
            start.elapsed()
        }));
    }

    let mut durations = Vec::with_capacity(tasks.len());
    for task in tasks {
        durations.push(task.await.map_err(|e| e.to_string())?);
    }
    Ok(durations)
}
