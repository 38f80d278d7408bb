use super::{Check, CheckOutcome};
use crate::engine::model::Response;
use crate::error::CheckError;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Extracts `href`/`src` references from `<a>`, `<link>`, `<img>`,
/// `<script>`, filters by prefix allow/deny, and issues concurrent
/// HEAD (or GET, with `use_get`) requests bounded by `concurrency`.
/// Passes exactly when every in-scope link answers with a 2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Links {
    pub allow_prefixes: Vec<String>,
    pub deny_prefixes: Vec<String>,
    pub concurrency: usize,
    pub use_get: bool,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            allow_prefixes: Vec::new(),
            deny_prefixes: Vec::new(),
            concurrency: 8,
            use_get: false,
        }
    }
}

static SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], link[href], img[src], script[src]").unwrap());

impl Check for Links {
    fn execute(&self, response: &Response) -> CheckOutcome {
        let body = match response.body_str() {
            Ok(b) => b,
            Err(e) => return CheckOutcome::Error(e),
        };
        let document = Html::parse_document(body);
        let urls: Vec<String> = document
            .select(&SELECTOR)
            .filter_map(|el| el.value().attr("href").or_else(|| el.value().attr("src")))
            .map(str::to_string)
            .filter(|url| self.in_scope(url))
            .collect();

        if urls.is_empty() {
            return CheckOutcome::Pass;
        }

        let concurrency = self.concurrency.max(1);
        let use_get = self.use_get;
        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(check_links(urls, concurrency, use_get))
        });

        match result {
            Ok(()) => CheckOutcome::Pass,
            Err(failures) => CheckOutcome::Fail(failures.join("; ")),
        }
    }

    fn name(&self) -> &'static str {
        "Links"
    }
}

impl Links {
    fn in_scope(&self, url: &str) -> bool {
        if !self.allow_prefixes.is_empty() && !self.allow_prefixes.iter().any(|p| url.starts_with(p.as_str())) {
            return false;
        }
        if self.deny_prefixes.iter().any(|p| url.starts_with(p.as_str())) {
            return false;
        }
        true
    }
}

async fn check_links(urls: Vec<String>, concurrency: usize, use_get: bool) -> Result<(), Vec<String>> {
    let client = reqwest::Client::new();
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = Vec::new();

    for url in urls {
        let client = client.clone();
        let semaphore = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let request = if use_get {
                client.get(&url)
            } else {
                client.head(&url)
            };
            match request.send().await {
                Ok(resp) if resp.status().is_success() => None,
                Ok(resp) => Some(format!("{url} -> {}", resp.status())),
                Err(e) => Some(format!("{url} -> {e}")),
            }
        }));
    }

    let mut failures = Vec::new();
    for task in tasks {
        if let Some(failure) = task.await.map_err(|e| vec![e.to_string()])? {
            failures.push(failure);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_prefix_filters_out_of_scope_links() {
        let check = Links {
            allow_prefixes: vec!["https://internal.example".into()],
            ..Default::default()
        };
        assert!(check.in_scope("https://internal.example/a"));
        assert!(!check.in_scope("https://external.example/a"));
    }

    #[test]
    fn deny_prefix_overrides_allow() {
        let check = Links {
            deny_prefixes: vec!["https://internal.example/admin".into()],
            ..Default::default()
        };
        assert!(!check.in_scope("https://internal.example/admin/x"));
    }

    #[test]
    fn empty_filters_admit_everything() {
        let check = Links::default();
        assert!(check.in_scope("https://anything.example"));
    }
}
