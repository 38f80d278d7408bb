//! Layered variable substitution ("Scope").
//!
//! Generalizes the original single flat `HashMap` context into an ordered
//! chain of mappings, innermost first, plus the auto-variables (`COUNTER`,
//! `RANDOM`) and the `{{NOW ...}}` special form. The interpolation regex
//! and the "walk the chain, fall back to `ENV_` prefix" resolution strategy
//! are carried over from the original `Context`.

mod replacer;

pub use replacer::Replacer;

use crate::error::{CheckError, ErrorCode};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One layer of string-to-string bindings in a [`Scope`] chain.
pub type Layer = HashMap<String, String>;

/// Ordered chain of variable layers. Lookup walks innermost (last pushed)
/// to outermost (index 0). Only the Suite loop mutates the outermost
/// ("globals") layer; everything else pushes a layer for its own element
/// and pops it when done, so there is never more than one writer at a
/// time (spec.md §5's single-writer invariant).
#[derive(Debug, Clone)]
pub struct Scope {
    layers: Vec<Layer>,
    counter: Arc<AtomicU64>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::new()],
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pushes a new, empty innermost layer and returns its index, to be
    /// passed to [`Scope::pop_to`] once the element using it is done.
    pub fn push_layer(&mut self) -> usize {
        self.layers.push(Layer::new());
        self.layers.len() - 1
    }

    /// Pops layers back down to (and including) `mark`.
    pub fn pop_to(&mut self, mark: usize) {
        self.layers.truncate(mark);
    }

    /// Sets a variable in the current innermost layer.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(layer) = self.layers.last_mut() {
            layer.insert(key.into(), value.into());
        }
    }

    /// Bulk-sets variables from a map into the current innermost layer.
    pub fn extend(&mut self, entries: &HashMap<String, String>) {
        if let Some(layer) = self.layers.last_mut() {
            for (k, v) in entries {
                layer.insert(k.clone(), v.clone());
            }
        }
    }

    /// Writes into the outermost ("globals") layer — used by the Suite
    /// runner to propagate extractor output (spec.md invariant (b)).
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(layer) = self.layers.first_mut() {
            layer.insert(key.into(), value.into());
        }
    }

    /// Flattens the whole layer chain into one map (innermost wins),
    /// for callers — the mock server's response-template substitution —
    /// that need a plain snapshot rather than a live, poppable `Scope`.
    pub fn snapshot(&self) -> HashMap<String, String> {
        let mut flat = HashMap::new();
        for layer in &self.layers {
            flat.extend(layer.clone());
        }
        flat
    }

    /// Looks up `key`, walking innermost to outermost.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key))
            .map(|s| s.as_str())
    }

    fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    fn resolve_token(&self, token: &str) -> Result<String, CheckError> {
        if let Some(rest) = token.strip_prefix("ENV_") {
            return std::env::var(rest).map_err(|_| {
                CheckError::malformed(
                    ErrorCode::ENV_VAR_NOT_FOUND,
                    format!("missing environment variable '{rest}'"),
                )
            });
        }
        match token {
            "RANDOM" => Ok(rand::thread_rng().gen::<u32>().to_string()),
            "COUNTER" => Ok(self.next_counter().to_string()),
            _ => self.get(token).map(str::to_string).ok_or_else(|| {
                CheckError::malformed(
                    ErrorCode::CONTEXT_VAR_NOT_FOUND,
                    format!("missing context variable '{token}'"),
                )
            }),
        }
    }

    /// Interpolates `{{NAME}}`, `{{RANDOM}}`, `{{COUNTER}}`, and
    /// `{{NOW [+N unit] ["layout"]}}` placeholders in `input`.
    ///
    /// Compiles a fresh [`Replacer`] each call; callers that interpolate
    /// the same template repeatedly (the retry loop) should compile once
    /// with [`Replacer::compile`] and call [`Replacer::render`] directly.
    pub fn interpolate(&self, input: &str) -> Result<String, CheckError> {
        Replacer::compile(input).render(self)
    }

    /// Resolves one already-parsed token (delegated to by [`Replacer`]).
    pub(crate) fn resolve(&self, token: &replacer::Token) -> Result<String, CheckError> {
        match token {
            replacer::Token::Literal(s) => Ok(s.clone()),
            replacer::Token::Variable(name) => self.resolve_token(name),
            replacer::Token::Now { offset, layout } => {
                let now = chrono::Utc::now() + *offset;
                let layout = layout.as_deref().unwrap_or("%a, %d %b %Y %H:%M:%S UTC");
                Ok(now.format(layout).to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_innermost_first() {
        let mut scope = Scope::new();
        scope.set("name", "outer");
        scope.push_layer();
        scope.set("name", "inner");
        assert_eq!(scope.get("name"), Some("inner"));
        scope.pop_to(1);
        assert_eq!(scope.get("name"), Some("outer"));
    }

    #[test]
    fn set_global_writes_outermost_layer() {
        let mut scope = Scope::new();
        scope.push_layer();
        scope.set_global("token", "abc");
        scope.pop_to(1);
        assert_eq!(scope.get("token"), Some("abc"));
    }

    #[test]
    fn interpolate_substitutes_known_variable() {
        let mut scope = Scope::new();
        scope.set("user", "alice");
        assert_eq!(scope.interpolate("hello {{user}}").unwrap(), "hello alice");
    }

    #[test]
    fn interpolate_missing_variable_errors() {
        let scope = Scope::new();
        assert!(scope.interpolate("{{missing}}").is_err());
    }

    #[test]
    fn interpolate_now_with_offset_and_layout() {
        let scope = Scope::new();
        let rendered = scope.interpolate(r#"{{NOW + 1h | "%Y"}}"#).unwrap();
        assert_eq!(rendered.len(), 4);
    }

    #[test]
    fn env_prefixed_variable_reads_process_environment() {
        std::env::set_var("HTTPBENCH_TEST_VAR", "xyz");
        let scope = Scope::new();
        assert_eq!(
            scope.interpolate("{{ENV_HTTPBENCH_TEST_VAR}}").unwrap(),
            "xyz"
        );
    }
}
