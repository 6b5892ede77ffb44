//! Rule registration and ordered evaluation.
//!
//! A [`RuleSet`] holds named, independently configured limits. Each rule
//! pairs a criteria extractor (request context → key, e.g. client IP or API
//! token) with its own [`KeyedLimiter`]. Evaluation walks the rules in
//! registration order and stops at the first one that denies.

use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{ConfigError, Result};

use super::keyed::KeyedLimiter;

/// Function deriving a rule's criteria key from the request context.
///
/// Returning `None` (or a blank string) marks the rule as not applicable to
/// that request.
pub type CriteriaExtractor<C> = Box<dyn Fn(&C) -> Option<String> + Send + Sync>;

/// A single named rate limit: label, criteria extractor, and the keyed
/// counter store enforcing it. Immutable once registered.
struct Rule<C> {
    label: String,
    extractor: CriteriaExtractor<C>,
    limiter: KeyedLimiter,
}

/// The rule that denied a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Label of the violated rule.
    pub label: String,
    /// The rule's window length in seconds, for retry-after messaging.
    pub window_size: u64,
}

impl Violation {
    /// The canonical user-facing denial text.
    ///
    /// Adapters embedding this in an HTTP response should pair it with
    /// status 429.
    pub fn message(&self) -> String {
        format!(
            "Rate limit exceeded. Try again in {} seconds",
            self.window_size
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Outcome of evaluating a request against a [`RuleSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Every rule was satisfied.
    Allowed,
    /// A rule denied the request; later rules were not evaluated.
    Denied(Violation),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// The violated rule, if the request was denied.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Decision::Allowed => None,
            Decision::Denied(violation) => Some(violation),
        }
    }
}

/// An ordered collection of rate limit rules evaluated against every
/// incoming request context.
///
/// `C` is the request context type, opaque to the rule set itself; only the
/// registered extractors interpret it. Registration takes `&mut self` and
/// evaluation `&self`, so a rule set shared behind an `Arc` after
/// configuration is immutable during traffic by construction.
pub struct RuleSet<C> {
    rules: Vec<Rule<C>>,
}

impl<C> RuleSet<C> {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule allowing `rate_limit` requests per trailing
    /// `window_size` seconds for each key the extractor derives.
    ///
    /// Rules are evaluated in registration order. Fails fast on a blank or
    /// duplicated label, a zero window, or a zero limit; these are static
    /// configuration mistakes with no recovery path.
    pub fn register<F>(
        &mut self,
        label: &str,
        window_size: u64,
        rate_limit: usize,
        extractor: F,
    ) -> Result<()>
    where
        F: Fn(&C) -> Option<String> + Send + Sync + 'static,
    {
        let label = label.trim();
        if label.is_empty() {
            return Err(ConfigError::MissingLabel);
        }
        if self.rules.iter().any(|rule| rule.label == label) {
            return Err(ConfigError::DuplicateLabel(label.to_string()));
        }
        if window_size == 0 {
            return Err(ConfigError::InvalidWindowSize);
        }
        if rate_limit == 0 {
            return Err(ConfigError::InvalidRateLimit);
        }

        debug!(
            label = %label,
            window_size = window_size,
            rate_limit = rate_limit,
            "Registering rate limit rule"
        );
        self.rules.push(Rule {
            label: label.to_string(),
            extractor: Box::new(extractor),
            limiter: KeyedLimiter::new(window_size, rate_limit),
        });
        Ok(())
    }

    /// Evaluate `ctx` against every rule in registration order.
    ///
    /// A rule whose extractor yields no criteria (or a blank one) is
    /// satisfied without consulting its counters. The first rule to deny
    /// short-circuits evaluation: rules after it are neither evaluated nor
    /// mutated for this call.
    pub fn evaluate(&self, ctx: &C) -> Decision {
        self.check(ctx, |rule, key| rule.limiter.allow(key))
    }

    /// Evaluate `ctx` as of `now` (unix seconds) instead of the wall clock.
    pub fn evaluate_at(&self, ctx: &C, now: u64) -> Decision {
        self.check(ctx, |rule, key| rule.limiter.allow_at(key, now))
    }

    fn check(&self, ctx: &C, allow: impl Fn(&Rule<C>, &str) -> bool) -> Decision {
        for rule in &self.rules {
            let criteria = (rule.extractor)(ctx);
            // Blank-after-trim means the rule does not apply; a usable
            // criteria is keyed exactly as returned, whitespace included.
            let Some(key) = criteria.as_deref().filter(|k| !k.trim().is_empty()) else {
                trace!(rule = %rule.label, "no criteria, rule not applicable");
                continue;
            };

            if !allow(rule, key) {
                debug!(rule = %rule.label, key = %key, "Rate limit exceeded");
                return Decision::Denied(Violation {
                    label: rule.label.clone(),
                    window_size: rule.limiter.window_size(),
                });
            }
        }
        Decision::Allowed
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<C> Default for RuleSet<C> {
    fn default() -> Self {
        Self::new()
    }
}
