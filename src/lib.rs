//! Turnpike - In-Process Sliding Window Rate Limiting
//!
//! This crate implements per-key admission control: an ordered set of named
//! rules, each enforcing a maximum number of operations within a trailing
//! time window. Counting is exact (a circular buffer of timestamps per key,
//! not fixed buckets) and all state is in-process and thread-safe; there is
//! no distributed coordination and no persistence.
//!
//! Rules are registered once at configuration time and the rule set is then
//! shared read-only with the traffic path, typically behind an `Arc`. Each
//! rule derives its key from an opaque request context via a criteria
//! extractor, so the same rule set can limit per client IP, per API token,
//! or per anything else the surrounding adapter can name.
//!
//! ```
//! use turnpike::{Decision, RuleSet};
//!
//! struct Request {
//!     ip: String,
//! }
//!
//! let mut rules = RuleSet::new();
//! rules
//!     .register("per_ip", 60, 100, |req: &Request| Some(req.ip.clone()))
//!     .expect("valid rule");
//!
//! let req = Request { ip: "10.0.0.1".to_string() };
//! match rules.evaluate(&req) {
//!     Decision::Allowed => { /* proceed */ }
//!     Decision::Denied(violation) => {
//!         // e.g. respond 429 with violation.message()
//!         let _ = violation.message();
//!     }
//! }
//! ```

pub mod error;
pub mod ratelimit;

pub use error::{ConfigError, Result};
pub use ratelimit::{CriteriaExtractor, Decision, KeyedLimiter, RuleSet, SlidingWindow, Violation};
