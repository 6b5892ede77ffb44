//! Rate limiting logic and state management.

mod keyed;
mod rules;
mod window;

pub use keyed::KeyedLimiter;
pub use rules::{CriteriaExtractor, Decision, RuleSet, Violation};
pub use window::SlidingWindow;
