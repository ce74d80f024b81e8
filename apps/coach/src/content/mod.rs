// Study content: quiz questions and study plans, the cache that stores them,
// the validation that decides whether a cached entry can be trusted, and the
// fuzzy resolver that produces content when nothing better is available.

pub mod cache;
pub mod models;
pub mod resolver;
pub mod validation;
