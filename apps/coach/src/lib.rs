pub mod coach;
pub mod config;
pub mod content;
pub mod errors;
pub mod queue;
pub mod remote;
pub mod resilience;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
