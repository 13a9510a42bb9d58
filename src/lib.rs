//! Adaptive learning engine for driving-school learners: Bayesian knowledge
//! tracing per (user, topic), content recommendations, dropout-risk
//! assessment and goal pathways over pluggable storage and cache backends.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod params;
pub mod store;
pub mod types;

pub use engine::LearningEngine;
pub use error::{CacheError, EngineError, ParamsError, StoreError};
pub use params::EngineParams;
