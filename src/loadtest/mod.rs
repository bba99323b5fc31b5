//! Load generation engine.
//!
//! Provides typed TOML configuration, payload sources, a pooled HTTP target
//! client with error classification, the concurrent dispatcher, the
//! stage/schedule runners and the statistics aggregator.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod sink;
pub mod summary;
