//! cannonade: a staged HTTP load generator.
//!
//! The [`loadtest`] module holds the execution engine (dispatcher, stage and
//! schedule runners), the statistics aggregator and the collaborators they
//! depend on (payload sources, target client, latency sink).

pub mod loadtest;
