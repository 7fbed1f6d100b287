//! PayLink payment-orchestration gateway.
//!
//! Merchants submit a normalized checkout, the gateway forwards it to a
//! payment provider adapter and later reconciles provider webhooks through a
//! Redis-backed job queue.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod models;
pub mod payments;
pub mod queue;
pub mod telemetry;
pub mod worker;
