//! Periodic resource-usage sampler.
//!
//! Reads CPU and memory utilization from a [`provider::MetricsProvider`] on a
//! fixed cadence, batches the samples in memory, and durably appends each full
//! batch to an append-only CSV log via a [`sink::Sink`].

pub mod agent;
pub mod config;
pub mod provider;
pub mod sampler;
pub mod sink;
