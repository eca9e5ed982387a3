//! resnik aggregates statsd-style metric samples in memory and ships the
//! aggregated results to backends on a fixed flush cadence.
//!
//! The pipeline is: producers push parsed samples through a `Receiver`, which
//! routes each sample to the `Aggregator` shard that owns its `(name,
//! tags_key)` cell. Shards store cells in `Buckets`, the primary internal
//! storage type. A `FlushCoordinator` drives the flush cycle, handing each
//! shard's snapshot to every configured `Sink`.
extern crate chrono;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate seahash;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate toml;

pub mod aggregator;
pub mod buckets;
pub mod config;
pub mod flusher;
pub mod metric;
pub mod receiver;
pub mod sink;
pub mod time;
