//! A 'sink' consumes flush snapshots and ships them somewhere: a graphite
//! relay, stdout, the void. Sinks are handed a read-only snapshot and a
//! completion callback; delivery is their business, the flush cadence is
//! not.
use buckets::Buckets;
use std::io;
use std::sync::Arc;

mod console;
mod graphite;
mod null;

pub use self::console::{Console, ConsoleConfig};
pub use self::graphite::{Graphite, GraphiteConfig};
pub use self::null::{Null, NullConfig};

/// Completion callback for one delivery. Invoked exactly once with the list
/// of per-emit errors; an empty list means full success.
pub type Done = Box<FnOnce(Vec<io::Error>) + Send>;

pub trait Sink: Send {
    fn name(&self) -> &'static str;

    /// Serialize and ship one snapshot. The snapshot reference is only
    /// guaranteed live until `done` is invoked; a sink that wants to do slow
    /// I/O must extract what it needs first and return quickly.
    fn send_metrics_async(&mut self, snapshot: &Arc<Buckets>, done: Done);
}
