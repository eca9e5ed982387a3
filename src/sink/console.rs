//! Console sink: dump a snapshot to stdout in a human-readable layout.
//! Useful when bringing a pipeline up, or when graphite is lying to you.
use buckets::Buckets;
use chrono::Utc;
use sink::{Done, Sink};
use std::sync::Arc;

pub struct Console {}

impl Console {
    pub fn new(_config: ConsoleConfig) -> Console {
        Console {}
    }
}

impl Default for Console {
    fn default() -> Console {
        Self::new(ConsoleConfig::default())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {}

/// Print a single stats line.
fn fmt_line(key: &str, value: f64) {
    println!("    {}: {}", key, value)
}

impl Sink for Console {
    fn name(&self) -> &'static str {
        "console"
    }

    fn send_metrics_async(&mut self, snapshot: &Arc<Buckets>, done: Done) {
        println!("Flushing {} metrics: {}", snapshot.num_stats(), Utc::now().to_rfc3339());

        println!("  counters:");
        snapshot.each_counter(|name, _, counter| {
            fmt_line(name, counter.value as f64);
            fmt_line(&format!("{}.rate", name), counter.per_second);
        });

        println!("  gauges:");
        snapshot.each_gauge(|name, _, gauge| {
            fmt_line(name, gauge.value);
        });

        println!("  timers:");
        snapshot.each_timer(|name, _, timer| {
            for tup in &[
                ("lower", timer.min),
                ("upper", timer.max),
                ("mean", timer.mean),
                ("median", timer.median),
                ("std", timer.std_dev),
            ] {
                fmt_line(&format!("{}.{}", name, tup.0), tup.1);
            }
            for pct in timer.percentiles.iter() {
                fmt_line(&format!("{}.{}", name, pct.name), pct.value);
            }
        });

        println!("  sets:");
        snapshot.each_set(|name, _, set| {
            fmt_line(name, set.values.len() as f64);
        });

        done(Vec::new());
    }
}
