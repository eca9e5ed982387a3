//! Drives the flush cadence. Per tick, each shard runs flush, hands its
//! snapshot out through `process`, and resets; the snapshot then fans out to
//! every sink. Sinks report back asynchronously and a slow sink never holds
//! the next tick hostage for more than one flush interval.
use aggregator::Aggregator;
use sink::Sink;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};
use time;

static CLOCK_MAINTENANCE: Once = Once::new();

pub struct FlushCoordinator {
    aggregators: Vec<Arc<Mutex<Aggregator>>>,
    sinks: Vec<Box<Sink>>,
    flush_interval: Duration,
    shutdown: mpsc::Receiver<()>,
}

impl FlushCoordinator {
    /// Make a coordinator. The returned sender cancels the run loop: send a
    /// unit, or just drop it, and the loop winds down after the in-flight
    /// cycle.
    pub fn new(
        aggregators: Vec<Arc<Mutex<Aggregator>>>,
        sinks: Vec<Box<Sink>>,
        flush_interval: Duration,
    ) -> (FlushCoordinator, mpsc::Sender<()>) {
        let (trigger, shutdown) = mpsc::channel();
        (
            FlushCoordinator {
                aggregators: aggregators,
                sinks: sinks,
                flush_interval: flush_interval,
                shutdown: shutdown,
            },
            trigger,
        )
    }

    /// Tick until cancelled. Runs on the caller's thread; spawn it.
    pub fn run(mut self) {
        CLOCK_MAINTENANCE.call_once(|| {
            thread::spawn(time::update_time);
        });
        loop {
            match self.shutdown.recv_timeout(self.flush_interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => self.flush_once(),
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// One full flush cycle over every shard: flush, snapshot, reset, fan
    /// out, then collect sink completions until the interval is spent.
    pub fn flush_once(&mut self) {
        let start = Instant::now();
        let (done_tx, done_rx) = mpsc::channel();
        let mut in_flight = 0usize;

        for shard in &self.aggregators {
            let snapshot = {
                let mut agg = shard.lock().unwrap();
                agg.flush(self.flush_interval);
                let mut snap = None;
                agg.process(|buckets| {
                    snap = Some(Arc::new(buckets.clone()));
                });
                agg.reset();
                snap.expect("process did not run the snapshot callback")
            };

            for sink in &mut self.sinks {
                let done_tx = done_tx.clone();
                let name = sink.name();
                in_flight += 1;
                sink.send_metrics_async(
                    &snapshot,
                    Box::new(move |errs| {
                        let _ = done_tx.send((name, errs));
                    }),
                );
            }
        }
        drop(done_tx);

        while in_flight > 0 {
            let elapsed = start.elapsed();
            if elapsed >= self.flush_interval {
                warn!("abandoning {} sink deliveries still in flight", in_flight);
                break;
            }
            match done_rx.recv_timeout(self.flush_interval - elapsed) {
                Ok((name, errs)) => {
                    in_flight -= 1;
                    for e in &errs {
                        error!("sink {} delivery error: {}", name, e);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!("abandoning {} sink deliveries still in flight", in_flight);
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("flush cycle complete in {}ns", time::elapsed_ns(start));
    }
}
