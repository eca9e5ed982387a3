//! The aggregation core. An `Aggregator` owns one `Buckets` shard and walks
//! it through the flush cycle: `receive` on the hot path, then per tick
//! `flush` (derive), `process` (expose the snapshot) and `reset` (expire and
//! clear). All four run under the shard's mutual-exclusion domain; the
//! aggregator itself never blocks on I/O.
use buckets::Buckets;
use metric::{Metric, Timer};
use std::error;
use std::fmt;
use std::time::Duration;
use time;

/// Default upper bounds, in milliseconds, for the bucketed timer pipeline.
/// An implicit overflow bucket sits above the last bound.
pub const DEFAULT_BUCKET_BOUNDS: [f64; 11] = [
    20.0, 30.0, 40.0, 50.0, 75.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0,
];

/// Tag that routes a timer through the bucketed pipeline instead of the
/// percentile pipeline.
const BUCKETED_TIMER_TAG: &'static str = "percentiles:true";

/// Construction-time configuration errors. These abort startup; nothing in
/// the aggregator fails at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A percentile threshold is non-finite or outside `[-100, 100]`.
    Threshold(f64),
    /// A timer bucket bound is non-finite or not positive.
    BucketBound(f64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Threshold(pct) => write!(f, "percentile threshold out of range: {}", pct),
            Error::BucketBound(bound) => write!(f, "invalid timer bucket bound: {}", bound),
        }
    }
}

impl error::Error for Error {}

/// Which of a timer's per-threshold derived fields to suppress at flush.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DisabledSubtypes {
    pub count_pct: bool,
    pub mean_pct: bool,
    pub sum_pct: bool,
    pub sum_squares_pct: bool,
    pub upper_pct: bool,
    pub lower_pct: bool,
}

/// Cache of a threshold's derived-field names, rendered once at
/// construction so the flush loop never formats strings.
#[derive(Clone, Debug)]
struct PercentileNames {
    count: String,
    mean: String,
    sum: String,
    sum_squares: String,
    upper: String,
    lower: String,
}

impl PercentileNames {
    fn new(pct: f64) -> PercentileNames {
        let abs = pct.abs().trunc() as i64;
        PercentileNames {
            count: format!("count_{}", abs),
            mean: format!("mean_{}", abs),
            sum: format!("sum_{}", abs),
            sum_squares: format!("sum_squares_{}", abs),
            upper: format!("upper_{}", abs),
            lower: format!("lower_{}", abs),
        }
    }
}

/// Half-up rounding to the nearest integer.
fn round(v: f64) -> f64 {
    (v + 0.5).floor()
}

pub struct Aggregator {
    metrics_received: u64,
    metrics_dropped: u64,
    expiry_interval_ns: u64,
    percent_thresholds: Vec<(f64, PercentileNames)>,
    bucket_bounds: Vec<f64>,
    disabled_subtypes: DisabledSubtypes,
    now_ns: fn() -> u64,
    buckets: Buckets,
}

impl Aggregator {
    /// Make an aggregator. `percent_thresholds` are signed percentages, the
    /// sign selecting the upper or lower tail; each must be finite and
    /// within `[-100, 100]`. An `expiry_interval` of zero disables expiry.
    pub fn new(
        percent_thresholds: &[f64],
        expiry_interval: Duration,
        disabled_subtypes: DisabledSubtypes,
    ) -> Result<Aggregator, Error> {
        let mut thresholds = Vec::with_capacity(percent_thresholds.len());
        for &pct in percent_thresholds {
            if !pct.is_finite() || pct.abs() > 100.0 {
                return Err(Error::Threshold(pct));
            }
            thresholds.push((pct, PercentileNames::new(pct)));
        }
        Ok(Aggregator {
            metrics_received: 0,
            metrics_dropped: 0,
            expiry_interval_ns: time::duration_ns(expiry_interval),
            percent_thresholds: thresholds,
            bucket_bounds: DEFAULT_BUCKET_BOUNDS.to_vec(),
            disabled_subtypes: disabled_subtypes,
            now_ns: time::now_ns,
            buckets: Buckets::default(),
        })
    }

    /// Replace the bucketed pipeline's bound list. Bounds are sorted and
    /// deduplicated; each must be finite and positive.
    pub fn bucket_bounds(mut self, bounds: Vec<f64>) -> Result<Aggregator, Error> {
        for &bound in &bounds {
            if !bound.is_finite() || bound <= 0.0 {
                return Err(Error::BucketBound(bound));
            }
        }
        let mut bounds = bounds;
        bounds.sort_by(|a, b| a.partial_cmp(b).unwrap());
        bounds.dedup();
        self.bucket_bounds = bounds;
        Ok(self)
    }

    /// Swap the wall clock used for expiry. Handy under test.
    pub fn clock(mut self, now_ns: fn() -> u64) -> Aggregator {
        self.now_ns = now_ns;
        self
    }

    /// Fold one sample into the shard. This is the hot path: amortized O(1)
    /// per sample, no allocation when the cell already exists. A sample
    /// whose tags cannot be canonicalized is dropped and counted.
    pub fn receive(&mut self, m: Metric, now: u64) {
        self.metrics_received += 1;
        if let Err(e) = self.buckets.receive(m, now) {
            self.metrics_dropped += 1;
            debug!("dropped sample: {}", e);
        }
    }

    pub fn metrics_received(&self) -> u64 {
        self.metrics_received
    }

    pub fn metrics_dropped(&self) -> u64 {
        self.metrics_dropped
    }

    /// Derive the per-kind flush fields in place. Counters gain a
    /// per-second rate, timers their statistics and percentile fields (or a
    /// histogram, for bucketed timers); gauges and sets pass through.
    pub fn flush(&mut self, flush_interval: Duration) {
        let flush_seconds = time::duration_seconds(flush_interval);
        debug!(
            "flush window closing: {} received, {} dropped",
            self.metrics_received, self.metrics_dropped
        );

        self.buckets.each_counter_mut(|_, _, counter| {
            counter.per_second = counter.value as f64 / flush_seconds;
        });

        {
            let thresholds = &self.percent_thresholds;
            let disabled = &self.disabled_subtypes;
            let bounds = &self.bucket_bounds;
            self.buckets.each_timer_mut(|_, _, timer| {
                if timer.tags.contains(BUCKETED_TIMER_TAG) {
                    bucket_pipeline(timer, bounds);
                } else {
                    percentile_pipeline(timer, thresholds, disabled, flush_seconds);
                }
            });
        }

        self.buckets.update_num_stats();
    }

    /// Expose the shard's map to a snapshot consumer. Call between `flush`
    /// and `reset`; the argument is live only for the duration of the
    /// callback.
    pub fn process<F>(&self, f: F)
    where
        F: FnOnce(&Buckets),
    {
        f(&self.buckets)
    }

    /// Close the window: expire stale cells, then apply the per-kind reset
    /// discipline. Counters zero, timers truncate, sets empty, gauges keep
    /// their last value.
    pub fn reset(&mut self) {
        self.metrics_received = 0;
        self.metrics_dropped = 0;

        let now_nano = (self.now_ns)();
        let expiry = self.expiry_interval_ns;
        let is_expired = move |ts: u64| expiry != 0 && now_nano.saturating_sub(ts) > expiry;

        let mut dead: Vec<(String, String)> = Vec::new();

        self.buckets.each_counter_mut(|name, tags_key, counter| {
            if is_expired(counter.timestamp) {
                dead.push((name.to_owned(), tags_key.to_owned()));
            } else {
                counter.reset();
            }
        });
        for (name, tags_key) in dead.drain(..) {
            self.buckets.delete_counter(&name, &tags_key);
        }

        self.buckets.each_timer_mut(|name, tags_key, timer| {
            if is_expired(timer.timestamp) {
                dead.push((name.to_owned(), tags_key.to_owned()));
            } else {
                timer.reset();
            }
        });
        for (name, tags_key) in dead.drain(..) {
            self.buckets.delete_timer(&name, &tags_key);
        }

        // Gauges keep their last value until expiry.
        self.buckets.each_gauge_mut(|name, tags_key, gauge| {
            if is_expired(gauge.timestamp) {
                dead.push((name.to_owned(), tags_key.to_owned()));
            }
        });
        for (name, tags_key) in dead.drain(..) {
            self.buckets.delete_gauge(&name, &tags_key);
        }

        self.buckets.each_set_mut(|name, tags_key, set| {
            if is_expired(set.timestamp) {
                dead.push((name.to_owned(), tags_key.to_owned()));
            } else {
                set.reset();
            }
        });
        for (name, tags_key) in dead.drain(..) {
            self.buckets.delete_set(&name, &tags_key);
        }
    }
}

/// The default timer pipeline: sort, derive tail statistics for each
/// configured threshold off prefix sums, then the full-population
/// statistics.
fn percentile_pipeline(
    timer: &mut Timer,
    thresholds: &[(f64, PercentileNames)],
    disabled: &DisabledSubtypes,
    flush_seconds: f64,
) {
    let n = timer.values.len();
    if n == 0 {
        timer.sampled_count = 0.0;
        timer.clear_derived();
        return;
    }

    timer.values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    timer.min = timer.values[0];
    timer.max = timer.values[n - 1];
    let count = n as f64;

    let mut cumulative = Vec::with_capacity(n);
    let mut cumul_squares = Vec::with_capacity(n);
    let mut acc = 0.0;
    let mut acc_squares = 0.0;
    for &v in &timer.values {
        acc += v;
        acc_squares += v * v;
        cumulative.push(acc);
        cumul_squares.push(acc_squares);
    }

    let mut sum = timer.min;
    let mut sum_squares = timer.min * timer.min;
    let mut mean = timer.min;
    let mut boundary = timer.max;

    for &(pct, ref names) in thresholds {
        let mut num_in_threshold = n;
        if n > 1 {
            num_in_threshold = round(pct.abs() / 100.0 * count) as usize;
            if num_in_threshold == 0 {
                continue;
            }
            if pct > 0.0 {
                boundary = timer.values[num_in_threshold - 1];
                sum = cumulative[num_in_threshold - 1];
                sum_squares = cumul_squares[num_in_threshold - 1];
            } else {
                // The whole population can sit in the tail; there is no
                // prefix below it to subtract then.
                let below = n - num_in_threshold;
                boundary = timer.values[below];
                sum = cumulative[n - 1] - if below == 0 { 0.0 } else { cumulative[below - 1] };
                sum_squares =
                    cumul_squares[n - 1] - if below == 0 { 0.0 } else { cumul_squares[below - 1] };
            }
            mean = sum / num_in_threshold as f64;
        }

        if !disabled.count_pct {
            timer.percentiles.set(&names.count, num_in_threshold as f64);
        }
        if !disabled.mean_pct {
            timer.percentiles.set(&names.mean, mean);
        }
        if !disabled.sum_pct {
            timer.percentiles.set(&names.sum, sum);
        }
        if !disabled.sum_squares_pct {
            timer.percentiles.set(&names.sum_squares, sum_squares);
        }
        if pct > 0.0 {
            if !disabled.upper_pct {
                timer.percentiles.set(&names.upper, boundary);
            }
        } else if !disabled.lower_pct {
            timer.percentiles.set(&names.lower, boundary);
        }
    }

    let sum = cumulative[n - 1];
    let sum_squares = cumul_squares[n - 1];
    let mean = sum / count;

    let mut sum_of_diffs = 0.0;
    for &v in &timer.values {
        sum_of_diffs += (v - mean) * (v - mean);
    }

    let mid = (count / 2.0).floor() as usize;
    timer.median = if n % 2 == 0 {
        (timer.values[mid - 1] + timer.values[mid]) / 2.0
    } else {
        timer.values[mid]
    };

    timer.mean = mean;
    timer.std_dev = (sum_of_diffs / count).sqrt();
    timer.sum = sum;
    timer.sum_squares = sum_squares;
    timer.count = round(timer.sampled_count) as u64;
    timer.per_second = timer.sampled_count / flush_seconds;
}

/// The bucketed timer pipeline: histogram the raw values over the bound
/// list. A value equal to a bound promotes to the next bucket up; anything
/// past the last finite bound lands in the overflow bucket. No percentile
/// or statistic derivation happens in this mode.
fn bucket_pipeline(timer: &mut Timer, bounds: &[f64]) {
    timer.buckets.clear();
    for &bound in bounds {
        timer.buckets.push((bound, 0));
    }
    timer.buckets.push((::std::f64::INFINITY, 0));

    for &v in &timer.values {
        let idx = match bounds.binary_search_by(|probe| probe.partial_cmp(&v).unwrap()) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        timer.buckets[idx].1 += 1;
    }
}
