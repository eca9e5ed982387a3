//! Aggregation cells, one flavor per metric kind. A cell is the live record
//! for one `(name, tags_key)` pair; `Buckets` owns them and the aggregator
//! mutates them in place across the flush cycle.
use buckets::HashSetSea;
use metric::Tags;
use std::slice::Iter;

/// A named derived field of a timer, e.g. `upper_90`.
#[derive(Clone, Debug, PartialEq)]
pub struct Percentile {
    pub name: String,
    pub value: f64,
}

/// Insertion-ordered collection of a timer's per-threshold derived fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Percentiles {
    inner: Vec<Percentile>,
}

impl Percentiles {
    /// Write a derived field, replacing any previous value under the same
    /// name. Replacement keeps a re-flush of the same window idempotent.
    pub fn set(&mut self, name: &str, value: f64) {
        match self.inner.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value,
            None => self.inner.push(Percentile {
                name: name.to_owned(),
                value: value,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.inner.iter().find(|p| p.name == name).map(|p| p.value)
    }

    pub fn iter(&self) -> Iter<Percentile> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A counter cell. `value` accumulates within a window and resets to zero
/// across windows; `per_second` is derived at flush.
#[derive(Clone, Debug, PartialEq)]
pub struct Counter {
    pub value: i64,
    pub sampled_count: f64,
    pub per_second: f64,
    pub timestamp: u64,
    pub hostname: String,
    pub tags: Tags,
}

impl Counter {
    pub fn new(value: i64, sampled_count: f64, timestamp: u64, hostname: String, tags: Tags) -> Counter {
        Counter {
            value: value,
            sampled_count: sampled_count,
            per_second: 0.0,
            timestamp: timestamp,
            hostname: hostname,
            tags: tags,
        }
    }

    /// Zero the window state, preserving identity fields.
    pub fn reset(&mut self) {
        self.value = 0;
        self.sampled_count = 0.0;
        self.per_second = 0.0;
    }
}

/// A timer cell. Raw values are retained for the duration of a window so the
/// flush can derive exact percentile statistics; the backing storage is
/// reused across windows.
#[derive(Clone, Debug, PartialEq)]
pub struct Timer {
    pub values: Vec<f64>,
    pub sampled_count: f64,
    pub timestamp: u64,
    pub hostname: String,
    pub tags: Tags,

    pub count: u64,
    pub per_second: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub sum: f64,
    pub sum_squares: f64,
    pub percentiles: Percentiles,
    /// Histogram of `(upper bound, count)` pairs, populated only for timers
    /// routed through the bucketed pipeline. The final bound is infinite.
    pub buckets: Vec<(f64, u64)>,
}

impl Timer {
    pub fn new(timestamp: u64, hostname: String, tags: Tags) -> Timer {
        Timer {
            values: Vec::new(),
            sampled_count: 0.0,
            timestamp: timestamp,
            hostname: hostname,
            tags: tags,
            count: 0,
            per_second: 0.0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            sum: 0.0,
            sum_squares: 0.0,
            percentiles: Percentiles::default(),
            buckets: Vec::new(),
        }
    }

    /// Zero every field derived at flush.
    pub fn clear_derived(&mut self) {
        self.count = 0;
        self.per_second = 0.0;
        self.min = 0.0;
        self.max = 0.0;
        self.mean = 0.0;
        self.median = 0.0;
        self.std_dev = 0.0;
        self.sum = 0.0;
        self.sum_squares = 0.0;
        self.percentiles.clear();
        self.buckets.clear();
    }

    /// Truncate the window, keeping identity fields and the backing storage
    /// of `values`.
    pub fn reset(&mut self) {
        self.values.clear();
        self.sampled_count = 0.0;
        self.clear_derived();
    }
}

/// A gauge cell. Retains its last value across windows; it only ever leaves
/// the map by expiry.
#[derive(Clone, Debug, PartialEq)]
pub struct Gauge {
    pub value: f64,
    pub timestamp: u64,
    pub hostname: String,
    pub tags: Tags,
}

impl Gauge {
    pub fn new(value: f64, timestamp: u64, hostname: String, tags: Tags) -> Gauge {
        Gauge {
            value: value,
            timestamp: timestamp,
            hostname: hostname,
            tags: tags,
        }
    }
}

/// A set cell. Cardinality is per-window; reset swaps in a fresh empty set.
#[derive(Clone, Debug, PartialEq)]
pub struct Set {
    pub values: HashSetSea<String>,
    pub timestamp: u64,
    pub hostname: String,
    pub tags: Tags,
}

impl Set {
    pub fn new(timestamp: u64, hostname: String, tags: Tags) -> Set {
        Set {
            values: HashSetSea::default(),
            timestamp: timestamp,
            hostname: hostname,
            tags: tags,
        }
    }

    pub fn reset(&mut self) {
        self.values = HashSetSea::default();
    }
}
