//! `metric` is the collection of datatypes the daemon aggregates over: the
//! incoming `Metric` sample, its tag multiset, and the per-kind cells that
//! live in `Buckets` between flushes.
use std::error;
use std::fmt;

mod cells;
mod tags;

pub use self::cells::{Counter, Gauge, Percentile, Percentiles, Set, Timer};
pub use self::tags::{Tags, TAGS_KEY_SEPARATOR};

/// Errors surfaced while folding a sample into the metric map.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A tag label embeds the canonical separator and cannot be digested.
    InvalidTag(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidTag(ref label) => write!(f, "tag cannot be canonicalized: {:?}", label),
        }
    }
}

impl error::Error for Error {}

/// The four statsd metric kinds.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Set,
    Timer,
}

/// A single parsed sample, as handed to the core by a network listener.
///
/// `sample_rate` is the upstream sampling probability in `(0, 1]`; counter
/// and timer contributions are scaled by its reciprocal. Set members arrive
/// in `string_value`.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub kind: MetricKind,
    pub name: String,
    pub value: f64,
    pub string_value: String,
    pub hostname: String,
    pub sample_rate: f64,
    pub tags: Tags,
    /// Memoized canonical tags digest, filled by `format_tags_key`. Empty
    /// until computed.
    pub tags_key: String,
}

impl Metric {
    /// Make a new sample with a name and a value. The kind defaults to
    /// counter; chain the kind setters to change it.
    ///
    /// # Examples
    ///
    /// ```
    /// use resnik::metric::{Metric, MetricKind};
    ///
    /// let m = Metric::new("foo", 1.1).timer();
    ///
    /// assert_eq!(m.kind, MetricKind::Timer);
    /// assert_eq!(m.name, "foo");
    /// assert_eq!(m.value, 1.1);
    /// ```
    pub fn new<S>(name: S, value: f64) -> Metric
    where
        S: Into<String>,
    {
        Metric {
            kind: MetricKind::Counter,
            name: name.into(),
            value: value,
            string_value: String::new(),
            hostname: String::new(),
            sample_rate: 1.0,
            tags: Tags::default(),
            tags_key: String::new(),
        }
    }

    pub fn counter(mut self) -> Metric {
        self.kind = MetricKind::Counter;
        self
    }

    pub fn gauge(mut self) -> Metric {
        self.kind = MetricKind::Gauge;
        self
    }

    pub fn timer(mut self) -> Metric {
        self.kind = MetricKind::Timer;
        self
    }

    /// Switch the sample to a set member. The member string is what the
    /// aggregation counts; `value` is ignored for sets.
    pub fn set<S>(mut self, member: S) -> Metric
    where
        S: Into<String>,
    {
        self.kind = MetricKind::Set;
        self.string_value = member.into();
        self
    }

    pub fn sample_rate(mut self, rate: f64) -> Metric {
        self.sample_rate = rate;
        self
    }

    pub fn hostname<S>(mut self, hostname: S) -> Metric
    where
        S: Into<String>,
    {
        self.hostname = hostname.into();
        self
    }

    /// Add a tag label, invalidating any memoized digest.
    pub fn tag<S>(mut self, label: S) -> Metric
    where
        S: Into<String>,
    {
        self.tags.insert(label);
        self.tags_key.clear();
        self
    }

    /// Compute and memoize the canonical tags digest.
    pub fn format_tags_key(&mut self) -> Result<&str, Error> {
        if self.tags_key.is_empty() && !self.tags.is_empty() {
            self.tags_key = self.tags.tags_key()?;
        }
        Ok(&self.tags_key)
    }
}
