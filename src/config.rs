//! Configuration for the aggregation pipeline, fed in as toml. Options are
//! kebab-case; every field has a default so an empty document is a valid,
//! if quiet, configuration.
use aggregator::{self, Aggregator, DisabledSubtypes};
use sink::{ConsoleConfig, GraphiteConfig, NullConfig};
use std::error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toml;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Seconds between flushes.
    pub flush_interval: u64,
    /// Seconds a cell may go unwritten before expiry deletes it. Zero
    /// disables expiry.
    pub expiry_interval: u64,
    /// Signed percentile thresholds handed to every aggregator shard.
    pub percent_thresholds: Vec<f64>,
    /// Upper bounds for the bucketed timer pipeline.
    pub timer_buckets: Vec<f64>,
    pub disabled_timer_subtypes: DisabledSubtypes,
    /// Number of aggregator shards to spread cells over.
    pub aggregators: usize,
    pub graphite: Option<GraphiteConfig>,
    pub console: Option<ConsoleConfig>,
    pub null: Option<NullConfig>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            flush_interval: 10,
            expiry_interval: 5 * 60,
            percent_thresholds: vec![90.0],
            timer_buckets: aggregator::DEFAULT_BUCKET_BOUNDS.to_vec(),
            disabled_timer_subtypes: DisabledSubtypes::default(),
            aggregators: 4,
            graphite: None,
            console: None,
            null: None,
        }
    }
}

impl Config {
    /// Spin up the configured shard set, ready to hand to a `Receiver` and
    /// a `FlushCoordinator`.
    pub fn build_aggregators(&self) -> Result<Vec<Arc<Mutex<Aggregator>>>, aggregator::Error> {
        let expiry = Duration::new(self.expiry_interval, 0);
        let mut shards = Vec::with_capacity(self.aggregators);
        for _ in 0..self.aggregators {
            let agg = Aggregator::new(
                &self.percent_thresholds,
                expiry,
                self.disabled_timer_subtypes.clone(),
            )?.bucket_bounds(self.timer_buckets.clone())?;
            shards.push(Arc::new(Mutex::new(agg)));
        }
        Ok(shards)
    }
}

#[derive(Debug)]
pub enum Error {
    Toml(toml::de::Error),
    ZeroFlushInterval,
    ZeroAggregators,
    Threshold(f64),
    BucketBound(f64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Toml(ref e) => write!(f, "malformed configuration: {}", e),
            Error::ZeroFlushInterval => write!(f, "flush-interval must be positive"),
            Error::ZeroAggregators => write!(f, "aggregators must be positive"),
            Error::Threshold(pct) => write!(f, "percentile threshold out of range: {}", pct),
            Error::BucketBound(bound) => write!(f, "invalid timer bucket bound: {}", bound),
        }
    }
}

impl error::Error for Error {}

/// Parse and validate a configuration document. Validation failures here
/// are fatal by design; a half-configured aggregation pipeline silently
/// misreports.
pub fn parse_config(buffer: &str) -> Result<Config, Error> {
    let config: Config = toml::from_str(buffer).map_err(Error::Toml)?;
    if config.flush_interval == 0 {
        return Err(Error::ZeroFlushInterval);
    }
    if config.aggregators == 0 {
        return Err(Error::ZeroAggregators);
    }
    for &pct in &config.percent_thresholds {
        if !pct.is_finite() || pct.abs() > 100.0 {
            return Err(Error::Threshold(pct));
        }
    }
    for &bound in &config.timer_buckets {
        if !bound.is_finite() || bound <= 0.0 {
            return Err(Error::BucketBound(bound));
        }
    }
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_file_default() {
        let config = parse_config("").unwrap();

        assert_eq!(10, config.flush_interval);
        assert_eq!(300, config.expiry_interval);
        assert_eq!(vec![90.0], config.percent_thresholds);
        assert_eq!(4, config.aggregators);
        assert!(config.graphite.is_none());
        assert!(config.console.is_none());
    }

    #[test]
    fn config_file_full() {
        let config = r#"
flush-interval = 1
expiry-interval = 0
percent-thresholds = [90.0, -50.0]
timer-buckets = [10.0, 100.0, 1000.0]
aggregators = 2

[disabled-timer-subtypes]
sum-pct = true
sum-squares-pct = true

[graphite]
address = "graphite.example.com:2003"
global-prefix = "gp"
prefix-counter = "pc"
legacy-namespace = false

[console]
"#;
        let config = parse_config(config).unwrap();

        assert_eq!(1, config.flush_interval);
        assert_eq!(0, config.expiry_interval);
        assert_eq!(vec![90.0, -50.0], config.percent_thresholds);
        assert_eq!(vec![10.0, 100.0, 1000.0], config.timer_buckets);
        assert_eq!(2, config.aggregators);
        assert!(config.disabled_timer_subtypes.sum_pct);
        assert!(config.disabled_timer_subtypes.sum_squares_pct);
        assert!(!config.disabled_timer_subtypes.count_pct);

        let graphite = config.graphite.unwrap();
        assert_eq!("graphite.example.com:2003", graphite.address);
        assert_eq!("gp", graphite.global_prefix);
        assert_eq!("pc", graphite.prefix_counter);
        // Untouched fields keep their defaults.
        assert_eq!("timers", graphite.prefix_timer);
        assert!(!graphite.legacy_namespace);

        assert!(config.console.is_some());
        assert!(config.null.is_none());
    }

    #[test]
    fn config_file_bad_threshold() {
        match parse_config("percent-thresholds = [101.0]") {
            Err(Error::Threshold(pct)) => assert_eq!(101.0, pct),
            other => panic!("expected threshold error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn config_file_bad_bucket() {
        assert!(parse_config("timer-buckets = [0.0]").is_err());
    }

    #[test]
    fn config_file_zero_flush_interval() {
        match parse_config("flush-interval = 0") {
            Err(Error::ZeroFlushInterval) => {}
            other => panic!("expected flush interval error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_aggregators() {
        let config = parse_config("aggregators = 3").unwrap();
        let shards = config.build_aggregators().unwrap();
        assert_eq!(3, shards.len());
    }
}
