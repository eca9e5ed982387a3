//! Routes parsed samples to the aggregator shard that owns their cell.
//! Sharding by the hash of `(name, tags_key)` keeps every cell on exactly
//! one shard, so producers contend only with producers of the same slice of
//! the keyspace.
use aggregator::Aggregator;
use metric::{Error, Metric};
use seahash::SeaHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Receiver {
    aggregators: Vec<Arc<Mutex<Aggregator>>>,
}

fn shard_index(name: &str, tags_key: &str, shards: usize) -> usize {
    let mut hasher = SeaHasher::default();
    name.hash(&mut hasher);
    tags_key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

impl Receiver {
    pub fn new(aggregators: Vec<Arc<Mutex<Aggregator>>>) -> Receiver {
        assert!(!aggregators.is_empty(), "receiver needs at least one aggregator");
        Receiver {
            aggregators: aggregators,
        }
    }

    /// Deliver one sample to its owning shard. Fails only when the sample's
    /// tags cannot be canonicalized, in which case nothing is delivered.
    pub fn receive(&self, mut m: Metric, now: u64) -> Result<(), Error> {
        m.format_tags_key()?;
        let idx = shard_index(&m.name, &m.tags_key, self.aggregators.len());
        let mut shard = self.aggregators[idx].lock().unwrap();
        shard.receive(m, now);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aggregator::DisabledSubtypes;
    use metric::Metric;
    use std::time::Duration;

    fn shards(n: usize) -> Vec<Arc<Mutex<Aggregator>>> {
        (0..n)
            .map(|_| {
                Arc::new(Mutex::new(
                    Aggregator::new(&[], Duration::new(0, 0), DisabledSubtypes::default())
                        .unwrap(),
                ))
            })
            .collect()
    }

    #[test]
    fn test_same_cell_routes_to_one_shard() {
        let aggregators = shards(8);
        let receiver = Receiver::new(aggregators.clone());
        for i in 0..100 {
            receiver
                .receive(Metric::new("some.metric", 1.0).counter().tag("service:api"), i)
                .unwrap();
        }

        let mut populated = 0;
        let mut total = 0;
        for shard in &aggregators {
            let shard = shard.lock().unwrap();
            if shard.metrics_received() > 0 {
                populated += 1;
                total += shard.metrics_received();
            }
        }
        assert_eq!(1, populated);
        assert_eq!(100, total);
    }

    #[test]
    fn test_all_samples_land_somewhere() {
        let aggregators = shards(4);
        let receiver = Receiver::new(aggregators.clone());
        for i in 0..64 {
            receiver
                .receive(Metric::new(format!("metric.{}", i), 1.0).counter(), i as u64)
                .unwrap();
        }

        let total: u64 = aggregators
            .iter()
            .map(|a| a.lock().unwrap().metrics_received())
            .sum();
        assert_eq!(64, total);
    }

    #[test]
    fn test_invalid_tags_surface_to_the_caller() {
        let aggregators = shards(2);
        let receiver = Receiver::new(aggregators.clone());
        assert!(
            receiver
                .receive(Metric::new("bad", 1.0).counter().tag("a,b"), 1)
                .is_err()
        );

        let total: u64 = aggregators
            .iter()
            .map(|a| a.lock().unwrap().metrics_received())
            .sum();
        assert_eq!(0, total);
    }
}
