//! Buckets are the primary internal storage type: four nested maps, one per
//! metric kind, each keyed by name and then by canonical tags digest. Every
//! sample a shard receives lands in exactly one cell here.
use metric::{Counter, Error, Gauge, Metric, MetricKind, Set, Timer};
use seahash::SeaHasher;
use std::cmp;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;

pub type HashMapSea<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;
pub type HashSetSea<V> = HashSet<V, BuildHasherDefault<SeaHasher>>;

type KindMap<T> = HashMapSea<String, HashMapSea<String, T>>;

/// In-memory metric map. Owned by exactly one aggregator; snapshots handed
/// to sinks are clones taken between flush and reset.
#[derive(Clone, Debug, Default)]
pub struct Buckets {
    counters: KindMap<Counter>,
    timers: KindMap<Timer>,
    gauges: KindMap<Gauge>,
    sets: KindMap<Set>,
    num_stats: usize,
}

fn each<T, F>(map: &KindMap<T>, mut f: F)
where
    F: FnMut(&str, &str, &T),
{
    for (name, children) in map {
        for (tags_key, cell) in children {
            f(name, tags_key, cell);
        }
    }
}

fn each_mut<T, F>(map: &mut KindMap<T>, mut f: F)
where
    F: FnMut(&str, &str, &mut T),
{
    for (name, children) in map.iter_mut() {
        for (tags_key, cell) in children.iter_mut() {
            f(name, tags_key, cell);
        }
    }
}

fn delete_child<T>(map: &mut KindMap<T>, name: &str, tags_key: &str) {
    let now_childless = match map.get_mut(name) {
        Some(children) => {
            children.remove(tags_key);
            children.is_empty()
        }
        None => false,
    };
    if now_childless {
        map.remove(name);
    }
}

fn get<'a, T>(map: &'a KindMap<T>, name: &str, tags_key: &str) -> Option<&'a T> {
    map.get(name).and_then(|children| children.get(tags_key))
}

fn cells<T>(map: &KindMap<T>) -> usize {
    map.values().map(|children| children.len()).sum()
}

impl Buckets {
    /// Fold a sample into the cell addressed by its `(name, tags_key)`,
    /// merging according to kind. The stored timestamp never decreases, no
    /// matter what order samples arrive in.
    pub fn receive(&mut self, mut m: Metric, now: u64) -> Result<(), Error> {
        m.format_tags_key()?;
        match m.kind {
            MetricKind::Counter => self.receive_counter(m, now),
            MetricKind::Gauge => self.receive_gauge(m, now),
            MetricKind::Set => self.receive_set(m, now),
            MetricKind::Timer => self.receive_timer(m, now),
        }
        Ok(())
    }

    fn receive_counter(&mut self, m: Metric, now: u64) {
        let rate = if m.sample_rate > 0.0 { m.sample_rate } else { 1.0 };
        let value = (m.value / rate) as i64;
        let children = self.counters.entry(m.name).or_insert_with(HashMapSea::default);
        match children.entry(m.tags_key) {
            Entry::Occupied(mut entry) => {
                let counter = entry.get_mut();
                counter.value = counter.value.saturating_add(value);
                counter.sampled_count += 1.0 / rate;
                counter.timestamp = cmp::max(counter.timestamp, now);
            }
            Entry::Vacant(entry) => {
                entry.insert(Counter::new(value, 1.0 / rate, now, m.hostname, m.tags));
            }
        }
    }

    fn receive_timer(&mut self, m: Metric, now: u64) {
        let rate = if m.sample_rate > 0.0 { m.sample_rate } else { 1.0 };
        let children = self.timers.entry(m.name).or_insert_with(HashMapSea::default);
        match children.entry(m.tags_key) {
            Entry::Occupied(mut entry) => {
                let timer = entry.get_mut();
                timer.values.push(m.value);
                timer.sampled_count += 1.0 / rate;
                timer.timestamp = cmp::max(timer.timestamp, now);
            }
            Entry::Vacant(entry) => {
                let mut timer = Timer::new(now, m.hostname, m.tags);
                timer.values.push(m.value);
                timer.sampled_count = 1.0 / rate;
                entry.insert(timer);
            }
        }
    }

    fn receive_gauge(&mut self, m: Metric, now: u64) {
        let children = self.gauges.entry(m.name).or_insert_with(HashMapSea::default);
        match children.entry(m.tags_key) {
            Entry::Occupied(mut entry) => {
                let gauge = entry.get_mut();
                gauge.value = m.value;
                gauge.timestamp = cmp::max(gauge.timestamp, now);
            }
            Entry::Vacant(entry) => {
                entry.insert(Gauge::new(m.value, now, m.hostname, m.tags));
            }
        }
    }

    fn receive_set(&mut self, m: Metric, now: u64) {
        let children = self.sets.entry(m.name).or_insert_with(HashMapSea::default);
        match children.entry(m.tags_key) {
            Entry::Occupied(mut entry) => {
                let set = entry.get_mut();
                set.values.insert(m.string_value);
                set.timestamp = cmp::max(set.timestamp, now);
            }
            Entry::Vacant(entry) => {
                let mut set = Set::new(now, m.hostname, m.tags);
                set.values.insert(m.string_value);
                entry.insert(set);
            }
        }
    }

    pub fn each_counter<F>(&self, f: F)
    where
        F: FnMut(&str, &str, &Counter),
    {
        each(&self.counters, f)
    }

    pub fn each_counter_mut<F>(&mut self, f: F)
    where
        F: FnMut(&str, &str, &mut Counter),
    {
        each_mut(&mut self.counters, f)
    }

    pub fn each_timer<F>(&self, f: F)
    where
        F: FnMut(&str, &str, &Timer),
    {
        each(&self.timers, f)
    }

    pub fn each_timer_mut<F>(&mut self, f: F)
    where
        F: FnMut(&str, &str, &mut Timer),
    {
        each_mut(&mut self.timers, f)
    }

    pub fn each_gauge<F>(&self, f: F)
    where
        F: FnMut(&str, &str, &Gauge),
    {
        each(&self.gauges, f)
    }

    pub fn each_gauge_mut<F>(&mut self, f: F)
    where
        F: FnMut(&str, &str, &mut Gauge),
    {
        each_mut(&mut self.gauges, f)
    }

    pub fn each_set<F>(&self, f: F)
    where
        F: FnMut(&str, &str, &Set),
    {
        each(&self.sets, f)
    }

    pub fn each_set_mut<F>(&mut self, f: F)
    where
        F: FnMut(&str, &str, &mut Set),
    {
        each_mut(&mut self.sets, f)
    }

    /// Remove one counter cell, dropping the name entirely once its last
    /// child is gone. The other kinds follow suit below.
    pub fn delete_counter(&mut self, name: &str, tags_key: &str) {
        delete_child(&mut self.counters, name, tags_key)
    }

    pub fn delete_timer(&mut self, name: &str, tags_key: &str) {
        delete_child(&mut self.timers, name, tags_key)
    }

    pub fn delete_gauge(&mut self, name: &str, tags_key: &str) {
        delete_child(&mut self.gauges, name, tags_key)
    }

    pub fn delete_set(&mut self, name: &str, tags_key: &str) {
        delete_child(&mut self.sets, name, tags_key)
    }

    pub fn counter(&self, name: &str, tags_key: &str) -> Option<&Counter> {
        get(&self.counters, name, tags_key)
    }

    pub fn timer(&self, name: &str, tags_key: &str) -> Option<&Timer> {
        get(&self.timers, name, tags_key)
    }

    pub fn gauge(&self, name: &str, tags_key: &str) -> Option<&Gauge> {
        get(&self.gauges, name, tags_key)
    }

    pub fn set(&self, name: &str, tags_key: &str) -> Option<&Set> {
        get(&self.sets, name, tags_key)
    }

    /// Recount the cells across all kinds. Called once per flush so sinks
    /// read a precomputed figure.
    pub fn update_num_stats(&mut self) -> usize {
        self.num_stats =
            cells(&self.counters) + cells(&self.timers) + cells(&self.gauges) + cells(&self.sets);
        self.num_stats
    }

    pub fn num_stats(&self) -> usize {
        self.num_stats
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.timers.is_empty()
            && self.gauges.is_empty()
            && self.sets.is_empty()
    }
}

#[cfg(test)]
mod test {
    extern crate quickcheck;

    use self::quickcheck::{QuickCheck, TestResult};
    use super::*;
    use metric::Metric;

    #[test]
    fn test_counter_accumulates() {
        let mut buckets = Buckets::default();
        buckets.receive(Metric::new("some.metric", 1.0).counter(), 10).unwrap();
        buckets.receive(Metric::new("some.metric", 2.0).counter(), 11).unwrap();

        let counter = buckets.counter("some.metric", "").unwrap();
        assert_eq!(3, counter.value);
        assert_eq!(2.0, counter.sampled_count);
        assert_eq!(11, counter.timestamp);
    }

    #[test]
    fn test_counter_sample_rate_scaling() {
        let mut buckets = Buckets::default();
        buckets
            .receive(Metric::new("some.metric", 5.0).counter().sample_rate(0.5), 10)
            .unwrap();

        let counter = buckets.counter("some.metric", "").unwrap();
        assert_eq!(10, counter.value);
        assert_eq!(2.0, counter.sampled_count);
    }

    #[test]
    fn test_timer_appends_raw_values() {
        let mut buckets = Buckets::default();
        buckets
            .receive(Metric::new("some.timer", 4.0).timer().sample_rate(0.1), 10)
            .unwrap();
        buckets.receive(Metric::new("some.timer", 2.0).timer(), 12).unwrap();

        let timer = buckets.timer("some.timer", "").unwrap();
        assert_eq!(vec![4.0, 2.0], timer.values);
        assert_eq!(11.0, timer.sampled_count);
        assert_eq!(12, timer.timestamp);
    }

    #[test]
    fn test_gauge_overwrites() {
        let mut buckets = Buckets::default();
        buckets.receive(Metric::new("g", 3.0).gauge(), 10).unwrap();
        buckets.receive(Metric::new("g", 7.5).gauge(), 11).unwrap();

        let gauge = buckets.gauge("g", "").unwrap();
        assert_eq!(7.5, gauge.value);
    }

    #[test]
    fn test_set_cardinality_dedups() {
        let mut buckets = Buckets::default();
        buckets.receive(Metric::new("users", 0.0).set("joe"), 10).unwrap();
        buckets.receive(Metric::new("users", 0.0).set("bob"), 11).unwrap();
        buckets.receive(Metric::new("users", 0.0).set("joe"), 12).unwrap();

        let set = buckets.set("users", "").unwrap();
        assert_eq!(2, set.values.len());
    }

    #[test]
    fn test_distinct_tags_distinct_cells() {
        let mut buckets = Buckets::default();
        buckets
            .receive(Metric::new("some.metric", 1.0).counter().tag("foo:bar"), 10)
            .unwrap();
        buckets
            .receive(Metric::new("some.metric", 1.0).counter().tag("foo:bingo"), 10)
            .unwrap();

        assert_eq!(1, buckets.counter("some.metric", "foo:bar").unwrap().value);
        assert_eq!(1, buckets.counter("some.metric", "foo:bingo").unwrap().value);
        assert_eq!(2, buckets.update_num_stats());
    }

    #[test]
    fn test_timestamp_never_decreases() {
        let mut buckets = Buckets::default();
        buckets.receive(Metric::new("g", 1.0).gauge(), 100).unwrap();
        buckets.receive(Metric::new("g", 2.0).gauge(), 50).unwrap();

        let gauge = buckets.gauge("g", "").unwrap();
        assert_eq!(100, gauge.timestamp);
        assert_eq!(2.0, gauge.value);
    }

    #[test]
    fn test_invalid_tag_is_an_error() {
        let mut buckets = Buckets::default();
        let res = buckets.receive(Metric::new("bad", 1.0).counter().tag("a,b"), 10);
        assert!(res.is_err());
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_delete_drops_childless_names() {
        let mut buckets = Buckets::default();
        buckets
            .receive(Metric::new("some.metric", 1.0).counter().tag("foo:bar"), 10)
            .unwrap();
        buckets
            .receive(Metric::new("some.metric", 1.0).counter().tag("foo:bingo"), 10)
            .unwrap();

        buckets.delete_counter("some.metric", "foo:bar");
        assert!(buckets.counter("some.metric", "foo:bar").is_none());
        assert!(buckets.counter("some.metric", "foo:bingo").is_some());

        buckets.delete_counter("some.metric", "foo:bingo");
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_num_stats_counts_across_kinds() {
        let mut buckets = Buckets::default();
        buckets.receive(Metric::new("c", 1.0).counter(), 10).unwrap();
        buckets.receive(Metric::new("t", 1.0).timer(), 10).unwrap();
        buckets.receive(Metric::new("g", 1.0).gauge(), 10).unwrap();
        buckets.receive(Metric::new("s", 0.0).set("one"), 10).unwrap();

        assert_eq!(4, buckets.update_num_stats());
        assert_eq!(4, buckets.num_stats());
    }

    #[test]
    fn cell_uniqueness() {
        fn inner(updates: u8) -> TestResult {
            let mut buckets = Buckets::default();
            for i in 0..u64::from(updates) {
                buckets
                    .receive(Metric::new("some.metric", 1.0).counter().tag("one").tag("two"), i)
                    .unwrap();
            }
            if updates == 0 {
                return TestResult::passed();
            }
            let mut seen = 0;
            buckets.each_counter(|name, tags_key, counter| {
                assert_eq!("some.metric", name);
                assert_eq!("one,two", tags_key);
                assert_eq!(i64::from(updates), counter.value);
                seen += 1;
            });
            TestResult::from_bool(seen == 1)
        }
        QuickCheck::new().quickcheck(inner as fn(u8) -> TestResult);
    }
}
