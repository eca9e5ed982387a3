//! Null sink: accepts every snapshot and does nothing with it. Handy as a
//! load-test target and as a stand-in sink under test.
use buckets::Buckets;
use sink::{Done, Sink};
use std::sync::Arc;

pub struct Null {}

impl Null {
    pub fn new(_config: NullConfig) -> Null {
        Null {}
    }
}

impl Default for Null {
    fn default() -> Null {
        Self::new(NullConfig::default())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NullConfig {}

impl Sink for Null {
    fn name(&self) -> &'static str {
        "null"
    }

    fn send_metrics_async(&mut self, _snapshot: &Arc<Buckets>, done: Done) {
        // discard snapshot
        done(Vec::new());
    }
}
