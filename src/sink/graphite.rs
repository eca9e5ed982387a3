//! Graphite sink. Renders a snapshot into the plaintext line protocol --
//! `<path> <value> <unix_ts>\n` -- and ships it over TCP. Path layout is
//! ruled by the `legacy-namespace` switch: legacy mode pins the historical
//! `stats`/`stats_counts` roots and ignores the configured prefixes,
//! non-legacy mode roots every kind under the global prefix.
use buckets::Buckets;
use sink::{Done, Sink};
use std::io;
use std::io::Write as IoWrite;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use time;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct GraphiteConfig {
    pub address: String,
    pub global_prefix: String,
    pub prefix_counter: String,
    pub prefix_timer: String,
    pub prefix_gauge: String,
    pub prefix_set: String,
    pub global_suffix: String,
    pub legacy_namespace: bool,
}

impl Default for GraphiteConfig {
    fn default() -> GraphiteConfig {
        GraphiteConfig {
            address: "localhost:2003".to_string(),
            global_prefix: "stats".to_string(),
            prefix_counter: "counters".to_string(),
            prefix_timer: "timers".to_string(),
            prefix_gauge: "gauges".to_string(),
            prefix_set: "sets".to_string(),
            global_suffix: String::new(),
            legacy_namespace: true,
        }
    }
}

/// Join the non-empty parts on dots.
fn namespace(parts: &[&str]) -> String {
    let mut ns = String::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !ns.is_empty() {
            ns.push('.');
        }
        ns.push_str(part);
    }
    ns
}

pub struct Graphite {
    address: String,
    legacy: bool,
    counter_prefix: String,
    rate_prefix: String,
    timer_prefix: String,
    gauge_prefix: String,
    set_prefix: String,
    suffix: String,
}

fn push_path(buf: &mut String, prefix: &str, name: &str, field: Option<&str>, suffix: &str) {
    if !prefix.is_empty() {
        buf.push_str(prefix);
        buf.push('.');
    }
    buf.push_str(name);
    if let Some(field) = field {
        buf.push('.');
        buf.push_str(field);
    }
    buf.push_str(suffix);
}

fn line_float(
    buf: &mut String,
    prefix: &str,
    name: &str,
    field: Option<&str>,
    suffix: &str,
    value: f64,
    when: &str,
) {
    push_path(buf, prefix, name, field, suffix);
    buf.push(' ');
    buf.push_str(&format!("{:.6}", value));
    buf.push(' ');
    buf.push_str(when);
    buf.push('\n');
}

fn line_int(
    buf: &mut String,
    prefix: &str,
    name: &str,
    field: Option<&str>,
    suffix: &str,
    value: i64,
    when: &str,
) {
    push_path(buf, prefix, name, field, suffix);
    buf.push(' ');
    buf.push_str(&value.to_string());
    buf.push(' ');
    buf.push_str(when);
    buf.push('\n');
}

impl Graphite {
    pub fn new(config: GraphiteConfig) -> Graphite {
        let suffix = if config.global_suffix.is_empty() {
            String::new()
        } else {
            format!(".{}", config.global_suffix)
        };
        if config.legacy_namespace {
            Graphite {
                address: config.address,
                legacy: true,
                counter_prefix: "stats_counts".to_string(),
                rate_prefix: "stats".to_string(),
                timer_prefix: "stats.timers".to_string(),
                gauge_prefix: "stats.gauges".to_string(),
                set_prefix: "stats.sets".to_string(),
                suffix: suffix,
            }
        } else {
            let counters = namespace(&[&config.global_prefix, &config.prefix_counter]);
            Graphite {
                address: config.address,
                legacy: false,
                counter_prefix: counters.clone(),
                rate_prefix: counters,
                timer_prefix: namespace(&[&config.global_prefix, &config.prefix_timer]),
                gauge_prefix: namespace(&[&config.global_prefix, &config.prefix_gauge]),
                set_prefix: namespace(&[&config.global_prefix, &config.prefix_set]),
                suffix: suffix,
            }
        }
    }

    /// Render a snapshot into one payload, stamping every line with `when`.
    pub fn prepare_payload(&self, snapshot: &Buckets, when: i64) -> String {
        let mut buf = String::with_capacity(8_192);
        let when = when.to_string();

        snapshot.each_counter(|name, _, counter| {
            let (count_field, rate_field) = if self.legacy {
                (None, None)
            } else {
                (Some("count"), Some("rate"))
            };
            line_int(
                &mut buf,
                &self.counter_prefix,
                name,
                count_field,
                &self.suffix,
                counter.value,
                &when,
            );
            line_float(
                &mut buf,
                &self.rate_prefix,
                name,
                rate_field,
                &self.suffix,
                counter.per_second,
                &when,
            );
        });

        snapshot.each_timer(|name, _, timer| {
            line_float(&mut buf, &self.timer_prefix, name, Some("lower"), &self.suffix, timer.min, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("upper"), &self.suffix, timer.max, &when);
            line_int(&mut buf, &self.timer_prefix, name, Some("count"), &self.suffix, timer.count as i64, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("count_ps"), &self.suffix, timer.per_second, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("mean"), &self.suffix, timer.mean, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("median"), &self.suffix, timer.median, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("std"), &self.suffix, timer.std_dev, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("sum"), &self.suffix, timer.sum, &when);
            line_float(&mut buf, &self.timer_prefix, name, Some("sum_squares"), &self.suffix, timer.sum_squares, &when);
            for pct in timer.percentiles.iter() {
                line_float(&mut buf, &self.timer_prefix, name, Some(&pct.name), &self.suffix, pct.value, &when);
            }
        });

        snapshot.each_gauge(|name, _, gauge| {
            line_float(&mut buf, &self.gauge_prefix, name, None, &self.suffix, gauge.value, &when);
        });

        snapshot.each_set(|name, _, set| {
            line_int(&mut buf, &self.set_prefix, name, None, &self.suffix, set.values.len() as i64, &when);
        });

        buf
    }
}

/// Write one payload to the given address, retrying a few times with
/// backoff. Success clears any errors collected on earlier attempts.
fn deliver(address: &str, payload: &str) -> Vec<io::Error> {
    let mut errs = Vec::new();
    for attempt in 0..3 {
        time::delay(attempt);
        match address.to_socket_addrs() {
            Ok(addrs) => {
                for addr in addrs {
                    match TcpStream::connect(addr) {
                        Ok(mut stream) => match stream.write_all(payload.as_bytes()) {
                            Ok(()) => return Vec::new(),
                            Err(e) => errs.push(e),
                        },
                        Err(e) => {
                            info!("unable to connect to graphite at {}: {}", address, e);
                            errs.push(e);
                        }
                    }
                }
            }
            Err(e) => {
                info!("unable to resolve graphite address {}: {}", address, e);
                errs.push(e);
            }
        }
    }
    errs
}

impl Sink for Graphite {
    fn name(&self) -> &'static str {
        "graphite"
    }

    fn send_metrics_async(&mut self, snapshot: &Arc<Buckets>, done: Done) {
        let payload = self.prepare_payload(snapshot, time::now());
        let address = self.address.clone();
        thread::spawn(move || {
            done(deliver(&address, &payload));
        });
    }
}
