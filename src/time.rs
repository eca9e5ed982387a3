//! Clock plumbing. The second-resolution clock is cached and refreshed by a
//! maintenance thread so that hot paths never pay for a syscall; the
//! nanosecond clock is read directly and backs cell timestamps and expiry.
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use std::{cmp, thread, time};

lazy_static! {
    static ref NOW: Arc<AtomicUsize> =
        Arc::new(AtomicUsize::new(Utc::now().timestamp() as usize));
}

/// Current unix time, seconds, at up to 500ms staleness. See `update_time`.
pub fn now() -> i64 {
    NOW.load(Ordering::Relaxed) as i64
}

/// Current unix time, nanoseconds. Uncached.
pub fn now_ns() -> u64 {
    Utc::now().timestamp_nanos() as u64
}

/// Refresh loop for the cached second clock. Runs forever; spawn it on a
/// dedicated thread.
pub fn update_time() {
    let dur = time::Duration::from_millis(500);
    loop {
        thread::sleep(dur);
        let now = Utc::now().timestamp() as usize;
        NOW.store(now, Ordering::Relaxed);
    }
}

pub fn elapsed_ns(i: Instant) -> u64 {
    let elapsed = i.elapsed();
    (elapsed.as_secs().saturating_mul(1_000_000_000))
        .saturating_add(u64::from(elapsed.subsec_nanos()))
}

pub fn duration_ns(d: Duration) -> u64 {
    (d.as_secs().saturating_mul(1_000_000_000)).saturating_add(u64::from(d.subsec_nanos()))
}

pub fn duration_seconds(d: Duration) -> f64 {
    d.as_secs() as f64 + f64::from(d.subsec_nanos()) * 1e-9
}

/// Exponential backoff, capped at one minute.
#[inline]
pub fn delay(attempts: u32) {
    if attempts > 0 && attempts < 16 {
        let max_delay: u32 = 60_000;
        let delay = cmp::min(max_delay, 2u32.pow(attempts));
        let sleep_time = time::Duration::from_millis(u64::from(delay));
        thread::sleep(sleep_time);
    } else if attempts >= 16 {
        let sleep_time = time::Duration::from_millis(60_000);
        thread::sleep(sleep_time);
    }
}
