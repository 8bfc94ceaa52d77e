use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Every synthesized unit is named `lambda_<n>`
pub const PREFIX: &str = "lambda_";

// Seeded once from the wall clock, then only ever incremented
static COUNTER: Lazy<AtomicU64> = Lazy::new(|| {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    AtomicU64::new(seed)
});

/// Next unit name; unique for the lifetime of the process
pub fn next_name() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{PREFIX}{n}")
}
