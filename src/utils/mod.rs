use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate an idempotent-looking request correlation id. Backends that
/// echo it let the adapter reject out-of-order or cross-talk responses.
pub fn correlation_id() -> String {
    let seq = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

/// Format an amount for display: round to `max_dp` places and strip
/// trailing zeros ("0.310000" -> "0.31", "1.000000" -> "1").
pub fn format_amount(value: Decimal, max_dp: u32) -> String {
    value.round_dp(max_dp).normalize().to_string()
}
