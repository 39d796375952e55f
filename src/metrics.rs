use tracing::trace;

// Lightweight metrics helpers; trace-based so they stay cheap when the
// `linkmint.metrics` target is filtered out.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "linkmint.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn resolution_elapsed(tier: &'static str, elapsed_ms: u128) {
    trace!(
        target = "linkmint.metrics",
        tier = tier,
        elapsed_ms = elapsed_ms as u64,
        "resolution_elapsed"
    );
}
