use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static INVOICES_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coinvoice_invoices_created_total",
        "Total number of invoices created",
    )
    .unwrap()
});

pub static FALLBACK_ADDRESSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coinvoice_fallback_addresses_total",
        "Invoices issued a local fallback deposit address",
    )
    .unwrap()
});

pub static STATUS_UPDATES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "coinvoice_status_updates_total",
            "Administrative status updates by target status",
        ),
        &["status"],
    )
    .unwrap()
});

// Webhook counters
pub static WEBHOOK_EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "coinvoice_webhook_events_total",
            "Processor webhook events by outcome",
        ),
        &["outcome"],
    )
    .unwrap()
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(INVOICES_CREATED.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(FALLBACK_ADDRESSES.clone()))
            .unwrap();
        REGISTRY.register(Box::new(STATUS_UPDATES.clone())).unwrap();
        REGISTRY.register(Box::new(WEBHOOK_EVENTS.clone())).unwrap();
    });
}

/// Render the registry in the Prometheus text exposition format.
pub fn metrics_output() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
