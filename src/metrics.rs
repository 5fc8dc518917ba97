//! Prometheus counters exported on `/metrics`

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    pub static ref ENDPOINT_RESOLUTIONS: IntCounterVec = register_int_counter_vec!(
        "endpoint_resolutions_total",
        "Provider endpoint resolutions by discovery source",
        &["provider", "source"]
    )
    .unwrap();
    pub static ref STREAM_RESOLUTIONS: IntCounterVec = register_int_counter_vec!(
        "stream_resolutions_total",
        "Stream lookups by provider and outcome",
        &["provider", "outcome"]
    )
    .unwrap();
    pub static ref SYNC_PAGES: IntCounterVec = register_int_counter_vec!(
        "sync_pages_total",
        "Catalog sync page fetches by outcome",
        &["outcome"]
    )
    .unwrap();
}
