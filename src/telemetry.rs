//! Telemetry metric name constants.
//!
//! Centralised metric names for spillway pumps. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `spillway_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `kind`: operation kind ("write" | "load" | "list")
//! - `status`: outcome ("ok" | "error")
//! - `reason`: why a pump slot was spent waiting ("paused" | "idle")

/// Total operations settled by a pump.
///
/// Labels: `kind`, `status` ("ok" | "error").
pub const OPERATIONS_TOTAL: &str = "spillway_operations_total";

/// Store call duration in seconds.
///
/// Labels: `kind`.
pub const OPERATION_DURATION_SECONDS: &str = "spillway_operation_duration_seconds";

/// Total listing pages fetched (successful fetches only).
pub const PAGES_FETCHED_TOTAL: &str = "spillway_pages_fetched_total";

/// Total listing entries pushed to output streams, before filtering.
pub const ENTRIES_EMITTED_TOTAL: &str = "spillway_entries_emitted_total";

/// Total poll-delay units scheduled by pumps.
///
/// Labels: `reason` ("paused" | "idle").
pub const PUMP_POLLS_TOTAL: &str = "spillway_pump_polls_total";
