//! Process-wide Prometheus counters for the supervision loop, registered
//! against the crate's default registry so `telemetry::metrics_handler`
//! picks them up via `prometheus::gather()` with no extra wiring.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

pub static SUPERVISION_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "orchestrator_supervision_attempts_total",
            "Supervision attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("metric options are valid");
    prometheus::register(Box::new(counter.clone())).ok();
    counter
});

pub static SUPERVISION_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "orchestrator_supervision_errors_total",
        "Supervision attempts that returned an error rather than an outcome",
    )
    .expect("metric options are valid");
    prometheus::register(Box::new(counter.clone())).ok();
    counter
});

pub fn record_outcome(outcome: &orc_supervisor::SupervisionOutcome) {
    let label = match outcome {
        orc_supervisor::SupervisionOutcome::LockContended => "lock_contended",
        orc_supervisor::SupervisionOutcome::NoOp => "no_op",
        orc_supervisor::SupervisionOutcome::Completed => "completed",
        orc_supervisor::SupervisionOutcome::PartiallyCompleted => "partially_completed",
        orc_supervisor::SupervisionOutcome::Failed => "failed",
        orc_supervisor::SupervisionOutcome::TimedOut => "timed_out",
        orc_supervisor::SupervisionOutcome::Cancelled => "cancelled",
        orc_supervisor::SupervisionOutcome::Requeued { .. } => "requeued",
    };
    SUPERVISION_ATTEMPTS_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_error() {
    SUPERVISION_ERRORS_TOTAL.inc();
}
