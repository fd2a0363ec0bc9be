use log::warn;
use prometheus::{Histogram, HistogramTimer, HistogramVec};

pub(crate) fn start_timer_vec(
    histogram_vec: &HistogramVec,
    method: &str,
) -> Option<HistogramTimer> {
    histogram_vec
        .get_metric_with_label_values(&[method])
        .as_ref()
        .map(Histogram::start_timer)
        .inspect_err(|error| warn!("unable to time Engine API call {method}: {error}"))
        .ok()
}

/// Records the elapsed time of an Engine API call if it was being timed.
pub fn stop_and_record(timer: Option<HistogramTimer>) {
    if let Some(timer) = timer {
        timer.stop_and_record();
    }
}

/// Drops a timer without recording it, for calls that should not skew latency histograms.
pub fn stop_and_discard(timer: Option<HistogramTimer>) {
    if let Some(timer) = timer {
        timer.stop_and_discard();
    }
}
