pub mod batch;
pub mod clustering;
pub mod config;
pub mod data_loading;
pub mod force_analysis;
pub mod output;
pub mod peaks;
pub mod plot;
pub mod preprocessing;
pub mod segmentation;

use segmentation::TimeWindow;

/// Indices of the samples with `window.start <= t <= window.end`.
///
/// The time axis does not have to be sorted; rows keep their recorded order.
pub fn window_indices(time: &[f64], window: &TimeWindow) -> Vec<usize> {
    time.iter()
        .enumerate()
        .filter(|&(_, &t)| t >= window.start && t <= window.end)
        .map(|(i, _)| i)
        .collect()
}
