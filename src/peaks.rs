use log::{debug, trace};

/// Selection criteria applied to the local maxima of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeakCriteria {
    /// Minimum peak value.
    pub height: Option<f64>,
    /// Minimum horizontal distance between neighbouring peaks, in samples.
    pub distance: Option<usize>,
    /// Minimum vertical prominence.
    pub prominence: Option<f64>,
}

/// Find local maxima by a strict rise followed by a strict fall.
///
/// Flat tops count as one peak located at their middle sample (rounded
/// down). The first and last samples are never peaks.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left_edge = i;
                let right_edge = ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// Prominence of each peak: its height above the higher of the two bases.
///
/// A base is the lowest point between the peak and the nearest strictly
/// higher sample on that side (or the signal edge).
pub fn peak_prominences(x: &[f64], peaks: &[usize]) -> Vec<f64> {
    peaks
        .iter()
        .map(|&peak| {
            let height = x[peak];

            let mut left_min = height;
            for &v in x[..=peak].iter().rev() {
                if v > height {
                    break;
                }
                left_min = left_min.min(v);
            }

            let mut right_min = height;
            for &v in &x[peak..] {
                if v > height {
                    break;
                }
                right_min = right_min.min(v);
            }

            height - left_min.max(right_min)
        })
        .collect()
}

/// Keep the highest peaks so that no two are closer than `distance` samples.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let n = peaks.len();
    let mut keep = vec![true; n];

    // Stable sort by height; visiting from the back processes the highest
    // peaks first, and the later of two equal peaks wins.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < n && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Find peaks in a 1-D signal.
///
/// Candidates are filtered by height, then by distance, then by prominence,
/// and returned in ascending sample order.
pub fn find_peaks(x: &[f64], criteria: &PeakCriteria) -> Vec<usize> {
    let mut peaks = local_maxima(x);
    trace!("{} local maxima", peaks.len());

    if let Some(height) = criteria.height {
        peaks.retain(|&p| x[p] >= height);
        trace!("{} peaks above height {}", peaks.len(), height);
    }

    if let Some(distance) = criteria.distance {
        peaks = select_by_distance(x, &peaks, distance.max(1));
        trace!("{} peaks after distance {}", peaks.len(), distance);
    }

    if let Some(prominence) = criteria.prominence {
        let prominences = peak_prominences(x, &peaks);
        peaks = peaks
            .into_iter()
            .zip(prominences)
            .filter_map(|(p, prom)| (prom >= prominence).then_some(p))
            .collect();
    }

    debug!("find_peaks: {} peaks selected", peaks.len());
    peaks
}
