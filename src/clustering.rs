use anyhow::{bail, Result};
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster of every input value, numbered by ascending centroid.
    pub labels: Vec<usize>,
    pub centroids: Vec<f64>,
    pub iterations: usize,
}

/// K-means over scalar values.
///
/// Centroids start at evenly spaced quantiles of the sorted values, so the
/// result is deterministic for a given input.
pub fn kmeans_1d(values: &[f64], k: usize, max_iter: usize) -> Result<Clustering> {
    if k == 0 {
        bail!("number of clusters must be positive");
    }
    if values.len() < k {
        bail!("cannot form {} clusters from {} values", k, values.len());
    }
    if values.iter().any(|v| !v.is_finite()) {
        bail!("values must be finite");
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mut centroids: Vec<f64> = (0..k).map(|c| sorted[(2 * c + 1) * n / (2 * k)]).collect();

    let mut labels = vec![0usize; n];
    let mut iterations = 0;
    for _ in 0..max_iter.max(1) {
        iterations += 1;

        // Assign points to clusters
        for (label, &v) in labels.iter_mut().zip(values) {
            *label = nearest_centroid(&centroids, v);
        }

        // Update centroids; an empty cluster keeps its previous position
        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (&label, &v) in labels.iter().zip(values) {
            sums[label] += v;
            counts[label] += 1;
        }
        let updated: Vec<f64> = centroids
            .iter()
            .zip(sums.iter().zip(&counts))
            .map(|(&old, (&sum, &count))| if count > 0 { sum / count as f64 } else { old })
            .collect();

        let converged = updated == centroids;
        centroids = updated;
        if converged {
            break;
        }
    }

    // Renumber clusters from left to right
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| centroids[a].total_cmp(&centroids[b]));
    let mut rank = vec![0usize; k];
    for (new, &old) in order.iter().enumerate() {
        rank[old] = new;
    }
    let labels = labels.into_iter().map(|l| rank[l]).collect();
    let centroids = order.iter().map(|&i| centroids[i]).collect();

    debug!("kmeans converged after {} iterations", iterations);

    Ok(Clustering {
        labels,
        centroids,
        iterations,
    })
}

fn nearest_centroid(centroids: &[f64], v: f64) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, (v - c).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_index_splits_evenly() {
        let index: Vec<f64> = (0..80).map(|i| i as f64).collect();
        let clustering = kmeans_1d(&index, 8, 300).unwrap();

        assert_eq!(clustering.centroids.len(), 8);
        for c in 0..8 {
            let count = clustering.labels.iter().filter(|&&l| l == c).count();
            assert!((9..=11).contains(&count), "cluster {} has {} samples", c, count);
        }
        // contiguous, ascending labels
        assert!(clustering.labels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(clustering.labels[0], 0);
        assert_eq!(clustering.labels[79], 7);
    }

    #[test]
    fn test_separated_groups() {
        let values = vec![100.0, 1.0, 101.0, 2.0, 99.0, 0.0];
        let clustering = kmeans_1d(&values, 2, 100).unwrap();
        assert_eq!(clustering.labels, vec![1, 0, 1, 0, 1, 0]);
        assert_eq!(clustering.centroids, vec![1.0, 100.0]);
    }

    #[test]
    fn test_invalid_cluster_counts() {
        assert!(kmeans_1d(&[1.0, 2.0], 0, 10).is_err());
        assert!(kmeans_1d(&[1.0, 2.0], 3, 10).is_err());
        assert!(kmeans_1d(&[1.0, f64::NAN], 1, 10).is_err());
    }
}
