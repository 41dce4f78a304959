//! Graph analytics over clustered result graphs
//!
//! Three independent analyzers consuming node/edge/cluster summaries:
//! - Bridge detection: papers connecting otherwise-separate clusters
//! - Gap detection: cluster pairs with sparse connectivity
//! - Trend analysis: emerging/stable/declining cluster classification

pub mod bridge;
pub mod gap;
pub mod trend;

pub use bridge::BridgeDetector;
pub use gap::{GapAnalysisResult, GapDetector, StructuralGap};
pub use trend::{ClusterTrend, TrendAnalyzer, TrendAnalysisResult, TrendClass};

use serde::{Deserialize, Serialize};

/// The paper view the analyzers operate on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisPaper {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub citation_count: i64,
    #[serde(default = "default_cluster")]
    pub cluster_id: i32,
    pub embedding: Option<Vec<f32>>,
}

fn default_cluster() -> i32 {
    papergraph_common::NOISE_CLUSTER
}

/// The cluster view the analyzers operate on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterRef {
    pub id: i32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub paper_count: usize,
}

/// Linearly interpolated percentile of a non-empty sorted slice,
/// `q` in [0, 100].
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Round to 4 decimal places for stable, readable scores.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&values, 100.0) - 4.0).abs() < 1e-9);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
    }
}
