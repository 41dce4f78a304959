//! Temporal trend analysis for research clusters
//!
//! Classifies clusters as emerging, stable, or declining from the
//! temporal distribution of their papers.

use super::{round4, AnalysisPaper, ClusterRef};
use papergraph_common::NOISE_CLUSTER;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Trend classification for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendClass {
    Emerging,
    Stable,
    Declining,
}

/// Trend data for a single cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTrend {
    pub cluster_id: i32,
    pub cluster_label: String,
    pub classification: TrendClass,
    pub paper_count: usize,
    pub year_range: (i32, i32),
    pub year_distribution: BTreeMap<i32, usize>,
    /// Fraction of the cluster's papers published in the latest 2 years
    /// of the global year range
    pub trend_strength: f64,
    /// (recent papers - early papers) / year span; negative = shrinking
    pub velocity: f64,
    /// Top 3 paper ids by citation count
    pub representative_papers: Vec<String>,
}

/// Summary over all classified clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendSummary {
    pub total_papers: usize,
    pub year_range: Option<(i32, i32)>,
    pub cluster_count: usize,
    pub emerging_count: usize,
    pub stable_count: usize,
    pub declining_count: usize,
}

/// Complete trend analysis across all clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendAnalysisResult {
    pub emerging: Vec<ClusterTrend>,
    pub stable: Vec<ClusterTrend>,
    pub declining: Vec<ClusterTrend>,
    pub summary: TrendSummary,
}

/// Classifies research clusters from temporal paper distribution.
///
/// Rules, evaluated in order:
/// 1. emerging: first_seen >= global_max_year - 2 AND paper_count >= 2
/// 2. declining: last_seen <= global_max_year - 3
/// 3. stable: paper_count >= 3 AND year_span >= 3
/// 4. default: stable
#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer;

impl TrendAnalyzer {
    /// Analyze temporal trends for each non-noise cluster.
    ///
    /// Deterministic: identical input yields identical classifications
    /// and ordering.
    pub fn analyze_trends(
        &self,
        papers: &[AnalysisPaper],
        clusters: &[ClusterRef],
    ) -> TrendAnalysisResult {
        if papers.is_empty() || clusters.is_empty() {
            return TrendAnalysisResult::default();
        }

        let mut cluster_papers: HashMap<i32, Vec<&AnalysisPaper>> = HashMap::new();
        for paper in papers {
            if paper.cluster_id != NOISE_CLUSTER {
                cluster_papers
                    .entry(paper.cluster_id)
                    .or_default()
                    .push(paper);
            }
        }

        let years: Vec<i32> = papers.iter().filter_map(|p| p.year).collect();
        let (Some(&global_min_year), Some(&global_max_year)) =
            (years.iter().min(), years.iter().max())
        else {
            return TrendAnalysisResult {
                summary: TrendSummary {
                    total_papers: papers.len(),
                    year_range: None,
                    cluster_count: clusters.iter().filter(|c| c.id != NOISE_CLUSTER).count(),
                    ..Default::default()
                },
                ..Default::default()
            };
        };

        let mut result = TrendAnalysisResult::default();

        for cluster in clusters {
            if cluster.id == NOISE_CLUSTER {
                continue;
            }
            let Some(members) = cluster_papers.get(&cluster.id) else {
                continue;
            };
            if members.is_empty() {
                continue;
            }

            let trend =
                Self::analyze_cluster(cluster.id, &cluster.label, members, global_max_year);

            match trend.classification {
                TrendClass::Emerging => result.emerging.push(trend),
                TrendClass::Stable => result.stable.push(trend),
                TrendClass::Declining => result.declining.push(trend),
            }
        }

        // Category-specific ordering; stable sorts keep input order on ties
        result.emerging.sort_by(|a, b| {
            b.trend_strength
                .partial_cmp(&a.trend_strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        result.stable.sort_by(|a, b| b.paper_count.cmp(&a.paper_count));
        result.declining.sort_by(|a, b| {
            a.velocity
                .partial_cmp(&b.velocity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        result.summary = TrendSummary {
            total_papers: papers.len(),
            year_range: Some((global_min_year, global_max_year)),
            cluster_count: clusters.iter().filter(|c| c.id != NOISE_CLUSTER).count(),
            emerging_count: result.emerging.len(),
            stable_count: result.stable.len(),
            declining_count: result.declining.len(),
        };

        info!(
            emerging = result.emerging.len(),
            stable = result.stable.len(),
            declining = result.declining.len(),
            "Trend analysis complete"
        );

        result
    }

    fn analyze_cluster(
        cluster_id: i32,
        cluster_label: &str,
        papers: &[&AnalysisPaper],
        global_max_year: i32,
    ) -> ClusterTrend {
        let mut year_counts: BTreeMap<i32, usize> = BTreeMap::new();
        for paper in papers {
            if let Some(year) = paper.year {
                *year_counts.entry(year).or_default() += 1;
            }
        }

        let (Some((&first_seen, _)), Some((&last_seen, _))) =
            (year_counts.first_key_value(), year_counts.last_key_value())
        else {
            // No dated papers at all
            return ClusterTrend {
                cluster_id,
                cluster_label: cluster_label.to_string(),
                classification: TrendClass::Stable,
                paper_count: papers.len(),
                year_range: (0, 0),
                year_distribution: BTreeMap::new(),
                trend_strength: 0.0,
                velocity: 0.0,
                representative_papers: Self::representative_papers(papers),
            };
        };

        let year_span = last_seen - first_seen + 1;
        let total_count: usize = year_counts.values().sum();

        // Recent window: latest 2 years of the global range
        let recent_count: usize = year_counts
            .iter()
            .filter(|(&year, _)| year >= global_max_year - 1)
            .map(|(_, &count)| count)
            .sum();
        let trend_strength = recent_count as f64 / total_count as f64;

        // Early window: the cluster's first 2 years
        let old_count: usize = year_counts
            .iter()
            .filter(|(&year, _)| year <= first_seen + 1)
            .map(|(_, &count)| count)
            .sum();
        let velocity = (recent_count as f64 - old_count as f64) / year_span.max(1) as f64;

        let classification = Self::classify(
            first_seen,
            last_seen,
            total_count,
            year_span,
            global_max_year,
        );

        ClusterTrend {
            cluster_id,
            cluster_label: cluster_label.to_string(),
            classification,
            paper_count: total_count,
            year_range: (first_seen, last_seen),
            year_distribution: year_counts,
            trend_strength: round4(trend_strength),
            velocity: round4(velocity),
            representative_papers: Self::representative_papers(papers),
        }
    }

    fn classify(
        first_seen: i32,
        last_seen: i32,
        paper_count: usize,
        year_span: i32,
        global_max_year: i32,
    ) -> TrendClass {
        // Recently appeared topic with some activity
        if first_seen >= global_max_year - 2 && paper_count >= 2 {
            return TrendClass::Emerging;
        }

        // No recent papers at all
        if last_seen <= global_max_year - 3 {
            return TrendClass::Declining;
        }

        // Sustained presence across multiple years
        if paper_count >= 3 && year_span >= 3 {
            return TrendClass::Stable;
        }

        // Small/ambiguous clusters default to stable
        TrendClass::Stable
    }

    /// Top 3 paper ids by citation count, id as tiebreak.
    fn representative_papers(papers: &[&AnalysisPaper]) -> Vec<String> {
        let mut sorted: Vec<&&AnalysisPaper> = papers.iter().collect();
        sorted.sort_by(|a, b| b.citation_count.cmp(&a.citation_count).then(a.id.cmp(&b.id)));
        sorted.into_iter().take(3).map(|p| p.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, year: Option<i32>, citations: i64, cluster_id: i32) -> AnalysisPaper {
        AnalysisPaper {
            id: id.to_string(),
            title: format!("Paper {}", id),
            year,
            citation_count: citations,
            cluster_id,
            embedding: None,
        }
    }

    fn cluster(id: i32, label: &str) -> ClusterRef {
        ClusterRef {
            id,
            label: label.to_string(),
            paper_count: 0,
        }
    }

    #[test]
    fn test_old_cluster_is_declining() {
        // Global range reaches 2024; this cluster stops in 2020
        let papers = vec![
            paper("a", Some(2018), 10, 0),
            paper("b", Some(2019), 5, 0),
            paper("c", Some(2020), 2, 0),
            paper("d", Some(2024), 50, 1),
            paper("e", Some(2024), 30, 1),
        ];
        let clusters = vec![cluster(0, "Old Topic"), cluster(1, "New Topic")];

        let result = TrendAnalyzer.analyze_trends(&papers, &clusters);

        assert_eq!(result.declining.len(), 1);
        assert_eq!(result.declining[0].cluster_id, 0);
        assert_eq!(result.declining[0].classification, TrendClass::Declining);
    }

    #[test]
    fn test_recent_cluster_is_emerging() {
        let papers = vec![
            paper("a", Some(2023), 3, 0),
            paper("b", Some(2024), 1, 0),
            paper("c", Some(2015), 100, 1),
            paper("d", Some(2020), 40, 1),
            paper("e", Some(2024), 10, 1),
        ];
        let clusters = vec![cluster(0, "Fresh"), cluster(1, "Long-running")];

        let result = TrendAnalyzer.analyze_trends(&papers, &clusters);

        assert_eq!(result.emerging.len(), 1);
        assert_eq!(result.emerging[0].cluster_id, 0);
        // first_seen 2015, last 2024, 3 papers over 10 years
        assert_eq!(result.stable.len(), 1);
        assert_eq!(result.stable[0].cluster_id, 1);
    }

    #[test]
    fn test_emerging_beats_stable_in_priority() {
        // Satisfies both the emerging and stable rules; emerging wins
        let papers = vec![
            paper("a", Some(2022), 1, 0),
            paper("b", Some(2023), 1, 0),
            paper("c", Some(2024), 1, 0),
            paper("d", Some(2024), 1, 0),
        ];
        let clusters = vec![cluster(0, "Both")];

        let result = TrendAnalyzer.analyze_trends(&papers, &clusters);
        assert_eq!(result.emerging.len(), 1);
        assert!(result.stable.is_empty());
    }

    #[test]
    fn test_trend_strength_and_velocity() {
        // Cluster 0: 1 paper in 2020, 3 papers in 2023-2024; global max 2024
        let papers = vec![
            paper("a", Some(2020), 0, 0),
            paper("b", Some(2023), 0, 0),
            paper("c", Some(2024), 0, 0),
            paper("d", Some(2024), 0, 0),
        ];
        let clusters = vec![cluster(0, "Growing")];

        let result = TrendAnalyzer.analyze_trends(&papers, &clusters);
        let trend = result
            .emerging
            .iter()
            .chain(&result.stable)
            .chain(&result.declining)
            .find(|t| t.cluster_id == 0)
            .unwrap();

        // 3 of 4 papers in the last 2 global years
        assert!((trend.trend_strength - 0.75).abs() < 1e-9);
        // (recent 3 - old 1) / span 5
        assert!((trend.velocity - 0.4).abs() < 1e-9);
        assert_eq!(trend.year_range, (2020, 2024));
    }

    #[test]
    fn test_representative_papers_by_citation() {
        let papers = vec![
            paper("low", Some(2020), 1, 0),
            paper("high", Some(2021), 100, 0),
            paper("mid", Some(2022), 50, 0),
            paper("tiny", Some(2022), 0, 0),
        ];
        let clusters = vec![cluster(0, "C")];

        let result = TrendAnalyzer.analyze_trends(&papers, &clusters);
        let trend = result
            .emerging
            .iter()
            .chain(&result.stable)
            .chain(&result.declining)
            .next()
            .unwrap();
        assert_eq!(trend.representative_papers, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_determinism_on_repeated_calls() {
        let papers: Vec<AnalysisPaper> = (0..20)
            .map(|i| paper(&format!("p{}", i), Some(2015 + (i % 10)), i as i64, (i % 3) as i32))
            .collect();
        let clusters = vec![cluster(0, "A"), cluster(1, "B"), cluster(2, "C")];

        let analyzer = TrendAnalyzer;
        let first = analyzer.analyze_trends(&papers, &clusters);
        let second = analyzer.analyze_trends(&papers, &clusters);

        let shape = |r: &TrendAnalysisResult| -> Vec<(i32, TrendClass, Vec<String>)> {
            r.emerging
                .iter()
                .chain(&r.stable)
                .chain(&r.declining)
                .map(|t| (t.cluster_id, t.classification, t.representative_papers.clone()))
                .collect()
        };
        assert_eq!(shape(&first), shape(&second));
    }

    #[test]
    fn test_no_years_yields_empty_range_summary() {
        let papers = vec![paper("a", None, 0, 0), paper("b", None, 0, 0)];
        let clusters = vec![cluster(0, "Undated")];

        let result = TrendAnalyzer.analyze_trends(&papers, &clusters);
        assert!(result.summary.year_range.is_none());
        assert_eq!(result.summary.total_papers, 2);
        assert!(result.emerging.is_empty() && result.stable.is_empty());
    }
}
