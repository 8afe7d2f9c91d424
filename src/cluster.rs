use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Detection, NOISE};
use crate::error::FirmsError;

/// Weight of one day on the temporal axis, before scaling by `max_time_diff_days`.
///
/// This is an empirical approximation, not a temporal cutoff: two coincident detections
/// `d` days apart are `d * DAY_SCALE * max_time_diff_days` apart, so whether they are
/// neighbours depends on `eps` as much as on `max_time_diff_days`. With `eps = 0.01` and
/// `max_time_diff_days = 5` consecutive days are direct neighbours while detections weeks
/// apart are not.
pub const DAY_SCALE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub eps: f64,
    pub min_samples: usize,
    pub max_time_diff_days: u32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: 0.01,
            min_samples: 5,
            max_time_diff_days: 5,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<(), FirmsError> {
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(FirmsError::InvalidClusterParams(format!(
                "eps must be a positive number, got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(FirmsError::InvalidClusterParams(
                "min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// one label per detection, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAssignment {
    labels: Vec<i32>,
}

impl ClusterAssignment {
    pub fn all_noise(len: usize) -> Self {
        Self {
            labels: vec![NOISE; len],
        }
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn cluster_count(&self) -> usize {
        self.labels
            .iter()
            .filter(|label| **label != NOISE)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|label| **label == NOISE).count()
    }

    pub fn apply(&self, detections: &mut [Detection]) {
        for (detection, label) in detections.iter_mut().zip(&self.labels) {
            detection.cluster = *label;
        }
    }
}

type Point3 = [f64; 3];

fn embed(detections: &[Detection], max_time_diff_days: u32) -> Vec<Point3> {
    let Some(first_date) = detections.iter().map(|d| d.acq_date).min() else {
        return Vec::new();
    };
    let time_scale = DAY_SCALE * f64::from(max_time_diff_days);
    detections
        .iter()
        .map(|d| {
            let day_offset = (d.acq_date - first_date).num_days() as f64;
            [d.latitude, d.longitude, day_offset * time_scale]
        })
        .collect()
}

type IndexedPoint = GeomWithData<Point3, usize>;

fn neighbourhood(tree: &RTree<IndexedPoint>, point: Point3, eps: f64) -> Vec<usize> {
    let mut found = tree
        .locate_within_distance(point, eps * eps)
        .map(|entry| entry.data)
        .collect::<Vec<_>>();
    found.sort_unstable();
    found
}

/// Density-based clustering over `(latitude, longitude, scaled day offset)`.
/// Labels are numbered in discovery order; unreachable points are [`NOISE`].
pub fn cluster(detections: &[Detection], params: &ClusterParams) -> ClusterAssignment {
    let min_samples = params.min_samples.max(1);
    if detections.len() < min_samples {
        warn!(
            points = detections.len(),
            min_samples, "too few points for clustering, all labelled noise"
        );
        return ClusterAssignment::all_noise(detections.len());
    }

    let points = embed(detections, params.max_time_diff_days);
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(idx, point)| IndexedPoint::new(*point, idx))
            .collect(),
    );
    let neighbourhoods = points
        .iter()
        .map(|point| neighbourhood(&tree, *point, params.eps))
        .collect::<Vec<_>>();
    let is_core = neighbourhoods
        .iter()
        .map(|n| n.len() >= min_samples)
        .collect::<Vec<_>>();

    let mut labels = vec![NOISE; points.len()];
    let mut next_label = 0;
    let mut stack = Vec::new();
    for seed in 0..points.len() {
        if labels[seed] != NOISE || !is_core[seed] {
            continue;
        }
        stack.push(seed);
        while let Some(i) = stack.pop() {
            if labels[i] != NOISE {
                continue;
            }
            labels[i] = next_label;
            if is_core[i] {
                stack.extend(neighbourhoods[i].iter().filter(|j| labels[**j] == NOISE));
            }
        }
        next_label += 1;
    }

    let assignment = ClusterAssignment { labels };
    info!(
        clusters = assignment.cluster_count(),
        noise = assignment.noise_count(),
        points = detections.len(),
        "clustering finished"
    );
    assignment
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: i32,
    pub points: usize,
    pub mean_latitude: f64,
    pub mean_longitude: f64,
    pub mean_frp: f64,
    pub total_frp: f64,
    pub first_detection: NaiveDate,
    pub last_detection: NaiveDate,
    pub distinct_dates: usize,
    pub mean_brightness: Option<f64>,
    pub max_brightness: Option<f64>,
}

impl ClusterSummary {
    pub fn is_multi_day(&self) -> bool {
        self.distinct_dates > 1
    }
}

fn by_cluster(detections: &[Detection]) -> BTreeMap<i32, Vec<&Detection>> {
    let mut groups = BTreeMap::<i32, Vec<&Detection>>::new();
    for detection in detections.iter().filter(|d| d.cluster != NOISE) {
        groups.entry(detection.cluster).or_default().push(detection);
    }
    groups
}

pub fn summarize(detections: &[Detection]) -> Vec<ClusterSummary> {
    by_cluster(detections)
        .into_iter()
        .map(|(cluster, members)| {
            let n = members.len() as f64;
            let total_frp = members.iter().map(|d| d.frp).sum::<f64>();
            let dates = members.iter().map(|d| d.acq_date).collect::<BTreeSet<_>>();
            let brightness = members.iter().filter_map(|d| d.brightness).collect::<Vec<_>>();
            ClusterSummary {
                cluster,
                points: members.len(),
                mean_latitude: members.iter().map(|d| d.latitude).sum::<f64>() / n,
                mean_longitude: members.iter().map(|d| d.longitude).sum::<f64>() / n,
                mean_frp: total_frp / n,
                total_frp,
                first_detection: *dates.first().unwrap_or(&members[0].acq_date),
                last_detection: *dates.last().unwrap_or(&members[0].acq_date),
                distinct_dates: dates.len(),
                mean_brightness: (!brightness.is_empty())
                    .then(|| brightness.iter().sum::<f64>() / brightness.len() as f64),
                max_brightness: brightness.iter().copied().reduce(f64::max),
            }
        })
        .collect()
}

pub fn has_multiple_dates(detections: &[Detection], cluster: i32) -> bool {
    let mut dates = detections
        .iter()
        .filter(|d| d.cluster == cluster)
        .map(|d| d.acq_date);
    match dates.next() {
        Some(first) => dates.any(|date| date != first),
        None => false,
    }
}

pub fn multi_day_clusters(detections: &[Detection]) -> BTreeSet<i32> {
    by_cluster(detections)
        .into_iter()
        .filter(|(_, members)| members.iter().any(|d| d.acq_date != members[0].acq_date))
        .map(|(cluster, _)| cluster)
        .collect()
}

pub fn filter_multi_day(detections: &[Detection]) -> Vec<Detection> {
    let keep = multi_day_clusters(detections);
    detections
        .iter()
        .filter(|d| keep.contains(&d.cluster))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Days;

    use super::*;
    use crate::domain::parse_date;

    fn at(lat: f64, lon: f64, day: u64) -> Detection {
        let date = parse_date("2025-03-01").unwrap().checked_add_days(Days::new(day)).unwrap();
        Detection::new(lat, lon, date, 2.0)
    }

    #[test]
    fn too_few_points_are_noise() {
        let points = vec![at(1.0, 1.0, 0), at(1.0, 1.0, 0)];
        let params = ClusterParams {
            min_samples: 3,
            ..ClusterParams::default()
        };
        assert_eq!(cluster(&points, &params).labels(), &[NOISE, NOISE]);
    }

    #[test]
    fn border_points_join_and_outliers_are_noise() {
        let points = vec![
            at(10.0, 10.0, 0),
            at(10.004, 10.0, 0),
            at(10.0, 10.004, 0),
            at(10.008, 10.0, 0),
            at(50.0, 50.0, 0),
        ];
        let params = ClusterParams {
            eps: 0.005,
            min_samples: 3,
            max_time_diff_days: 5,
        };
        let labels = cluster(&points, &params).labels().to_vec();
        assert_eq!(labels, vec![0, 0, 0, 0, NOISE]);
    }

    #[test]
    fn neighbourhood_is_sorted_and_inclusive_at_eps() {
        let points: Vec<Point3> = vec![[0.0, 0.0, 0.0], [5.0, 5.0, 0.0], [0.0, 0.01, 0.0], [0.0, 0.0, 0.005]];
        let tree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(idx, point)| IndexedPoint::new(*point, idx))
                .collect(),
        );
        assert_eq!(neighbourhood(&tree, points[0], 0.01), vec![0, 2, 3]);
        assert_eq!(neighbourhood(&tree, points[1], 0.01), vec![1]);
    }

    #[test]
    fn params_are_validated() {
        assert!(ClusterParams::default().validate().is_ok());
        let zero_eps = ClusterParams {
            eps: 0.0,
            ..ClusterParams::default()
        };
        assert!(matches!(zero_eps.validate(), Err(FirmsError::InvalidClusterParams(_))));
        let nan_eps = ClusterParams {
            eps: f64::NAN,
            ..ClusterParams::default()
        };
        assert!(nan_eps.validate().is_err());
    }

    #[test]
    fn labels_follow_discovery_order() {
        let mut points = Vec::new();
        for _ in 0..3 {
            points.push(at(-20.0, 30.0, 0));
        }
        for _ in 0..3 {
            points.push(at(5.0, 5.0, 0));
        }
        let params = ClusterParams {
            min_samples: 3,
            ..ClusterParams::default()
        };
        assert_eq!(cluster(&points, &params).labels(), &[0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn summary_and_multi_day() {
        let mut points = vec![at(1.0, 1.0, 0), at(1.0, 1.0, 1), at(3.0, 3.0, 0), at(9.0, 9.0, 0)];
        points[0].cluster = 0;
        points[1].cluster = 0;
        points[2].cluster = 1;
        points[0].brightness = Some(300.0);
        points[1].brightness = Some(320.0);

        let summary = summarize(&points);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].points, 2);
        assert_eq!(summary[0].total_frp, 4.0);
        assert_eq!(summary[0].mean_brightness, Some(310.0));
        assert_eq!(summary[0].max_brightness, Some(320.0));
        assert!(summary[0].is_multi_day());
        assert!(!summary[1].is_multi_day());

        assert!(has_multiple_dates(&points, 0));
        assert!(!has_multiple_dates(&points, 1));
        assert_eq!(multi_day_clusters(&points), BTreeSet::from([0]));
        assert_eq!(filter_multi_day(&points).len(), 2);
    }
}
