use chrono::{Days, NaiveDate};

use firms_incidents::cluster::{ClusterParams, cluster, filter_multi_day, summarize};
use firms_incidents::domain::{Detection, NOISE, parse_date};

fn day(offset: u64) -> NaiveDate {
    parse_date("2025-03-01")
        .unwrap()
        .checked_add_days(Days::new(offset))
        .unwrap()
}

fn at(lat: f64, lon: f64, offset: u64) -> Detection {
    Detection::new(lat, lon, day(offset), 3.0)
}

fn pairs_params() -> ClusterParams {
    ClusterParams {
        eps: 0.01,
        min_samples: 2,
        max_time_diff_days: 5,
    }
}

#[test]
fn consecutive_days_join_and_distant_days_do_not() {
    let detections = vec![
        at(10.0, 10.0, 0),
        at(10.0, 10.0, 1),
        at(20.0, 20.0, 0),
        at(20.0, 20.0, 50),
    ];
    let labels = cluster(&detections, &pairs_params()).labels().to_vec();
    assert_eq!(labels, vec![0, 0, NOISE, NOISE]);
}

#[test]
fn daily_detections_chain_across_the_time_window() {
    // isolated points five days apart sit 0.025 apart on the day axis alone
    let isolated = vec![at(10.0, 10.0, 0), at(10.0, 10.0, 5)];
    assert_eq!(cluster(&isolated, &pairs_params()).cluster_count(), 0);

    let daily = (0..=5).map(|offset| at(10.0, 10.0, offset)).collect::<Vec<_>>();
    assert_eq!(cluster(&daily, &pairs_params()).labels(), &[0; 6]);

    // a smaller day weight brings the isolated pair together
    let params = ClusterParams {
        max_time_diff_days: 1,
        ..pairs_params()
    };
    assert_eq!(cluster(&isolated, &params).labels(), &[0, 0]);
}

#[test]
fn labels_are_stable_for_identical_input() {
    let detections = (0..20u32)
        .map(|i| at(30.0 + f64::from(i % 4) * 0.002, 60.0, u64::from(i % 2)))
        .collect::<Vec<_>>();
    let params = ClusterParams {
        min_samples: 3,
        ..ClusterParams::default()
    };
    assert_eq!(cluster(&detections, &params), cluster(&detections, &params));
}

#[test]
fn summaries_follow_applied_labels() {
    let mut detections = vec![
        at(10.0, 10.0, 0),
        at(10.001, 10.0, 1),
        at(10.0, 10.001, 1),
        at(40.0, 40.0, 0),
        at(40.001, 40.0, 0),
        at(40.0, 40.001, 0),
    ];
    let params = ClusterParams {
        min_samples: 3,
        ..ClusterParams::default()
    };
    cluster(&detections, &params).apply(&mut detections);

    let summaries = summarize(&detections);
    assert_eq!(summaries.len(), 2);
    assert!(summaries[0].is_multi_day());
    assert_eq!(summaries[0].first_detection, day(0));
    assert_eq!(summaries[0].last_detection, day(1));
    assert!(!summaries[1].is_multi_day());
    assert_eq!(summaries[1].total_frp, 9.0);

    let multi_day = filter_multi_day(&detections);
    assert_eq!(multi_day.len(), 3);
    assert!(multi_day.iter().all(|d| d.cluster == 0));
}

#[test]
fn empty_input_is_empty_assignment() {
    let assignment = cluster(&[], &ClusterParams::default());
    assert!(assignment.labels().is_empty());
    assert_eq!(assignment.cluster_count(), 0);
}
