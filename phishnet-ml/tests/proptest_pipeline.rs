//! Property-based tests for splitting, drift verdicts and model selection.

use proptest::prelude::*;

use ndarray::{Array1, Array2};
use phishnet_ml::TaskKind;
use phishnet_ml::algorithms::candidate_families;
use phishnet_ml::data::DataBatch;
use phishnet_ml::drift::DriftReport;
use phishnet_ml::search::{SearchData, grid_search};
use phishnet_ml::stages::ingestion::split_indices;
use serde_json::json;

fn batch(columns: &[Vec<f64>]) -> DataBatch {
    let names = (0..columns.len()).map(|i| format!("c{i}")).collect();
    let rows = (0..columns[0].len())
        .map(|r| columns.iter().map(|c| json!(c[r])).collect())
        .collect();
    DataBatch::new(names, rows)
}

// --- Split properties ---

proptest! {
    #[test]
    fn split_partitions_every_row(n in 2usize..500, test_size in 0.05f64..0.95, seed: u64, shuffle: bool) {
        if let Ok((train, test)) = split_indices(n, test_size, shuffle, seed) {
            prop_assert_eq!(train.len() + test.len(), n);
            prop_assert_eq!(test.len(), (n as f64 * test_size).ceil() as usize);
            let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
            all.sort_unstable();
            all.dedup();
            prop_assert_eq!(all.len(), n);
        }
    }
}

// --- Drift verdict properties ---

proptest! {
    #[test]
    fn status_matches_per_column_verdicts(
        base in (1usize..4, 20usize..40).prop_flat_map(|(cols, rows)| {
            prop::collection::vec(prop::collection::vec(-50.0f64..50.0, rows), cols)
        }),
        shift in prop::collection::vec(0.0f64..200.0, 4),
        threshold in 0.01f64..0.2,
    ) {
        let current: Vec<Vec<f64>> = base
            .iter()
            .zip(&shift)
            .map(|(col, s)| col.iter().map(|v| v + s).collect())
            .collect();
        let report = DriftReport::compute(&batch(&base), &batch(&current), threshold).unwrap();

        prop_assert_eq!(report.columns.len(), base.len());
        for drift in report.columns.values() {
            prop_assert_eq!(drift.drift_status, drift.p_value <= threshold);
            prop_assert!((0.0..=1.0).contains(&drift.p_value));
        }
        prop_assert_eq!(report.status(), report.columns.values().all(|c| c.p_value > threshold));
        prop_assert_eq!(report.status(), report.drifted_columns().is_empty());
    }

    #[test]
    fn disjoint_column_always_drifts(values in prop::collection::vec(0.0f64..1.0, 30..60)) {
        let shifted: Vec<f64> = values.iter().map(|v| v + 10.0).collect();
        let report = DriftReport::compute(&batch(&[values]), &batch(&[shifted]), 0.05).unwrap();
        prop_assert!(!report.status());
        prop_assert!(report.columns["c0"].drift_status);
    }
}

// --- Selection properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn selected_model_has_the_best_test_score(noise in prop::collection::vec(0.0f64..3.0, 48)) {
        let rows: Vec<f64> = noise
            .iter()
            .enumerate()
            .flat_map(|(i, n)| [(i % 2) as f64 * 2.0 + n, (i % 3) as f64])
            .collect();
        let labels: Vec<f64> = (0..48).map(|i| (i % 2) as f64).collect();
        let x = Array2::from_shape_vec((48, 2), rows).unwrap();
        let y = Array1::from_vec(labels);
        let (x_train, x_test) = x.view().split_at(ndarray::Axis(0), 36);
        let (y_train, y_test) = y.view().split_at(ndarray::Axis(0), 36);

        let families = candidate_families(TaskKind::Classification);
        let data = SearchData { x_train, y_train, x_test, y_test };
        let report = grid_search(TaskKind::Classification, &families, data, 3, 7).unwrap();

        let best = report.best().test_score;
        prop_assert!(report.families.iter().all(|f| f.test_score <= best));
        let first_best = report.families.iter().find(|f| f.test_score == best).unwrap();
        prop_assert_eq!(&first_best.family, &report.best().family);
    }
}
