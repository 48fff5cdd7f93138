//! Per-column distribution drift between the train and test splits.

use crate::data::DataBatch;
use crate::error::MlError;
use crate::stats::ks_2samp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Drift verdict for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    /// `true` when the column drifted (`p_value <= threshold`).
    pub drift_status: bool,
}

/// Report written to `drift_report.yaml`, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriftReport {
    pub columns: BTreeMap<String, ColumnDrift>,
}

impl DriftReport {
    /// Run the KS test on every column of `base`, comparing against the same
    /// column of `current`.
    pub fn compute(base: &DataBatch, current: &DataBatch, threshold: f64) -> Result<Self, MlError> {
        let mut columns = BTreeMap::new();
        for name in &base.columns {
            let a = base.numeric_column(name)?;
            let b = current.numeric_column(name)?;
            let ks = ks_2samp(&a, &b)
                .map_err(|e| MlError::invalid_input(format!("column '{name}': {e}")))?;
            let drift_status = ks.p_value <= threshold;
            debug!(
                column = %name,
                statistic = ks.statistic,
                p_value = ks.p_value,
                drift_status,
                "KS drift check"
            );
            columns.insert(
                name.clone(),
                ColumnDrift {
                    p_value: ks.p_value,
                    drift_status,
                },
            );
        }
        Ok(Self { columns })
    }

    /// `true` when no column drifted.
    pub fn status(&self) -> bool {
        !self.columns.values().any(|c| c.drift_status)
    }

    pub fn drifted_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, c)| c.drift_status)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn write_yaml(&self, path: &Path) -> Result<(), MlError> {
        let yaml = serde_yaml::to_string(self)?;
        crate::persistence::atomic_write(path, yaml.as_bytes())?;
        Ok(())
    }

    pub fn read_yaml(path: &Path) -> Result<Self, MlError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn batch(values: impl IntoIterator<Item = (f64, f64)>) -> DataBatch {
        DataBatch::new(
            vec!["stable".into(), "shifted".into()],
            values
                .into_iter()
                .map(|(a, b)| vec![json!(a), json!(b)])
                .collect(),
        )
    }

    #[test]
    fn test_shifted_column_is_flagged() {
        let train = batch((0..80).map(|i| ((i % 5) as f64, (i % 5) as f64)));
        let test = batch((0..20).map(|i| ((i % 5) as f64, (i % 5) as f64 + 1000.0)));

        let report = DriftReport::compute(&train, &test, 0.05).unwrap();
        assert!(!report.status());
        assert_eq!(report.drifted_columns(), vec!["shifted".to_string()]);
        assert_eq!(report.columns["stable"].p_value, 1.0);
        assert!(!report.columns["stable"].drift_status);
    }

    #[test]
    fn test_missing_column_in_current_is_error() {
        let train = batch([(1.0, 1.0)]);
        let test = DataBatch::new(vec!["stable".into()], vec![vec![json!(1.0)]]);
        assert!(DriftReport::compute(&train, &test, 0.05).is_err());
    }

    #[test]
    fn test_yaml_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drift_report.yaml");
        let train = batch((0..10).map(|i| (i as f64, i as f64)));
        let report = DriftReport::compute(&train, &train, 0.05).unwrap();
        report.write_yaml(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("stable:"));
        assert!(text.contains("p_value: 1.0"));
        assert!(text.contains("drift_status: false"));
        assert_eq!(DriftReport::read_yaml(&path).unwrap(), report);
    }
}
