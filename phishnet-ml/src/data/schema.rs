//! Declared dataset schema, read from YAML.
//!
//! ```yaml
//! columns:
//!   - having_IP_Address: int64
//!   - URL_Length: int64
//!   - Result: int64
//! numerical_columns:
//!   - having_IP_Address
//!   - URL_Length
//!   - Result
//! ```

use crate::data::batch::DataBatch;
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Expected shape of the ingested collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// One single-entry `name: dtype` map per column, in declaration order.
    pub columns: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub numerical_columns: Vec<String>,
}

impl DatasetSchema {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MlError> {
        let schema: Self = serde_yaml::from_str(yaml)?;
        if schema.columns.iter().any(|entry| entry.len() != 1) {
            return Err(MlError::schema(
                "every entry under `columns` must map exactly one name to a dtype",
            ));
        }
        Ok(schema)
    }

    pub fn load(path: &Path) -> Result<Self, MlError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MlError::schema(format!("failed to read schema {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .flat_map(|entry| entry.keys().map(String::as_str))
            .collect()
    }

    /// Column-count conformance.
    pub fn check_column_count(&self, batch: &DataBatch) -> Result<(), MlError> {
        if batch.column_count() != self.column_count() {
            return Err(MlError::schema(format!(
                "expected {} columns, found {}",
                self.column_count(),
                batch.column_count()
            )));
        }
        Ok(())
    }

    /// Every declared numerical column must be present.
    pub fn check_numerical_columns(&self, batch: &DataBatch) -> Result<(), MlError> {
        let missing: Vec<&str> = self
            .numerical_columns
            .iter()
            .filter(|name| batch.column_index(name).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(MlError::schema(format!(
                "missing numerical columns: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = "columns:\n  - a: int64\n  - b: float64\n  - Result: int64\nnumerical_columns:\n  - a\n  - b\n";

    fn batch(columns: &[&str]) -> DataBatch {
        DataBatch::new(
            columns.iter().map(|c| c.to_string()).collect(),
            vec![columns.iter().map(|_| json!(1)).collect()],
        )
    }

    #[test]
    fn test_parse_schema() {
        let schema = DatasetSchema::from_yaml_str(YAML).unwrap();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.column_names(), vec!["a", "b", "Result"]);
        assert_eq!(schema.numerical_columns, vec!["a", "b"]);
    }

    #[test]
    fn test_column_count_mismatch() {
        let schema = DatasetSchema::from_yaml_str(YAML).unwrap();
        assert!(schema.check_column_count(&batch(&["a", "b", "Result"])).is_ok());
        let err = schema.check_column_count(&batch(&["a", "b"])).unwrap_err();
        assert!(err.to_string().contains("expected 3 columns, found 2"));
    }

    #[test]
    fn test_missing_numerical_column() {
        let schema = DatasetSchema::from_yaml_str(YAML).unwrap();
        let err = schema
            .check_numerical_columns(&batch(&["a", "c", "Result"]))
            .unwrap_err();
        assert!(err.to_string().contains("missing numerical columns: b"));
    }

    #[test]
    fn test_rejects_multi_key_entries() {
        let yaml = "columns:\n  - {a: int64, b: int64}\n";
        assert!(DatasetSchema::from_yaml_str(yaml).is_err());
    }
}
