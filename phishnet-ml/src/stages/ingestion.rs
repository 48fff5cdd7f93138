//! Data ingestion: pull the upstream collection, clean it, export it to the
//! feature store and split it into train/test CSV files.

use crate::artifacts::IngestionArtifact;
use crate::config::IngestionConfig;
use crate::data::{DataBatch, DataSource};
use crate::error::{MlError, PipelineError, StageContext, StageKind};
use crate::layout::ArtifactLayout;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

const STAGE: StageKind = StageKind::Ingestion;

pub struct DataIngestion {
    config: IngestionConfig,
    layout: ArtifactLayout,
}

impl DataIngestion {
    pub fn new(config: IngestionConfig, layout: ArtifactLayout) -> Self {
        Self { config, layout }
    }

    pub async fn run(&self, source: &dyn DataSource) -> Result<IngestionArtifact, PipelineError> {
        let info = source.source_info();
        info!(source = %info.source_type, location = %info.location, "Loading upstream collection");
        let batch = source
            .load()
            .await
            .stage_context(STAGE, format!("failed to load {} source {}", info.source_type, info.location))?;

        let config = self.config.clone();
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || export_and_split(batch, &config, &layout))
            .await
            .stage_context(STAGE, "ingestion worker panicked")?
    }
}

/// Clean the collection, write the feature store and the two splits.
pub fn export_and_split(
    mut batch: DataBatch,
    config: &IngestionConfig,
    layout: &ArtifactLayout,
) -> Result<IngestionArtifact, PipelineError> {
    let pulled = batch.row_count();
    if let Some(identity) = &config.identity_column {
        batch.drop_column(identity);
    }
    let dropped = batch.drop_incomplete_rows();
    if batch.is_empty() {
        return Err(PipelineError::stage(
            STAGE,
            format!("no rows left after cleaning ({pulled} pulled, {dropped} incomplete)"),
        ));
    }

    let feature_store_path = layout.feature_store_path();
    batch
        .write_csv(&feature_store_path)
        .stage_context(STAGE, "failed to export feature store")?;

    let (train_idx, test_idx) = split_indices(
        batch.row_count(),
        config.test_size,
        config.shuffle,
        config.seed,
    )
    .stage_context(STAGE, "failed to split the collection")?;

    let train_path = layout.ingested_train_path();
    let test_path = layout.ingested_test_path();
    batch
        .select_rows(&train_idx)
        .write_csv(&train_path)
        .stage_context(STAGE, "failed to write train split")?;
    batch
        .select_rows(&test_idx)
        .write_csv(&test_path)
        .stage_context(STAGE, "failed to write test split")?;

    info!(
        rows = batch.row_count(),
        dropped,
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        "Collection exported and split"
    );
    Ok(IngestionArtifact {
        feature_store_path,
        train_path,
        test_path,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
    })
}

/// Row indices for the train and test splits.
///
/// `n_test = ceil(n * test_size)`. With `shuffle` the rows are permuted by a
/// seeded RNG and the first `n_test` go to test; otherwise the last `n_test`
/// rows form the test split.
pub fn split_indices(
    n: usize,
    test_size: f64,
    shuffle: bool,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), MlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlError::invalid_input(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(MlError::dataset(format!(
            "a test_size of {test_size} on {n} rows leaves one split empty"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    if shuffle {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        let train = order.split_off(n_test);
        Ok((train, order))
    } else {
        let test = order.split_off(n - n_test);
        Ok((order, test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::CsvSource;
    use chrono::Utc;
    use tempfile::TempDir;

    fn layout_in(dir: &TempDir) -> (PipelineConfig, ArtifactLayout) {
        let mut config = PipelineConfig::default();
        config.artifacts.artifact_dir = dir.path().join("artifacts");
        config.artifacts.model_dir = dir.path().join("final_model");
        let layout = ArtifactLayout::new(&config, &Utc::now());
        (config, layout)
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = split_indices(11, 0.2, true, 42).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn test_unshuffled_split_takes_tail() {
        let (train, test) = split_indices(10, 0.2, false, 0).unwrap();
        assert_eq!(train, (0..8).collect::<Vec<_>>());
        assert_eq!(test, vec![8, 9]);
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(
            split_indices(50, 0.2, true, 7).unwrap(),
            split_indices(50, 0.2, true, 7).unwrap()
        );
    }

    #[test]
    fn test_split_leaving_empty_side_fails() {
        assert!(split_indices(1, 0.2, true, 0).is_err());
    }

    #[tokio::test]
    async fn test_ingestion_cleans_and_splits() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("raw.csv");
        let mut csv = String::from("_id,a,Result\n");
        for i in 0..20 {
            let a = if i == 3 { String::new() } else { i.to_string() };
            csv.push_str(&format!("id{i},{a},{}\n", if i % 2 == 0 { 1 } else { -1 }));
        }
        std::fs::write(&source_path, csv).unwrap();

        let (config, layout) = layout_in(&dir);
        let stage = DataIngestion::new(config.ingestion.clone(), layout.clone());
        let artifact = stage.run(&CsvSource { path: source_path }).await.unwrap();

        assert_eq!(artifact.train_rows + artifact.test_rows, 19);
        assert_eq!(artifact.test_rows, 4);
        assert!(artifact.train_path.exists());
        assert!(artifact.feature_store_path.exists());
        let train = DataBatch::read_csv(&artifact.train_path).unwrap();
        assert_eq!(train.columns, vec!["a".to_string(), "Result".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_collection_is_an_ingestion_error() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("raw.csv");
        std::fs::write(&source_path, "_id,a\nx1,\nx2,\n").unwrap();

        let (config, layout) = layout_in(&dir);
        let stage = DataIngestion::new(config.ingestion.clone(), layout);
        let err = stage.run(&CsvSource { path: source_path }).await.unwrap_err();
        assert_eq!(err.stage_kind(), Some(StageKind::Ingestion));
        assert!(err.to_string().contains("no rows left after cleaning"));
    }

    #[tokio::test]
    async fn test_unreachable_source_is_an_ingestion_error() {
        let dir = TempDir::new().unwrap();
        let (config, layout) = layout_in(&dir);
        let stage = DataIngestion::new(config.ingestion.clone(), layout);
        let err = stage
            .run(&CsvSource {
                path: dir.path().join("missing.csv"),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: StageKind::Ingestion,
                ..
            }
        ));
    }
}
