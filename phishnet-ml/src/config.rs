//! Configuration system for phishnet.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit config file.
//! Configuration is loaded from `~/.config/phishnet/config.toml` and/or
//! `.phishnet/config.toml` in the workspace directory.
//!
//! The loaded [`PipelineConfig`] is immutable once handed to the pipeline; each
//! stage receives only its own section.

use crate::error::PipelineError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub transformation: TransformationConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Where runs and final models are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Base directory; each run gets `<artifact_dir>/<timestamp>/`.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Directory holding the latest deployable model.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            model_dir: default_model_dir(),
            pipeline_name: default_pipeline_name(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("final_model")
}

fn default_pipeline_name() -> String {
    "network_security".to_string()
}

/// Where an upstream's secrets live. Only environment variable names are
/// stored, so a serialized config never carries a secret value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsRef {
    Basic {
        username: String,
        /// Environment variable holding the password.
        #[serde(default)]
        password_env: Option<String>,
    },
    Bearer {
        /// Environment variable holding the token.
        token_env: String,
    },
}

impl CredentialsRef {
    /// Resolve the named variables through `lookup`. A missing or empty
    /// variable is a configuration error.
    pub fn resolve<F>(&self, lookup: F) -> Result<Credentials, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| PipelineError::Config(format!("credential variable {name} is not set")))
        };
        match self {
            Self::Basic {
                username,
                password_env,
            } => Ok(Credentials::Basic {
                username: username.clone(),
                password: password_env.as_deref().map(fetch).transpose()?,
            }),
            Self::Bearer { token_env } => Ok(Credentials::Bearer {
                token: fetch(token_env.as_str())?,
            }),
        }
    }
}

/// Resolved credentials for an upstream. Never serialized; `Debug` redacts
/// the secret.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
}

impl Credentials {
    /// Attach these credentials to an outgoing request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Basic { username, password } => request.basic_auth(username, password.as_deref()),
            Self::Bearer { token } => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, password } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Secrets resolved for one run, injected into the pipeline by the caller.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCredentials {
    pub source: Option<Credentials>,
    pub tracking: Option<Credentials>,
}

impl ResolvedCredentials {
    /// Resolve every credential reference in `config` through `lookup`.
    pub fn resolve<F>(config: &PipelineConfig, lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match &config.ingestion.source {
            SourceConfig::Api {
                credentials: Some(reference),
                ..
            } => Some(reference.resolve(&lookup)?),
            _ => None,
        };
        let tracking = config
            .tracking
            .credentials
            .as_ref()
            .map(|reference| reference.resolve(&lookup))
            .transpose()?;
        Ok(Self { source, tracking })
    }
}

/// Upstream collection the ingestion stage pulls from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Csv {
        path: PathBuf,
    },
    /// Document-store export: one JSON object per line.
    Jsonl {
        path: PathBuf,
    },
    /// HTTP endpoint returning a JSON array of row objects.
    Api {
        url: String,
        #[serde(default)]
        credentials: Option<CredentialsRef>,
        #[serde(default = "default_api_timeout")]
        timeout_secs: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Csv {
            path: PathBuf::from("network_data/phisingData.csv"),
        }
    }
}

fn default_api_timeout() -> u64 {
    60
}

/// Data ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub source: SourceConfig,
    /// Identity column dropped before anything else (`_id` for document exports).
    #[serde(default = "default_identity_column")]
    pub identity_column: Option<String>,
    #[serde(default = "default_feature_store_file")]
    pub feature_store_file: String,
    #[serde(default = "default_train_file")]
    pub train_file: String,
    #[serde(default = "default_test_file")]
    pub test_file: String,
    /// Fraction of rows placed in the test split.
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            identity_column: default_identity_column(),
            feature_store_file: default_feature_store_file(),
            train_file: default_train_file(),
            test_file: default_test_file(),
            test_size: default_test_size(),
            shuffle: true,
            seed: default_seed(),
        }
    }
}

fn default_identity_column() -> Option<String> {
    Some("_id".to_string())
}

fn default_feature_store_file() -> String {
    "phishingData.csv".to_string()
}

fn default_train_file() -> String {
    "train.csv".to_string()
}

fn default_test_file() -> String {
    "test.csv".to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

/// Data validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// YAML schema declaring the expected columns.
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    /// A column drifts when its KS p-value is at or below this value.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            drift_threshold: default_drift_threshold(),
            report_file: default_report_file(),
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("data_schema/schema.yaml")
}

fn default_drift_threshold() -> f64 {
    0.05
}

fn default_report_file() -> String {
    "drift_report.yaml".to_string()
}

/// One label rewrite applied before training (`from` -> `to`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelRemap {
    pub from: f64,
    pub to: f64,
}

/// Data transformation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationConfig {
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_imputer_neighbors")]
    pub imputer_neighbors: usize,
    #[serde(default = "default_label_remap")]
    pub label_remap: Vec<LabelRemap>,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            target_column: default_target_column(),
            imputer_neighbors: default_imputer_neighbors(),
            label_remap: default_label_remap(),
        }
    }
}

fn default_target_column() -> String {
    "Result".to_string()
}

fn default_imputer_neighbors() -> usize {
    3
}

fn default_label_remap() -> Vec<LabelRemap> {
    vec![LabelRemap { from: -1.0, to: 0.0 }]
}

/// Learning task; selects candidate families and the scoring metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Binary classification scored by F1.
    #[default]
    Classification,
    /// Regression scored by R².
    Regression,
}

/// Model trainer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default)]
    pub task: TaskKind,
    /// Test score below this only produces a warning.
    #[serde(default = "default_expected_score")]
    pub expected_score: f64,
    /// Train/test score gap above this only produces a warning.
    #[serde(default = "default_overfitting_threshold")]
    pub overfitting_threshold: f64,
    /// Best score below this aborts the stage.
    #[serde(default = "default_min_score_floor")]
    pub min_score_floor: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_model_file")]
    pub model_file: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            task: TaskKind::default(),
            expected_score: default_expected_score(),
            overfitting_threshold: default_overfitting_threshold(),
            min_score_floor: default_min_score_floor(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
            model_file: default_model_file(),
        }
    }
}

fn default_expected_score() -> f64 {
    0.6
}

fn default_overfitting_threshold() -> f64 {
    0.05
}

fn default_min_score_floor() -> f64 {
    0.6
}

fn default_cv_folds() -> usize {
    3
}

fn default_model_file() -> String {
    "model.bin".to_string()
}

/// Experiment-tracking sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingBackend {
    #[default]
    None,
    File,
    Mlflow,
}

/// Experiment tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub backend: TrackingBackend,
    /// MLflow tracking server base URL.
    #[serde(default)]
    pub tracking_uri: Option<String>,
    #[serde(default = "default_pipeline_name")]
    pub experiment_name: String,
    #[serde(default)]
    pub credentials: Option<CredentialsRef>,
    /// Registry file for the `file` backend, relative to the artifact base dir.
    #[serde(default = "default_registry_file")]
    pub registry_file: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            backend: TrackingBackend::default(),
            tracking_uri: None,
            experiment_name: default_pipeline_name(),
            credentials: None,
            registry_file: default_registry_file(),
        }
    }
}

fn default_registry_file() -> String {
    "experiments.json".to_string()
}

/// Remote mirror configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `s3://bucket` or `file:///some/dir`.
    #[serde(default)]
    pub target_uri: Option<String>,
    #[serde(default = "default_aws_cli")]
    pub aws_cli: String,
    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_uri: None,
            aws_cli: default_aws_cli(),
            timeout_secs: default_sync_timeout(),
        }
    }
}

fn default_aws_cli() -> String {
    "aws".to_string()
}

fn default_sync_timeout() -> u64 {
    600
}

impl PipelineConfig {
    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let ing = &self.ingestion;
        if !(ing.test_size > 0.0 && ing.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "ingestion.test_size must be in (0, 1), got {}",
                ing.test_size
            )));
        }
        let threshold = self.validation.drift_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(PipelineError::Config(format!(
                "validation.drift_threshold must be in (0, 1), got {threshold}"
            )));
        }
        if self.transformation.imputer_neighbors == 0 {
            return Err(PipelineError::Config(
                "transformation.imputer_neighbors must be >= 1".to_string(),
            ));
        }
        if self.transformation.target_column.trim().is_empty() {
            return Err(PipelineError::Config(
                "transformation.target_column is required".to_string(),
            ));
        }
        if self.trainer.cv_folds < 2 {
            return Err(PipelineError::Config(
                "trainer.cv_folds must be >= 2".to_string(),
            ));
        }
        if self.tracking.backend == TrackingBackend::Mlflow && self.tracking.tracking_uri.is_none()
        {
            return Err(PipelineError::Config(
                "tracking.tracking_uri is required for the mlflow backend".to_string(),
            ));
        }
        if self.sync.enabled && self.sync.target_uri.is_none() {
            return Err(PipelineError::Config(
                "sync.target_uri is required when sync is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit config file (`--config`)
/// 2. Environment variables (prefixed with `PHISHNET_`, nested with `__`)
/// 3. Workspace-local config (`.phishnet/config.toml`)
/// 4. User config (`~/.config/phishnet/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "phishnet", "phishnet") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".phishnet").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // PHISHNET_TRAINER__MIN_SCORE_FLOOR, PHISHNET_SYNC__TARGET_URI, etc.
    figment = figment.merge(Env::prefixed("PHISHNET_").split("__"));

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment.extract().map_err(Box::new)
}
