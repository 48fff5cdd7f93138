//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use phishnet_ml::tracking::ExperimentRegistry;
use phishnet_ml::{
    ComposedPredictor, PipelineConfig, PipelineOutcome, ResolvedCredentials, SyncOutcome,
    TrainingPipeline, load_config, predict_csv,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

/// Exit status of a run stopped by the drift gate.
const EXIT_REJECTED: u8 = 2;

pub(crate) async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Train => {
            let config = resolve_config(workspace, config_file)?;
            handle_train(config).await
        }
        Commands::Predict {
            input,
            output,
            model,
        } => {
            let config = resolve_config(workspace, config_file)?;
            handle_predict(&config, workspace, &input, &output, model)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Runs { limit } => {
            let config = resolve_config(workspace, config_file)?;
            handle_runs(&config, limit)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => {
            handle_config(action, workspace, config_file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load layered configuration with relative paths anchored at `workspace`.
fn resolve_config(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let anchor = |path: &mut PathBuf| *path = anchored(workspace, path);
    anchor(&mut config.artifacts.artifact_dir);
    anchor(&mut config.artifacts.model_dir);
    anchor(&mut config.validation.schema_path);
    match &mut config.ingestion.source {
        phishnet_ml::config::SourceConfig::Csv { path }
        | phishnet_ml::config::SourceConfig::Jsonl { path } => anchor(path),
        phishnet_ml::config::SourceConfig::Api { .. } => {}
    }
    debug!(
        workspace = %workspace.display(),
        artifact_dir = %config.artifacts.artifact_dir.display(),
        "Configuration resolved"
    );
    Ok(config)
}

/// Relative paths resolve against the workspace, not the process cwd.
fn anchored(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        workspace.join(path)
    } else {
        path.to_path_buf()
    }
}

async fn handle_train(config: PipelineConfig) -> anyhow::Result<ExitCode> {
    let credentials = ResolvedCredentials::resolve(&config, |name| std::env::var(name).ok())?;
    let mut pipeline = TrainingPipeline::new(config)?.with_credentials(credentials)?;
    match pipeline.run().await? {
        PipelineOutcome::Completed { trainer, sync } => {
            println!("Training complete ({})", pipeline.state());
            println!("  Model family: {}", trainer.model_family);
            for (name, value) in trainer.test_metric.named_values() {
                println!("  Test {name}: {value:.4}");
            }
            println!("  Model: {}", trainer.final_model_path.display());
            match sync {
                SyncOutcome::Synced(report) => {
                    println!("  Mirrored to: {}", report.artifact_destination)
                }
                SyncOutcome::Disabled => println!("  Mirror: disabled"),
                SyncOutcome::Failed { error } => println!("  Mirror failed: {error}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        PipelineOutcome::Rejected { validation } => {
            eprintln!(
                "Run rejected: drift detected in {}",
                validation.drifted_columns().join(", ")
            );
            eprintln!(
                "  Drift report: {}",
                validation.drift_report_path().display()
            );
            Ok(ExitCode::from(EXIT_REJECTED))
        }
    }
}

fn handle_predict(
    config: &PipelineConfig,
    workspace: &Path,
    input: &Path,
    output: &Path,
    model: Option<PathBuf>,
) -> anyhow::Result<()> {
    let model_path = match model {
        Some(path) => anchored(workspace, &path),
        None => config
            .artifacts
            .model_dir
            .join(&config.trainer.model_file),
    };
    let predictor = ComposedPredictor::load(&model_path)?;
    let input = anchored(workspace, input);
    let output = anchored(workspace, output);
    let summary = predict_csv(
        &predictor,
        &input,
        &output,
        &config.transformation.target_column,
    )?;
    println!(
        "Scored {} rows with {} -> {}",
        summary.rows,
        predictor.algorithm.family(),
        summary.output_path.display()
    );
    Ok(())
}

fn handle_runs(config: &PipelineConfig, limit: usize) -> anyhow::Result<()> {
    let registry_path = config
        .artifacts
        .artifact_dir
        .join(&config.tracking.registry_file);
    let registry = ExperimentRegistry::load(&registry_path)?;
    let experiment = &config.tracking.experiment_name;
    let board = registry.leaderboard(experiment);
    if board.is_empty() {
        println!(
            "No tracked runs for '{experiment}' in {}",
            registry_path.display()
        );
        return Ok(());
    }

    println!("Runs for '{experiment}' (best test score first):");
    for (rank, run) in board.iter().take(limit).enumerate() {
        println!(
            "  {:>2}. {}  {:<20} test {:.4}  {}",
            rank + 1,
            run.run_name,
            run.model_family,
            run.test_metric.score(),
            run.model_path.display()
        );
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".phishnet");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
