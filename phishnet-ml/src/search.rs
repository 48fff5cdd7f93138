//! Grid search with k-fold cross-validation over the candidate families.
//!
//! Each family's grid is scored by mean CV score on the training split
//! (trials in parallel with rayon). The family's best configuration is refit
//! on the full training split and scored on the test split. The family with
//! the highest test score wins; ties go to the earlier family.

use crate::algorithms::{
    CandidateFamily, ClassicalAlgorithm, CrossValidation, CrossValidationResult, Estimator,
    FittedModel,
};
use crate::config::TaskKind;
use crate::error::MlError;
use crate::metrics;
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One grid point and its cross-validation scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub family: String,
    pub algorithm: ClassicalAlgorithm,
    pub cv: CrossValidationResult,
}

/// The refit winner of one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyReport {
    pub family: String,
    pub algorithm: ClassicalAlgorithm,
    pub cv_score: f64,
    pub train_score: f64,
    pub test_score: f64,
}

/// Everything the search measured, plus the fitted family winners.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub trials: Vec<TrialRecord>,
    pub families: Vec<FamilyReport>,
    models: Vec<FittedModel>,
    best: usize,
}

impl SearchReport {
    pub fn best(&self) -> &FamilyReport {
        &self.families[self.best]
    }

    pub fn into_best(mut self) -> (FamilyReport, FittedModel) {
        let model = self.models.swap_remove(self.best);
        let report = self.families.swap_remove(self.best);
        (report, model)
    }
}

/// Training and test matrices handed to the search.
#[derive(Debug, Clone, Copy)]
pub struct SearchData<'a> {
    pub x_train: ArrayView2<'a, f64>,
    pub y_train: ArrayView1<'a, f64>,
    pub x_test: ArrayView2<'a, f64>,
    pub y_test: ArrayView1<'a, f64>,
}

pub fn grid_search(
    task: TaskKind,
    families: &[CandidateFamily],
    data: SearchData<'_>,
    cv_folds: usize,
    seed: u64,
) -> Result<SearchReport, MlError> {
    if families.iter().all(|f| f.grid.is_empty()) {
        return Err(MlError::model("no candidate configurations to search"));
    }
    let cv = CrossValidation {
        n_folds: cv_folds,
        stratified: task == TaskKind::Classification,
    };
    let labels = data.y_train.to_vec();
    let folds = cv.folds(&labels);
    if folds.is_empty() {
        return Err(MlError::dataset(format!(
            "cannot build {cv_folds} folds from {} training rows",
            labels.len()
        )));
    }

    let mut trials = Vec::new();
    let mut reports = Vec::new();
    let mut models = Vec::new();

    for family in families.iter().filter(|f| !f.grid.is_empty()) {
        let family_trials = family
            .grid
            .par_iter()
            .map(|algorithm| {
                let scores = folds
                    .iter()
                    .map(|fold| {
                        let x_fit = data.x_train.select(Axis(0), &fold.train);
                        let y_fit = data.y_train.select(Axis(0), &fold.train);
                        let x_val = data.x_train.select(Axis(0), &fold.validation);
                        let y_val = data.y_train.select(Axis(0), &fold.validation);
                        let model = algorithm.fit(x_fit.view(), y_fit.view(), seed)?;
                        let pred = model.predict(x_val.view());
                        Ok(metrics::score(task, &y_val.to_vec(), &pred.to_vec()))
                    })
                    .collect::<Result<Vec<f64>, MlError>>()?;
                Ok(TrialRecord {
                    family: family.name.to_string(),
                    algorithm: *algorithm,
                    cv: CrossValidationResult::from_scores(scores, score_name(task)),
                })
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        let mut best_trial = 0;
        for (i, trial) in family_trials.iter().enumerate() {
            debug!(
                family = family.name,
                params = %serde_json::to_string(&trial.algorithm).unwrap_or_default(),
                cv_score = trial.cv.mean_score,
                "grid trial scored"
            );
            if trial.cv.mean_score > family_trials[best_trial].cv.mean_score {
                best_trial = i;
            }
        }

        let chosen = family_trials[best_trial].algorithm;
        let model = chosen.fit(data.x_train, data.y_train, seed)?;
        let train_score = score_of(task, &model, data.x_train, data.y_train);
        let test_score = score_of(task, &model, data.x_test, data.y_test);
        debug!(
            family = family.name,
            train_score, test_score, "family winner refit"
        );

        reports.push(FamilyReport {
            family: family.name.to_string(),
            algorithm: chosen,
            cv_score: family_trials[best_trial].cv.mean_score,
            train_score,
            test_score,
        });
        models.push(model);
        trials.extend(family_trials);
    }

    let mut best = 0;
    for (i, report) in reports.iter().enumerate() {
        if report.test_score > reports[best].test_score {
            best = i;
        }
    }

    Ok(SearchReport {
        trials,
        families: reports,
        models,
        best,
    })
}

fn score_of(task: TaskKind, model: &FittedModel, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let pred = model.predict(x);
    metrics::score(task, &y.to_vec(), &pred.to_vec())
}

fn score_name(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Classification => "f1",
        TaskKind::Regression => "r2",
    }
}
