//! The four pipeline stages. Each consumes the previous stage's artifact and
//! returns its own; none of them know about the others.

pub mod ingestion;
pub mod trainer;
pub mod transformation;
pub mod validation;

pub use ingestion::DataIngestion;
pub use trainer::{ModelTrainer, TrainingOutcome};
pub use transformation::DataTransformation;
pub use validation::DataValidation;
