//! Tabular data: the in-memory batch, upstream sources and the declared schema.

pub mod batch;
pub mod schema;
pub mod source;

pub use batch::DataBatch;
pub use schema::DatasetSchema;
pub use source::{ApiSource, CsvSource, DataSource, DataSourceInfo, JsonlSource, source_from_config};
