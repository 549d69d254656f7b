//! Download, harmonize and aggregate the MITMA open mobility datasets for
//! Spain (origin-destination trips, overnight stays and trip counts).

pub mod aggregate;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod model;
pub mod numeric;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod sources;
pub mod table;

pub use error::{MobilityError, Result};
pub use model::{Backend, DatasetVersion, MetricKind, Zones};
pub use pipeline::{MobilityPipeline, PipelineConfig, RunOptions, RunOutcome};
pub use table::{CanonicalTable, Cell};
