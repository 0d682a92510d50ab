// Public fallible APIs in this crate share one concrete error contract (`VantageError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub(crate) mod cache;
pub mod config;
pub mod error;
pub mod externals;
pub mod index;
pub mod key;
pub mod model;
pub mod registry;
pub mod reports;
pub mod result;
pub mod serialize;
pub mod status;
pub mod store;
pub mod table;
pub(crate) mod text;

pub use config::FORMAT_VERSION;
pub use error::{Result, VantageError};
pub use externals::{ExternalMap, ExternalValue};
pub use index::{IndexHeader, IndexRepair, ReportInfo, RunEntry};
pub use model::{Block, ElementAddr, Link, Report, ReportBuilder, ReportElement, Section};
pub use registry::{ResultRegistry, VariantCodec};
pub use reports::{Catalog, CatalogEntry, read_report};
pub use result::{
    ChartResult, ImageResult, PlotResult, ReportResult, StaticResult, TableResult, TextResult,
};
pub use serialize::ReadContext;
pub use status::Status;
pub use store::{FsStore, KeyValueStore, MemoryStore};
pub use table::{Cell, Table};
