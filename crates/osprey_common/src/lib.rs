//! Shared foundation for the osprey scatter-gather workspace: error
//! taxonomy, cancellation signal, executor configuration, core query and
//! row types, and per-query log correlation.

pub mod cancel;
pub mod config;
pub mod error;
pub mod request_context;
pub mod types;

pub use cancel::CancelSignal;
pub use config::ExecutorConfig;
pub use error::{ErrorContext, ErrorKind, OspreyError, OspreyResult};
pub use request_context::{next_query_id, QueryContext};
pub use types::{PartitionId, PartitionQuery, QueryArg, Record};
