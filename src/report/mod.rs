//! Result aggregation, progress reporting and failure collection.

pub mod collect;
pub mod progress;
pub mod result;

pub use collect::{collect_failures, collect_file, write_collected, CollectError};
pub use progress::{ConsoleProgress, JsonProgress, NullProgress, ProgressEvent, ProgressReporter};
pub use result::{
    read_rerun_list, signal_name, write_rerun_list, ExecutionResult, RerunError, RunReport,
    RunStatus,
};
