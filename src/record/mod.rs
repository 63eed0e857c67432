//! Output recording.
//!
//! Two independently locked sinks are shared by every worker:
//! - **Console**: script output blocks, live chunks and status lines
//! - **Main log**: one structured line per script

pub mod console;
pub mod main_log;

pub use console::ConsoleSink;
pub use main_log::{LineError, LogStatus, MainLog, MainLogLine};
