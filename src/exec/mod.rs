//! Script execution.
//!
//! - **Process**: launcher, child lifetime and output capture for one script
//! - **Pool**: bounded concurrent execution of a whole run plan

pub mod pool;
pub mod process;

pub use pool::ExecutorPool;
pub use process::{classify_exit, ChildGuard, Launcher, ScriptRunner};
