//! Run planning.
//!
//! Decides, for every discovered script, whether it runs or is skipped and
//! why, and resolves how many scripts may run at once.
//!
//! # Example
//!
//! ```ignore
//! use exrun::schedule::{AutoSkipList, RunOverrides, Scheduler};
//!
//! let plan = Scheduler::new(RunOverrides::new(false), AutoSkipList::default())
//!     .with_jobs(4)
//!     .plan(entries);
//!
//! println!("{} to run with {} workers", plan.run_count(), plan.concurrency());
//! ```

pub mod plan;

pub use plan::*;
