//! exrun - concurrent execution harness for example scripts
//!
//! This library provides functionality to:
//! - Discover entry-point scripts and tag the resources they need
//! - Decide which scripts run, and how many at once
//! - Run them as isolated child processes with captured output
//! - Record a structured main log and collect failures for reruns

pub mod cli;
pub mod config;
pub mod exec;
pub mod record;
pub mod report;
pub mod scan;
pub mod schedule;
