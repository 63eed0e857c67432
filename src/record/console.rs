//! Console sink shared by all workers.
//!
//! Every write acquires the sink's lock, so a buffered block, a status line
//! or a live chunk is never split by another worker.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded console writer.
pub struct ConsoleSink {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl ConsoleSink {
    /// Sink writing to stdout.
    pub fn stdout() -> Self {
        Self::with_output(std::io::stdout())
    }

    /// Sink writing to a custom output (for testing).
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        // A worker that panicked mid-write leaves at worst a short line.
        self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write one line.
    pub fn line(&self, line: &str) {
        let mut output = self.lock();
        let _ = writeln!(output, "{}", line);
        let _ = output.flush();
    }

    /// Write several lines as one uninterrupted block.
    pub fn lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut output = self.lock();
        for line in lines {
            let _ = writeln!(output, "{}", line.as_ref());
        }
        let _ = output.flush();
    }

    /// Flush a script's captured output as one contiguous block, every
    /// line prefixed with `[relpath] `.
    pub fn block(&self, relpath: &str, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let prefixed = prefix_lines(relpath, bytes, &mut true);
        let mut output = self.lock();
        let _ = output.write_all(&prefixed);
        if !prefixed.ends_with(b"\n") {
            let _ = output.write_all(b"\n");
        }
        let _ = output.flush();
    }

    /// Forward a chunk of live output. `at_line_start` carries the line
    /// state of this script's stream between chunks.
    pub fn live(&self, relpath: &str, chunk: &[u8], at_line_start: &mut bool) {
        if chunk.is_empty() {
            return;
        }
        let prefixed = prefix_lines(relpath, chunk, at_line_start);
        let mut output = self.lock();
        let _ = output.write_all(&prefixed);
        let _ = output.flush();
    }

    /// Terminate a live stream that did not end with a newline.
    pub fn finish_live(&self, at_line_start: &mut bool) {
        if !*at_line_start {
            let mut output = self.lock();
            let _ = output.write_all(b"\n");
            let _ = output.flush();
            *at_line_start = true;
        }
    }
}

/// Insert `[relpath] ` at every line start in `bytes`.
pub fn prefix_lines(relpath: &str, bytes: &[u8], at_line_start: &mut bool) -> Vec<u8> {
    let prefix = format!("[{}] ", relpath);
    let mut out = Vec::with_capacity(bytes.len() + prefix.len() * 2);
    for &byte in bytes {
        if *at_line_start {
            out.extend_from_slice(prefix.as_bytes());
            *at_line_start = false;
        }
        out.push(byte);
        if byte == b'\n' {
            *at_line_start = true;
        }
    }
    out
}
