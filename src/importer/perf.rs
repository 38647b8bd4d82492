//! Per-phase wall-clock accounting for the performance CSV.

use std::io::Write as _;
use std::path::Path;
use std::time::Instant;

/// Records how long each import phase took.
///
/// Starting a phase closes the previous one; [`PhaseTimer::finish`] closes
/// the last. Records append to the CSV as `<phase>,<milliseconds>` lines.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    records: Vec<(String, u128)>,
    current: Option<(String, Instant)>,
}

impl PhaseTimer {
    /// Creates an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a phase, closing the running one if any.
    pub fn start(&mut self, phase: &str) {
        self.finish();
        self.current = Some((phase.to_string(), Instant::now()));
    }

    /// Closes the running phase.
    pub fn finish(&mut self) {
        if let Some((phase, started)) = self.current.take() {
            let elapsed = started.elapsed().as_millis();
            tracing::debug!(phase = %phase, ms = elapsed, "phase complete");
            self.records.push((phase, elapsed));
        }
    }

    /// The recorded phases so far.
    pub fn records(&self) -> &[(String, u128)] {
        &self.records
    }

    /// Appends all records to `path`, one `<phase>,<milliseconds>` line each.
    pub fn append_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for (phase, millis) in &self.records {
            writeln!(file, "{phase},{millis}")?;
        }
        Ok(())
    }
}
