//! Scan progress reporting.
//!
//! Listeners that render [`ScanListener`] callbacks for the CLI. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use upload_scout_core::batch::ScanListener;
use upload_scout_core::models::{ScanProgress, UploadArtifact};

/// Human-friendly progress on stderr: "scan ./a/b  12 / 1,340 directories".
pub struct StderrProgress;

impl ScanListener for StderrProgress {
    fn on_progress(&self, directory: &str, processed: usize, total: usize) {
        let line = format!(
            "scan {}  {} / {} directories\n",
            directory,
            format_number(processed as u64),
            format_number(total as u64)
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    fn on_batch_result(&self, artifacts: &[UploadArtifact]) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "scan  stored {} artifacts", artifacts.len());
        let _ = stderr.flush();
    }

    fn on_complete(&self) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "scan  done");
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn emit(obj: serde_json::Value) {
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

impl ScanListener for JsonProgress {
    fn on_progress(&self, directory: &str, processed: usize, total: usize) {
        let progress = ScanProgress {
            current_directory: directory.to_string(),
            processed,
            total,
        };
        Self::emit(serde_json::json!({
            "event": "progress",
            "progress": progress,
        }));
    }

    fn on_batch_result(&self, artifacts: &[UploadArtifact]) {
        Self::emit(serde_json::json!({
            "event": "batch",
            "artifacts": artifacts,
        }));
    }

    fn on_complete(&self) {
        Self::emit(serde_json::json!({ "event": "complete" }));
    }
}

/// No-op listener when progress is disabled.
pub struct NoProgress;

impl ScanListener for NoProgress {
    fn on_progress(&self, _directory: &str, _processed: usize, _total: usize) {}
    fn on_batch_result(&self, _artifacts: &[UploadArtifact]) {}
    fn on_complete(&self) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a listener for this mode.
    pub fn listener(&self) -> Box<dyn ScanListener> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
