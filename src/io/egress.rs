//! Visit egress - writes closed visits to file
//!
//! Visits are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::visit::Visit;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for visits
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a visit to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_visit(&self, visit: &Visit, site_id: &str) -> bool {
        let json = visit.to_json_with_site(site_id);

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    vid = %visit.vid,
                    place = %visit.place,
                    outcome = %visit.outcome.as_str(),
                    dwell_ms = %visit.dwell_ms,
                    "visit_egressed"
                );
                true
            }
            Err(e) => {
                error!(
                    vid = %visit.vid,
                    place = %visit.place,
                    error = %e,
                    "visit_egress_failed"
                );
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
