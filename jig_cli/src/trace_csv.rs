//! CSV dump of a valve rotation's feedback samples.

use std::path::Path;

use jig_core::valve::RotationReport;

/// Header row written before the samples.
pub const HEADER: [&str; 2] = ["iteration", "reading"];

/// Write `iteration,reading` rows, one per polled sample.
pub fn write_trace(path: &Path, report: &RotationReport) -> eyre::Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(HEADER)?;
    for s in &report.samples {
        w.write_record([s.iteration.to_string(), s.reading.value().to_string()])?;
    }
    w.flush()?;
    tracing::debug!(path = %path.display(), rows = report.samples.len(), "rotation trace written");
    Ok(())
}
