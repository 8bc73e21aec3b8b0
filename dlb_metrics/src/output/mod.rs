//! Output dispatch: extension-based format selection, plus the "no file
//! configured" path that prints to the log sink.

pub mod csv;
pub mod json;
pub mod txt;
pub mod xml;

use crate::error::MetricsResult;
use crate::report::Report;
use std::path::Path;

/// Output format, selected by `talp-output-file`'s extension. An
/// unrecognised extension falls back to [`OutputFormat::Txt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `serde_json`-backed structured output.
    Json,
    /// Deprecated XML rendering, kept for backward compatibility.
    Xml,
    /// One or more `.csv` files, split by record kind.
    Csv,
    /// Human-readable plain text (also what an unconfigured output path
    /// prints to the log sink).
    Txt,
}

impl OutputFormat {
    /// Select a format from a file's extension; case-insensitive, and
    /// unknown or missing extensions resolve to [`OutputFormat::Txt`].
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            Some(ext) if ext.eq_ignore_ascii_case("xml") => OutputFormat::Xml,
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Txt,
        }
    }
}

/// Write `report` according to `path`.
///
/// `path == None` prints the human-readable rendering to the log sink via
/// `tracing::info!`, matching the original library's behaviour when
/// `talp-output-file` is unset. An unwritable path logs a warning and
/// falls back to the same log-sink rendering rather than propagating the
/// I/O error up to the caller's finalisation path.
pub fn write_report(report: &Report, path: Option<&Path>) -> MetricsResult<()> {
    let Some(path) = path else {
        log_report(report);
        return Ok(());
    };

    let result = match OutputFormat::from_path(path) {
        OutputFormat::Json => json::write(report, path),
        OutputFormat::Xml => xml::write(report, path),
        OutputFormat::Csv => csv::write(report, path),
        OutputFormat::Txt => txt::write(report, path),
    };

    if let Err(err) = &result {
        tracing::warn!(path = %path.display(), error = %err, "failed to write output file, falling back to log sink");
        log_report(report);
        return Ok(());
    }
    result
}

fn log_report(report: &Report) {
    for line in txt::render(report).lines() {
        tracing::info!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn from_path_is_case_insensitive() {
        assert_eq!(OutputFormat::from_path(&PathBuf::from("out.JSON")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(&PathBuf::from("out.Csv")), OutputFormat::Csv);
    }

    #[test]
    fn unknown_extension_falls_back_to_txt() {
        assert_eq!(OutputFormat::from_path(&PathBuf::from("out.bin")), OutputFormat::Txt);
        assert_eq!(OutputFormat::from_path(&PathBuf::from("out")), OutputFormat::Txt);
    }

    #[test]
    fn no_path_logs_without_error() {
        let report = Report::default();
        assert!(write_report(&report, None).is_ok());
    }
}
