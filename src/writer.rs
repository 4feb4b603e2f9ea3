//! Artifact writer
//!
//! Puts the generated program, the external-path manifest and the analysis
//! report into the output directory.

use crate::config::ConvertConfig;
use crate::core::converter::Conversion;
use crate::core::report::AnalysisReport;
use crate::error::ConvertResult;
use crate::excel::ReportWriter;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Paths of everything written for one conversion
#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub script: PathBuf,
    /// Only written when the workbook reads external files
    pub manifest: Option<PathBuf>,
    pub report_json: PathBuf,
    pub report_xlsx: Option<PathBuf>,
}

/// Write every artifact of a conversion into `out_dir`, creating it if needed
pub fn write_artifacts(
    out_dir: &Path,
    conversion: &Conversion,
    config: &ConvertConfig,
) -> ConvertResult<Artifacts> {
    fs::create_dir_all(out_dir)?;

    let script = out_dir.join(&config.script_name);
    fs::write(&script, &conversion.program)?;
    make_executable(&script)?;
    info!(path = %script.display(), "program written");

    let manifest = if conversion.manifest.is_empty() {
        None
    } else {
        let path = out_dir.join(&config.manifest_name);
        write_manifest(&path, &conversion.manifest)?;
        Some(path)
    };

    let (report_json, report_xlsx) = write_report(out_dir, &conversion.report, config)?;

    Ok(Artifacts {
        script,
        manifest,
        report_json,
        report_xlsx,
    })
}

/// Write the JSON report and, if configured, its workbook rendering
pub fn write_report(
    out_dir: &Path,
    report: &AnalysisReport,
    config: &ConvertConfig,
) -> ConvertResult<(PathBuf, Option<PathBuf>)> {
    fs::create_dir_all(out_dir)?;

    let json = out_dir.join(format!("{}.json", config.report_name));
    fs::write(&json, report.to_json()?)?;
    debug!(path = %json.display(), "report written");

    let xlsx = if config.write_report_xlsx {
        let path = out_dir.join(format!("{}.xlsx", config.report_name));
        ReportWriter::new(report).write(&path)?;
        Some(path)
    } else {
        None
    };
    Ok((json, xlsx))
}

/// Write the manifest, keeping paths already filled in for files still referenced
fn write_manifest(path: &Path, manifest: &BTreeMap<String, String>) -> ConvertResult<()> {
    let mut merged = manifest.clone();
    if path.exists() {
        match fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str::<BTreeMap<String, String>>(&s).ok())
        {
            Some(existing) => {
                for (file, location) in existing {
                    if let Some(slot) = merged.get_mut(&file) {
                        *slot = location;
                    }
                }
            }
            None => warn!(path = %path.display(), "existing manifest unreadable, overwriting"),
        }
    }
    fs::write(path, serde_json::to_string_pretty(&merged)? + "\n")?;
    info!(path = %path.display(), files = merged.len(), "manifest written");
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> ConvertResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> ConvertResult<()> {
    Ok(())
}
