//! Export, restore, manifest, verification and error formatting.
//!
//! Two modes:
//! - **Human** (default): aligned key/value lines
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use ranchvault_archive::{ArchiveVerifyInfo, RanchSnapshotManifest};
use ranchvault_engine::{ExportReport, RestoreSummary};
use std::fmt::Write;
use std::path::Path;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Format an error, including its source chain.
pub fn format_error(err: &anyhow::Error, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&serde_json::json!({
            "error": format!("{:#}", err)
        }))
        .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", err)),
        OutputMode::Human => format!("(error) {:#}", err),
    }
}

/// Format a manifest for `inspect`.
pub fn format_manifest(manifest: &RanchSnapshotManifest, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(manifest)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "Format        v{} (engine {})",
                manifest.format_version, manifest.engine_version
            );
            let _ = writeln!(out, "Ranch         {}", manifest.ranch_id);
            let _ = writeln!(out, "Exported at   {}", manifest.exported_at.to_rfc3339());
            let _ = writeln!(out, "Records       {}", manifest.total_records());
            for (section, count) in &manifest.entity_counts {
                let _ = writeln!(out, "  {:<26}{}", section, count);
            }
            let _ = writeln!(
                out,
                "Media         {} files, {} bytes",
                manifest.media_checksums.len(),
                manifest.media_bytes()
            );
            let _ = write!(out, "Missing media {}", manifest.missing_media.len());
            for missing in &manifest.missing_media {
                let _ = write!(
                    out,
                    "\n  {} (photo {}): {}",
                    missing.path, missing.photo_id, missing.reason
                );
            }
            out
        }
    }
}

/// Format the result of `verify`.
pub fn format_verify(info: &ArchiveVerifyInfo, path: &Path, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(info)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => {
            let records: u64 = info.entity_counts.values().sum();
            format!(
                "OK {}\nRanch {}, format v{}: {} records, {} media files, {} missing",
                path.display(),
                info.ranch_id,
                info.format_version,
                records,
                info.media_count,
                info.missing_media_count
            )
        }
    }
}

/// Format the result of `export`.
pub fn format_export(report: &ExportReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&serde_json::json!({
            "path": report.handle.path.display().to_string(),
            "ranchId": report.ranch_id,
            "entityCounts": report.entity_counts,
            "mediaExported": report.media_exported,
            "mediaBytes": report.media_bytes,
            "missingMedia": report.missing_media,
            "danglingReferences": report.dangling_references,
            "bundleSizeBytes": report.bundle_size_bytes,
            "checksum": report.checksum,
        }))
        .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => {
            let records: u64 = report.entity_counts.values().sum();
            let mut out = format!(
                "Exported ranch {} to {}\n{} records, {} media files ({} bytes), {} bytes on disk",
                report.ranch_id,
                report.handle.path.display(),
                records,
                report.media_exported,
                report.media_bytes,
                report.bundle_size_bytes
            );
            for missing in &report.missing_media {
                let _ = write!(
                    out,
                    "\n  missing {} (photo {}): {}",
                    missing.path, missing.photo_id, missing.reason
                );
            }
            out
        }
    }
}

/// Format the result of `restore`.
pub fn format_restore(summary: &RestoreSummary, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(summary)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "Restored into ranch {} ({} mode)",
                summary.ranch_id, summary.mode
            );
            if summary.animals_deleted > 0 {
                let _ = writeln!(out, "Deleted       {}", summary.animals_deleted);
            }
            let _ = writeln!(
                out,
                "Animals       {} restored, {} skipped, {} updated",
                summary.animals_restored, summary.animals_skipped, summary.animals_updated
            );
            let _ = writeln!(out, "Medical       {}", summary.medical_restored);
            let _ = writeln!(out, "Custom fields {}", summary.custom_values_restored);
            let _ = writeln!(out, "Photos        {}", summary.photos_restored);
            let _ = write!(
                out,
                "Media         {} restored, {} failed",
                summary.media_restored, summary.media_failed
            );
            for failure in &summary.media_failures {
                let _ = write!(out, "\n  {}", failure);
            }
            out
        }
    }
}

/// Format the result of `config init`.
pub fn format_config_init(path: &Path, written: bool, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::json!({
            "path": path.display().to_string(),
            "written": written,
        })
        .to_string(),
        OutputMode::Human if written => format!("Wrote {}", path.display()),
        OutputMode::Human => format!("{} already exists; left unchanged", path.display()),
    }
}
