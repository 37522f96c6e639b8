use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::types::Artifact;

/// Media type by file extension; `application/octet-stream` when unknown.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "log" | "out" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "jsonl" | "ndjson" => "application/x-ndjson",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Hash every regular file under `run_dir` (recursively) into an [`Artifact`].
///
/// Blocking; call from `spawn_blocking`.
pub fn scan_artifacts(run_id: &str, run_dir: &Path) -> io::Result<Vec<Artifact>> {
    let mut out = Vec::new();
    if !run_dir.exists() {
        return Ok(out);
    }

    for entry in WalkDir::new(run_dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let meta = entry.metadata().map_err(io::Error::from)?;
        let created_at: DateTime<Utc> = meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        out.push(Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            media_type: media_type_for(path).to_string(),
            path: path.to_path_buf(),
            sha256: sha256_file(path)?,
            size_bytes: meta.len(),
            created_at,
        });
    }

    Ok(out)
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
