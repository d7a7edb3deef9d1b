//! Artifact fingerprinting and upload diffing
//!
//! Every file of the artifact is hashed with SHA-256. The platform is asked
//! which of those contents it already holds; only the rest is sent.

use ferry_platform::{FileFingerprint, UploadRequest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Error while reading an artifact
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ArtifactError {
    #[error("failed to walk {path}: {message}")]
    WalkDir { path: String, message: String },

    #[error("failed to read file {path}: {message}")]
    ReadFile { path: String, message: String },
}

/// Fingerprint every regular file under `path`.
///
/// A directory yields one entry per file, ordered by path and named
/// relative to the directory. A single file (an archive) yields one entry
/// named after the file.
pub fn fingerprint_artifact(path: &Path) -> Result<Vec<FileFingerprint>, ArtifactError> {
    let metadata = fs::metadata(path).map_err(|e| ArtifactError::ReadFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if metadata.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![fingerprint_file(path, name)?]);
    }

    let mut fingerprints = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| ArtifactError::WalkDir {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        fingerprints.push(fingerprint_file(entry.path(), relative)?);
    }

    fingerprints.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(fingerprints)
}

fn fingerprint_file(path: &Path, name: String) -> Result<FileFingerprint, ArtifactError> {
    let read_error = |e: std::io::Error| ArtifactError::ReadFile {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut file = fs::File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;

    loop {
        let read = file.read(&mut buffer).map_err(read_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok(FileFingerprint {
        path: name,
        sha256: format!("{:x}", hasher.finalize()),
        size,
    })
}

/// Split `all` into files the platform already holds and files to send.
///
/// The upload is built even when nothing is left to send; issuing it
/// finalizes the application bits.
pub fn upload_request(
    bits: &Path,
    all: Vec<FileFingerprint>,
    known: &[FileFingerprint],
) -> UploadRequest {
    let known: HashSet<&str> = known.iter().map(|f| f.sha256.as_str()).collect();
    let (matched, files): (Vec<_>, Vec<_>) = all
        .into_iter()
        .partition(|f| known.contains(f.sha256.as_str()));

    UploadRequest {
        bits: Some(bits.to_path_buf()),
        matched,
        files,
    }
}
