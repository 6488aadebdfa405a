use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::UpdateError;

/// Four-part firmware version encoded in an image filename.
///
/// Ordered lexicographically, major first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub revision: u32,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.revision
        )
    }
}

/// Parse a version out of an image filename stem.
///
/// The stem must split on `_` into exactly 7 non-empty tokens, with tokens
/// 3..=6 being the numeric major/minor/patch/revision fields. Anything else
/// is not a candidate.
fn parse_version(stem: &str) -> Option<FirmwareVersion> {
    let tokens: Vec<&str> =
        stem.split('_').filter(|t| !t.is_empty()).collect();
    if tokens.len() != 7 {
        return None;
    }
    Some(FirmwareVersion {
        major: tokens[3].parse().ok()?,
        minor: tokens[4].parse().ok()?,
        patch: tokens[5].parse().ok()?,
        revision: tokens[6].parse().ok()?,
    })
}

/// Pick the newest `.bin` firmware image in `dir`.
///
/// Scans immediate regular-file entries only. Files whose names do not carry
/// a parseable version are skipped, not errors. Returns `None` when the
/// directory is missing or holds no candidate. Exact duplicate versions
/// resolve by scan order (stable sort, last wins), which is not
/// deterministic across filesystems.
pub fn latest_firmware(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut candidates: Vec<(FirmwareVersion, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("bin")
        {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(version) = parse_version(stem) {
            candidates.push((version, path));
        }
    }
    candidates.sort_by_key(|(version, _)| *version);
    let (_, path) = candidates.pop()?;
    std::path::absolute(&path).ok().or(Some(path))
}

/// Firmware payload loaded once per run and shared read-only across all
/// flashing tasks.
#[derive(Clone)]
pub struct FirmwareImage {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl FirmwareImage {
    /// Read the image from disk. An empty file is a fatal precondition
    /// failure.
    pub fn load(path: &Path) -> Result<Self, UpdateError> {
        let bytes = fs::read(path).map_err(|source| {
            UpdateError::FirmwareRead {
                path: path.to_owned(),
                source,
            }
        })?;
        if bytes.is_empty() {
            return Err(UpdateError::EmptyFirmware(path.to_owned()));
        }
        Ok(FirmwareImage {
            path: path.to_owned(),
            bytes: bytes.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
