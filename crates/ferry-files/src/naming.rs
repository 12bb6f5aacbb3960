//! Destination naming.
//!
//! Names come from the remote peer and are untrusted. Only a single plain
//! path component is ever joined onto the output directory.

use std::path::{Component, Path, PathBuf};

use crate::FileError;

/// Longest accepted file name in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Validate a file name received from a peer or taken from a local path.
pub fn sanitize_file_name(name: &str) -> Result<String, FileError> {
    let invalid = || FileError::InvalidName(name.to_string());

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid());
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(name.to_string()),
        _ => Err(invalid()),
    }
}

/// Pick a destination in `dir` that does not collide with an existing file:
/// `name.ext`, then `name (1).ext`, `name (2).ext`, ...
pub async fn unique_destination(dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let (stem, ext) = split_name(name);
    for i in 1u32.. {
        let candidate = dir.join(format!("{stem} ({i}){ext}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(std::io::Error::other("no free destination name"))
}

/// Split into stem and extension (with leading dot). Dotfiles keep their
/// full name as the stem.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}
