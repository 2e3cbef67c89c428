//! Atomic file publication.
//!
//! Writers never expose partial files: bytes land in a temp file inside the
//! destination directory and are renamed into place.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn write_atomic_bytes(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", dest.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", dest.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {}", dest.display()))?;
    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

pub fn write_atomic_text(dest: &Path, text: &str) -> Result<()> {
    write_atomic_bytes(dest, text.as_bytes())
}

pub fn write_atomic_json<T: serde::Serialize>(dest: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serialize JSON artifact")?;
    write_atomic_bytes(dest, &bytes)
}
