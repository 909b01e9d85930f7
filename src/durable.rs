//! Crash-safe file writes shared by the checkpoint and cache stores.
//!
//! Whole-file state is written atomically (write-to-temp + fsync + rename)
//! so a crash leaves either the old or the new content. Logs are appended
//! one JSON line at a time and fsynced before returning.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Replace `path` with `contents` atomically.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .map_or_else(|| "state".into(), |n| n.to_string_lossy());
    let tmp_path = dir.join(format!(".{name}.tmp"));

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

/// Append `record` to the JSON-lines file at `path`, creating it if needed.
///
/// A torn final line left by a crash is cut off first, so the new record
/// starts on a line of its own.
pub(crate) fn append_json_line<T: Serialize>(path: &Path, record: &T) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let mut existing = Vec::new();
    file.read_to_end(&mut existing)?;
    if existing.last().is_some_and(|&b| b != b'\n') {
        let keep = existing.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        file.set_len(keep as u64)?;
    }
    file.write_all(&line)?;
    file.sync_all()
}

/// Read every record of a JSON-lines file. A missing file reads as empty.
///
/// A torn final line (from a crash mid-append) is ignored; a malformed line
/// anywhere else is an error.
pub(crate) fn read_json_lines<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let lines: Vec<String> = BufReader::new(file).lines().collect::<io::Result<_>>()?;
    let last = lines.len().saturating_sub(1);
    let mut records = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(_) if idx == last => break,
            Err(e) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}:{}: {e}", path.display(), idx + 1),
                ));
            }
        }
    }
    Ok(records)
}
