//! Temp file + rename writes.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `path` through a sibling temp file so a failed write leaves the
/// previous file untouched.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path(path);
    let result = write_temp(&temp, write).and_then(|()| fs::rename(&temp, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    } else {
        debug!(path = %path.display(), "atomic write complete");
    }
    result
}

fn write_temp<F>(temp: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(temp)?);
    write(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
