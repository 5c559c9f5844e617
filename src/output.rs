use crate::errors::PipelineError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` next to `path` and rename it into place, so readers
/// never observe a half-written file and a failure leaves the old one intact.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PipelineError::write(path, e))?;
    }

    let tmp = temp_path(path);
    let written = fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(contents)?;
        f.sync_all()
    });
    if let Err(e) = written {
        warn!(path = %tmp.display(), error = %e, "failed to write temporary file");
        let _ = fs::remove_file(&tmp);
        return Err(PipelineError::write(path, e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        warn!(from = %tmp.display(), to = %path.display(), error = %e, "failed to swap file into place");
        let _ = fs::remove_file(&tmp);
        return Err(PipelineError::write(path, e));
    }
    Ok(())
}
