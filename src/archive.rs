//! Report directory compression.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};

/// Compresses every file under `dir` into `<dir>.zip` and returns the archive path.
///
/// Entry names are relative to `dir` and use `/` separators. An existing
/// archive at the target path is overwritten.
pub fn compress_directory(dir: &Path) -> Result<PathBuf> {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".zip");
    let zip_path = PathBuf::from(name);

    let file = File::create(&zip_path).map_err(|e| BenchError::io(&zip_path, e))?;
    let mut zip = zip::ZipWriter::new(file);

    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let zip_error = |message: String| BenchError::Report {
        path: zip_path.clone(),
        message,
    };

    let mut added = 0usize;
    for entry in walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| zip_error(e.to_string()))?;
        let entry_name = relative
            .to_str()
            .ok_or_else(|| zip_error(format!("non UTF-8 path {}", relative.display())))?
            .replace('\\', "/");

        zip.start_file(entry_name.as_str(), options)
            .map_err(|e| zip_error(e.to_string()))?;
        let mut source = File::open(path).map_err(|e| BenchError::io(path, e))?;
        std::io::copy(&mut source, &mut zip).map_err(|e| BenchError::io(path, e))?;
        added += 1;
    }

    zip.finish().map_err(|e| zip_error(e.to_string()))?;
    tracing::debug!(archive = %zip_path.display(), files = added, "Report directory compressed");

    Ok(zip_path)
}
