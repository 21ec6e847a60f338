//! Output path handling: results land next to the source file, or under
//! `--destdir` when given, named after the source file's stem.

use std::path::{Path, PathBuf};

/// The extensionless base path for a source's output files.
pub fn output_base(destdir: Option<&str>, source_path: &str) -> PathBuf {
    let path = Path::new(source_path);
    match destdir {
        Some(dir) => {
            let stem = path.file_stem().unwrap_or(path.as_os_str());
            Path::new(dir).join(stem)
        }
        None => path.with_extension(""),
    }
}
