use std::{
    env,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use eyre::Result;

/// Convert a long path to a short path relative to the working directory.
///
/// ```no_run
/// use cobolt_common::utils::io::file::short_path;
///
/// let path = "/some/long/path/that/is/cwd/report.html";
/// let short_path = short_path(path);
/// assert_eq!(short_path, "./report.html");
/// ```
pub fn short_path(path: &str) -> String {
    match env::current_dir() {
        Ok(dir) => path.replace(&dir.into_os_string().into_string().unwrap_or_default(), "."),
        Err(_) => path.to_owned(),
    }
}

/// Write contents to a file on disk, creating parent directories as needed.
///
/// ```no_run
/// use cobolt_common::utils::io::file::write_file;
///
/// let result = write_file("/tmp/out/report.html", "<html></html>");
/// ```
pub fn write_file(path_str: &str, contents: &str) -> Result<()> {
    let path = Path::new(path_str);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;

    Ok(())
}

/// Read a file on disk into a `String`. Sources that are not valid UTF-8
/// are decoded as Latin-1, which covers the encodings legacy COBOL
/// listings actually ship in.
///
/// ```no_run
/// use cobolt_common::utils::io::file::read_source_file;
///
/// let contents = read_source_file("payroll.cbl");
/// ```
pub fn read_source_file(path_str: &str) -> Result<String> {
    let path = Path::new(path_str);
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        // Latin-1 maps every byte to the code point of the same value.
        Err(err) => err.as_bytes().iter().map(|&b| b as char).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = std::env::temp_dir().join("cobolt-file-tests");
        let path = dir.join("roundtrip.txt");
        let path_str = path.to_str().expect("temp path is valid utf-8");

        write_file(path_str, "move 'x' to a.\n").expect("write succeeds");
        let contents = read_source_file(path_str).expect("read succeeds");
        assert_eq!(contents, "move 'x' to a.\n");
    }

    #[test]
    fn test_read_latin1_fallback() {
        let dir = std::env::temp_dir().join("cobolt-file-tests");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("latin1.cbl");
        std::fs::write(&path, [b'm', b'o', b'v', b'e', b' ', 0xe9_u8]).expect("write bytes");

        let contents =
            read_source_file(path.to_str().expect("temp path is valid utf-8")).expect("read");
        assert_eq!(contents, "move \u{e9}");
    }
}
