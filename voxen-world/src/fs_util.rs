//! Small filesystem helpers shared by the settings loader and the flat-file
//! database backend.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Suffix of the temporary file used by [`safe_write`].
pub const TMP_SUFFIX: &str = ".~mt";

/// Writes `contents` to `path` through a temporary sibling file followed by
/// an atomic rename, so a crash mid-write never leaves a half-written file
/// behind.
///
/// # Errors
/// Any I/O error of the underlying create/write/rename calls.
pub fn safe_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp_path = Path::new(&tmp_name);

    {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(contents)?;
        file.sync_data()?;
    }

    match fs::rename(tmp_path, path) {
        Ok(()) => Ok(()),
        Err(first_error) => {
            // on some platforms rename over an existing file needs the
            // target removed first; retry once that way
            if path.exists() {
                fs::remove_file(path)?;
                fs::rename(tmp_path, path)
            } else {
                Err(first_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_write_replaces_existing_content() {
        let dir = std::env::temp_dir().join("voxen_fs_util_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("target.txt");

        safe_write(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        safe_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        // the temporary must be gone afterwards
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        assert!(!Path::new(&tmp_name).exists(), "temp file left behind");

        fs::remove_dir_all(&dir).unwrap();
    }
}
