use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid progress template: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}

/// Expand command-line arguments into image paths. Files are kept as given,
/// even with unknown extensions; directories are walked recursively for
/// image files in file-name order.
pub fn collect_inputs(args: &[PathBuf], show_progress: bool) -> Result<Vec<PathBuf>, ScanError> {
    let mut inputs = Vec::new();
    for arg in args {
        if arg.is_dir() {
            inputs.extend(scan_directory(arg, show_progress)?);
        } else {
            inputs.push(arg.clone());
        }
    }
    Ok(inputs)
}

/// Recursively walk `dir`, returning image file paths sorted by file name
/// within each directory.
pub fn scan_directory(dir: &Path, show_progress: bool) -> Result<Vec<PathBuf>, ScanError> {
    let spinner = if show_progress {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Scanning {} for images…", dir.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: dir.to_string_lossy().to_string(),
            source,
        })?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            images.push(entry.into_path());
        }
        spinner.tick();
    }
    spinner.finish_and_clear();
    log::info!("Found {} images under {}", images.len(), dir.display());
    Ok(images)
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// One path per line. Trailing whitespace is trimmed and blank lines are
/// skipped. Lines are taken as raw bytes, so names that are not valid UTF-8
/// still reach the decoder (and fail there, on their own).
pub fn read_path_list<R: BufRead>(reader: R) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.split(b'\n') {
        let mut line = line?;
        let len = line.trim_ascii_end().len();
        line.truncate(len);
        if !line.is_empty() {
            paths.push(path_from_bytes(line));
        }
    }
    Ok(paths)
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_extension_filter() {
        assert!(has_image_extension(Path::new("a/b/photo.JPG")));
        assert!(has_image_extension(Path::new("scan.tiff")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("no_extension")));
    }

    #[test]
    fn test_scan_directory_recurses_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("nested")).unwrap();
        for name in ["b.png", "a.jpg", "readme.md", "nested/c.jpeg"] {
            fs::write(root.join(name), b"x").unwrap();
        }

        let found = scan_directory(root, false).unwrap();
        let relative: Vec<PathBuf> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            [
                PathBuf::from("a.jpg"),
                PathBuf::from("b.png"),
                PathBuf::from("nested/c.jpeg")
            ]
        );
    }

    #[test]
    fn test_collect_inputs_keeps_files_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("photos");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("x.png"), b"x").unwrap();

        let explicit = PathBuf::from("missing/file.raw");
        let inputs = collect_inputs(&[explicit.clone(), dir.clone()], false).unwrap();
        assert_eq!(inputs, [explicit, dir.join("x.png")]);
    }

    #[test]
    fn test_read_path_list_trims_and_skips_blank_lines() {
        let input = "first.jpg  \n\n  second dir/photo.png\t\r\n   \nlast.png";
        let paths = read_path_list(Cursor::new(input)).unwrap();
        assert_eq!(
            paths,
            [
                PathBuf::from("first.jpg"),
                PathBuf::from("  second dir/photo.png"),
                PathBuf::from("last.png")
            ]
        );
    }

    #[test]
    fn test_read_path_list_keeps_lines_that_are_not_utf8() {
        let input: &[u8] = b"good.jpg\n\xffbad\xfe.jpg\nlater.jpg\n";
        let paths = read_path_list(Cursor::new(input)).unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], PathBuf::from("good.jpg"));
        assert_eq!(paths[2], PathBuf::from("later.jpg"));

        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            assert_eq!(paths[1].as_os_str().as_bytes(), b"\xffbad\xfe.jpg");
        }
    }
}
