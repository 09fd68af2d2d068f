//! Archive validation and extraction.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::SyncError;

/// Zip local-file-header magic bytes.
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Check that a downloaded file starts with the zip local-file-header magic.
///
/// A failing check is [`SyncError::InvalidArchive`], distinct from network
/// errors, so callers can tell a corrupt payload from a failed transfer.
pub fn validate_zip_magic(path: &Path) -> Result<(), SyncError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    let n = file.read(&mut magic)?;
    if n < magic.len() || magic != ZIP_MAGIC {
        return Err(SyncError::InvalidArchive(format!(
            "{:?} does not start with a zip local file header",
            path
        )));
    }
    Ok(())
}

/// Extract a zip archive into `dest`, creating directories as needed.
///
/// Entries whose names escape the destination are skipped. Unix permission
/// bits are restored where the archive carries them.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(dest)?;

    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => continue,
        };

        if entry.name().ends_with('/') {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    debug!("extracted {:?} into {:?}", archive_path, dest);
    Ok(())
}

/// Un-nest a single wrapping directory.
///
/// Branch archives commonly wrap their content in one `<repo>-<branch>/`
/// root. When `dir` contains exactly one entry and it is a directory, its
/// contents are hoisted up one level and the wrapper removed. Returns
/// whether a hoist happened.
pub fn hoist_single_root(dir: &Path) -> Result<bool, SyncError> {
    let entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    let [only] = entries.as_slice() else {
        return Ok(false);
    };
    if !only.file_type()?.is_dir() {
        return Ok(false);
    }

    // Rename the wrapper aside first so a child sharing its name cannot
    // collide while moving up.
    let wrapper = dir.join(".hoist");
    std::fs::rename(only.path(), &wrapper)?;
    for child in std::fs::read_dir(&wrapper)? {
        let child = child?;
        std::fs::rename(child.path(), dir.join(child.file_name()))?;
    }
    std::fs::remove_dir(&wrapper)?;

    debug!("hoisted single wrapping directory in {:?}", dir);
    Ok(true)
}

/// Build an in-memory zip archive for tests.
#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }
    buf
}
