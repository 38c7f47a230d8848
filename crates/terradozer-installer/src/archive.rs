//! Release archive verification and extraction

use crate::error::{InstallError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Check `data` against the registry's hex SHA-256
pub fn verify_sha256(filename: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(data));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(InstallError::ChecksumMismatch {
            filename: filename.to_string(),
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(())
}

/// Whether `file_name` is the plugin binary of provider `name`
pub fn is_provider_binary(file_name: &str, name: &str) -> bool {
    let prefix = format!("terraform-provider-{}", name);
    file_name == prefix
        || file_name.starts_with(&format!("{}_", prefix))
        || file_name == format!("{}.exe", prefix)
}

/// Extract every regular file of a zip archive into `dest` and return the
/// path of the provider binary among them.
pub fn extract_provider(data: &[u8], name: &str, dest: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest)?;
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut binary = None;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        // entries escaping the archive root are skipped
        let Some(file_name) = file
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        else {
            continue;
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let path = dest.join(&file_name);
        fs::write(&path, &contents)?;

        if is_provider_binary(&file_name, name) {
            make_executable(&path)?;
            binary = Some(path);
        }
    }

    binary.ok_or_else(|| InstallError::MissingBinary {
        provider: name.to_string(),
        dir: dest.to_path_buf(),
    })
}

/// Locate an already extracted provider binary in `dir`
pub fn find_provider_binary(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| is_provider_binary(n, name))
        })
}

pub(crate) fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut buffer = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buffer));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer
}
