use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

const SECRET_FILE_MODE: u32 = 0o600;
const OUTPUT_DIR_MODE: u32 = 0o700;

/// Ensures the output directory exists and is private to the current user.
///
/// # Errors
/// Returns an error if the directory cannot be created or permissions cannot be set.
pub async fn ensure_output_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create output dir {}", path.display()))?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(OUTPUT_DIR_MODE))
        .await
        .with_context(|| format!("Failed to set output dir permissions: {}", path.display()))?;
    Ok(())
}

/// Replaces `path` with `contents`, readable only by the current user.
///
/// The data goes to a sibling temporary file that is renamed over `path`,
/// so readers never observe a partially written file.
///
/// # Errors
/// Returns an error if the temporary file cannot be written, its permissions
/// cannot be set, or the rename fails.
pub async fn write_private_file(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = temp_path(path)?;
    fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    let result = async {
        fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(SECRET_FILE_MODE))
            .await
            .with_context(|| format!("Failed to set permissions on {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))
    }
    .await;
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Output path has no file name: {}", path.display()))?;
    Ok(path.with_file_name(format!(".{file_name}.tmp")))
}
