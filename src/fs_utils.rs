use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Every regular file below `root`, sorted by path.
///
/// Symlinks are not followed. A missing `root` yields an empty list.
pub async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    // Async recursion is not allowed without boxing; use an explicit stack.
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_files_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2023/11/Attachments")).unwrap();
        std::fs::write(root.join("2023/11/2023-11-14.md"), "x").unwrap();
        std::fs::write(root.join("2023/11/Attachments/a.jpg"), "x").unwrap();
        std::fs::write(root.join("notes.txt"), "x").unwrap();

        let files = collect_files(root).await.unwrap();
        let relative: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(
            relative,
            vec!["2023/11/2023-11-14.md", "2023/11/Attachments/a.jpg", "notes.txt"]
        );
    }

    #[tokio::test]
    async fn test_collect_files_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let files = collect_files(&dir.path().join("nope")).await.unwrap();
        assert!(files.is_empty());
    }
}
