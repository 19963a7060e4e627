use std::path::{Path, PathBuf};

use crate::scheduler::Job;

/// One file or directory picked up from the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    pub name: String,
    /// Absolute or caller-relative location on the local filesystem.
    pub full_path: PathBuf,
    /// Location relative to the upload destination, starting with the root's name.
    pub relative_path: PathBuf,
    pub is_root: bool,
    pub is_file: bool,
    /// Number of direct children, for directories.
    pub entries_in_folder: Option<usize>,
    /// Size in bytes, for files.
    pub size: Option<u64>,
}

/// Walk `root` and turn it into upload jobs.
///
/// Directories become Blocking jobs and files Non-blocking ones. The returned
/// list is ordered for the pending stack: popping from the end visits the tree
/// in pre-order, so a directory is always dispatched before anything inside it.
/// Symlinks are skipped.
pub async fn collect_jobs(root: &Path) -> std::io::Result<Vec<Job<UploadEntry>>> {
    let metadata = tokio::fs::metadata(root).await?;
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned());

    let mut ordered = Vec::new();
    let mut stack = vec![(
        root.to_path_buf(),
        PathBuf::from(&name),
        name,
        metadata.is_file(),
        true,
    )];

    while let Some((full_path, relative_path, name, is_file, is_root)) = stack.pop() {
        if is_file {
            let size = tokio::fs::metadata(&full_path).await?.len();
            ordered.push(Job::non_blocking(UploadEntry {
                name,
                full_path,
                relative_path,
                is_root,
                is_file: true,
                entries_in_folder: None,
                size: Some(size),
            }));
            continue;
        }

        let mut children = Vec::new();
        let mut dir = tokio::fs::read_dir(&full_path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                tracing::debug!(path = %entry.path().display(), "Skipping symlink");
                continue;
            }
            let child_name = entry.file_name().to_string_lossy().into_owned();
            children.push((
                entry.path(),
                relative_path.join(&child_name),
                child_name,
                file_type.is_file(),
            ));
        }
        children.sort_by(|a, b| a.2.cmp(&b.2));

        ordered.push(Job::blocking(UploadEntry {
            name,
            full_path,
            relative_path,
            is_root,
            is_file: false,
            entries_in_folder: Some(children.len()),
            size: None,
        }));

        // Reverse so the alphabetically first child is visited next.
        for (path, relative, child_name, child_is_file) in children.into_iter().rev() {
            stack.push((path, relative, child_name, child_is_file, false));
        }
    }

    ordered.reverse();
    tracing::debug!(jobs = ordered.len(), root = %root.display(), "Collected upload jobs");
    Ok(ordered)
}
