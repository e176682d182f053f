//! Recursive file enumeration over a set of library roots.

use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use walkdir::WalkDir;

/// List every file below `roots`, as absolute paths.
///
/// Each root is traversed on the blocking pool in parallel; the result is only
/// returned once every traversal finished. Missing roots contribute nothing.
/// Ordering is unspecified.
pub async fn walk(roots: &[PathBuf], follow_links: bool) -> Vec<PathBuf> {
    let mut traversals = JoinSet::new();
    for root in roots {
        let root = root.clone();
        traversals.spawn_blocking(move || walk_root(&root, follow_links));
    }

    let mut files = Vec::new();
    while let Some(joined) = traversals.join_next().await {
        match joined {
            Ok(mut found) => files.append(&mut found),
            Err(e) => log::warn!("library traversal task failed: {e}"),
        }
    }
    files
}

fn walk_root(root: &Path, follow_links: bool) -> Vec<PathBuf> {
    if !root.exists() {
        log::warn!("skipping missing library root {}", root.display());
        return Vec::new();
    }

    WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file())
        .map(|path| std::path::absolute(&path).unwrap_or(path))
        .collect()
}
