use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Total byte size of a set of files and directories, counting each inode
/// once so hard-linked files do not inflate the total. Directories are
/// expanded recursively; symlinks are not followed.
pub fn total_size<P: AsRef<Path>>(paths: &[P]) -> io::Result<u64> {
    let mut inode_sizes: HashMap<(u64, u64), u64> = HashMap::new();
    for path in paths {
        visit(path.as_ref(), &mut inode_sizes)?;
    }
    Ok(inode_sizes.values().sum())
}

/// `total_size` reported in decimal gigabytes, for log lines.
pub fn total_size_gb<P: AsRef<Path>>(paths: &[P]) -> io::Result<f64> {
    Ok(total_size(paths)? as f64 / 1_000_000_000.0)
}

fn visit(path: &Path, inode_sizes: &mut HashMap<(u64, u64), u64>) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!("Skipping vanished path {}", path.display());
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            visit(&entry?.path(), inode_sizes)?;
        }
    } else if metadata.file_type().is_file() {
        // Keyed by (device, inode): hard links share both, so the last
        // writer wins and the size is only summed once.
        inode_sizes.insert((metadata.dev(), metadata.ino()), metadata.len());
    }

    Ok(())
}

/// Basenames of a directory's entries, sorted. Used by the staging
/// verification steps.
pub fn sorted_entry_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| {
            entry
                .ok()
                .map(|e| e.file_name().to_string_lossy().into_owned())
        })
        .collect();
    names.sort();
    Ok(names)
}

/// Expand a list of files and directories into the regular files beneath
/// them, without deduplication.
pub fn regular_files_under<P: AsRef<Path>>(paths: &[P]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        collect_files(path.as_ref(), &mut files)?;
    }
    Ok(files)
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            collect_files(&entry?.path(), files)?;
        }
    } else if metadata.file_type().is_file() {
        files.push(path.to_path_buf());
    }
    Ok(())
}
