//! Filesystem helpers for release directories.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::manifest::SfvFile;

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

/// Regular files directly inside `directory`, sorted by path.
pub fn list_files(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(directory).with_context(|| format!("reading directory {}", directory.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn files_with_extension(directory: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    Ok(list_files(directory)?
        .into_iter()
        .filter(|p| has_extension(p, extension))
        .collect())
}

/// Every directory below `directory`, parents before children.
pub fn subdirectories(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = fs::read_dir(directory).with_context(|| format!("reading directory {}", directory.display()))?;
    let mut children: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    children.sort();
    for child in children {
        found.push(child.clone());
        found.extend(subdirectories(&child)?);
    }
    Ok(found)
}

/// Drop files whose extension is in `ignore` (case-insensitive, leading dot
/// optional).
pub fn without_ignored(files: Vec<PathBuf>, ignore: &[String]) -> Vec<PathBuf> {
    if ignore.is_empty() {
        return files;
    }
    files
        .into_iter()
        .filter(|path| {
            !ignore
                .iter()
                .any(|ext| has_extension(path, ext.trim_start_matches('.')))
        })
        .collect()
}

/// Move a file, replacing any existing destination. A missing source leaves
/// the destination alone.
pub fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if !from.is_file() {
        anyhow::bail!("cannot move {}: source is not a file", from.display());
    }
    if to.exists() {
        fs::remove_file(to).with_context(|| format!("replacing {}", to.display()))?;
    }
    if fs::rename(from, to).is_err() {
        fs::copy(from, to).with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        fs::remove_file(from).with_context(|| format!("removing {}", from.display()))?;
    }
    tracing::info!(from = %from.display(), to = %to.display(), "moved");
    Ok(())
}

/// Relocate every SFV manifest past the first, together with the files it
/// lists and the files named after it, into numbered sibling directories
/// `"<name> (<n>)"`. Returns the directories created.
pub fn split_multiple_releases(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let manifests = files_with_extension(directory, "sfv")?;
    if manifests.len() < 2 {
        return Ok(Vec::new());
    }
    let parent = directory
        .parent()
        .with_context(|| format!("{} has no parent directory", directory.display()))?;
    let name = directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut created = Vec::new();
    for (index, manifest) in manifests.iter().skip(1).enumerate() {
        let target = parent.join(format!("{name} ({index})"));
        fs::create_dir_all(&target).with_context(|| format!("creating {}", target.display()))?;

        let manifest_name = manifest.file_name().context("manifest without a file name")?;
        let moved_manifest = target.join(manifest_name);
        move_file(manifest, &moved_manifest)?;

        for entry in SfvFile::load(&moved_manifest)?.entries {
            let referenced = directory.join(&entry.file_name);
            if referenced.is_file() {
                move_file(&referenced, &target.join(&entry.file_name))?;
            }
        }

        let stem = manifest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        for file in list_files(directory)? {
            let Some(file_name) = file.file_name() else { continue };
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&stem) && file_name.contains('.') {
                move_file(&file, &target.join(file_name.as_ref()))?;
            }
        }

        tracing::info!(
            dir = %directory.display(),
            target = %target.display(),
            "relocated bundled release"
        );
        created.push(target);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(dir: &Path) -> Vec<String> {
        list_files(dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_split_multiple_releases() {
        let root = tempfile::tempdir().unwrap();
        let release = root.path().join("Bundle");
        fs::create_dir(&release).unwrap();
        fs::write(release.join("a.sfv"), "01 - One.mp3 AAAAAAAA\n").unwrap();
        fs::write(release.join("01 - One.mp3"), b"1").unwrap();
        fs::write(release.join("b.sfv"), "; second\n02 - Two.mp3 BBBBBBBB\n").unwrap();
        fs::write(release.join("02 - Two.mp3"), b"2").unwrap();
        fs::write(release.join("b.nfo"), b"info").unwrap();

        let created = split_multiple_releases(&release).unwrap();
        let sibling = root.path().join("Bundle (0)");
        assert_eq!(created, vec![sibling.clone()]);
        assert_eq!(names(&release), vec!["01 - One.mp3", "a.sfv"]);
        assert_eq!(names(&sibling), vec!["02 - Two.mp3", "b.nfo", "b.sfv"]);
    }

    #[test]
    fn test_single_manifest_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sfv"), "01.mp3 AAAAAAAA\n").unwrap();
        assert!(split_multiple_releases(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_move_file_with_missing_source_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        let to = dir.path().join("Inside Cover.jpg");
        fs::write(&to, b"moved").unwrap();
        assert!(move_file(&dir.path().join("gone.jpg"), &to).is_err());
        assert_eq!(fs::read(&to).unwrap(), b"moved");
    }

    #[test]
    fn test_move_file_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.jpg");
        let to = dir.path().join("b.jpg");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }

    #[test]
    fn test_without_ignored() {
        let files = vec![
            PathBuf::from("/a/01.mp3"),
            PathBuf::from("/a/info.NFO"),
            PathBuf::from("/a/log.txt"),
        ];
        let kept = without_ignored(files, &[".nfo".to_string(), "txt".to_string()]);
        assert_eq!(kept, vec![PathBuf::from("/a/01.mp3")]);
    }

    #[test]
    fn test_subdirectories_parents_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("CD1/Scans")).unwrap();
        fs::create_dir_all(dir.path().join("CD2")).unwrap();
        let subdirs = subdirectories(dir.path()).unwrap();
        assert_eq!(
            subdirs,
            vec![
                dir.path().join("CD1"),
                dir.path().join("CD1/Scans"),
                dir.path().join("CD2"),
            ]
        );
    }
}
