//! Access to working-directory files, behind a trait so differs and tests
//! can run against a real directory or an in-memory map.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use bstr::{BStr, BString, ByteSlice};
use grove_index::StatData;
use grove_object::FileMode;

/// One file found in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkdirFile {
    /// `/`-separated, relative to the working directory root.
    pub path: BString,
    pub mode: FileMode,
    pub size: u64,
    /// `None` when the backing store has no stat information.
    pub stat: Option<StatData>,
}

pub trait Workdir: Send + Sync {
    /// File content; a symlink yields its target path.
    fn read_file(&self, path: &BStr) -> io::Result<Vec<u8>>;

    /// Create or replace `path`, creating parent directories.
    fn write_file(&self, path: &BStr, data: &[u8], mode: FileMode) -> io::Result<()>;

    /// Every file, sorted by path. The `.git` directory is never listed.
    fn list_files(&self) -> io::Result<Vec<WorkdirFile>>;
}

#[derive(Debug, Clone)]
pub struct FsWorkdir {
    root: PathBuf,
}

impl FsWorkdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &BStr) -> io::Result<PathBuf> {
        let relative = path
            .to_path()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("unrepresentable path {path}")))?;
        Ok(self.root.join(relative))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<WorkdirFile>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == ".git" {
                continue;
            }
            let rel = format!("{prefix}{name}");
            let meta = std::fs::symlink_metadata(entry.path())?;
            if meta.is_dir() {
                self.walk(&entry.path(), &format!("{rel}/"), out)?;
                continue;
            }
            out.push(WorkdirFile {
                path: BString::from(rel),
                mode: mode_of(&meta),
                size: meta.len(),
                stat: Some(StatData::from_metadata(&meta)),
            });
        }
        Ok(())
    }
}

fn mode_of(meta: &std::fs::Metadata) -> FileMode {
    if meta.file_type().is_symlink() {
        return FileMode::Symlink;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return FileMode::Executable;
        }
    }
    FileMode::Regular
}

impl Workdir for FsWorkdir {
    fn read_file(&self, path: &BStr) -> io::Result<Vec<u8>> {
        let full = self.full_path(path)?;
        let meta = std::fs::symlink_metadata(&full)?;
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&full)?;
            return Ok(target.to_string_lossy().into_owned().into_bytes());
        }
        std::fs::read(full)
    }

    fn write_file(&self, path: &BStr, data: &[u8], mode: FileMode) -> io::Result<()> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::symlink_metadata(&full).is_ok() {
            std::fs::remove_file(&full)?;
        }

        #[cfg(unix)]
        {
            if mode == FileMode::Symlink {
                let target = data
                    .to_path()
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "unrepresentable link target"))?;
                return std::os::unix::fs::symlink(target, &full);
            }
        }

        std::fs::write(&full, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let bits = if mode == FileMode::Executable { 0o755 } else { 0o644 };
            std::fs::set_permissions(&full, std::fs::Permissions::from_mode(bits))?;
        }
        Ok(())
    }

    fn list_files(&self) -> io::Result<Vec<WorkdirFile>> {
        let mut out = Vec::new();
        self.walk(&self.root, "", &mut out)?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }
}

/// A working directory held in memory.
#[derive(Debug, Default)]
pub struct MemoryWorkdir {
    files: Mutex<BTreeMap<BString, (Vec<u8>, FileMode)>>,
}

impl MemoryWorkdir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let map = files
            .into_iter()
            .map(|(path, data)| (BString::from(path), (data.to_vec(), FileMode::Regular)))
            .collect();
        Self {
            files: Mutex::new(map),
        }
    }

    pub fn remove_file(&self, path: &BStr) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }
}

impl Workdir for MemoryWorkdir {
    fn read_file(&self, path: &BStr) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such file")))
    }

    fn write_file(&self, path: &BStr, data: &[u8], mode: FileMode) -> io::Result<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), (data.to_vec(), mode));
        Ok(())
    }

    fn list_files(&self) -> io::Result<Vec<WorkdirFile>> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(files
            .iter()
            .map(|(path, (data, mode))| WorkdirFile {
                path: path.clone(),
                mode: *mode,
                size: data.len() as u64,
                stat: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_workdir_lists_and_skips_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let wd = FsWorkdir::new(dir.path());
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "x").unwrap();

        wd.write_file("src/lib.rs".into(), b"pub fn f() {}\n", FileMode::Regular).unwrap();
        wd.write_file("run.sh".into(), b"#!/bin/sh\n", FileMode::Executable).unwrap();
        wd.write_file("b.txt".into(), b"b", FileMode::Regular).unwrap();

        let files = wd.list_files().unwrap();
        let paths: Vec<String> = files.iter().map(|f| f.path.to_string()).collect();
        assert_eq!(paths, ["b.txt", "run.sh", "src/lib.rs"]);
        assert_eq!(wd.read_file("src/lib.rs".into()).unwrap(), b"pub fn f() {}\n");
        #[cfg(unix)]
        assert_eq!(files[1].mode, FileMode::Executable);
        assert!(files.iter().all(|f| f.stat.is_some()));
    }

    #[cfg(unix)]
    #[test]
    fn fs_workdir_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let wd = FsWorkdir::new(dir.path());
        wd.write_file("link".into(), b"target.txt", FileMode::Symlink).unwrap();
        assert_eq!(wd.read_file("link".into()).unwrap(), b"target.txt");
        assert_eq!(wd.list_files().unwrap()[0].mode, FileMode::Symlink);
    }

    #[test]
    fn memory_workdir() {
        let wd = MemoryWorkdir::with_files([("a", &b"1"[..]), ("b/c", &b"22"[..])]);
        assert_eq!(wd.list_files().unwrap()[1].size, 2);
        assert!(wd.remove_file("a".into()));
        let err = wd.read_file("a".into()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
