//! One file per reference: `<hex>\n` or `ref: <name>\n`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use grove_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

pub(crate) fn path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

pub(crate) fn parse(name: &RefName, content: &[u8]) -> Result<Reference, RefError> {
    let content = content.trim_end();
    if let Some(target) = content.strip_prefix(b"ref:") {
        let target = target
            .trim()
            .to_str()
            .map_err(|_| RefError::parse("symbolic ref", format!("{name}: target is not UTF-8")))?;
        return Ok(Reference::Symbolic {
            name: name.clone(),
            target: RefName::new(target)?,
        });
    }
    let hex = content
        .to_str()
        .map_err(|_| RefError::parse("loose ref", format!("{name}: not UTF-8")))?;
    let oid = ObjectId::from_hex(hex)
        .map_err(|e| RefError::parse("loose ref", format!("{name}: {e}")))?;
    Ok(Reference::direct(name.clone(), oid))
}

/// `None` when no file exists (a directory of that name does not count).
pub(crate) fn read(git_dir: &Path, name: &RefName) -> Result<Option<Reference>, RefError> {
    let path = path(git_dir, name);
    match fs::read(&path) {
        Ok(content) => parse(name, &content).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(_) if path.is_dir() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn render(reference: &Reference) -> String {
    match reference {
        Reference::Direct { target, .. } => format!("{target}\n"),
        Reference::Symbolic { target, .. } => format!("ref: {target}\n"),
    }
}

/// Delete the file and any directories below `refs/<kind>/` it leaves empty.
/// Returns whether a file was removed.
pub(crate) fn remove(git_dir: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = path(git_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    }
    prune_empty_parents(git_dir, &path);
    Ok(true)
}

pub(crate) fn prune_empty_parents(git_dir: &Path, path: &Path) {
    let refs = git_dir.join("refs");
    let logs = git_dir.join("logs").join("refs");
    let mut dir = path.parent();
    while let Some(d) = dir {
        let top_level = [&refs, &logs].iter().any(|root| d == root.as_path() || d.parent() == Some(root.as_path()));
        if top_level || !d.starts_with(git_dir) || d == git_dir {
            break;
        }
        // Fails harmlessly when the directory still has entries.
        if fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

/// Whether `dir` holds at least one file other than a lock.
pub(crate) fn dir_has_refs(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        if path.is_dir() {
            dir_has_refs(&path)
        } else {
            !entry.file_name().to_string_lossy().ends_with(".lock")
        }
    })
}

/// Every loose reference under `refs/`, sorted by name.
pub(crate) fn enumerate(git_dir: &Path, prefix: Option<&str>) -> Result<Vec<RefName>, RefError> {
    let mut names = Vec::new();
    walk(git_dir, &git_dir.join("refs"), &mut names)?;
    if let Some(prefix) = prefix {
        names.retain(|n: &RefName| n.as_str().starts_with(prefix));
    }
    names.sort();
    Ok(names)
}

fn walk(git_dir: &Path, dir: &Path, out: &mut Vec<RefName>) -> Result<(), RefError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(git_dir, &path, out)?;
            continue;
        }
        let Ok(rel) = path.strip_prefix(git_dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        // Lock files and other debris fail validation and are skipped.
        if let Ok(name) = RefName::new(rel) {
            out.push(name);
        }
    }
    Ok(())
}
