//! `objects/info/alternates`: one object directory per line, `#` comments.
//!
//! Only one level is followed. An alternate's own alternates file is
//! ignored, which also rules out cycles.

use std::fs;
use std::path::{Path, PathBuf};

use grove_hash::HashAlgorithm;
use tracing::{debug, warn};

use crate::{ObjectDatabase, OdbError};

/// Object directories listed in `objects_dir`'s alternates file, relative
/// entries resolved against `objects_dir`.
pub(crate) fn read_list(objects_dir: &Path) -> Result<Vec<PathBuf>, OdbError> {
    let file = objects_dir.join("info").join("alternates");
    let content = match fs::read(&file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let content = String::from_utf8(content)
        .map_err(|_| OdbError::Alternates(format!("{} is not UTF-8", file.display())))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let path = Path::new(line);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                objects_dir.join(path)
            }
        })
        .collect())
}

pub(crate) fn load(objects_dir: &Path, algo: HashAlgorithm) -> Result<Vec<ObjectDatabase>, OdbError> {
    let own = objects_dir.canonicalize().ok();
    let mut dbs = Vec::new();
    for dir in read_list(objects_dir)? {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "alternate object directory does not exist");
            continue;
        }
        if own.is_some() && dir.canonicalize().ok() == own {
            return Err(OdbError::Alternates(format!(
                "{} lists itself as an alternate",
                dir.display()
            )));
        }
        debug!(path = %dir.display(), "loading alternate");
        dbs.push(ObjectDatabase::open_without_alternates(&dir, algo)?);
    }
    Ok(dbs)
}
