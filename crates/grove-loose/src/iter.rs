use std::fs;
use std::path::{Path, PathBuf};

use grove_hash::{ObjectId, OidPrefix};

use crate::{LooseError, LooseStore};

fn is_hex(name: &str) -> bool {
    name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Every object id in the loose store, fan-out directory by directory.
pub struct LooseOidIter {
    dirs: std::vec::IntoIter<(String, PathBuf)>,
    pending: std::vec::IntoIter<ObjectId>,
}

impl LooseOidIter {
    fn new(objects_dir: &Path) -> Result<Self, LooseError> {
        let mut dirs = Vec::new();
        match fs::read_dir(objects_dir) {
            Ok(rd) => {
                for entry in rd {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.len() == 2 && is_hex(&name) && entry.file_type()?.is_dir() {
                        dirs.push((name.to_ascii_lowercase(), entry.path()));
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        dirs.sort();
        Ok(Self {
            dirs: dirs.into_iter(),
            pending: Vec::new().into_iter(),
        })
    }
}

fn scan_fanout(prefix: &str, dir: &Path) -> Result<Vec<ObjectId>, LooseError> {
    let mut oids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !is_hex(&name) {
            continue;
        }
        if let Ok(oid) = ObjectId::from_hex(&format!("{prefix}{name}")) {
            oids.push(oid);
        }
    }
    oids.sort();
    Ok(oids)
}

impl Iterator for LooseOidIter {
    type Item = Result<ObjectId, LooseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(oid) = self.pending.next() {
                return Some(Ok(oid));
            }
            let (prefix, dir) = self.dirs.next()?;
            match scan_fanout(&prefix, &dir) {
                Ok(oids) => self.pending = oids.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl LooseStore {
    pub fn iter(&self) -> Result<LooseOidIter, LooseError> {
        LooseOidIter::new(&self.objects_dir)
    }

    /// Loose objects whose id starts with `prefix`. Only one fan-out
    /// directory is read.
    pub fn find_prefix(&self, prefix: &OidPrefix) -> Result<Vec<ObjectId>, LooseError> {
        let dir = self.objects_dir.join(prefix.fanout_dir());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        Ok(scan_fanout(prefix.fanout_dir(), &dir)?
            .into_iter()
            .filter(|oid| prefix.matches(oid))
            .collect())
    }
}
