use std::fs;
use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use grove_hash::{Hasher, ObjectId};
use grove_object::{header, Object, ObjectType};
use tracing::{debug, trace};

use crate::{LooseError, LooseStore};

impl LooseStore {
    pub fn write(&self, object: &Object) -> Result<ObjectId, LooseError> {
        self.write_raw(object.object_type(), &object.encode())
    }

    /// Store `content` as an object of `kind`. Writing an object that already
    /// exists leaves the store untouched and returns the same id.
    pub fn write_raw(&self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, LooseError> {
        let head = header::write_header(kind, content.len());
        let mut hasher = Hasher::new(self.algo);
        hasher.update(&head);
        hasher.update(content);
        let oid = hasher.finalize()?;

        let target = self.object_path(&oid);
        if target.is_file() {
            trace!(%oid, "loose object already present");
            return Ok(oid);
        }
        let dir = match target.parent() {
            Some(d) => d,
            None => return Err(io::Error::other("object path has no parent").into()),
        };
        fs::create_dir_all(dir)?;

        let tmp = tempfile::Builder::new().prefix("tmp_obj_").tempfile_in(dir)?;
        let mut encoder = ZlibEncoder::new(tmp, self.compression);
        encoder.write_all(&head)?;
        encoder.write_all(content)?;
        let tmp = encoder.finish()?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o444))?;
        }

        match tmp.persist_noclobber(&target) {
            Ok(_) => debug!(%oid, %kind, size = content.len(), "wrote loose object"),
            // Another writer produced the same content first.
            Err(e) if target.is_file() => {
                trace!(%oid, "lost rename race to identical object");
                drop(e);
            }
            Err(e) => return Err(e.error.into()),
        }
        Ok(oid)
    }
}
