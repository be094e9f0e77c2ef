use std::fs;
use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use grove_hash::{Hasher, ObjectId};
use grove_object::{header, Object, ObjectType};

use crate::{LooseError, LooseStore};

/// Longest header we accept: `commit ` plus a 20-digit size and the NUL.
const MAX_HEADER: usize = 32;

impl LooseStore {
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    fn open(&self, oid: &ObjectId) -> Result<Option<fs::File>, LooseError> {
        match fs::File::open(self.object_path(oid)) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Inflated `header + content`, or `None` when the file does not exist.
    fn inflate(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        let Some(file) = self.open(oid)? else {
            return Ok(None);
        };
        let mut out = Vec::new();
        ZlibDecoder::new(io::BufReader::new(file))
            .read_to_end(&mut out)
            .map_err(|e| LooseError::Corrupt {
                oid: *oid,
                reason: format!("zlib: {e}"),
            })?;
        Ok(Some(out))
    }

    fn split(oid: &ObjectId, data: Vec<u8>) -> Result<(ObjectType, Vec<u8>), LooseError> {
        let (kind, size, header_len) = header::parse_header(&data)?;
        if data.len() - header_len != size {
            return Err(LooseError::Corrupt {
                oid: *oid,
                reason: format!("header size {size}, content {}", data.len() - header_len),
            });
        }
        Ok((kind, data[header_len..].to_vec()))
    }

    /// Type and content bytes without parsing the content.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        match self.inflate(oid)? {
            Some(data) => Ok(Some(Self::split(oid, data)?)),
            None => Ok(None),
        }
    }

    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, LooseError> {
        match self.read_raw(oid)? {
            Some((kind, content)) => Ok(Some(Object::parse_content(kind, &content, self.algo)?)),
            None => Ok(None),
        }
    }

    /// Like [`read`](Self::read) but rehashes the bytes and fails on mismatch.
    pub fn read_verified(&self, oid: &ObjectId) -> Result<Option<Object>, LooseError> {
        let Some(data) = self.inflate(oid)? else {
            return Ok(None);
        };
        let actual = Hasher::digest(self.algo, &data)?;
        if actual != *oid {
            return Err(LooseError::HashMismatch { oid: *oid, actual });
        }
        let (kind, content) = Self::split(oid, data)?;
        Ok(Some(Object::parse_content(kind, &content, self.algo)?))
    }

    /// Type and size, inflating only as far as the header.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, LooseError> {
        let Some(file) = self.open(oid)? else {
            return Ok(None);
        };
        let mut decoder = ZlibDecoder::new(io::BufReader::new(file));
        let mut buf = [0u8; MAX_HEADER];
        let mut filled = 0;
        while !buf[..filled].contains(&0) {
            if filled == buf.len() {
                return Err(LooseError::Corrupt {
                    oid: *oid,
                    reason: "header too long".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|e| LooseError::Corrupt {
                    oid: *oid,
                    reason: format!("zlib: {e}"),
                })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: *oid,
                    reason: "stream ended inside header".into(),
                });
            }
            filled += n;
        }
        let (kind, size, _) = header::parse_header(&buf[..filled])?;
        Ok(Some((kind, size)))
    }
}
