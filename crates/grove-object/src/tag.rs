use bstr::{BString, ByteSlice};
use grove_hash::ObjectId;
use grove_utils::Signature;

use crate::fields::{write_field, Fields};
use crate::{ObjectError, ObjectType};

const SIGNATURE_MARKERS: [&[u8]; 2] = [
    b"-----BEGIN PGP SIGNATURE-----",
    b"-----BEGIN SSH SIGNATURE-----",
];

/// Annotated tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: ObjectId,
    pub target_type: ObjectType,
    pub name: BString,
    /// Very old tags were written without a tagger.
    pub tagger: Option<Signature>,
    pub message: BString,
    /// Trailing signature block, stored verbatim after the message.
    pub signature: Option<BString>,
}

impl Tag {
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut target = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        let mut fields = Fields::new(content);
        for (key, value) in fields.by_ref() {
            match key {
                b"object" => {
                    let text = std::str::from_utf8(&value)
                        .map_err(|_| ObjectError::InvalidHeader("tag target is not ASCII".into()))?;
                    target = Some(ObjectId::from_hex(text)?);
                }
                b"type" => target_type = Some(ObjectType::from_bytes(&value)?),
                b"tag" => name = Some(BString::from(value)),
                b"tagger" => tagger = Some(Signature::parse(value.as_bstr())?),
                _ => {}
            }
        }

        let rest = &content[fields.message_start()..];
        let split = SIGNATURE_MARKERS.iter().filter_map(|m| rest.find(m)).min();
        let (message, signature) = match split {
            Some(at) => (BString::from(&rest[..at]), Some(BString::from(&rest[at..]))),
            None => (BString::from(rest), None),
        };

        Ok(Self {
            target: target.ok_or(ObjectError::MissingTagField("object"))?,
            target_type: target_type.ok_or(ObjectError::MissingTagField("type"))?,
            name: name.ok_or(ObjectError::MissingTagField("tag"))?,
            tagger,
            message,
            signature,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160 + self.message.len());
        write_field(&mut out, b"object", self.target.to_hex().as_bytes());
        write_field(&mut out, b"type", self.target_type.as_bytes());
        write_field(&mut out, b"tag", &self.name);
        if let Some(t) = &self.tagger {
            write_field(&mut out, b"tagger", &t.to_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        if let Some(sig) = &self.signature {
            out.extend_from_slice(sig);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"object 95d09f2b10159347eece71399a7e2e907ea3df4f\n\
type commit\n\
tag v1.0\n\
tagger Rel Eng <rel@example.com> 1700000000 +0000\n\
\n\
First release\n"
            .to_vec()
    }

    #[test]
    fn parse_round_trip() {
        let data = sample();
        let tag = Tag::parse(&data).unwrap();
        assert_eq!(tag.name, "v1.0");
        assert_eq!(tag.target_type, ObjectType::Commit);
        assert_eq!(tag.message, "First release\n");
        assert!(tag.signature.is_none());
        assert_eq!(tag.encode(), data);
    }

    #[test]
    fn signature_split_off() {
        let mut data = sample();
        data.extend_from_slice(b"-----BEGIN PGP SIGNATURE-----\nxyz\n-----END PGP SIGNATURE-----\n");
        let tag = Tag::parse(&data).unwrap();
        assert_eq!(tag.message, "First release\n");
        assert!(tag.signature.as_ref().unwrap().starts_with(b"-----BEGIN PGP"));
        assert_eq!(tag.encode(), data);
    }

    #[test]
    fn tagger_is_optional() {
        let data = b"object 95d09f2b10159347eece71399a7e2e907ea3df4f\ntype blob\ntag old\n\nx";
        let tag = Tag::parse(data).unwrap();
        assert!(tag.tagger.is_none());
        assert_eq!(tag.target_type, ObjectType::Blob);
    }

    #[test]
    fn missing_target() {
        assert!(matches!(
            Tag::parse(b"type commit\ntag v\n\n"),
            Err(ObjectError::MissingTagField("object"))
        ));
    }
}
