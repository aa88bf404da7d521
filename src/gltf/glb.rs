use log::{debug, warn};

use crate::error::{FormatError, FormatResult};

pub const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
pub const GLB_VERSION: u32 = 2;
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
pub const CHUNK_BIN: u32 = 0x004E_4942;

const HEADER_LENGTH: usize = 12;
const CHUNK_HEADER_LENGTH: usize = 8;

/// A parsed binary glTF container: the JSON document and the optional BIN chunk,
/// which stands in for buffer 0.
#[derive(Debug)]
pub struct Glb<'a> {
    pub version: u32,
    pub length: u32,
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

pub fn is_glb(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && read_u32(bytes, 0) == Some(GLB_MAGIC)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let word: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(word))
}

impl<'a> Glb<'a> {
    pub fn parse(bytes: &'a [u8]) -> FormatResult<Self> {
        if bytes.len() < HEADER_LENGTH {
            return Err(FormatError::TruncatedGlb("header"));
        }
        let magic = read_u32(bytes, 0).ok_or(FormatError::TruncatedGlb("header"))?;
        if magic != GLB_MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let version = read_u32(bytes, 4).ok_or(FormatError::TruncatedGlb("header"))?;
        if version != GLB_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let length = read_u32(bytes, 8).ok_or(FormatError::TruncatedGlb("header"))?;
        // Trailing bytes past the declared length are not part of the container.
        let body = bytes.get(..length as usize).ok_or(FormatError::TruncatedGlb("length"))?;

        let mut chunks = vec![];
        let mut offset = HEADER_LENGTH;
        while offset < body.len() {
            let chunk_length = read_u32(body, offset).ok_or(FormatError::TruncatedGlb("chunk header"))? as usize;
            let chunk_type = read_u32(body, offset + 4).ok_or(FormatError::TruncatedGlb("chunk header"))?;
            let start = offset + CHUNK_HEADER_LENGTH;
            let data = start
                .checked_add(chunk_length)
                .and_then(|end| body.get(start..end))
                .ok_or(FormatError::TruncatedGlb("chunk data"))?;
            debug!("glb chunk {} type {:#010x} at {} ({} bytes)", chunks.len(), chunk_type, start, chunk_length);
            chunks.push((chunk_type, data));
            offset = start + chunk_length;
        }

        let (json_type, json) = *chunks.first().ok_or(FormatError::TruncatedGlb("missing JSON chunk"))?;
        if json_type != CHUNK_JSON {
            return Err(FormatError::ChunkTypeMismatch { index: 0, expected: CHUNK_JSON, found: json_type });
        }
        let bin = match chunks.get(1) {
            Some(&(CHUNK_BIN, data)) => Some(data),
            Some(&(found, _)) => {
                return Err(FormatError::ChunkTypeMismatch { index: 1, expected: CHUNK_BIN, found })
            }
            None => None,
        };
        if chunks.len() > 2 {
            warn!("ignoring {} extra glb chunks", chunks.len() - 2);
        }

        Ok(Self { version, length, json, bin })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn build_glb(json: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
        let pad = |len: usize| (4 - len % 4) % 4;
        let mut json = json.to_vec();
        json.extend(std::iter::repeat(b' ').take(pad(json.len())));
        let mut out = vec![];
        out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        out.extend_from_slice(&GLB_VERSION.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
        out.extend_from_slice(&json);
        if let Some(bin) = bin {
            let mut bin = bin.to_vec();
            bin.extend(std::iter::repeat(0u8).take(pad(bin.len())));
            out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(&bin);
        }
        let total = out.len() as u32;
        out[8..12].copy_from_slice(&total.to_le_bytes());
        out
    }

    #[test]
    fn parses_json_and_bin_chunks() {
        let bytes = build_glb(br#"{"asset":{"version":"2.0"}}"#, Some(&[1, 2, 3, 4]));
        assert!(is_glb(&bytes));
        let glb = Glb::parse(&bytes).unwrap();
        assert_eq!(glb.version, 2);
        assert_eq!(glb.length as usize, bytes.len());
        assert!(glb.json.starts_with(b"{\"asset\""));
        assert_eq!(glb.bin, Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn bin_chunk_is_optional() {
        let bytes = build_glb(b"{}", None);
        assert!(Glb::parse(&bytes).unwrap().bin.is_none());
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = build_glb(b"{}", None);
        bytes[0] = b'x';
        assert!(matches!(Glb::parse(&bytes), Err(FormatError::BadMagic(_))));

        let mut bytes = build_glb(b"{}", None);
        bytes[4] = 1;
        assert!(matches!(Glb::parse(&bytes), Err(FormatError::UnsupportedVersion(1))));
    }

    #[test]
    fn rejects_chunk_type_mismatch() {
        let mut bytes = build_glb(b"{}", Some(&[0; 4]));
        // first chunk type lives at 16..20
        bytes[16..20].copy_from_slice(&CHUNK_BIN.to_le_bytes());
        assert!(matches!(
            Glb::parse(&bytes),
            Err(FormatError::ChunkTypeMismatch { index: 0, .. })
        ));

        let mut bytes = build_glb(b"{}", Some(&[0; 4]));
        // second chunk type: 12 header + 8 chunk header + 4 json bytes + 4 length
        bytes[28..32].copy_from_slice(&CHUNK_JSON.to_le_bytes());
        assert!(matches!(
            Glb::parse(&bytes),
            Err(FormatError::ChunkTypeMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(Glb::parse(b"glTF"), Err(FormatError::TruncatedGlb(_))));

        let mut bytes = build_glb(b"{}", Some(&[0; 8]));
        bytes.truncate(bytes.len() - 4);
        let total = bytes.len() as u32;
        bytes[8..12].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(Glb::parse(&bytes), Err(FormatError::TruncatedGlb("chunk data"))));

        // cut at the chunk boundary, header still declares the BIN chunk
        let mut bytes = build_glb(b"{}", Some(&[0; 8]));
        bytes.truncate(bytes.len() - 16);
        assert!(matches!(Glb::parse(&bytes), Err(FormatError::TruncatedGlb("length"))));
    }

    #[test]
    fn ignores_bytes_past_the_declared_length() {
        let mut bytes = build_glb(b"{}", Some(&[7; 4]));
        bytes.extend_from_slice(&[0xAB; 12]);
        assert_eq!(Glb::parse(&bytes).unwrap().bin, Some(&[7u8; 4][..]));
    }
}
