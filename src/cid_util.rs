//! Content identifiers
//!
//! Computes and validates the CIDs this node stores content under.
//!
//! ## Identifier layout
//!
//! ```text
//! 0x01  0x00  0x00 0x22  0x12 0x20 <32-byte sha2-256 digest>
//! ver   codec identity   sha2-256 multihash
//!             multihash
//! ```
//!
//! The SHA2-256 multihash of the content is wrapped in an identity multihash and
//! then in a CIDv1, rendered base32-lower (`baeaaaiq...`, 62 chars). Every CID
//! already stored on the network has this shape, so it must not change.
//!
//! Legacy `Qm...` identifiers were not derived from a plain hash of the bytes and
//! can never be reproduced here. [`validate_cid`] always rejects them; callers
//! that accept legacy content check [`is_legacy_cid`] first.

use crate::error::NodeError;
use cid::multihash::Multihash;
use cid::Cid;
use multihash_codetable::Code;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use std::str::FromStr;

/// Multicodec for the identity hash (digest stored inline)
const IDENTITY: u64 = 0x00;

/// Content codec tag written into every CID this node computes
const CODEC: u64 = 0x00;

/// Length of a legacy (CIDv0) identifier
pub const LEGACY_CID_LEN: usize = 46;

/// Prefix of every legacy identifier
pub const LEGACY_CID_PREFIX: &str = "Qm";

/// Compute the CID of everything readable from `reader`.
///
/// Hashing is single-pass and streaming. The reader is rewound to the start
/// afterwards; a failed rewind is ignored.
pub fn compute_file_cid<R: Read + Seek>(reader: &mut R) -> Result<String, NodeError> {
    let result = hash_stream(reader);
    let _ = reader.rewind();
    result
}

/// Open the file at `path` and compute its CID
pub fn compute_path_cid<P: AsRef<Path>>(path: P) -> Result<String, NodeError> {
    let mut file = File::open(path).map_err(NodeError::Input)?;
    compute_file_cid(&mut file)
}

/// Recompute the CID of `reader` and compare it to `expected`.
///
/// Note: any `Qm` CID fails here because its hash won't match the contents.
pub fn validate_cid<R: Read + Seek>(expected: &str, reader: &mut R) -> Result<(), NodeError> {
    let computed = compute_file_cid(reader)?;
    if computed != expected {
        return Err(NodeError::CidMismatch {
            expected: expected.to_string(),
            computed,
        });
    }
    Ok(())
}

/// Syntactic check for the legacy (CIDv0) scheme
pub fn is_legacy_cid(cid: &str) -> bool {
    cid.len() == LEGACY_CID_LEN && cid.starts_with(LEGACY_CID_PREFIX)
}

/// Parse an identifier with the standard CID decoder.
///
/// Used where an identifier arrives from outside and must at least be a
/// decodable CID before it names a file on disk.
pub fn parse_cid(cid: &str) -> Result<Cid, NodeError> {
    Cid::from_str(cid).map_err(|e| NodeError::MalformedCid(format!("{}: {}", cid, e)))
}

fn hash_stream<R: Read>(reader: &mut R) -> Result<String, NodeError> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher).map_err(NodeError::Input)?;
    let digest = hasher.finalize();

    let content_hash = Multihash::<64>::wrap(u64::from(Code::Sha2_256), &digest)
        .map_err(|e| NodeError::Encoding(e.to_string()))?;
    let wrapped = Multihash::<64>::wrap(IDENTITY, &content_hash.to_bytes())
        .map_err(|e| NodeError::Encoding(e.to_string()))?;

    Ok(Cid::new_v1(CODEC, wrapped).to_string())
}
