//! Windows security identifier decoding

use attrbridge_core::{CoreError, Result};
use std::fmt::Write;

/// Attribute carrying a binary security identifier
pub const OBJECT_SID: &str = "objectSid";

/// Decode a binary SID into `S-1-<authority>-<sub>-...`.
///
/// Layout: revision byte (must be 1), sub-authority count, 6-byte big-endian
/// authority, then little-endian 32-bit sub-authorities.
pub fn decode_sid(bytes: &[u8]) -> Result<String> {
    if bytes.len() < 8 {
        return Err(CoreError::decoding(format!(
            "SID too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0] != 1 {
        return Err(CoreError::decoding(format!(
            "SID revision must be 1, got {}",
            bytes[0]
        )));
    }

    let count = bytes[1] as usize;
    let expected = 8 + count * 4;
    if bytes.len() < expected {
        return Err(CoreError::decoding(format!(
            "SID declares {} sub-authorities but has {} bytes",
            count,
            bytes.len()
        )));
    }

    let authority = bytes[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = String::from("S-1-");
    if authority < (1u64 << 32) {
        let _ = write!(sid, "{}", authority);
    } else {
        let _ = write!(sid, "0x{:X}", authority);
    }

    for chunk in bytes[8..expected].chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let _ = write!(sid, "-{}", sub);
    }

    Ok(sid)
}

#[cfg(test)]
pub(crate) fn encode_sid(authority: u64, subs: &[u32]) -> Vec<u8> {
    let mut bytes = vec![1u8, subs.len() as u8];
    bytes.extend_from_slice(&authority.to_be_bytes()[2..8]);
    for sub in subs {
        bytes.extend_from_slice(&sub.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_domain_user_sid() {
        let bytes = encode_sid(5, &[21, 3623811015, 3361044348, 30300820, 1013]);
        assert_eq!(
            decode_sid(&bytes).unwrap(),
            "S-1-5-21-3623811015-3361044348-30300820-1013"
        );
    }

    #[test]
    fn test_decode_well_known_sid() {
        // S-1-5-32-544, BUILTIN\Administrators
        let bytes = [1, 2, 0, 0, 0, 0, 0, 5, 32, 0, 0, 0, 0x20, 0x02, 0, 0];
        assert_eq!(decode_sid(&bytes).unwrap(), "S-1-5-32-544");
    }

    #[test]
    fn test_large_authority_is_hex() {
        let bytes = encode_sid(0x1_0000_00AB, &[7]);
        assert_eq!(decode_sid(&bytes).unwrap(), "S-1-0x1000000AB-7");
    }

    #[test]
    fn test_rejects_bad_revision() {
        let mut bytes = encode_sid(5, &[21]);
        bytes[0] = 2;
        assert!(matches!(decode_sid(&bytes), Err(CoreError::Decoding(_))));
    }

    #[test]
    fn test_rejects_truncated() {
        let mut bytes = encode_sid(5, &[21, 22]);
        bytes.truncate(13);
        assert!(decode_sid(&bytes).is_err());
        assert!(decode_sid(&[1, 0, 0]).is_err());
    }
}
