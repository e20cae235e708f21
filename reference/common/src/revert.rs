//! `Error(string)` revert data codec.
//!
//! Rollback failures carry their reason as ABI-encoded `Error(string)` bytes:
//! the 4-byte selector `0x08c379a0`, a 32-byte offset word, a 32-byte length
//! word and the UTF-8 payload right-padded to a multiple of 32 bytes.

/// Selector of `Error(string)`.
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;

fn word_from_usize(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn usize_from_word(word: &[u8]) -> Option<usize> {
    if word.len() != WORD || word[..WORD - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}

/// Encode a reason string as `Error(string)` revert data.
pub fn encode_error(reason: &str) -> Vec<u8> {
    let payload = reason.as_bytes();
    let padded_len = payload.len().div_ceil(WORD) * WORD;

    let mut out = Vec::with_capacity(4 + 2 * WORD + padded_len);
    out.extend_from_slice(&ERROR_SELECTOR);
    out.extend_from_slice(&word_from_usize(WORD));
    out.extend_from_slice(&word_from_usize(payload.len()));
    out.extend_from_slice(payload);
    out.resize(4 + 2 * WORD + padded_len, 0);
    out
}

/// Decode `Error(string)` revert data. Returns `None` for any other payload.
pub fn decode_error(data: &[u8]) -> Option<String> {
    if data.len() < 4 + 2 * WORD || data[..4] != ERROR_SELECTOR {
        return None;
    }
    let body = &data[4..];
    let len_start = usize_from_word(&body[..WORD])?;
    let start = len_start.checked_add(WORD)?;
    let len = usize_from_word(body.get(len_start..start)?)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Render revert data as `0x`-prefixed hex.
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_layout() {
        let data = encode_error("Only the delegate of the lock can refund it");
        assert!(to_hex(&data).starts_with("0x08c379a0"));
        // selector + offset + length + 43 bytes padded to 64
        assert_eq!(data.len(), 4 + 32 + 32 + 64);
        assert_eq!(data[4 + 31], 0x20);
        assert_eq!(data[4 + 32 + 31], 43);
    }

    #[test]
    fn test_decode_known_reason() {
        let reason = "Only the delegate of the lock can refund it";
        assert_eq!(decode_error(&encode_error(reason)).as_deref(), Some(reason));
    }

    #[test]
    fn test_empty_reason() {
        let data = encode_error("");
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(decode_error(&data).as_deref(), Some(""));
    }

    #[test]
    fn test_rejects_foreign_payloads() {
        assert_eq!(decode_error(&[]), None);
        assert_eq!(decode_error(&[0xde, 0xad, 0xbe, 0xef]), None);

        let mut data = encode_error("abc");
        data[0] = 0x4e;
        assert_eq!(decode_error(&data), None);

        let mut truncated = encode_error("a longer reason string here");
        truncated.truncate(4 + 64 + 3);
        assert_eq!(decode_error(&truncated), None);
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let mut data = ERROR_SELECTOR.to_vec();
        data.extend_from_slice(&[0; 24]);
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0; WORD]);
        assert_eq!(decode_error(&data), None);

        // a huge length is rejected the same way
        let mut data = encode_error("abc");
        data[4 + WORD + 24..4 + 2 * WORD].copy_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(decode_error(&data), None);
    }
}
