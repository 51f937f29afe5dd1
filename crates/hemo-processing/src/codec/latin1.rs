//! ISO-8859-1 text conversion.
//!
//! Every byte maps to the code point of the same value, so decoding never
//! fails. Encoding replaces characters above U+00FF with `?`.

const REPLACEMENT: u8 = b'?';
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode ISO-8859-1 bytes into a string.
///
/// A leading UTF-8 byte-order mark is dropped, since some mirrors of the
/// dataset prepend one.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a string as ISO-8859-1 bytes.
pub fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accented_bytes() {
        // "ÓBITO" with Ó as 0xD3
        let bytes = [0xD3, b'B', b'I', b'T', b'O'];
        assert_eq!(decode(&bytes), "ÓBITO");
    }

    #[test]
    fn test_encode_matches_decode() {
        let text = "Reação febril não hemolítica";
        assert_eq!(decode(&encode(text)), text);
    }

    #[test]
    fn test_encode_replaces_unmappable() {
        assert_eq!(encode("a€b"), b"a?b".to_vec());
    }

    #[test]
    fn test_decode_strips_bom() {
        assert_eq!(decode(&[0xEF, 0xBB, 0xBF, b'U', b'F']), "UF");
    }
}
