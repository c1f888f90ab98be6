//! Raw bytes → UTF-8, for txt/md and any unrecognised extension (§4.2).

use crate::decoder::TextDecoder;
use crate::error::{LoaderError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainBytesDecoder;

impl TextDecoder for PlainBytesDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LoaderError::Decode(format!("not valid utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_utf8() {
        let decoder = PlainBytesDecoder;
        assert_eq!(decoder.decode(b"hello").unwrap(), "hello");
    }

    #[test]
    fn rejects_invalid_utf8() {
        let decoder = PlainBytesDecoder;
        assert!(decoder.decode(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
