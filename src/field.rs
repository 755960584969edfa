use bytes::BytesMut;
use encoding_rs::Encoding;

use crate::helpers;

/// Buffers the body of one text field and decodes it once the part ends.
#[derive(Debug)]
pub(crate) struct FieldAccumulator {
    name: String,
    buf: BytesMut,
    limit: Option<u64>,
    encoding: &'static Encoding,
}

impl FieldAccumulator {
    pub(crate) fn new(name: String, limit: Option<u64>, encoding: &'static Encoding) -> FieldAccumulator {
        FieldAccumulator {
            name,
            buf: BytesMut::new(),
            limit,
            encoding,
        }
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) -> crate::Result<()> {
        if let Some(limit) = self.limit {
            if self.buf.len() as u64 + bytes.len() as u64 > limit {
                return Err(crate::Error::FieldTooLarge {
                    field_name: self.name.clone(),
                    limit,
                    bytes_parsed: 0,
                });
            }
        }

        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Decodes the buffered bytes, yielding `(name, value)`.
    pub(crate) fn finish(self) -> (String, String) {
        let value = helpers::decode_text(self.encoding, &self.buf);
        (self.name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, UTF_8};

    #[test]
    fn test_accumulate_and_decode() {
        let mut field = FieldAccumulator::new("comments".to_owned(), None, UTF_8);
        field.append(b"foo ").unwrap();
        field.append(b"bar ").unwrap();
        field.append(b"baz").unwrap();

        assert_eq!(field.finish(), ("comments".to_owned(), "foo bar baz".to_owned()));
    }

    #[test]
    fn test_split_multibyte_sequence() {
        let text = "日本語のテキスト";
        let (encoded, _, _) = SHIFT_JIS.encode(text);

        let mut field = FieldAccumulator::new("jp".to_owned(), None, SHIFT_JIS);
        for byte in encoded.iter() {
            field.append(&[*byte]).unwrap();
        }

        assert_eq!(field.finish().1, text);
    }

    #[test]
    fn test_limit() {
        let mut field = FieldAccumulator::new("bio".to_owned(), Some(5), UTF_8);
        field.append(b"12345").unwrap();

        let err = field.append(b"6").unwrap_err();
        assert_eq!(
            err,
            crate::Error::FieldTooLarge {
                field_name: "bio".to_owned(),
                limit: 5,
                bytes_parsed: 0,
            }
        );
    }
}
