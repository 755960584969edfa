use std::collections::HashMap;

use bytes::BytesMut;
use encoding_rs::Encoding;
use percent_encoding::percent_decode;

use crate::helpers;

/// Streaming decoder for `application/x-www-form-urlencoded` bodies.
///
/// Only the pair currently being read is buffered; every complete
/// `key=value` pair is decoded and stored as soon as its `&` arrives.
#[derive(Debug)]
pub(crate) struct UrlEncodedDecoder {
    pair: BytesMut,
    limit: Option<u64>,
    encoding: &'static Encoding,
}

impl UrlEncodedDecoder {
    pub(crate) fn new(limit: Option<u64>, encoding: &'static Encoding) -> UrlEncodedDecoder {
        UrlEncodedDecoder {
            pair: BytesMut::new(),
            limit,
            encoding,
        }
    }

    pub(crate) fn feed(&mut self, chunk: &[u8], fields: &mut HashMap<String, String>) -> crate::Result<()> {
        let mut rest = chunk;

        while let Some(idx) = memchr::memchr(b'&', rest) {
            self.push(&rest[..idx])?;
            self.flush_pair(fields);
            rest = &rest[idx + 1..];
        }

        self.push(rest)
    }

    pub(crate) fn end(&mut self, fields: &mut HashMap<String, String>) {
        self.flush_pair(fields);
    }

    fn push(&mut self, bytes: &[u8]) -> crate::Result<()> {
        if let Some(limit) = self.limit {
            if self.pair.len() as u64 + bytes.len() as u64 > limit {
                let mut pending = self.pair.clone();
                pending.extend_from_slice(bytes);

                let key = match memchr::memchr(b'=', &pending) {
                    Some(idx) => &pending[..idx],
                    None => &pending[..],
                };

                return Err(crate::Error::FieldTooLarge {
                    field_name: decode_component(key, self.encoding),
                    limit,
                    bytes_parsed: 0,
                });
            }
        }

        self.pair.extend_from_slice(bytes);
        Ok(())
    }

    fn flush_pair(&mut self, fields: &mut HashMap<String, String>) {
        if self.pair.is_empty() {
            return;
        }

        let pair = self.pair.split();
        let (key, value) = match memchr::memchr(b'=', &pair) {
            Some(idx) => (&pair[..idx], &pair[idx + 1..]),
            None => (&pair[..], &[][..]),
        };

        let key = decode_component(key, self.encoding);
        let value = decode_component(value, self.encoding);

        trace!("urlencoded field '{}' decoded ({} bytes)", key, value.len());

        fields.insert(key, value);
    }
}

fn decode_component(raw: &[u8], encoding: &'static Encoding) -> String {
    let plus_as_space: Vec<u8> = raw.iter().map(|&b| if b == b'+' { b' ' } else { b }).collect();
    let bytes: Vec<u8> = percent_decode(&plus_as_space).collect();

    helpers::decode_text(encoding, &bytes)
}
