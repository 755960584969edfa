use std::borrow::Cow;
use std::convert::TryFrom;
use std::path::Path;

use encoding_rs::Encoding;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use httparse::Header;

use crate::constants;

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header]) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name)
            .map_err(|err| format!("invalid header name {:?}: {}", raw_header.name, err))?;

        let value = HeaderValue::from_bytes(trim_ascii_whitespace(raw_header.value))
            .map_err(|err| format!("invalid value for header {:?}: {}", raw_header.name, err))?;

        headers.append(name, value);
    }

    Ok(headers)
}

pub(crate) fn trim_ascii_whitespace(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }

    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }

    bytes
}

pub(crate) fn decode_text(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _, _) = encoding.decode(bytes);

    match text {
        Cow::Owned(s) => s,
        Cow::Borrowed(s) => String::from(s),
    }
}

/// Returns `.ext` when `file_name` ends with a short, plain extension.
pub(crate) fn file_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;

    let plain = !ext.is_empty()
        && ext.len() <= constants::MAX_EXTENSION_LEN
        && ext.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

    if plain {
        Some(format!(".{}", ext))
    } else {
        None
    }
}
