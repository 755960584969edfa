use bytes::{BufMut, Bytes, BytesMut};
use encoding_rs::Encoding;
use http::header::{self, HeaderMap};

use crate::constants;
use crate::content_disposition::ContentDisposition;
use crate::helpers;

/// Whether a part is a text field or an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PartKind {
    Field,
    File,
}

/// The classified headers of one multipart part.
#[derive(Debug, Clone)]
pub(crate) struct Part {
    name: String,
    file_name: Option<String>,
    content_type: String,
    headers: HeaderMap,
}

/// Why a part's header block was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HeaderError {
    MissingFieldName,
    Malformed(String),
}

impl Part {
    /// Parses the raw header lines of one part, without their line endings.
    ///
    /// Header values are decoded with `encoding`, which matters for
    /// non-ASCII field and file names.
    pub(crate) fn parse(lines: &[Bytes], encoding: &'static Encoding) -> Result<Part, HeaderError> {
        let mut block = BytesMut::with_capacity(lines.iter().map(|line| line.len() + 2).sum::<usize>() + 2);
        for line in lines {
            block.put_slice(line);
            block.put_slice(constants::CRLF.as_bytes());
        }
        block.put_slice(constants::CRLF.as_bytes());

        let mut raw_headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

        let headers = match httparse::parse_headers(&block, &mut raw_headers) {
            Ok(httparse::Status::Complete((_, raw_headers))) => {
                helpers::convert_raw_headers_to_header_map(raw_headers).map_err(HeaderError::Malformed)?
            }
            Ok(httparse::Status::Partial) => {
                return Err(HeaderError::Malformed("incomplete part headers".to_owned()));
            }
            Err(err) => return Err(HeaderError::Malformed(format!("failed to read part headers: {}", err))),
        };

        let content_disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .map(|val| helpers::decode_text(encoding, val.as_bytes()))
            .map(|val| ContentDisposition::parse(&val))
            .ok_or(HeaderError::MissingFieldName)?;

        let name = content_disposition.field_name.ok_or(HeaderError::MissingFieldName)?;
        let file_name = content_disposition.file_name;

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .map(|val| helpers::decode_text(encoding, val.as_bytes()))
            .unwrap_or_else(|| {
                if file_name.is_some() {
                    constants::DEFAULT_FILE_CONTENT_TYPE.to_owned()
                } else {
                    constants::DEFAULT_FIELD_CONTENT_TYPE.to_owned()
                }
            });

        Ok(Part {
            name,
            file_name,
            content_type,
            headers,
        })
    }

    /// The `name` parameter of `Content-Disposition`.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// The original file name; present, possibly empty, for file parts only.
    pub(crate) fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// The declared `Content-Type`, or the default for the part's kind.
    pub(crate) fn content_type(&self) -> &str {
        &self.content_type
    }

    /// All headers of the part, including ones not interpreted here.
    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn kind(&self) -> PartKind {
        if self.file_name.is_some() {
            PartKind::File
        } else {
            PartKind::Field
        }
    }

    /// The encoding named by the part's `charset` parameter, if known.
    pub(crate) fn charset(&self) -> Option<&'static Encoding> {
        let mime = self.content_type.parse::<mime::Mime>().ok()?;
        let charset = mime.get_param(mime::CHARSET)?;

        Encoding::for_label(charset.as_str().as_bytes())
    }
}
