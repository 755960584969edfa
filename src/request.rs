use std::sync::Arc;

use http::header::{self, HeaderMap};
use http::Method;

/// The kind of form body a `Content-Type` announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
    /// `multipart/form-data` with its boundary.
    Multipart { boundary: String },
    /// `application/x-www-form-urlencoded`.
    UrlEncoded,
}

impl FormKind {
    /// Parses a `Content-Type` header value.
    pub fn from_content_type<T: AsRef<str>>(content_type: T) -> crate::Result<FormKind> {
        let m = content_type
            .as_ref()
            .parse::<mime::Mime>()
            .map_err(|err| crate::Error::DecodeContentType(Arc::new(err)))?;

        if is_multipart(&m) {
            let boundary = m
                .get_param(mime::BOUNDARY)
                .map(|name| name.as_str().to_owned())
                .filter(|boundary| !boundary.is_empty())
                .ok_or(crate::Error::NoBoundary)?;

            Ok(FormKind::Multipart { boundary })
        } else if is_urlencoded(&m) {
            Ok(FormKind::UrlEncoded)
        } else {
            Err(crate::Error::NoMultipart)
        }
    }
}

fn is_multipart(m: &mime::Mime) -> bool {
    m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA
}

fn is_urlencoded(m: &mime::Mime) -> bool {
    m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED
}

/// Parses the `Content-Type` header to extract the boundary value.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    match FormKind::from_content_type(content_type)? {
        FormKind::Multipart { boundary } => Ok(boundary),
        FormKind::UrlEncoded => Err(crate::Error::NoMultipart),
    }
}

/// Decides whether a request carries a form body that still needs decoding.
///
/// True for `POST`, `PUT` and `PATCH` requests whose `Content-Type` is
/// `multipart/form-data` or `application/x-www-form-urlencoded`, unless an
/// earlier stage already parsed the body, in which case the request is
/// skipped rather than rejected.
///
/// # Examples
///
/// ```
/// use formbody::is_form_request;
/// use http::{header, HeaderMap, Method};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(header::CONTENT_TYPE, "multipart/form-data; boundary=X".parse().unwrap());
///
/// assert!(is_form_request(&Method::POST, &headers, false));
/// assert!(!is_form_request(&Method::POST, &headers, true));
/// assert!(!is_form_request(&Method::GET, &headers, false));
/// ```
pub fn is_form_request(method: &Method, headers: &HeaderMap, body_already_parsed: bool) -> bool {
    if body_already_parsed {
        return false;
    }

    if !(method == Method::POST || method == Method::PUT || method == Method::PATCH) {
        return false;
    }

    headers
        .get(header::CONTENT_TYPE)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<mime::Mime>().ok())
        .map(|m| is_multipart(&m) || is_urlencoded(&m))
        .unwrap_or(false)
}
