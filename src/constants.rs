use lazy_static::lazy_static;
use regex::Regex;

pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const MAX_HEADER_LINE_SIZE: usize = 8 * 1024;

pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
pub(crate) const CRLF: &str = "\r\n";

pub(crate) const DEFAULT_FIELD_CONTENT_TYPE: &str = "text/plain";
pub(crate) const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

pub(crate) const UPLOAD_FILE_PREFIX: &str = "upload_";
pub(crate) const MAX_EXTENSION_LEN: usize = 16;
pub(crate) const MAX_CREATE_ATTEMPTS: usize = 16;

lazy_static! {
    /// One `key=value` parameter; the value is either a quoted string or a token.
    pub(crate) static ref CONTENT_DISPOSITION_PARAM_RE: Regex =
        Regex::new(r#"([A-Za-z0-9_.*-]+)\s*=\s*(?:"([^"]*)"|([^;\s"]*))"#).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(val: &str) -> Vec<(&str, &str)> {
        CONTENT_DISPOSITION_PARAM_RE
            .captures_iter(val)
            .map(|cap| {
                let key = cap.get(1).unwrap().as_str();
                let value = cap.get(2).or_else(|| cap.get(3)).unwrap().as_str();
                (key, value)
            })
            .collect()
    }

    #[test]
    fn test_content_disposition_param_re() {
        let val = r#"form-data; name="my field"; filename="file abc.txt""#;
        assert_eq!(params(val), vec![("name", "my field"), ("filename", "file abc.txt")]);

        let val = r#"form-data: name="comments""#;
        assert_eq!(params(val), vec![("name", "comments")]);

        let val = "form-data; name=bare; filename=\"\"";
        assert_eq!(params(val), vec![("name", "bare"), ("filename", "")]);

        let val = "form-data; name=\"কখগ\"; filename=\"你好.txt\"";
        assert_eq!(params(val), vec![("name", "কখগ"), ("filename", "你好.txt")]);

        let val = "form-data; name=\"f\"; filename*=UTF-8''%E4%BD%A0%E5%A5%BD.txt";
        assert_eq!(params(val), vec![("name", "f"), ("filename*", "UTF-8''%E4%BD%A0%E5%A5%BD.txt")]);
    }

    #[test]
    fn test_quoted_values_hide_parameters() {
        let val = r#"form-data; filename="a; name=x"; name="real""#;
        assert_eq!(params(val), vec![("filename", "a; name=x"), ("name", "real")]);
    }
}
