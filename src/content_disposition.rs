use encoding_rs::Encoding;
use percent_encoding::percent_decode_str;

use crate::constants;
use crate::helpers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    /// Parses a `Content-Disposition` value one parameter at a time. The first
    /// occurrence of a parameter wins; `filename*` takes precedence over
    /// `filename`.
    pub(crate) fn parse(value: &str) -> ContentDisposition {
        let mut field_name = None;
        let mut file_name = None;
        let mut ext_file_name = None;

        for (key, val) in params(value) {
            if key.eq_ignore_ascii_case("name") {
                field_name.get_or_insert(val);
            } else if key.eq_ignore_ascii_case("filename") {
                file_name.get_or_insert(val);
            } else if key.eq_ignore_ascii_case("filename*") {
                ext_file_name.get_or_insert(val);
            }
        }

        let field_name = field_name.filter(|name| !name.is_empty()).map(unescape_quotes);

        let file_name = ext_file_name
            .and_then(parse_extended_value)
            .or_else(|| file_name.map(unescape_quotes))
            .map(|name| strip_directories(&name).to_owned());

        ContentDisposition { field_name, file_name }
    }
}

fn params(value: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
    constants::CONTENT_DISPOSITION_PARAM_RE
        .captures_iter(value)
        .filter_map(|cap| {
            let key = cap.get(1)?.as_str();
            let val = cap.get(2).or_else(|| cap.get(3))?.as_str();
            Some((key, val))
        })
}

// charset'language'percent-encoded
fn parse_extended_value(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let encoding = Encoding::for_label(parts.next()?.as_bytes())?;
    parts.next()?;
    let raw: Vec<u8> = percent_decode_str(parts.next()?).collect();

    Some(helpers::decode_text(encoding, &raw))
}

fn unescape_quotes(value: &str) -> String {
    value.replace("%22", "\"")
}

// Some clients send the full client-side path.
fn strip_directories(file_name: &str) -> &str {
    match file_name.rfind(|c| c == '/' || c == '\\') {
        Some(idx) => &file_name[idx + 1..],
        None => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        let cd = ContentDisposition::parse(r#"form-data; name="my_field""#);
        assert_eq!(cd.field_name.as_deref(), Some("my_field"));
        assert_eq!(cd.file_name, None);
    }

    #[test]
    fn test_parse_file() {
        let cd = ContentDisposition::parse(r#"form-data; name="upload"; filename="a %22quoted%22 name.txt""#);
        assert_eq!(cd.field_name.as_deref(), Some("upload"));
        assert_eq!(cd.file_name.as_deref(), Some("a \"quoted\" name.txt"));

        let cd = ContentDisposition::parse(r#"form-data; name="upload"; filename="""#);
        assert_eq!(cd.file_name.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_strips_client_path() {
        let cd = ContentDisposition::parse(r#"form-data; name="f"; filename="C:\Users\me\photo.jpg""#);
        assert_eq!(cd.file_name.as_deref(), Some("photo.jpg"));

        let cd = ContentDisposition::parse(r#"form-data; name="f"; filename="/home/me/notes.md""#);
        assert_eq!(cd.file_name.as_deref(), Some("notes.md"));
    }

    #[test]
    fn test_parse_extended_file_name() {
        let cd = ContentDisposition::parse(
            "form-data; name=\"f\"; filename=\"fallback.txt\"; filename*=UTF-8''%E4%BD%A0%E5%A5%BD.txt",
        );
        assert_eq!(cd.file_name.as_deref(), Some("你好.txt"));
    }

    #[test]
    fn test_parse_name_inside_quoted_file_name() {
        let cd = ContentDisposition::parse(r#"form-data; filename="a; name=x"; name="real""#);
        assert_eq!(cd.field_name.as_deref(), Some("real"));
        assert_eq!(cd.file_name.as_deref(), Some("a; name=x"));

        let cd = ContentDisposition::parse(r#"form-data; filename="name=x.txt""#);
        assert_eq!(cd.field_name, None);
    }

    #[test]
    fn test_parse_case_insensitive_keys() {
        let cd = ContentDisposition::parse(r#"form-data; NAME="a"; FileName="b.txt""#);
        assert_eq!(cd.field_name.as_deref(), Some("a"));
        assert_eq!(cd.file_name.as_deref(), Some("b.txt"));
    }

    #[test]
    fn test_parse_missing_or_empty_name() {
        let cd = ContentDisposition::parse("form-data");
        assert_eq!(cd.field_name, None);

        let cd = ContentDisposition::parse(r#"form-data; name="""#);
        assert_eq!(cd.field_name, None);
    }
}
