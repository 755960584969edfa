use std::env;
use std::path::PathBuf;

use encoding_rs::{Encoding, UTF_8};

use crate::SizeLimit;

/// Options for decoding a form body.
///
/// A `Config` is passed by value to the [`Decoder`](crate::Decoder) and never
/// changes during a parse.
///
/// # Examples
///
/// ```
/// use formbody::{Config, SizeLimit};
///
/// let config = Config::new()
///     .upload_dir("/var/tmp/uploads")
///     .keep_extensions(true)
///     .size_limit(SizeLimit::new().per_field(64 * 1024).per_file(16 * 1024 * 1024));
///
/// assert!(config.keeps_extensions());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) encoding: &'static Encoding,
    pub(crate) upload_dir: PathBuf,
    pub(crate) keep_extensions: bool,
    pub(crate) size_limit: SizeLimit,
}

impl Config {
    /// Creates a config with UTF-8 text, the system temporary directory for
    /// uploads, generated names without extensions and no size limits.
    pub fn new() -> Config {
        Config::default()
    }

    /// Sets the encoding used to decode text fields and header values.
    pub fn encoding(mut self, encoding: &'static Encoding) -> Config {
        self.encoding = encoding;
        self
    }

    /// Sets the encoding by its WHATWG label, e.g. `"latin1"`. Returns `None`
    /// if the label names no known encoding.
    ///
    /// ```
    /// use formbody::Config;
    ///
    /// assert!(Config::new().encoding_label("shift_jis").is_some());
    /// assert!(Config::new().encoding_label("klingon").is_none());
    /// ```
    pub fn encoding_label<L: AsRef<str>>(self, label: L) -> Option<Config> {
        let encoding = Encoding::for_label(label.as_ref().as_bytes())?;
        Some(self.encoding(encoding))
    }

    /// Sets the directory where uploaded files are staged. It must exist
    /// before parsing.
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> Config {
        self.upload_dir = dir.into();
        self
    }

    /// Whether generated upload names keep the original file extension.
    pub fn keep_extensions(mut self, keep: bool) -> Config {
        self.keep_extensions = keep;
        self
    }

    /// Sets the size limits.
    pub fn size_limit(mut self, size_limit: SizeLimit) -> Config {
        self.size_limit = size_limit;
        self
    }

    pub fn text_encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn upload_directory(&self) -> &PathBuf {
        &self.upload_dir
    }

    pub fn keeps_extensions(&self) -> bool {
        self.keep_extensions
    }

    pub fn limits(&self) -> &SizeLimit {
        &self.size_limit
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            encoding: UTF_8,
            upload_dir: env::temp_dir(),
            keep_extensions: false,
            size_limit: SizeLimit::default(),
        }
    }
}
