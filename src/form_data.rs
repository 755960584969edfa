use std::collections::HashMap;

#[cfg(feature = "json")]
use serde::de::DeserializeOwned;

use crate::FileDescriptor;

/// The decoded form: text fields and staged uploads, each keyed by field
/// name. When a name repeats, the last part wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, FileDescriptor>,
}

impl FormData {
    pub fn new(fields: HashMap<String, String>, files: HashMap<String, FileDescriptor>) -> FormData {
        FormData { fields, files }
    }

    /// Returns the text value of a field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the descriptor of an uploaded file.
    pub fn file(&self, name: &str) -> Option<&FileDescriptor> {
        self.files.get(name)
    }

    /// Deserializes the text fields into `T`, treating them as a flat JSON
    /// object of strings.
    ///
    /// # Optional
    ///
    /// This requires the optional `json` feature to be enabled.
    ///
    /// # Examples
    ///
    /// ```
    /// use formbody::{Config, Decoder};
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Signup {
    ///     name: String,
    ///     comments: Option<String>,
    /// }
    ///
    /// # async fn run() {
    /// let mut decoder = Decoder::urlencoded(Config::default());
    /// let form = decoder.parse_bytes("name=foo&comments=foo+bar").await.unwrap();
    ///
    /// let signup: Signup = form.json().unwrap();
    /// assert_eq!(signup.name, "foo");
    /// assert_eq!(signup.comments.as_deref(), Some("foo bar"));
    /// # }
    /// # tokio::runtime::Runtime::new().unwrap().block_on(run());
    /// ```
    #[cfg(feature = "json")]
    pub fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        let object = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect::<serde_json::Map<_, _>>();

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|err| crate::Error::DecodeJson(std::sync::Arc::new(err)))
    }
}
