//! A streaming decoder for `multipart/form-data` and
//! `application/x-www-form-urlencoded` request bodies.
//!
//! The [`Decoder`] consumes a body chunk by chunk, as it arrives from the
//! network, and produces a [`FormData`]: text fields keyed by name and
//! uploaded files staged in an upload directory. Memory use stays bounded:
//! file parts are streamed to disk and text fields are capped by the
//! configured [`SizeLimit`].
//!
//! Whether a request should be decoded at all is decided by
//! [`is_form_request`]; [`Decoder::from_headers`] then picks the right body
//! format.
//!
//! # Examples
//!
//! ```
//! use formbody::{Config, Decoder};
//! use bytes::Bytes;
//! use std::convert::Infallible;
//! use futures_util::stream::iter;
//!
//! # async fn run() {
//! let dir = std::env::temp_dir();
//! let chunks = vec![
//!     "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nfoo\r\n",
//!     "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"text\"; filename=\"foo.txt\"\r\n\r\n",
//!     "foo\nbar\nbaz\n\r\n--X-BOUNDARY--\r\n",
//! ];
//! let stream = iter(chunks.into_iter().map(|chunk| Result::<Bytes, Infallible>::Ok(Bytes::from(chunk))));
//!
//! let mut decoder = Decoder::multipart("X-BOUNDARY", Config::new().upload_dir(dir)).unwrap();
//! let form = decoder.parse(stream).await.unwrap();
//!
//! assert_eq!(form.field("name"), Some("foo"));
//!
//! let file = form.file("text").unwrap();
//! assert_eq!(file.original_filename, "foo.txt");
//! assert_eq!(file.size, 12);
//! # std::fs::remove_file(&file.path).unwrap();
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```
//!
//! # Features
//!
//! - `log`: logs the decoding lifecycle through the `log` crate (enabled by
//!   default).
//! - `tokio-io`: adds [`Decoder::parse_reader`] for `AsyncRead` sources.
//! - `serde`: derives `Serialize` for [`FormData`] and [`FileDescriptor`].
//! - `json`: adds [`FormData::json`] to deserialize the text fields.

pub use completion::Completion;
pub use config::Config;
pub use decoder::Decoder;
pub use error::{Error, ErrorKind};
pub use file_sink::FileDescriptor;
pub use form_data::FormData;
pub use request::{is_form_request, parse_boundary, FormKind};
pub use size_limit::SizeLimit;
pub use state::DecodeState;

#[macro_use]
mod macros;

mod completion;
mod config;
mod constants;
mod content_disposition;
mod decoder;
mod error;
mod field;
mod file_sink;
mod form_data;
mod helpers;
mod part;
mod request;
mod size_limit;
mod state;
pub mod tokenizer;
mod urlencoded;

/// A Result type often returned from methods that can have `formbody` errors.
pub type Result<T> = std::result::Result<T, Error>;
