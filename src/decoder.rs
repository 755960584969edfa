use std::collections::HashMap;
use std::convert::Infallible;
use std::mem;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use http::header::{self, HeaderMap};
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::ReaderStream;

use crate::field::FieldAccumulator;
use crate::file_sink::FileSink;
use crate::part::{HeaderError, Part, PartKind};
use crate::request::FormKind;
use crate::state::DecodeState;
use crate::tokenizer::{Event, Tokenizer};
use crate::urlencoded::UrlEncodedDecoder;
use crate::{Completion, Config, FileDescriptor, FormData};

enum PartSink {
    Field(FieldAccumulator),
    File(FileSink),
}

struct MultipartBody {
    tokenizer: Tokenizer,
    header_lines: Vec<Bytes>,
    current: Option<PartSink>,
}

enum Body {
    Multipart(MultipartBody),
    UrlEncoded(UrlEncodedDecoder),
}

/// Decodes one form body into a [`FormData`].
///
/// A `Decoder` runs through `Idle → Parsing → {Completed, Failed}` exactly
/// once. Bytes are either pulled from a stream with [`parse`](Decoder::parse)
/// or pushed with [`feed`](Decoder::feed) and [`end`](Decoder::end). Multipart
/// file parts are streamed to the upload directory as they arrive; text
/// fields are buffered up to their size limit.
///
/// Every error is terminal: the decoder stops consuming bytes, removes the
/// files it wrote during this parse and settles the error. The outcome is
/// also available through [`completion`](Decoder::completion), which can be
/// awaited from anywhere, any number of times.
///
/// Dropping a decoder in the middle of a parse settles
/// [`Aborted`](crate::Error::Aborted) and removes its files.
///
/// # Examples
///
/// ```
/// use formbody::{Config, Decoder};
/// use bytes::Bytes;
/// use std::convert::Infallible;
/// use futures_util::stream::once;
///
/// # async fn run() {
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
///
/// let mut decoder = Decoder::multipart("X-BOUNDARY", Config::default()).unwrap();
/// let form = decoder.parse(stream).await.unwrap();
///
/// assert_eq!(form.field("my_text_field"), Some("abcd"));
/// assert!(form.files.is_empty());
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
pub struct Decoder {
    config: Config,
    body: Body,
    state: DecodeState,
    received: u64,
    fields: HashMap<String, String>,
    files: HashMap<String, FileDescriptor>,
    completion: Completion,
}

impl Decoder {
    /// Creates a decoder for a `multipart/form-data` body with the given
    /// boundary, which must not be empty.
    pub fn multipart<B: AsRef<str>>(boundary: B, config: Config) -> crate::Result<Decoder> {
        let tokenizer = Tokenizer::new(boundary.as_ref())?;

        let body = Body::Multipart(MultipartBody {
            tokenizer,
            header_lines: Vec::new(),
            current: None,
        });

        Ok(Decoder::with_body(body, config))
    }

    /// Creates a decoder for an `application/x-www-form-urlencoded` body.
    pub fn urlencoded(config: Config) -> Decoder {
        let decoder = UrlEncodedDecoder::new(config.size_limit.per_field, config.encoding);
        Decoder::with_body(Body::UrlEncoded(decoder), config)
    }

    /// Creates the right decoder for a `Content-Type` header value.
    pub fn from_content_type<T: AsRef<str>>(content_type: T, config: Config) -> crate::Result<Decoder> {
        match FormKind::from_content_type(content_type)? {
            FormKind::Multipart { boundary } => Decoder::multipart(boundary, config),
            FormKind::UrlEncoded => Ok(Decoder::urlencoded(config)),
        }
    }

    /// Creates the right decoder for a request's headers.
    pub fn from_headers(headers: &HeaderMap, config: Config) -> crate::Result<Decoder> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .ok_or(crate::Error::NoMultipart)?;

        Decoder::from_content_type(content_type, config)
    }

    fn with_body(body: Body, config: Config) -> Decoder {
        Decoder {
            config,
            body,
            state: DecodeState::Idle,
            received: 0,
            fields: HashMap::new(),
            files: HashMap::new(),
            completion: Completion::new(),
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a future resolving to this parse's outcome.
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Consumes the whole stream and returns the decoded form.
    ///
    /// Fails with [`AlreadyStarted`](crate::Error::AlreadyStarted) if bytes
    /// were already pushed with [`feed`](Decoder::feed), and with
    /// [`AlreadyFinished`](crate::Error::AlreadyFinished) if this decoder has
    /// already ended; neither touches the settled outcome. A stream error
    /// fails the parse with [`Aborted`](crate::Error::Aborted).
    pub async fn parse<S, O, E>(&mut self, stream: S) -> crate::Result<FormData>
    where
        S: Stream<Item = Result<O, E>>,
        O: Into<Bytes>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match self.state {
            DecodeState::Idle => {}
            DecodeState::Parsing => return Err(crate::Error::AlreadyStarted),
            DecodeState::Completed | DecodeState::Failed => return Err(crate::Error::AlreadyFinished),
        }

        futures_util::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    let bytes: Bytes = bytes.into();
                    self.feed(bytes).await?;
                }
                Err(err) => {
                    let err: Box<dyn std::error::Error + Send + Sync> = err.into();
                    let reason = format!("stream read failed: {}", err);
                    return Err(self.fail(crate::Error::aborted(reason)).await);
                }
            }
        }

        self.end().await
    }

    /// Decodes a body that is already fully in memory.
    pub async fn parse_bytes<B: Into<Bytes>>(&mut self, body: B) -> crate::Result<FormData> {
        let body = body.into();
        self.parse(stream::once(async move { Result::<Bytes, Infallible>::Ok(body) }))
            .await
    }

    /// Consumes the whole reader and returns the decoded form.
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    pub async fn parse_reader<R: AsyncRead>(&mut self, reader: R) -> crate::Result<FormData> {
        self.parse(ReaderStream::new(reader)).await
    }

    /// Pushes the next chunk of the body, starting the parse if needed.
    pub async fn feed<B: AsRef<[u8]>>(&mut self, chunk: B) -> crate::Result<()> {
        self.begin()?;

        let chunk = chunk.as_ref();

        if let Some(limit) = self.config.size_limit.whole_stream {
            if self.received + chunk.len() as u64 > limit {
                let err = crate::Error::StreamSizeExceeded { limit, bytes_parsed: 0 };
                return Err(self.fail(err).await);
            }
        }

        self.received += chunk.len() as u64;

        let result = match self.body {
            Body::Multipart(ref mut body) => {
                body.tokenizer.feed(chunk);
                Ok(())
            }
            Body::UrlEncoded(ref mut decoder) => decoder.feed(chunk, &mut self.fields),
        };

        let result = match result {
            Ok(()) => self.drain().await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Signals the end of the body and returns the decoded form.
    pub async fn end(&mut self) -> crate::Result<FormData> {
        self.begin()?;

        match self.body {
            Body::Multipart(ref mut body) => body.tokenizer.end(),
            Body::UrlEncoded(ref mut decoder) => decoder.end(&mut self.fields),
        }

        if let Err(err) = self.drain().await {
            return Err(self.fail(err).await);
        }

        Ok(self.complete())
    }

    /// Cancels the parse, e.g. because the connection went away.
    ///
    /// Open and already written uploads are removed and
    /// [`Aborted`](crate::Error::Aborted) is settled.
    pub async fn abort<R: Into<String>>(&mut self, reason: R) -> crate::Result<()> {
        if self.state.is_terminal() {
            return Err(crate::Error::AlreadyFinished);
        }

        self.fail(crate::Error::aborted(reason)).await;
        Ok(())
    }

    /// The number of body bytes accepted so far.
    ///
    /// For multipart bodies this counts what the tokenizer consumed, which
    /// excludes bytes still buffered, such as an incomplete header line.
    pub fn bytes_parsed(&self) -> u64 {
        match self.body {
            Body::Multipart(ref body) => body.tokenizer.bytes_parsed(),
            Body::UrlEncoded(_) => self.received,
        }
    }

    fn begin(&mut self) -> crate::Result<()> {
        match self.state {
            DecodeState::Idle => {
                trace!("form decoding started");
                self.state = DecodeState::Parsing;
                Ok(())
            }
            DecodeState::Parsing => Ok(()),
            DecodeState::Completed | DecodeState::Failed => Err(crate::Error::AlreadyFinished),
        }
    }

    async fn drain(&mut self) -> crate::Result<()> {
        let body = match self.body {
            Body::Multipart(ref mut body) => body,
            Body::UrlEncoded(_) => return Ok(()),
        };

        while let Some(event) = body.tokenizer.next_event()? {
            match event {
                Event::PartStart => body.header_lines.clear(),
                Event::HeaderLine(line) => body.header_lines.push(line),
                Event::HeadersEnd => {
                    let bytes_parsed = body.tokenizer.bytes_parsed();

                    let part = Part::parse(&body.header_lines, self.config.encoding).map_err(|err| match err {
                        HeaderError::MissingFieldName => crate::Error::MissingFieldName { bytes_parsed },
                        HeaderError::Malformed(reason) => crate::Error::malformed(bytes_parsed, reason),
                    })?;

                    trace!(
                        "part '{}' classified as {:?} with {} headers",
                        part.name(),
                        part.kind(),
                        part.headers().len()
                    );

                    body.current = Some(match part.kind() {
                        PartKind::Field => PartSink::Field(FieldAccumulator::new(
                            part.name().to_owned(),
                            self.config.size_limit.field_limit_for(part.name()),
                            part.charset().unwrap_or(self.config.encoding),
                        )),
                        PartKind::File => PartSink::File(FileSink::new(&part, &self.config)),
                    });
                }
                Event::Body(bytes) => match body.current {
                    Some(PartSink::Field(ref mut field)) => field.append(&bytes)?,
                    Some(PartSink::File(ref mut sink)) => sink.append(&bytes).await?,
                    None => {}
                },
                Event::PartEnd => match body.current.take() {
                    Some(PartSink::Field(field)) => {
                        let (name, value) = field.finish();
                        self.fields.insert(name, value);
                    }
                    Some(PartSink::File(sink)) => {
                        let (name, file) = sink.finish().await?;

                        if let Some(superseded) = self.files.insert(name, file) {
                            remove_upload(&superseded).await;
                        }
                    }
                    None => {}
                },
                Event::StreamEnd => break,
            }
        }

        Ok(())
    }

    fn complete(&mut self) -> FormData {
        self.state = DecodeState::Completed;

        let form = FormData::new(mem::take(&mut self.fields), mem::take(&mut self.files));

        debug!(
            "form decoded: {} fields, {} files, {} bytes",
            form.fields.len(),
            form.files.len(),
            self.received
        );

        self.completion.settle(Ok(form.clone()));
        form
    }

    async fn fail(&mut self, err: crate::Error) -> crate::Error {
        self.state = DecodeState::Failed;
        let err = err.at(self.bytes_parsed());

        debug!("form decoding failed after {} bytes: {}", self.received, err);

        if let Body::Multipart(ref mut body) = self.body {
            body.header_lines.clear();

            if let Some(PartSink::File(mut sink)) = body.current.take() {
                sink.discard().await;
            }
        }

        for (_, file) in self.files.drain() {
            remove_upload(&file).await;
        }
        self.fields.clear();

        self.completion.settle(Err(err.clone()));
        err
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        self.state = DecodeState::Failed;

        // An open sink removes its own file when dropped.
        if let Body::Multipart(ref mut body) = self.body {
            body.current.take();
        }

        for (_, file) in self.files.drain() {
            if let Err(err) = std::fs::remove_file(&file.path) {
                warn!("failed to remove upload {:?}: {}", file.path, err);
            }
        }

        let err = crate::Error::aborted("decoder dropped before the body was complete").at(self.bytes_parsed());
        self.completion.settle(Err(err));
    }
}

async fn remove_upload(file: &FileDescriptor) {
    if let Err(err) = tokio::fs::remove_file(&file.path).await {
        warn!("failed to remove upload {:?}: {}", file.path, err);
    }
}
