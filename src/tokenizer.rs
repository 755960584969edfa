use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem::Finder;

use crate::constants::{self, CR, LF};
use crate::state::StreamingStage;

/// A structural event of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A delimiter opened a new part.
    PartStart,
    /// One raw header line of the current part, without its line ending.
    HeaderLine(Bytes),
    /// The blank line closing the current part's headers.
    HeadersEnd,
    /// A slice of the current part's body, passed through untouched.
    Body(Bytes),
    /// The current part's body ended at a delimiter.
    PartEnd,
    /// The close delimiter was read; nothing follows.
    StreamEnd,
}

/// An incremental, push-based multipart tokenizer.
///
/// Bytes are pushed with [`feed`](Tokenizer::feed) and the end of input is
/// signalled with [`end`](Tokenizer::end). [`next_event`](Tokenizer::next_event)
/// yields events as long as the buffered bytes allow it and returns
/// `Ok(None)` when it needs more input. Only a tail that might still turn out
/// to be a delimiter is held back, so body data is never buffered as a whole.
///
/// # Examples
///
/// ```
/// use formbody::tokenizer::{Event, Tokenizer};
///
/// let mut tokenizer = Tokenizer::new("X").unwrap();
/// tokenizer.feed(b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nb\r\n--X--\r\n");
/// tokenizer.end();
///
/// let mut events = Vec::new();
/// while let Some(event) = tokenizer.next_event().unwrap() {
///     events.push(event);
/// }
///
/// assert_eq!(events.first(), Some(&Event::PartStart));
/// assert_eq!(events.last(), Some(&Event::StreamEnd));
/// ```
pub struct Tokenizer {
    buf: BytesMut,
    delimiter: Vec<u8>,
    body_delimiter: Vec<u8>,
    finder: Finder<'static>,
    stage: StreamingStage,
    consumed: u64,
    header_count: usize,
    eof: bool,
}

impl Tokenizer {
    /// Creates a tokenizer for the given boundary, which must not be empty.
    pub fn new<B: AsRef<[u8]>>(boundary: B) -> crate::Result<Tokenizer> {
        let boundary = boundary.as_ref();
        if boundary.is_empty() {
            return Err(crate::Error::NoBoundary);
        }

        let mut delimiter = Vec::with_capacity(constants::BOUNDARY_EXT.len() + boundary.len());
        delimiter.extend_from_slice(constants::BOUNDARY_EXT.as_bytes());
        delimiter.extend_from_slice(boundary);

        let mut body_delimiter = Vec::with_capacity(constants::CRLF.len() + delimiter.len());
        body_delimiter.extend_from_slice(constants::CRLF.as_bytes());
        body_delimiter.extend_from_slice(&delimiter);

        let finder = Finder::new(&body_delimiter).into_owned();

        Ok(Tokenizer {
            buf: BytesMut::new(),
            delimiter,
            body_delimiter,
            finder,
            stage: StreamingStage::ReadingFirstBoundary,
            consumed: 0,
            header_count: 0,
            eof: false,
        })
    }

    /// Pushes the next chunk of the raw body.
    ///
    /// Bytes after the close delimiter form the epilogue and are discarded.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.stage == StreamingStage::Eof {
            self.consumed += chunk.len() as u64;
            return;
        }

        self.buf.extend_from_slice(chunk);
    }

    /// Marks the end of input. Pending events can still be drained.
    pub fn end(&mut self) {
        self.eof = true;
    }

    /// The number of bytes turned into events so far.
    pub fn bytes_parsed(&self) -> u64 {
        self.consumed
    }

    /// Returns `true` once the close delimiter has been read.
    pub fn is_finished(&self) -> bool {
        self.stage == StreamingStage::Eof
    }

    /// Yields the next event, `Ok(None)` if more input is needed.
    ///
    /// Fails with [`MalformedStream`](crate::Error::MalformedStream) whose
    /// `bytes_parsed` is the offset of the first offending byte, or the total
    /// input length if the input ended early.
    pub fn next_event(&mut self) -> crate::Result<Option<Event>> {
        loop {
            match self.stage {
                StreamingStage::ReadingFirstBoundary => {
                    let n = self.buf.len().min(self.delimiter.len());

                    if let Some(idx) = (0..n).find(|&idx| self.buf[idx] != self.delimiter[idx]) {
                        return Err(crate::Error::malformed(
                            self.consumed + idx as u64,
                            "expected the opening boundary delimiter",
                        ));
                    }

                    if n < self.delimiter.len() {
                        return self.need_more("stream ended before the opening boundary delimiter");
                    }

                    self.discard(self.delimiter.len());
                    self.stage = StreamingStage::DeterminingBoundaryType;
                }
                StreamingStage::DeterminingBoundaryType => match self.buf.first() {
                    None => return self.need_more("stream ended after a boundary delimiter"),
                    Some(b'-') => match self.buf.get(1) {
                        None => return self.need_more("stream ended inside the close delimiter"),
                        Some(b'-') => {
                            self.discard(2);
                            self.discard(self.buf.len());
                            self.stage = StreamingStage::Eof;

                            trace!("multipart close delimiter reached at byte {}", self.consumed);

                            return Ok(Some(Event::StreamEnd));
                        }
                        Some(_) => {
                            return Err(crate::Error::malformed(
                                self.consumed + 1,
                                "expected the close delimiter",
                            ));
                        }
                    },
                    Some(_) => self.stage = StreamingStage::ReadingTransportPadding,
                },
                StreamingStage::ReadingTransportPadding => {
                    let padding = self.buf.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
                    self.discard(padding);

                    match self.buf.first() {
                        None => return self.need_more("stream ended after a boundary delimiter"),
                        Some(&CR) => match self.buf.get(1) {
                            None => return self.need_more("stream ended after a boundary delimiter"),
                            Some(&LF) => self.discard(2),
                            Some(_) => {
                                return Err(crate::Error::malformed(
                                    self.consumed + 1,
                                    "expected a line feed after the boundary delimiter",
                                ));
                            }
                        },
                        Some(&LF) => self.discard(1),
                        Some(_) => {
                            return Err(crate::Error::malformed(
                                self.consumed,
                                "unexpected byte after the boundary delimiter",
                            ));
                        }
                    }

                    self.stage = StreamingStage::ReadingFieldHeaders;
                    self.header_count = 0;

                    return Ok(Some(Event::PartStart));
                }
                StreamingStage::ReadingFieldHeaders => return self.read_header_line(),
                StreamingStage::ReadingFieldData => return self.read_field_data(),
                StreamingStage::Eof => return Ok(None),
            }
        }
    }

    fn read_header_line(&mut self) -> crate::Result<Option<Event>> {
        let idx = match memchr::memchr(LF, &self.buf) {
            Some(idx) => idx,
            None if self.buf.len() > constants::MAX_HEADER_LINE_SIZE => {
                return Err(crate::Error::malformed(self.consumed, "header line too long"));
            }
            None => return self.need_more("stream ended inside the part headers"),
        };

        let line_len = if idx > 0 && self.buf[idx - 1] == CR { idx - 1 } else { idx };

        if line_len == 0 {
            self.discard(idx + 1);
            self.stage = StreamingStage::ReadingFieldData;
            return Ok(Some(Event::HeadersEnd));
        }

        if line_len > constants::MAX_HEADER_LINE_SIZE {
            return Err(crate::Error::malformed(self.consumed, "header line too long"));
        }

        if self.header_count == constants::MAX_HEADERS {
            return Err(crate::Error::malformed(self.consumed, "too many part headers"));
        }
        self.header_count += 1;

        let mut line = self.consume(idx + 1);
        line.truncate(line_len);

        Ok(Some(Event::HeaderLine(line)))
    }

    fn read_field_data(&mut self) -> crate::Result<Option<Event>> {
        let delimiter_len = self.body_delimiter.len();

        let idx = match self.finder.find(&self.buf) {
            Some(idx) => idx,
            None if self.eof => {
                return Err(crate::Error::malformed(
                    self.total_received(),
                    "stream ended inside a part body",
                ));
            }
            None => {
                let end = self.partial_delimiter_start(0);
                return if end == 0 {
                    Ok(None)
                } else {
                    Ok(Some(Event::Body(self.consume(end))))
                };
            }
        };

        if idx > 0 {
            return Ok(Some(Event::Body(self.consume(idx))));
        }

        match self.confirm_delimiter(delimiter_len) {
            None => self.need_more("stream ended inside a boundary delimiter"),
            Some(true) => {
                self.discard(delimiter_len);
                self.stage = StreamingStage::DeterminingBoundaryType;
                Ok(Some(Event::PartEnd))
            }
            Some(false) => {
                // Not a delimiter, only body content that starts like one.
                let end = match self.finder.find(&self.buf[1..]) {
                    Some(idx) => idx + 1,
                    None => self.partial_delimiter_start(1),
                };
                Ok(Some(Event::Body(self.consume(end))))
            }
        }
    }

    /// Whether the body delimiter matched at the start of the buffer is
    /// completed by the bytes at `from`: `--`, or optional transport padding
    /// and a line break. `None` if more input is needed to tell.
    fn confirm_delimiter(&self, from: usize) -> Option<bool> {
        let rest = &self.buf[from..];

        match rest.first()? {
            b'-' => rest.get(1).map(|&b| b == b'-'),
            _ => {
                let padding = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
                if padding > constants::MAX_HEADER_LINE_SIZE {
                    return Some(false);
                }

                match rest.get(padding)? {
                    &LF => Some(true),
                    &CR => rest.get(padding + 1).map(|&b| b == LF),
                    _ => Some(false),
                }
            }
        }
    }

    /// Earliest index at or after `from` where the buffered tail could be the
    /// beginning of a body delimiter, or the buffer length.
    fn partial_delimiter_start(&self, from: usize) -> usize {
        let len = self.buf.len();
        let window = len.saturating_sub(self.body_delimiter.len() - 1).max(from);

        memchr::memchr_iter(CR, &self.buf[window..])
            .map(|idx| window + idx)
            .find(|&idx| self.body_delimiter.starts_with(&self.buf[idx..]))
            .unwrap_or(len)
    }

    fn need_more(&self, reason: &str) -> crate::Result<Option<Event>> {
        if self.eof {
            Err(crate::Error::malformed(self.total_received(), reason))
        } else {
            Ok(None)
        }
    }

    fn total_received(&self) -> u64 {
        self.consumed + self.buf.len() as u64
    }

    fn consume(&mut self, size: usize) -> Bytes {
        self.consumed += size as u64;
        self.buf.split_to(size).freeze()
    }

    fn discard(&mut self, size: usize) {
        self.consumed += size as u64;
        self.buf.advance(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const BODY: &str = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    fn tokenize(data: &[u8], boundary: &str, chunk_size: usize) -> crate::Result<Vec<Event>> {
        let mut tokenizer = Tokenizer::new(boundary)?;
        let mut events = Vec::new();

        for chunk in data.chunks(chunk_size) {
            tokenizer.feed(chunk);
            while let Some(event) = tokenizer.next_event()? {
                push_merged(&mut events, event);
            }
        }

        tokenizer.end();
        while let Some(event) = tokenizer.next_event()? {
            push_merged(&mut events, event);
        }

        Ok(events)
    }

    fn push_merged(events: &mut Vec<Event>, event: Event) {
        if let (Some(Event::Body(prev)), Event::Body(next)) = (events.last_mut(), &event) {
            let mut joined = BytesMut::from(&prev[..]);
            joined.extend_from_slice(next);
            *prev = joined.freeze();
            return;
        }
        events.push(event);
    }

    fn line(s: &str) -> Event {
        Event::HeaderLine(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn body(s: &str) -> Event {
        Event::Body(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn test_tokenize_basic_any_chunking() {
        let expected = vec![
            Event::PartStart,
            line("Content-Disposition: form-data; name=\"My Field\""),
            Event::HeadersEnd,
            body("abcd"),
            Event::PartEnd,
            Event::PartStart,
            line("Content-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\""),
            line("Content-Type: text/plain"),
            Event::HeadersEnd,
            body("Hello world\nHello\r\nWorld\rAgain"),
            Event::PartEnd,
            Event::StreamEnd,
        ];

        for chunk_size in [1, 2, 3, 7, 13, BODY.len()].iter() {
            assert_eq!(tokenize(BODY.as_bytes(), "X-BOUNDARY", *chunk_size).unwrap(), expected);
        }
    }

    #[test]
    fn test_near_match_is_body() {
        let contents = [
            "line\r\n--XY",
            "line\r\n--X-not-a-boundary",
            "line\r\n--X is mentioned here",
            "line\r\n--X\ttab",
            "line\r\n--X\rbare carriage return",
            "line\r\n--X  \t padding then text",
            "\r\n--X-\r\n--X \tx\r\n--X\r",
        ];

        for content in contents.iter() {
            let data = format!(
                "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n{}\r\n--X--\r\n",
                content
            );

            for chunk_size in [1, 2, 5, data.len()].iter() {
                let events = tokenize(data.as_bytes(), "X", *chunk_size).unwrap();
                assert_eq!(events.len(), 6, "{:?}", content);
                assert_eq!(events[3], body(content));
                assert_eq!(events[4], Event::PartEnd);
                assert_eq!(events[5], Event::StreamEnd);
            }
        }
    }

    #[test]
    fn test_padded_body_delimiter() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nb\r\n--X \t \r\nContent-Disposition: form-data; name=\"c\"\r\n\r\nd\r\n--X--";

        for chunk_size in [1, 3, data.len()].iter() {
            let events = tokenize(data.as_bytes(), "X", *chunk_size).unwrap();
            assert_eq!(events[3], body("b"));
            assert_eq!(events[4], Event::PartEnd);
            assert_eq!(events[5], Event::PartStart);
            assert_eq!(events[8], body("d"));
        }
    }

    #[test]
    fn test_near_match_then_truncated() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nline\r\n--X  ";

        for chunk_size in [1, 4, data.len()].iter() {
            let err = tokenize(data.as_bytes(), "X", *chunk_size).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedStream);
            assert_eq!(err.bytes_parsed(), Some(data.len() as u64));
        }
    }

    #[test]
    fn test_empty_parts_and_lf_headers() {
        let data = "--X\nContent-Disposition: form-data; name=\"a\"\n\n\r\n--X\r\n\r\n\r\n--X--";
        let events = tokenize(data.as_bytes(), "X", 2).unwrap();
        assert_eq!(
            events,
            vec![
                Event::PartStart,
                line("Content-Disposition: form-data; name=\"a\""),
                Event::HeadersEnd,
                Event::PartEnd,
                Event::PartStart,
                Event::HeadersEnd,
                Event::PartEnd,
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_empty_stream() {
        let events = tokenize(b"--X-BOUNDARY--\r\n", "X-BOUNDARY", 1).unwrap();
        assert_eq!(events, vec![Event::StreamEnd]);
    }

    #[test]
    fn test_epilogue_ignored() {
        let data = "--X--\r\nthis is the epilogue\r\n--X\r\n";
        let events = tokenize(data.as_bytes(), "X", 4).unwrap();
        assert_eq!(events, vec![Event::StreamEnd]);
    }

    #[test]
    fn test_transport_padding() {
        let data = "--X \t\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nb\r\n--X--";
        let events = tokenize(data.as_bytes(), "X", 1).unwrap();
        assert_eq!(events[0], Event::PartStart);
        assert_eq!(events[3], body("b"));
    }

    #[test]
    fn test_malformed_opening_delimiter_offset() {
        let boundary = "----WebKitFormBoundaryMfJEpQcCbybb6A8U";
        let data = "--WebKitFormBoundaryMfJEpQcCbybb6A8U\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nfoo\r\n------WebKitFormBoundaryMfJEpQcCbybb6A8U--\r\n";

        for chunk_size in [1, 5, data.len()].iter() {
            let err = tokenize(data.as_bytes(), boundary, *chunk_size).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedStream);
            assert_eq!(err.bytes_parsed(), Some(2));
        }
    }

    #[test]
    fn test_truncated_stream_offset() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello";
        for chunk_size in [1, 6, data.len()].iter() {
            let err = tokenize(data.as_bytes(), "X", *chunk_size).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedStream);
            assert_eq!(err.bytes_parsed(), Some(data.len() as u64));
        }

        let err = tokenize(b"", "X", 1).unwrap_err();
        assert_eq!(err.bytes_parsed(), Some(0));
    }

    #[test]
    fn test_garbage_after_delimiter() {
        let err = tokenize(b"--Xz\r\n", "X", 1).unwrap_err();
        assert_eq!(err.bytes_parsed(), Some(3));

        let err = tokenize(b"--X-z", "X", 1).unwrap_err();
        assert_eq!(err.bytes_parsed(), Some(4));
    }

    #[test]
    fn test_too_many_headers() {
        let mut data = String::from("--X\r\n");
        for i in 0..=constants::MAX_HEADERS {
            data.push_str(&format!("X-Header-{}: {}\r\n", i, i));
        }
        data.push_str("\r\nbody\r\n--X--");

        let err = tokenize(data.as_bytes(), "X", 16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedStream);
    }

    #[test]
    fn test_body_tail_is_held_back() {
        let mut tokenizer = Tokenizer::new("BOUNDARY").unwrap();
        tokenizer.feed(b"--BOUNDARY\r\n\r\nsome data\r\n--BOUN");

        let mut events = Vec::new();
        while let Some(event) = tokenizer.next_event().unwrap() {
            events.push(event);
        }

        assert_eq!(events.last(), Some(&body("some data")));
        assert_eq!(tokenizer.bytes_parsed(), 23);

        tokenizer.feed(b"DARY--");
        assert_eq!(tokenizer.next_event().unwrap(), Some(Event::PartEnd));
        assert_eq!(tokenizer.next_event().unwrap(), Some(Event::StreamEnd));
        assert!(tokenizer.is_finished());
        assert_eq!(tokenizer.next_event().unwrap(), None);
    }

    #[test]
    fn test_empty_boundary_rejected() {
        assert_eq!(Tokenizer::new("").err(), Some(crate::Error::NoBoundary));
    }
}
