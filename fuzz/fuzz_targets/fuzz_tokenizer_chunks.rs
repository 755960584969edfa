#![no_main]

use bytes::BytesMut;
use formbody::tokenizer::{Event, Tokenizer};
use libfuzzer_sys::fuzz_target;

/// Tokenizes `data` split into `chunk_size` pieces. Adjacent body chunks are
/// merged so runs with different chunkings can be compared.
fn tokenize(data: &[u8], chunk_size: usize) -> (Vec<Event>, Option<u64>) {
    let mut tokenizer = Tokenizer::new("X-BOUNDARY").expect("boundary");
    let mut events = Vec::new();
    let mut body = BytesMut::new();

    let record = |event: Event, events: &mut Vec<Event>, body: &mut BytesMut| match event {
        Event::Body(bytes) => body.extend_from_slice(&bytes),
        other => {
            if !body.is_empty() {
                events.push(Event::Body(body.split().freeze()));
            }
            events.push(other);
        }
    };

    let chunks = data.chunks(chunk_size.max(1)).map(Some).chain(std::iter::once(None));

    for chunk in chunks {
        match chunk {
            Some(chunk) => tokenizer.feed(chunk),
            None => tokenizer.end(),
        }

        loop {
            match tokenizer.next_event() {
                Ok(Some(Event::StreamEnd)) => {
                    record(Event::StreamEnd, &mut events, &mut body);
                    return (events, None);
                }
                Ok(Some(event)) => record(event, &mut events, &mut body),
                Ok(None) => break,
                Err(err) => return (events, err.bytes_parsed()),
            }
        }
    }

    (events, None)
}

fuzz_target!(|data: &[u8]| {
    let (whole_events, whole_err) = tokenize(data, data.len());
    let (byte_events, byte_err) = tokenize(data, 1);

    if let Some(at) = whole_err {
        assert!(at <= data.len() as u64);
    }

    assert_eq!(whole_err, byte_err);
    if whole_err.is_none() {
        assert_eq!(whole_events, byte_events);
    }
});
