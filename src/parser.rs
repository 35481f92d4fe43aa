//! Incremental HTTP/1.x message parser.
//!
//! [`Http1MessageParser`] consumes bytes in whatever pieces the network hands
//! them over and reports what it finds to a [`MessageListener`]: the headers
//! of each message once they are complete, the body bytes as they stream by,
//! and the end of each message. Parsing is byte-at-a-time, so the events do
//! not depend on where a stream happens to be split.
//!
//! Every body byte is reported exactly once, tagged with a [`BodyBytesType`].
//! Writing out all body events reproduces the body exactly as it appeared on
//! the wire, while the [`BodyBytesType::Content`] events alone make up the
//! decoded payload.
//!
//! Request and response parsers for one connection share a [`RequestQueue`]
//! so that every response can be paired with the request it answers.
use crate::chars::{self, COLON, SEMICOLON, SP};
use crate::error::{Error, Result};
use crate::protocol::{BodySize, HttpMessage, HttpMessageType, HttpRequest};
use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Longest start-line token, header name or value, or trailer block accepted.
pub const MAX_TOKEN_BYTES: usize = 16 * 1024;

const MAX_STATUS_CODE_DIGITS: usize = 4;
const MAX_CHUNK_SIZE_DIGITS: usize = 16;

/// What reaching the end of the stream means in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofAction {
    Nothing,
    Error,
    /// The stream end completes the current message.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestStart,
    ResponseStart,
    ResponseVersion,
    Method,
    RequestTarget,
    HttpVersion,
    RequestLineEnding,
    StatusCode,
    ReasonPhrase,
    StatusLineEnding,
    HeaderStart,
    HeaderName,
    HeaderNameEnded,
    HeaderValue,
    HeaderValueEnding,
    HeadersEnding,
    FixedSizeBody,
    UnspecifiedBody,
    ChunkStart,
    ChunkSize,
    ChunkExtensions,
    ChunkHeaderEnding,
    ChunkData,
    ChunkDataEnding,
    ChunkDataLineEnding,
    LastChunk,
    ChunkedBodyEnding,
    Trailers,
    Websocket,
    Failed,
}

impl ParseState {
    pub fn eof_action(self) -> EofAction {
        match self {
            ParseState::RequestStart | ParseState::ResponseStart | ParseState::Failed => {
                EofAction::Nothing
            }
            ParseState::UnspecifiedBody | ParseState::Websocket => EofAction::Complete,
            _ => EofAction::Error,
        }
    }
}

/// How a run of body bytes relates to the message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyBytesType {
    /// Transfer-coding framing: chunk-size lines, chunk extensions, the CRLF
    /// after each chunk. Websocket traffic is also reported this way.
    Encoding,
    /// Payload.
    Content,
    /// The final CRLF of a chunked body, or the trailer block including it.
    Trailers,
}

/// Receives the events of a [`Http1MessageParser`].
///
/// Errors returned from a callback abort the current `feed` and put the
/// parser in the failed state, after `on_error` has been called.
pub trait MessageListener {
    /// The start line and headers are complete. They may be mutated here.
    fn on_headers(&mut self, message: &mut HttpMessage) -> Result<()>;

    fn on_body_bytes(&mut self, message: &HttpMessage, kind: BodyBytesType, bytes: &[u8])
        -> Result<()>;

    fn on_message_ended(&mut self, message: &HttpMessage) -> Result<()>;

    /// Called at most once per parser, on its first error.
    fn on_error(&mut self, message: &HttpMessage, error: &Error);

    /// Called by drivers once everything from one read has been fed.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A request slot enqueued as soon as a request starts. It is filled in
/// once the request headers have been parsed.
#[derive(Debug, Clone, Default)]
pub struct PendingRequest {
    request: Arc<Mutex<Option<HttpRequest>>>,
}

impl PendingRequest {
    fn complete(&self, request: &HttpRequest) {
        *lock(&self.request) = Some(request.clone());
    }

    pub fn request(&self) -> Option<HttpRequest> {
        lock(&self.request).clone()
    }
}

/// FIFO of requests still waiting for a final response, shared between the
/// two parsers of one connection.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    requests: Arc<Mutex<VecDeque<PendingRequest>>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: PendingRequest) {
        lock(&self.requests).push_back(request);
    }

    pub fn pop(&self) -> Option<PendingRequest> {
        lock(&self.requests).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.requests).is_empty()
    }
}

#[derive(Debug)]
pub struct Http1MessageParser {
    message_type: HttpMessageType,
    queue: RequestQueue,
    state: ParseState,
    message: HttpMessage,
    pending: Option<PendingRequest>,
    buffer: Vec<u8>,
    header_name: String,
    remaining: u64,
    // Start, within the current feed, of chunk framing bytes not yet reported.
    encoding_from: Option<usize>,
}

impl Http1MessageParser {
    pub fn new(message_type: HttpMessageType, queue: RequestQueue) -> Self {
        Http1MessageParser {
            message_type,
            queue,
            state: Self::start_state(message_type),
            message: HttpMessage::empty(message_type),
            pending: None,
            buffer: Vec::new(),
            header_name: String::new(),
            remaining: 0,
            encoding_from: None,
        }
    }

    fn start_state(message_type: HttpMessageType) -> ParseState {
        match message_type {
            HttpMessageType::Request => ParseState::RequestStart,
            HttpMessageType::Response => ParseState::ResponseStart,
        }
    }

    pub fn message_type(&self) -> HttpMessageType {
        self.message_type
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The message currently being parsed.
    pub fn message(&self) -> &HttpMessage {
        &self.message
    }

    pub fn feed<L: MessageListener>(&mut self, bytes: &[u8], listener: &mut L) -> Result<()> {
        if self.state == ParseState::Failed {
            return Err(Error::ParserFailed);
        }
        trace!(
            message_type = ?self.message_type,
            state = ?self.state,
            len = bytes.len(),
            "feeding parser"
        );
        match self.parse(bytes, listener) {
            Ok(()) => Ok(()),
            Err(error) => Err(self.report_error(error, listener)),
        }
    }

    /// Signals the end of the stream.
    pub fn eof<L: MessageListener>(&mut self, listener: &mut L) -> Result<()> {
        match self.state.eof_action() {
            EofAction::Nothing => Ok(()),
            EofAction::Complete if self.state == ParseState::Websocket => Ok(()),
            EofAction::Complete => match self.end_message(listener) {
                Ok(()) => Ok(()),
                Err(error) => Err(self.report_error(error, listener)),
            },
            EofAction::Error => {
                let error = Error::UnexpectedEof(format!("EOF when state is {:?}", self.state));
                Err(self.report_error(error, listener))
            }
        }
    }

    /// Fails the parser with an error found outside of it, such as a read
    /// error on the stream being parsed. The listener hears about the first
    /// error only. Returns `error` back.
    pub fn report_error<L: MessageListener>(&mut self, error: Error, listener: &mut L) -> Error {
        if self.state != ParseState::Failed {
            debug!(
                message_type = ?self.message_type,
                state = ?self.state,
                %error,
                "parser failed"
            );
            self.state = ParseState::Failed;
            listener.on_error(&self.message, &error);
        }
        error
    }

    fn unexpected(&self, byte: u8, position: usize) -> Error {
        Error::ParseError {
            state: self.state,
            byte,
            position,
        }
    }

    fn append(&mut self, byte: u8) -> Result<()> {
        if self.buffer.len() >= MAX_TOKEN_BYTES {
            return Err(Error::TokenTooLong(MAX_TOKEN_BYTES));
        }
        self.buffer.push(byte);
        Ok(())
    }

    // Only ASCII ever reaches the buffer, so this is lossless.
    fn consume(&mut self) -> String {
        let token = self.buffer.iter().map(|&b| b as char).collect();
        self.buffer.clear();
        token
    }

    fn parse<L: MessageListener>(&mut self, bytes: &[u8], listener: &mut L) -> Result<()> {
        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];
            match self.state {
                ParseState::RequestStart => {
                    if !chars::is_upper_case(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    let pending = PendingRequest::default();
                    self.queue.push(pending.clone());
                    self.pending = Some(pending);
                    self.append(byte)?;
                    self.state = ParseState::Method;
                }
                ParseState::Method => {
                    if chars::is_upper_case(byte) {
                        self.append(byte)?;
                    } else if byte == SP {
                        let method = self.consume();
                        if let HttpMessage::Request(request) = &mut self.message {
                            request.method = method;
                        }
                        self.state = ParseState::RequestTarget;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::RequestTarget => {
                    if chars::is_vchar(byte) {
                        self.append(byte)?;
                    } else if byte == SP && !self.buffer.is_empty() {
                        let url = self.consume();
                        if let HttpMessage::Request(request) = &mut self.message {
                            request.url = url;
                        }
                        self.state = ParseState::HttpVersion;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::HttpVersion => {
                    if chars::is_vchar(byte) {
                        self.append(byte)?;
                    } else if chars::is_cr(byte) && !self.buffer.is_empty() {
                        let version = self.consume();
                        if let HttpMessage::Request(request) = &mut self.message {
                            request.http_version = version;
                        }
                        self.state = ParseState::RequestLineEnding;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::RequestLineEnding | ParseState::StatusLineEnding => {
                    if !chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.state = ParseState::HeaderStart;
                }
                ParseState::ResponseStart => {
                    if !chars::is_vchar(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.append(byte)?;
                    self.state = ParseState::ResponseVersion;
                }
                ParseState::ResponseVersion => {
                    if chars::is_vchar(byte) {
                        self.append(byte)?;
                    } else if byte == SP && !self.buffer.is_empty() {
                        let version = self.consume();
                        if let HttpMessage::Response(response) = &mut self.message {
                            response.http_version = version;
                        }
                        self.state = ParseState::StatusCode;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::StatusCode => {
                    if chars::is_digit(byte) && self.buffer.len() < MAX_STATUS_CODE_DIGITS {
                        self.append(byte)?;
                    } else if byte == SP && !self.buffer.is_empty() {
                        let status_code: u16 = self.consume().parse()?;
                        let request = if status_code >= 200 || status_code == 101 {
                            Some(self.dequeue_request()?)
                        } else {
                            None
                        };
                        if let HttpMessage::Response(response) = &mut self.message {
                            response.status_code = status_code;
                            response.request = request;
                        }
                        self.state = ParseState::ReasonPhrase;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::ReasonPhrase => {
                    if chars::is_vchar(byte) || chars::is_ows(byte) {
                        self.append(byte)?;
                    } else if chars::is_cr(byte) {
                        let reason = self.consume();
                        if let HttpMessage::Response(response) = &mut self.message {
                            response.reason = reason;
                        }
                        self.state = ParseState::StatusLineEnding;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::HeaderStart => {
                    if chars::is_tchar(byte) {
                        self.append(chars::to_lower(byte))?;
                        self.state = ParseState::HeaderName;
                    } else if chars::is_cr(byte) {
                        self.state = ParseState::HeadersEnding;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::HeaderName => {
                    if chars::is_tchar(byte) {
                        self.append(chars::to_lower(byte))?;
                    } else if byte == COLON {
                        self.header_name = self.consume();
                        self.state = ParseState::HeaderNameEnded;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::HeaderNameEnded => {
                    if chars::is_ows(byte) {
                        // leading whitespace
                    } else if chars::is_vchar(byte) {
                        self.append(byte)?;
                        self.state = ParseState::HeaderValue;
                    } else if chars::is_cr(byte) {
                        self.state = ParseState::HeaderValueEnding;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::HeaderValue => {
                    if chars::is_vchar(byte) || chars::is_ows(byte) {
                        self.append(byte)?;
                    } else if chars::is_cr(byte) {
                        self.state = ParseState::HeaderValueEnding;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::HeaderValueEnding => {
                    if !chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.add_header();
                    self.state = ParseState::HeaderStart;
                }
                ParseState::HeadersEnding => {
                    if !chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.on_headers_ended(listener)?;
                }
                ParseState::FixedSizeBody => {
                    i += self.send_body_bytes(listener, &bytes[i..], BodyBytesType::Content)?;
                    if self.remaining == 0 {
                        self.end_message(listener)?;
                    }
                    continue;
                }
                ParseState::UnspecifiedBody => {
                    i += self.send_body_bytes(listener, &bytes[i..], BodyBytesType::Content)?;
                    continue;
                }
                ParseState::ChunkStart => {
                    if !chars::is_hex_digit(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.encoding_from = Some(i);
                    self.append(byte)?;
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkSize => {
                    if chars::is_hex_digit(byte) && self.buffer.len() < MAX_CHUNK_SIZE_DIGITS {
                        self.append(byte)?;
                    } else if byte == SEMICOLON {
                        self.state = ParseState::ChunkExtensions;
                    } else if chars::is_cr(byte) {
                        self.state = ParseState::ChunkHeaderEnding;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                // Extensions are skipped unparsed; only a bare LF is rejected.
                ParseState::ChunkExtensions => {
                    if chars::is_cr(byte) {
                        self.state = ParseState::ChunkHeaderEnding;
                    } else if chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::ChunkHeaderEnding => {
                    if !chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    let size = u64::from_str_radix(&self.consume(), 16)?;
                    self.send_encoding(listener, bytes, i)?;
                    if size == 0 {
                        self.state = ParseState::LastChunk;
                    } else {
                        self.remaining = size;
                        self.state = ParseState::ChunkData;
                    }
                }
                ParseState::ChunkData => {
                    i += self.send_body_bytes(listener, &bytes[i..], BodyBytesType::Content)?;
                    if self.remaining == 0 {
                        self.state = ParseState::ChunkDataEnding;
                    }
                    continue;
                }
                ParseState::ChunkDataEnding => {
                    if !chars::is_cr(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.encoding_from = Some(i);
                    self.state = ParseState::ChunkDataLineEnding;
                }
                ParseState::ChunkDataLineEnding => {
                    if !chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.send_encoding(listener, bytes, i)?;
                    self.state = ParseState::ChunkStart;
                }
                ParseState::LastChunk => {
                    if chars::is_cr(byte) {
                        self.append(byte)?;
                        self.state = ParseState::ChunkedBodyEnding;
                    } else if chars::is_tchar(byte) {
                        self.append(byte)?;
                        self.state = ParseState::Trailers;
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::ChunkedBodyEnding => {
                    if !chars::is_lf(byte) {
                        return Err(self.unexpected(byte, i));
                    }
                    self.append(byte)?;
                    self.send_trailers(listener)?;
                }
                ParseState::Trailers => {
                    if chars::is_vchar(byte) || chars::is_ows(byte) || chars::is_cr(byte) {
                        self.append(byte)?;
                    } else if chars::is_lf(byte) {
                        self.append(byte)?;
                        if self.buffer.ends_with(b"\r\n\r\n") {
                            self.send_trailers(listener)?;
                        }
                    } else {
                        return Err(self.unexpected(byte, i));
                    }
                }
                ParseState::Websocket => {
                    listener.on_body_bytes(&self.message, BodyBytesType::Encoding, &bytes[i..])?;
                    i = bytes.len();
                    continue;
                }
                ParseState::Failed => return Err(Error::ParserFailed),
            }
            i += 1;
        }

        // Chunk framing still in progress: report what this feed holds of it
        // and continue from the start of the next one.
        if let Some(start) = self.encoding_from {
            if start < bytes.len() {
                listener.on_body_bytes(&self.message, BodyBytesType::Encoding, &bytes[start..])?;
            }
            self.encoding_from = Some(0);
        }
        Ok(())
    }

    fn dequeue_request(&self) -> Result<HttpRequest> {
        let pending = self
            .queue
            .pop()
            .ok_or_else(|| Error::Pairing("got a response without a request".into()))?;
        pending.request().ok_or_else(|| {
            Error::Pairing("got a response before its request headers were complete".into())
        })
    }

    fn add_header(&mut self) {
        let name = mem::take(&mut self.header_name);
        let value = self.consume();
        let value = value.trim_end_matches(|c| c == ' ' || c == '\t');
        if value.is_empty() {
            debug!(header = %name, "discarding header with an empty value");
        } else {
            self.message.headers_mut().add(name, value);
        }
    }

    fn on_headers_ended<L: MessageListener>(&mut self, listener: &mut L) -> Result<()> {
        let body_size = self.message.body_size()?;
        if let (Some(pending), HttpMessage::Request(request)) = (&self.pending, &self.message) {
            pending.complete(request);
        }
        debug!(
            message_type = ?self.message_type,
            ?body_size,
            headers = self.message.headers().len(),
            "headers ended"
        );
        match body_size {
            BodySize::FixedSize(length) => {
                self.remaining = length;
                self.state = ParseState::FixedSizeBody;
            }
            BodySize::Chunked => self.state = ParseState::ChunkStart,
            BodySize::Unspecified => {
                self.remaining = u64::MAX;
                self.state = ParseState::UnspecifiedBody;
            }
            BodySize::None => {}
        }
        listener.on_headers(&mut self.message)?;
        // Refill with the listener's edits. A response parsed before this
        // point keeps the request as received.
        if let (Some(pending), HttpMessage::Request(request)) = (&self.pending, &self.message) {
            pending.complete(request);
        }
        if body_size == BodySize::None {
            self.end_message(listener)?;
        }
        Ok(())
    }

    /// Reports as many of `available` as the current body still expects.
    fn send_body_bytes<L: MessageListener>(
        &mut self,
        listener: &mut L,
        available: &[u8],
        kind: BodyBytesType,
    ) -> Result<usize> {
        let count = if (available.len() as u64) < self.remaining {
            available.len()
        } else {
            self.remaining as usize
        };
        if count > 0 {
            listener.on_body_bytes(&self.message, kind, &available[..count])?;
            self.remaining -= count as u64;
        }
        Ok(count)
    }

    /// Reports the chunk framing that ends at `end`, inclusive.
    fn send_encoding<L: MessageListener>(
        &mut self,
        listener: &mut L,
        bytes: &[u8],
        end: usize,
    ) -> Result<()> {
        let start = self.encoding_from.take().unwrap_or(0);
        listener.on_body_bytes(&self.message, BodyBytesType::Encoding, &bytes[start..=end])
    }

    fn send_trailers<L: MessageListener>(&mut self, listener: &mut L) -> Result<()> {
        let trailers = mem::take(&mut self.buffer);
        listener.on_body_bytes(&self.message, BodyBytesType::Trailers, &trailers)?;
        self.buffer = trailers;
        self.buffer.clear();
        self.end_message(listener)
    }

    fn end_message<L: MessageListener>(&mut self, listener: &mut L) -> Result<()> {
        let informational = match &self.message {
            HttpMessage::Response(response) => {
                response.is_informational() && response.status_code != 101
            }
            HttpMessage::Request(_) => false,
        };
        if !informational {
            listener.on_message_ended(&self.message)?;
        }
        if self.message.is_websocket_upgrade() {
            debug!(message_type = ?self.message_type, "switching to websocket");
            self.state = ParseState::Websocket;
        } else {
            self.reset();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = Self::start_state(self.message_type);
        self.message = HttpMessage::empty(self.message_type);
        self.pending = None;
        self.buffer.clear();
        self.header_name.clear();
        self.remaining = 0;
        self.encoding_from = None;
    }
}



#[cfg(test)]
mod chunked_tests {
    use super::test_listener::RecordingListener;
    use super::*;
    use proptest::prelude::*;

    const WIKI: &[u8] = b"POST /wiki HTTP/1.1\r\nhost: example.org\r\n\
        transfer-encoding: chunked\r\n\r\n\
        4\r\nWiki\r\n\
        5;ext=\"value\" ; another\r\npedia\r\n\
        E\r\n in\r\n\r\nchunks.\r\n\
        0\r\ntrailer: hello\r\nx-checksum: abc\r\n\r\n";

    const WIKI_CONTENT: &[u8] = b"Wikipedia in\r\n\r\nchunks.";

    fn head_len(message: &[u8]) -> usize {
        message.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4
    }

    fn feed_in_pieces(input: &[u8], pieces: &[usize]) -> RecordingListener {
        let mut parser = Http1MessageParser::new(HttpMessageType::Request, RequestQueue::new());
        let mut listener = RecordingListener::default();
        let mut start = 0;
        for &end in pieces.iter().chain(std::iter::once(&input.len())) {
            parser.feed(&input[start..end], &mut listener).unwrap();
            start = end;
        }
        parser.eof(&mut listener).unwrap();
        assert_eq!(parser.state(), ParseState::RequestStart);
        listener
    }

    fn feed_every(input: &[u8], piece_size: usize) -> RecordingListener {
        let pieces: Vec<usize> = (1..)
            .map(|n| n * piece_size)
            .take_while(|&end| end < input.len())
            .collect();
        feed_in_pieces(input, &pieces)
    }

    fn check(input: &[u8], listener: &RecordingListener) {
        assert_eq!(listener.body, &input[head_len(input)..]);
        assert_eq!(listener.content, WIKI_CONTENT);
        assert_eq!(
            listener.trailers,
            b"trailer: hello\r\nx-checksum: abc\r\n\r\n".to_vec()
        );
        let trailers = listener.trailer_headers();
        assert_eq!(trailers.len(), 2);
        assert_eq!(trailers.get("trailer"), Some("hello"));
        assert_eq!(
            listener.events.iter().filter(|e| *e == "Message ended").count(),
            1
        );
    }

    #[test]
    fn whole_message_in_one_buffer() {
        check(WIKI, &feed_in_pieces(WIKI, &[]));
    }

    #[test]
    fn various_piece_sizes() {
        for &size in &[1, 2, 3, 11, 20, 1000] {
            check(WIKI, &feed_every(WIKI, size));
        }
    }

    #[test]
    fn every_two_piece_split() {
        for split in 1..WIKI.len() {
            check(WIKI, &feed_in_pieces(WIKI, &[split]));
        }
    }

    #[test]
    fn chunk_crossing_a_read_buffer_edge() {
        let mut input = b"POST / HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n".to_vec();
        let payload: Vec<u8> = (0..10_000u32).map(|i| b'a' + (i % 26) as u8).collect();
        input.extend_from_slice(format!("{:x}\r\n", payload.len()).as_bytes());
        input.extend_from_slice(&payload);
        input.extend_from_slice(b"\r\n0\r\n\r\n");

        let listener = feed_every(&input, 8192);
        assert_eq!(listener.content, payload);
        assert_eq!(listener.body, &input[head_len(&input)..]);
        assert_eq!(listener.trailers, b"\r\n");
    }

    #[test]
    fn body_event_types() {
        let input = b"POST / HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n\
            3;x=y\r\nabc\r\n0\r\n\r\n";
        let mut parser = Http1MessageParser::new(HttpMessageType::Request, RequestQueue::new());

        #[derive(Default)]
        struct Typed(Vec<(BodyBytesType, Vec<u8>)>);
        impl MessageListener for Typed {
            fn on_headers(&mut self, _: &mut HttpMessage) -> Result<()> {
                Ok(())
            }
            fn on_body_bytes(&mut self, _: &HttpMessage, kind: BodyBytesType, bytes: &[u8]) -> Result<()> {
                self.0.push((kind, bytes.to_vec()));
                Ok(())
            }
            fn on_message_ended(&mut self, _: &HttpMessage) -> Result<()> {
                Ok(())
            }
            fn on_error(&mut self, _: &HttpMessage, _: &Error) {}
        }

        let mut typed = Typed::default();
        parser.feed(input, &mut typed).unwrap();
        assert_eq!(
            typed.0,
            vec![
                (BodyBytesType::Encoding, b"3;x=y\r\n".to_vec()),
                (BodyBytesType::Content, b"abc".to_vec()),
                (BodyBytesType::Encoding, b"\r\n".to_vec()),
                (BodyBytesType::Encoding, b"0\r\n".to_vec()),
                (BodyBytesType::Trailers, b"\r\n".to_vec()),
            ]
        );
    }

    #[test]
    fn malformed_chunks() {
        let inputs: &[&[u8]] = &[
            b"g\r\n",
            b"3\r\nabcX",
            b"3\r\nabc\rX",
            b"0\r\n\x01",
            b"1\n",
            b"1;ext\n",
            b"12345678901234567\r\n",
        ];
        for input in inputs {
            let mut message =
                b"POST / HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n".to_vec();
            message.extend_from_slice(input);
            let mut parser =
                Http1MessageParser::new(HttpMessageType::Request, RequestQueue::new());
            let mut listener = RecordingListener::default();
            assert!(
                parser.feed(&message, &mut listener).is_err(),
                "input {:?}",
                String::from_utf8_lossy(input)
            );
            assert_eq!(listener.errors, 1);
        }
    }

    #[test]
    fn extensions_are_skipped_whatever_they_contain() {
        let input: &[u8] = b"POST / HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n\
                             3;n=\"caf\xe9\"\x01\r\nabc\r\n0\r\n\r\n";
        let listener = feed_in_pieces(input, &[]);
        assert_eq!(listener.errors, 0);
        assert_eq!(listener.content, b"abc");
        let body_start = input.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(listener.body, &input[body_start..]);
        assert_eq!(listener.events.last().unwrap(), "Message ended");
    }

    #[test]
    fn sixteen_digit_chunk_size_is_accepted() {
        let input = b"POST / HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n0000000000000002\r\nhi\r\n0\r\n\r\n";
        let listener = feed_in_pieces(input, &[]);
        assert_eq!(listener.content, b"hi");
    }

    proptest! {
        #[test]
        fn split_points_do_not_matter(splits in proptest::collection::vec(1..WIKI.len(), 0..12)) {
            let mut splits = splits;
            splits.sort_unstable();
            splits.dedup();
            let listener = feed_in_pieces(WIKI, &splits);
            prop_assert_eq!(&listener.body[..], &WIKI[head_len(WIKI)..]);
            prop_assert_eq!(&listener.content[..], WIKI_CONTENT);
            prop_assert_eq!(listener.trailer_headers().len(), 2);
        }
    }
}
