//! Drives a parser from a blocking byte stream.
use crate::error::{Error, Result};
use crate::parser::{Http1MessageParser, MessageListener};
use std::io;
use tracing::trace;

pub const BUFFER_SIZE: usize = 8 * 1024;

/// Reads `source` until it ends, feeding every read into `parser`.
///
/// The end of the stream is reported through `parser.eof`, as is an
/// `UnexpectedEof` read error. Other read errors fail the parser and are
/// returned. The listener is flushed after each read has been fed.
pub fn pipe<R: io::Read, L: MessageListener>(
    mut source: R,
    parser: &mut Http1MessageParser,
    listener: &mut L,
) -> Result<()> {
    let mut buffer = [0u8; BUFFER_SIZE];
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(parser.report_error(Error::from(e), listener)),
        };
        trace!(read, "piping bytes");
        parser.feed(&buffer[..read], listener)?;
        if let Err(e) = listener.flush() {
            return Err(parser.report_error(e, listener));
        }
    }
    parser.eof(listener)?;
    listener.flush()
}
