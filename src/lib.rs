//! A man-in-the-middle HTTP proxy with an incremental HTTP/1.x parser.
//!
//! See the `proxy` module for the proxy itself and the `interceptor` module
//! for the hooks it calls. The `parser` module can be used on its own:
//!
//! ```
//! use intercepting_proxy::error::{Error, Result};
//! use intercepting_proxy::parser::{BodyBytesType, Http1MessageParser, MessageListener, RequestQueue};
//! use intercepting_proxy::protocol::{HttpMessage, HttpMessageType};
//!
//! #[derive(Default)]
//! struct Collect {
//!     targets: Vec<String>,
//!     content: Vec<u8>,
//! }
//!
//! impl MessageListener for Collect {
//!     fn on_headers(&mut self, message: &mut HttpMessage) -> Result<()> {
//!         if let Some(request) = message.as_request() {
//!             self.targets.push(request.url.clone());
//!         }
//!         Ok(())
//!     }
//!
//!     fn on_body_bytes(&mut self, _: &HttpMessage, kind: BodyBytesType, bytes: &[u8]) -> Result<()> {
//!         if kind == BodyBytesType::Content {
//!             self.content.extend_from_slice(bytes);
//!         }
//!         Ok(())
//!     }
//!
//!     fn on_message_ended(&mut self, _: &HttpMessage) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn on_error(&mut self, _: &HttpMessage, _: &Error) {}
//! }
//!
//! let mut parser = Http1MessageParser::new(HttpMessageType::Request, RequestQueue::new());
//! let mut listener = Collect::default();
//! parser.feed(b"POST /a HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n3\r\nab", &mut listener).unwrap();
//! parser.feed(b"c\r\n0\r\n\r\nGET /b HTTP/1.1\r\n\r\n", &mut listener).unwrap();
//! parser.eof(&mut listener).unwrap();
//!
//! assert_eq!(listener.targets, vec!["/a", "/b"]);
//! assert_eq!(listener.content, b"abc");
//! ```

pub mod chars;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod parser;
pub mod pipe;
pub mod protocol;
pub mod proxy;
pub mod ssl;
