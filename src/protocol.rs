//! HTTP/1.x message model shared by the parser, the proxy and interceptors.
use crate::chars;
use crate::error::{Error, Result};
use std::fmt;
use std::io;
use std::str;

/// Which side of an exchange a parser or message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMessageType {
    Request,
    Response,
}

/// Ordered header fields. Names are lowercased on insertion, duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    headers: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        HttpHeaders {
            headers: Vec::new(),
        }
    }

    pub fn add<K: AsRef<str>, V: Into<String>>(&mut self, name: K, value: V) {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
    }

    /// Replaces every value of `name` with a single value.
    pub fn set<K: AsRef<str>, V: Into<String>>(&mut self, name: K, value: V) {
        self.remove(name.as_ref());
        self.add(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a str> + 'b
    where
        'a: 'b,
    {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True when the first value of `name` is exactly `value`.
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.get(name) == Some(value)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length")?.parse().ok()
    }

    pub fn is_chunked(&self) -> bool {
        self.has_value("transfer-encoding", "chunked")
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self)
    }

    /// Parses a block of `name: value` lines separated by CRLF, such as a
    /// chunked trailer block. Blank lines are skipped.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let mut headers = HttpHeaders::new();
        for line in str::from_utf8(block)?.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            let colon = line
                .find(':')
                .ok_or_else(|| Error::InvalidHeader(format!("missing ':' in {:?}", line)))?;
            let name = &line[..colon];
            if name.is_empty() || !name.bytes().all(chars::is_tchar) {
                return Err(Error::InvalidHeader(format!("bad header name {:?}", name)));
            }
            let value = line[colon + 1..].trim_matches(|c| c == ' ' || c == '\t');
            if !value.is_empty() {
                headers.add(name, value);
            }
        }
        Ok(headers)
    }
}

impl fmt::Display for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod http_headers_tests {
    use super::HttpHeaders;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        let mut headers = HttpHeaders::new();
        for (name, value) in pairs {
            headers.add(name, *value);
        }
        headers
    }

    #[test]
    fn names_are_lowercased_and_order_kept() {
        let headers = headers(&[("Host", "example.org"), ("X-A", "1"), ("x-a", "2")]);
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![("host", "example.org"), ("x-a", "1"), ("x-a", "2")]
        );
        assert_eq!(headers.get("X-A"), Some("1"));
        assert_eq!(headers.get_all("x-a").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn values_outlive_the_name_looked_up() {
        let headers = headers(&[("Content-Type", "text/plain"), ("Accept", "a"), ("accept", "b")]);
        let content_type = {
            let name = String::from("CONTENT-TYPE");
            headers.get(&name)
        };
        assert_eq!(content_type, Some("text/plain"));
        let accepted: Vec<&str> = {
            let name = String::from("accept");
            headers.get_all(&name).collect()
        };
        assert_eq!(accepted, vec!["a", "b"]);
    }

    #[test]
    fn set_replaces_all_values() {
        let mut headers = headers(&[("a", "1"), ("b", "2"), ("a", "3")]);
        headers.set("A", "4");
        assert_eq!(headers.to_string(), "b: 2\r\na: 4\r\n");
    }

    #[test]
    fn remove() {
        let mut headers = headers(&[("a", "1"), ("b", "2"), ("a", "3")]);
        headers.remove("a");
        assert!(!headers.has("a"));
        assert!(headers.has("b"));
        headers.remove("b");
        assert!(headers.is_empty());
    }

    #[test]
    fn has_value_uses_first_value() {
        let headers = headers(&[("transfer-encoding", "gzip"), ("transfer-encoding", "chunked")]);
        assert!(headers.has_value("transfer-encoding", "gzip"));
        assert!(!headers.is_chunked());
        assert!(self::headers(&[("Transfer-Encoding", "chunked")]).is_chunked());
    }

    #[test]
    fn content_length() {
        assert_eq!(headers(&[("content-length", "42")]).content_length(), Some(42));
        assert_eq!(headers(&[("content-length", "x")]).content_length(), None);
        assert_eq!(headers(&[]).content_length(), None);
    }

    #[test]
    fn to_string() {
        assert_eq!(headers(&[("a", "b"), ("c", "d")]).to_string(), "a: b\r\nc: d\r\n");
        assert_eq!(headers(&[]).to_string(), "");
    }

    #[test]
    fn parse_trailer_block() {
        let actual = HttpHeaders::parse(b"trailer: hello\r\nX-Sum:  abc \r\nempty:\r\n\r\n").unwrap();
        assert_eq!(actual, headers(&[("trailer", "hello"), ("x-sum", "abc")]));
        assert!(HttpHeaders::parse(b"\r\n").unwrap().is_empty());
    }

    #[test]
    fn parse_failure() {
        assert!(HttpHeaders::parse(b"no colon here\r\n\r\n").is_err());
        assert!(HttpHeaders::parse(b": value\r\n\r\n").is_err());
        assert!(HttpHeaders::parse(b"bad name: value\r\n\r\n").is_err());
        assert!(HttpHeaders::parse(b"a: \xff\r\n").is_err());
    }
}

/// How the length of a message body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySize {
    /// Exactly this many bytes, always greater than zero.
    FixedSize(u64),
    Chunked,
    /// Everything until the connection closes.
    Unspecified,
    None,
}

fn fixed_body_length(value: &str) -> Result<BodySize> {
    if let Some(digits) = value.strip_prefix('-') {
        if !digits.is_empty() && digits.bytes().all(chars::is_digit) {
            return Err(Error::Framing(format!("negative content-length {}", value)));
        }
    }
    if value.is_empty() || !value.bytes().all(chars::is_digit) {
        return Err(Error::Framing(format!("invalid content-length {:?}", value)));
    }
    let length: u64 = value
        .parse()
        .map_err(|_| Error::Framing(format!("content-length {} is too large", value)))?;
    Ok(if length == 0 {
        BodySize::None
    } else {
        BodySize::FixedSize(length)
    })
}

fn body_size_from_headers(headers: &HttpHeaders, without_length: BodySize) -> Result<BodySize> {
    let lengths: Vec<&str> = headers.get_all("content-length").collect();
    if headers.is_chunked() {
        if !lengths.is_empty() {
            return Err(Error::Framing(format!(
                "chunked transfer-encoding with content-length {:?}",
                lengths
            )));
        }
        return Ok(BodySize::Chunked);
    }
    match lengths.as_slice() {
        [] => Ok(without_length),
        [length] => fixed_body_length(length),
        _ => Err(Error::Framing(format!(
            "multiple content-length headers {:?}",
            lengths
        ))),
    }
}

fn is_websocket_upgrade(headers: &HttpHeaders) -> bool {
    headers
        .get("upgrade")
        .map_or(false, |v| v.eq_ignore_ascii_case("websocket"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub headers: HttpHeaders,
}

impl HttpRequest {
    pub fn new<M: Into<String>, U: Into<String>, V: Into<String>>(
        method: M,
        url: U,
        http_version: V,
    ) -> Self {
        HttpRequest {
            method: method.into(),
            url: url.into(),
            http_version: http_version.into(),
            headers: HttpHeaders::new(),
        }
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        is_websocket_upgrade(&self.headers)
    }

    pub fn body_size(&self) -> Result<BodySize> {
        body_size_from_headers(&self.headers, BodySize::None)
    }

    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self)
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.url, self.http_version)?;
        write!(f, "{}", self.headers)?;
        write!(f, "\r\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod http_request_tests {
    use super::{BodySize, HttpRequest};

    fn request(headers: &[(&str, &str)]) -> HttpRequest {
        let mut request = HttpRequest::new("POST", "/upload", "HTTP/1.1");
        for (name, value) in headers {
            request.headers.add(name, *value);
        }
        request
    }

    #[test]
    fn to_string() {
        let mut request = HttpRequest::new("GET", "/a/b", "HTTP/1.1");
        request.headers.add("Host", "example.org");
        request.headers.add("C", "D");
        assert_eq!(
            request.to_string(),
            "GET /a/b HTTP/1.1\r\nhost: example.org\r\nc: D\r\n\r\n"
        );
        let mut out = vec![];
        request.write_to(&mut out).unwrap();
        assert_eq!(out, request.to_string().into_bytes());
    }

    #[test]
    fn body_size() {
        assert_eq!(request(&[]).body_size().unwrap(), BodySize::None);
        assert_eq!(
            request(&[("content-length", "0")]).body_size().unwrap(),
            BodySize::None
        );
        assert_eq!(
            request(&[("content-length", "12")]).body_size().unwrap(),
            BodySize::FixedSize(12)
        );
        assert_eq!(
            request(&[("transfer-encoding", "chunked")]).body_size().unwrap(),
            BodySize::Chunked
        );
    }

    #[test]
    fn body_size_errors() {
        assert!(request(&[("transfer-encoding", "chunked"), ("content-length", "3")])
            .body_size()
            .is_err());
        assert!(request(&[("content-length", "3"), ("content-length", "3")])
            .body_size()
            .is_err());
        assert!(request(&[("content-length", "-1")]).body_size().is_err());
        assert!(request(&[("content-length", "+1")]).body_size().is_err());
        assert!(request(&[("content-length", "abc")]).body_size().is_err());
        assert!(request(&[("content-length", "99999999999999999999999")])
            .body_size()
            .is_err());
    }

    #[test]
    fn websocket_upgrade() {
        assert!(request(&[("Upgrade", "websocket")]).is_websocket_upgrade());
        assert!(request(&[("upgrade", "WebSocket")]).is_websocket_upgrade());
        assert!(!request(&[("upgrade", "h2c")]).is_websocket_upgrade());
        assert!(!request(&[]).is_websocket_upgrade());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// The request this response answers, as it was received from the client.
    /// Informational responses other than 101 have none.
    pub request: Option<HttpRequest>,
    pub http_version: String,
    pub status_code: u16,
    pub reason: String,
    pub headers: HttpHeaders,
}

impl HttpResponse {
    pub fn new<V: Into<String>, R: Into<String>>(
        request: Option<HttpRequest>,
        http_version: V,
        status_code: u16,
        reason: R,
    ) -> Self {
        HttpResponse {
            request,
            http_version: http_version.into(),
            status_code,
            reason: reason.into(),
            headers: HttpHeaders::new(),
        }
    }

    pub fn is_informational(&self) -> bool {
        self.status_code / 100 == 1
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.status_code == 101 && is_websocket_upgrade(&self.headers)
    }

    pub fn body_size(&self) -> Result<BodySize> {
        if self.is_informational() || self.status_code == 204 || self.status_code == 304 {
            return Ok(BodySize::None);
        }
        let request = self.request.as_ref().ok_or_else(|| {
            Error::Pairing(format!(
                "cannot frame a {} response without its request",
                self.status_code
            ))
        })?;
        if request.method == "HEAD" {
            return Ok(BodySize::None);
        }
        if request.method == "CONNECT" && self.status_code / 100 == 2 {
            return Ok(BodySize::Unspecified);
        }
        body_size_from_headers(&self.headers, BodySize::Unspecified)
    }

    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self)
    }
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}\r\n",
            self.http_version, self.status_code, self.reason
        )?;
        write!(f, "{}", self.headers)?;
        write!(f, "\r\n")?;
        Ok(())
    }
}


/// A request or a response, as handed to parser listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMessage {
    Request(HttpRequest),
    Response(HttpResponse),
}

impl HttpMessage {
    pub fn empty(message_type: HttpMessageType) -> Self {
        match message_type {
            HttpMessageType::Request => HttpMessage::Request(HttpRequest::default()),
            HttpMessageType::Response => HttpMessage::Response(HttpResponse::default()),
        }
    }

    pub fn message_type(&self) -> HttpMessageType {
        match self {
            HttpMessage::Request(_) => HttpMessageType::Request,
            HttpMessage::Response(_) => HttpMessageType::Response,
        }
    }

    pub fn headers(&self) -> &HttpHeaders {
        match self {
            HttpMessage::Request(r) => &r.headers,
            HttpMessage::Response(r) => &r.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        match self {
            HttpMessage::Request(r) => &mut r.headers,
            HttpMessage::Response(r) => &mut r.headers,
        }
    }

    pub fn http_version(&self) -> &str {
        match self {
            HttpMessage::Request(r) => &r.http_version,
            HttpMessage::Response(r) => &r.http_version,
        }
    }

    pub fn body_size(&self) -> Result<BodySize> {
        match self {
            HttpMessage::Request(r) => r.body_size(),
            HttpMessage::Response(r) => r.body_size(),
        }
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        match self {
            HttpMessage::Request(r) => r.is_websocket_upgrade(),
            HttpMessage::Response(r) => r.is_websocket_upgrade(),
        }
    }

    pub fn as_request(&self) -> Option<&HttpRequest> {
        match self {
            HttpMessage::Request(r) => Some(r),
            HttpMessage::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&HttpResponse> {
        match self {
            HttpMessage::Request(_) => None,
            HttpMessage::Response(r) => Some(r),
        }
    }

    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            HttpMessage::Request(r) => r.write_to(out),
            HttpMessage::Response(r) => r.write_to(out),
        }
    }
}

impl fmt::Display for HttpMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpMessage::Request(r) => write!(f, "{}", r),
            HttpMessage::Response(r) => write!(f, "{}", r),
        }
    }
}
