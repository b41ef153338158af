//! # HTTP Transport
//!
//! [`Transport`] is the seam between the client and the network: it takes a
//! built [`ApiRequest`] and hands back the raw response body. Interpreting
//! that body is the decoder's job, so the HTTP status is deliberately not
//! inspected here (the service answers 200 for failures too).
//!
//! [`HttpTransport`] is the production implementation on top of
//! `reqwest::blocking`. Every exchange is bounded by the configured timeout;
//! there is no retry at this level.

use log::debug;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client as HttpClient;
use std::fs::File;
use std::time::Duration;

use crate::api::{ApiRequest, Method, RequestBody};
use crate::common::{ClientError, Result};

/// Sends one request and returns the response body.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<Vec<u8>>;
}

/// Blocking HTTP transport rooted at the API base URL.
pub struct HttpTransport {
    /// API root without trailing slash
    base_url: String,
    http: HttpClient,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for `base_url` whose calls give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("➡️  {} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart { fields, file } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                // Streamed from disk; reqwest writes the boundary and content type.
                let source = File::open(&file.path)?;
                let length = source.metadata()?.len();
                let part = Part::reader_with_length(source, length)
                    .file_name(file.file_name.clone())
                    .mime_str("application/octet-stream")
                    .map_err(|e| self.map_error(e))?;
                builder.multipart(form.part(file.field.clone(), part))
            }
        };

        let response = builder.send().map_err(|e| self.map_error(e))?;
        let body = response.bytes().map_err(|e| self.map_error(e))?;
        debug!("⬅️  {} bytes from {}", body.len(), request.path);

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{self, Operation, Params};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    const LOGIN_REPLY: &str = r#"{"status": "success", "session": "abc"}"#;

    /// Answers one request with `body` and hands back the raw request.
    fn serve_once(body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(reply.as_bytes()).unwrap();
            request
        });
        (base_url, handle)
    }

    /// Reads headers plus a `Content-Length` or chunked body, lowercased.
    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw).to_lowercase();
            if let Some(end) = text.find("\r\n\r\n") {
                let head = &text[..end];
                let body = &raw[end + 4..];
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok());
                let complete = match length {
                    Some(length) => body.len() >= length,
                    None => !head.contains("chunked") || body.ends_with(b"0\r\n\r\n"),
                };
                if complete {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_lowercase()
    }

    #[test]
    fn test_form_body_carries_request_json() {
        let (base_url, server) = serve_once(LOGIN_REPLY);
        let transport = HttpTransport::new(&base_url, Duration::from_secs(5)).unwrap();
        let request = api::build(Operation::Login, Params::Login { api_key: "key123" }).unwrap();

        let body = transport.send(&request).unwrap();

        assert_eq!(body, LOGIN_REPLY.as_bytes());
        let captured = server.join().unwrap();
        assert!(captured.starts_with("post /api/login http/1.1"));
        assert!(captured.contains("content-type: application/x-www-form-urlencoded"));
        let (_, form) = captured.split_once("\r\n\r\n").unwrap();
        assert!(form.starts_with("request-json="));
        assert!(form.contains("key123"));
    }

    #[test]
    fn test_upload_is_streamed_as_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m31.fits");
        std::fs::write(&path, b"simple fake pixel data").unwrap();

        let (base_url, server) = serve_once(r#"{"status": "success", "subid": 7}"#);
        let transport = HttpTransport::new(&base_url, Duration::from_secs(5)).unwrap();
        let request = api::build(
            Operation::Upload,
            Params::Upload {
                session: "sess",
                file: &path,
            },
        )
        .unwrap();

        transport.send(&request).unwrap();

        let captured = server.join().unwrap();
        assert!(captured.starts_with("post /api/upload http/1.1"));
        assert!(captured.contains("content-type: multipart/form-data; boundary="));
        assert!(captured.contains(r#"name="request-json""#));
        assert!(captured.contains(r#"name="file"; filename="m31.fits""#));
        assert!(captured.contains("simple fake pixel data"));
    }

    #[test]
    fn test_silent_server_times_out() {
        // accepted by the OS backlog, never answered
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());
        let timeout = Duration::from_millis(300);
        let transport = HttpTransport::new(&base_url, timeout).unwrap();
        let request = api::build(Operation::JobStatus, Params::Id(1)).unwrap();

        let err = transport.send(&request).unwrap_err();

        assert!(matches!(err, ClientError::Timeout(t) if t == timeout));
        drop(listener);
    }

    #[test]
    fn test_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());
        drop(listener);

        let transport = HttpTransport::new(&base_url, Duration::from_secs(5)).unwrap();
        let request = api::build(Operation::JobStatus, Params::Id(1)).unwrap();

        let err = transport.send(&request).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
