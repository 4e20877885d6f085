//! Blocking JSON POST shared by the network backends and the webhook sinks.
//!
//! Requests run on a scoped worker thread that the caller joins. The panic
//! hook can fire on an async runtime worker, and reqwest's blocking client
//! must not be created, driven or dropped there.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use std::thread;
use std::time::Duration;

/// Default bound on every outbound request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level failure of a [`JsonPost`]
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("HTTP worker thread panicked")]
    WorkerPanicked,
}

/// Status and raw body of a completed request
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

/// A single JSON POST
#[derive(Debug, Clone, Copy)]
pub struct JsonPost<'a> {
    url: &'a str,
    bearer: Option<&'a str>,
    query: &'a [(&'a str, &'a str)],
    timeout: Option<Duration>,
}

impl<'a> JsonPost<'a> {
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            bearer: None,
            query: &[],
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Builder: send `Authorization: Bearer <token>`
    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    /// Builder: append query parameters
    pub fn query(mut self, query: &'a [(&'a str, &'a str)]) -> Self {
        self.query = query;
        self
    }

    /// Builder: request timeout (`None` waits forever)
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `body` and wait for the reply.
    ///
    /// Any status is returned as a reply; only transport failures are errors.
    pub fn send<T: Serialize + Sync + ?Sized>(&self, body: &T) -> Result<HttpReply, HttpError> {
        thread::scope(|scope| {
            scope
                .spawn(|| self.send_blocking(body))
                .join()
                .unwrap_or(Err(HttpError::WorkerPanicked))
        })
    }

    fn send_blocking<T: Serialize + ?Sized>(&self, body: &T) -> Result<HttpReply, HttpError> {
        let client = Client::builder().timeout(self.timeout).build()?;

        let mut request = client
            .post(self.url)
            .header("Content-Type", "application/json")
            .json(body);
        if !self.query.is_empty() {
            request = request.query(self.query);
        }
        if let Some(token) = self.bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        Ok(HttpReply { status, body })
    }
}

/// Minimal HTTP/1.1 server for exercising outbound requests in tests
#[cfg(test)]
pub(crate) mod stub {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    /// One request as seen by the server
    #[derive(Debug)]
    pub struct CapturedRequest {
        pub request_line: String,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl CapturedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            let name = name.to_lowercase();
            self.headers
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).expect("request body is not JSON")
        }
    }

    pub struct StubServer {
        pub url: String,
        handle: JoinHandle<Vec<CapturedRequest>>,
    }

    impl StubServer {
        /// Serve `count` requests, answering each with `status` and `body`
        pub fn respond(status: u16, body: &str, count: usize) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
            let url = format!("http://{}", listener.local_addr().expect("local addr"));
            let body = body.to_string();

            let handle = thread::spawn(move || {
                let mut captured = Vec::new();
                for _ in 0..count {
                    let (mut stream, _) = listener.accept().expect("accept");
                    captured.push(read_request(&mut stream));
                    let reason = if status == 200 { "OK" } else { "Error" };
                    let reply = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason,
                        body.len(),
                        body
                    );
                    stream.write_all(reply.as_bytes()).expect("write reply");
                    stream.flush().expect("flush reply");
                }
                captured
            });

            Self { url, handle }
        }

        /// Wait for every expected request and return them
        pub fn finish(self) -> Vec<CapturedRequest> {
            self.handle.join().expect("stub server thread")
        }
    }

    fn read_request(stream: &mut TcpStream) -> CapturedRequest {
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_lowercase(), value.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).expect("request body");

        CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}
