// Copyright Staunch Contributors.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `http` module provides [`HttpTransport`], a [`Transport`] over HTTP/HTTPS that absorbs
//! transient failures by retrying, and resumes interrupted transfers where the server allows.

use crate::transport::{Transport, TransportError, TransportErrorKind};
use log::trace;
use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::header::{self, HeaderValue, ACCEPT_RANGES};
use snafu::{ResultExt, Snafu};
use std::io::Read;
use std::time::Duration;
use url::Url;

/// Configures an [`HttpTransport`] before it is built.
///
/// # Example
///
/// ```
/// # use staunch::http::HttpTransportBuilder;
/// let transport = HttpTransportBuilder::new()
///     .attempts(2)
///     .retry_delay_growth(2.0)
///     .build();
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HttpTransportBuilder {
    request_timeout: Duration,
    connect_timeout: Duration,
    attempts: u32,
    first_retry_delay: Duration,
    retry_delay_ceiling: Duration,
    retry_delay_growth: f32,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            attempts: 3,
            first_retry_delay: Duration::from_millis(250),
            retry_delay_ceiling: Duration::from_secs(3),
            retry_delay_growth: 2.0,
        }
    }
}

impl HttpTransportBuilder {
    /// Starts from the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the total time one request, body included, may take.
    #[must_use]
    pub fn request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Bounds how long establishing a connection may take.
    #[must_use]
    pub fn connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    /// How many times a request is attempted before the transport gives up. One means a single
    /// attempt with no retries.
    #[must_use]
    pub fn attempts(mut self, value: u32) -> Self {
        self.attempts = value;
        self
    }

    /// The pause before the first retry.
    #[must_use]
    pub fn first_retry_delay(mut self, value: Duration) -> Self {
        self.first_retry_delay = value;
        self
    }

    /// The longest pause between retries; the growing delay saturates here.
    #[must_use]
    pub fn retry_delay_ceiling(mut self, value: Duration) -> Self {
        self.retry_delay_ceiling = value;
        self
    }

    /// The multiplier applied to the pause after each retry.
    #[must_use]
    pub fn retry_delay_growth(mut self, value: f32) -> Self {
        self.retry_delay_growth = value;
        self
    }

    /// Builds the transport.
    pub fn build(self) -> HttpTransport {
        HttpTransport { settings: self }
    }

    fn client(&self) -> Result<Client, HttpError> {
        ClientBuilder::new()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .context(ClientBuildSnafu)
    }
}

/// A [`Transport`] over HTTP. Use [`HttpTransportBuilder`] to adjust the timeouts and retry
/// policy, or `HttpTransport::default()` for reasonable defaults.
///
/// Responses with status 403, 404, and 410 map to [`TransportErrorKind::FileNotFound`] (some
/// object stores answer 403 for objects that do not exist), which the update workflow relies
/// on to detect the end of the root version chain. Server errors, timeouts, and connection
/// failures are retried with a growing delay; when the connection drops mid-body and the
/// server advertised `Accept-Ranges: bytes`, the transfer picks up at the first byte the
/// caller has not seen.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpTransport {
    settings: HttpTransportBuilder,
}

impl Transport for HttpTransport {
    fn fetch(&self, url: Url) -> Result<Box<dyn Read + Send>, TransportError> {
        let client = self
            .settings
            .client()
            .map_err(|e| (url.clone(), e))?;
        let response = request_with_retries(&client, &self.settings, &url, 0)
            .map_err(|e| (url.clone(), e))?;

        let can_resume = accepts_byte_ranges(&response);
        Ok(Box::new(RetryRead {
            client,
            settings: self.settings,
            response,
            url,
            received: 0,
            recoveries_left: self.settings.attempts.saturating_sub(1),
            can_resume,
        }))
    }
}

/// Reads an HTTP response body, re-requesting the remainder when the body stream fails
/// underneath the caller.
struct RetryRead {
    client: Client,
    settings: HttpTransportBuilder,
    response: Response,
    url: Url,
    /// Bytes already handed to the caller, which a recovery must not replay.
    received: u64,
    recoveries_left: u32,
    can_resume: bool,
}

impl Read for RetryRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match self.response.read(buf) {
                Ok(count) => {
                    self.received += count as u64;
                    return Ok(count);
                }
                // Without range support, a recovery mid-body would replay bytes the caller
                // already consumed.
                Err(err) if self.recoveries_left == 0 || (self.received > 0 && !self.can_resume) => {
                    return Err(err);
                }
                Err(err) => {
                    self.recoveries_left -= 1;
                    trace!(
                        "picking '{}' back up at byte {} after: {}",
                        self.url,
                        self.received,
                        err
                    );
                    self.response =
                        request_with_retries(&self.client, &self.settings, &self.url, self.received)
                            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                }
            }
        }
    }
}

/// Issues GET requests for `url` until one is streaming, the file turns out not to exist, the
/// failure is one a retry cannot fix, or the attempt budget runs out. A nonzero `resume_from`
/// asks the server for the body starting at that byte.
fn request_with_retries(
    client: &Client,
    settings: &HttpTransportBuilder,
    url: &Url,
    resume_from: u64,
) -> Result<Response, HttpError> {
    let mut delay = settings.first_retry_delay;
    let mut attempt: u32 = 1;
    loop {
        let mut request = client.get(url.as_str());
        if resume_from > 0 {
            let value = format!("bytes={resume_from}-");
            let range = HeaderValue::from_str(&value).context(RangeHeaderSnafu { value: &value })?;
            request = request.header(header::RANGE, range);
        }

        let disposition = match request.send() {
            Ok(response) => classify_response(response),
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                Disposition::Transient(e)
            }
            Err(e) => Disposition::Permanent(e),
        };

        match disposition {
            Disposition::Streaming(response) => {
                trace!("'{url}' is streaming on attempt {attempt}");
                return Ok(response);
            }
            Disposition::Missing(e) => {
                trace!("'{url}' does not exist on the repository: {e}");
                return Err(HttpError::NotFound { source: e });
            }
            Disposition::Permanent(e) => {
                trace!("giving up on '{url}', retrying would not help: {e}");
                return Err(HttpError::Request { source: e });
            }
            Disposition::Transient(e) => {
                trace!("attempt {attempt} on '{url}' failed, worth another try: {e}");
                if attempt >= settings.attempts.max(1) {
                    return Err(HttpError::RetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                std::thread::sleep(delay);
                delay = settings.retry_delay_ceiling.min(delay.mul_f32(settings.retry_delay_growth));
                attempt += 1;
            }
        }
    }
}

/// What one request outcome means for the retry loop.
enum Disposition {
    /// A successful response whose body is ready to read.
    Streaming(Response),
    /// The server says the file is not there (403, 404 or 410).
    Missing(reqwest::Error),
    /// Worth retrying: server errors, timeouts, connection-level failures.
    Transient(reqwest::Error),
    /// Retrying would reproduce the failure.
    Permanent(reqwest::Error),
}

fn classify_response(response: Response) -> Disposition {
    match response.error_for_status() {
        Ok(streaming) => Disposition::Streaming(streaming),
        Err(e) => match e.status() {
            Some(status) if [403, 404, 410].contains(&status.as_u16()) => Disposition::Missing(e),
            Some(status) if status.is_server_error() => Disposition::Transient(e),
            _ => Disposition::Permanent(e),
        },
    }
}

fn accepts_byte_ranges(response: &Response) -> bool {
    response
        .headers()
        .get_all(ACCEPT_RANGES)
        .iter()
        .any(|value| value.to_str().is_ok_and(|v| v.contains("bytes")))
}

/// The error type for the HTTP transport module.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum HttpError {
    #[snafu(display("The HTTP client could not be built: {}", source))]
    ClientBuild { source: reqwest::Error },

    #[snafu(display("The requested file was not found: {}", source))]
    NotFound { source: reqwest::Error },

    #[snafu(display("Invalid byte range header '{}': {}", value, source))]
    RangeHeader {
        value: String,
        source: reqwest::header::InvalidHeaderValue,
    },

    #[snafu(display("Request failed: {}", source))]
    Request { source: reqwest::Error },

    #[snafu(display("Request still failing after {} attempts: {}", attempts, source))]
    RetriesExhausted { attempts: u32, source: reqwest::Error },
}

/// Converts a `Url` and an [`HttpError`] into a [`TransportError`], preserving the
/// file-not-found distinction the update workflow depends on.
impl From<(Url, HttpError)> for TransportError {
    fn from((url, e): (Url, HttpError)) -> Self {
        let kind = match e {
            HttpError::NotFound { .. } => TransportErrorKind::FileNotFound,
            _ => TransportErrorKind::Other,
        };
        TransportError::new(kind, url, e)
    }
}
