use std::{borrow::Cow, collections::BTreeSet, fmt, fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use itertools::Itertools;
use url::{Host, Url};

use crate::core::{
    env::{Config, Os},
    error::{ConfigurationError, Result},
    wait::{poll::PollLoop, StrategyKind, WaitStrategy},
    WaitTarget,
};

type StatusCodeMatcher = Arc<dyn Fn(u16) -> bool + Send + Sync + 'static>;
type ResponsePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync + 'static>;

/// Represents a strategy for waiting for a certain HTTP response.
///
/// By default, `GET /` is sent to the first exposed port until it answers with status 200.
#[derive(Clone)]
pub struct HttpWaitStrategy {
    client: Option<reqwest::Client>,
    path: String,
    port: Option<u16>,
    method: reqwest::Method,
    headers: reqwest::header::HeaderMap,
    body: Option<Bytes>,
    auth: Option<Auth>,
    use_tls: bool,
    allow_insecure: bool,
    read_timeout: Duration,
    status_codes: BTreeSet<u16>,
    status_code_matcher: Option<StatusCodeMatcher>,
    response_predicate: Option<ResponsePredicate>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

#[derive(Clone)]
enum Auth {
    Basic { username: String, password: String },
    Bearer(String),
}

impl Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Why a single HTTP attempt did not count as ready.
#[derive(Debug)]
enum Miss {
    Status(u16),
    Body(u16),
    Request(reqwest::Error),
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Miss::Status(status) => write!(f, "last response status was {status}"),
            Miss::Body(status) => write!(
                f,
                "last response (status {status}) did not match the response predicate"
            ),
            Miss::Request(err) => write!(f, "last request failed: {err}"),
        }
    }
}

impl HttpWaitStrategy {
    /// Create a new `HttpWaitStrategy` for the given resource path (using GET method by default).
    pub fn new(path: impl Into<String>) -> Self {
        let config = Config::load::<Os>();
        Self {
            client: None,
            path: path.into(),
            port: None,
            method: reqwest::Method::GET,
            headers: Default::default(),
            body: None,
            auth: None,
            use_tls: false,
            allow_insecure: false,
            read_timeout: Duration::from_secs(1),
            status_codes: BTreeSet::new(),
            status_code_matcher: None,
            response_predicate: None,
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(Duration::from_millis(500)),
        }
    }

    /// Set the port to be used for the request.
    ///
    /// The container port is mapped to its host port. By default, the lowest exposed port is used.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the custom client for the request.
    ///
    /// Allows to customize the client, enabling features like proxies or custom root certificates.
    /// The TLS and read timeout settings of this strategy do not apply to a custom client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set method for the request.
    pub fn with_method(mut self, method: reqwest::Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header to the request.
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: reqwest::header::IntoHeaderName,
        V: Into<reqwest::header::HeaderValue>,
    {
        self.headers.insert(key, value.into());
        self
    }

    /// Add several headers to the request.
    pub fn with_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the body for the request.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the basic auth for the request.
    /// Overwrites any previously set Authorization header.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = Some(Auth::Basic {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the bearer token for the request.
    /// Overwrites any previously set Authorization header.
    pub fn with_bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Auth::Bearer(token.into()));
        self
    }

    /// Use TLS for the request.
    ///
    /// This will use `https` scheme for the request.
    pub fn with_tls(mut self) -> Self {
        self.use_tls = true;
        self
    }

    /// Accept any certificate presented by the container, including self-signed ones.
    pub fn with_allow_insecure(mut self) -> Self {
        self.allow_insecure = true;
        self
    }

    /// Set the time a single request may take. Must be at least 1 millisecond.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Wait for expected status code.
    ///
    /// Can be called several times, any of the given status codes is accepted.
    pub fn with_expected_status_code(mut self, status: impl Into<u16>) -> Self {
        self.status_codes.insert(status.into());
        self
    }

    /// Wait for a status code accepted by the given matcher.
    ///
    /// Combined with [`HttpWaitStrategy::with_expected_status_code`], a status is accepted if
    /// either of them accepts it.
    pub fn with_status_code_matcher<Matcher>(mut self, matcher: Matcher) -> Self
    where
        Matcher: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.status_code_matcher = Some(Arc::new(matcher));
        self
    }

    /// Wait for a response body accepted by the given predicate.
    ///
    /// The body is only checked for responses with an accepted status code.
    pub fn with_response_predicate<Predicate>(mut self, predicate: Predicate) -> Self
    where
        Predicate: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.response_predicate = Some(Arc::new(predicate));
        self
    }

    /// Set the maximum time to wait for the expected response.
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Set the poll interval for the wait strategy.
    ///
    /// This is the time to wait between each poll for the expected condition to be met.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn status_matches(&self, status: u16) -> bool {
        if self.status_codes.is_empty() && self.status_code_matcher.is_none() {
            return status == 200;
        }

        self.status_codes.contains(&status)
            || self
                .status_code_matcher
                .as_ref()
                .is_some_and(|matcher| matcher(status))
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.allow_insecure)
            .timeout(self.read_timeout)
            .build()
            .map_err(|err| ConfigurationError::HttpClient(err.to_string()))?;
        Ok(client)
    }

    fn request(&self, client: &reqwest::Client, url: &Url) -> reqwest::RequestBuilder {
        let mut request = client
            .request(self.method.clone(), url.clone())
            .headers(self.headers.clone());

        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        if let Some(auth) = &self.auth {
            match auth {
                Auth::Basic { username, password } => {
                    request = request.basic_auth(username, Some(password));
                }
                Auth::Bearer(token) => {
                    request = request.bearer_auth(token);
                }
            }
        }

        request
    }

    async fn check(&self, client: &reqwest::Client, url: &Url) -> std::result::Result<(), Miss> {
        let response = self.request(client, url).send().await.map_err(Miss::Request)?;
        let status = response.status().as_u16();
        if !self.status_matches(status) {
            return Err(Miss::Status(status));
        }

        if let Some(predicate) = &self.response_predicate {
            let body = response.text().await.map_err(Miss::Request)?;
            if !predicate(&body) {
                return Err(Miss::Body(status));
            }
        }

        Ok(())
    }

    fn expectation(&self) -> String {
        match (self.status_codes.is_empty(), self.status_code_matcher.is_some()) {
            (true, false) => "200".to_owned(),
            (true, true) => "a matching status".to_owned(),
            (false, false) => self.status_codes.iter().join(" or "),
            (false, true) => format!(
                "{} or a matching status",
                self.status_codes.iter().join(" or ")
            ),
        }
    }
}

impl Default for HttpWaitStrategy {
    fn default() -> Self {
        Self::new("/")
    }
}

#[async_trait]
impl WaitStrategy for HttpWaitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Http
    }

    fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError> {
        self.startup_timeout = timeout;
        Ok(())
    }

    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()> {
        if self.read_timeout < Duration::from_millis(1) {
            return Err(
                ConfigurationError::ReadTimeoutTooShort(self.read_timeout).into(),
            );
        }

        let host_port = match self.port {
            Some(port) => target.mapped_port(port).await?,
            None => match target.liveness_check_ports().await?.first() {
                Some(port) => *port,
                None => {
                    log::warn!(
                        "{}: No exposed or mapped ports, cannot wait for HTTP status",
                        target.container_id()
                    );
                    return Ok(());
                }
            },
        };

        let host = target.host().await?;
        let url = liveness_url(&host, host_port, self.use_tls, &self.path)
            .map_err(ConfigurationError::from)?;
        let client = self.build_client()?;

        log::info!(
            "{}: Waiting for {:?} for URL: {url} (expecting HTTP {})",
            target.container_id(),
            self.startup_timeout,
            self.expectation()
        );

        let mut poll = PollLoop::start(self.kind(), self.startup_timeout, self.poll_interval);
        loop {
            let miss = match self.check(&client, &url).await {
                Ok(()) => {
                    log::info!("{}: URL {url} is accessible", target.container_id());
                    return Ok(());
                }
                Err(miss) => miss,
            };

            let detail = format!("{url} should return HTTP {}, {miss}", self.expectation());
            poll.retry(detail).await?;
        }
    }
}

/// Builds the URL requested on `host:port`, leaving out the port if it is the scheme's default.
pub(crate) fn liveness_url(
    host: &Host,
    port: u16,
    use_tls: bool,
    path: &str,
) -> std::result::Result<Url, url::ParseError> {
    let (scheme, default_port) = if use_tls { ("https", 443) } else { ("http", 80) };
    let path = if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{path}"))
    };

    if port == default_port {
        Url::parse(&format!("{scheme}://{host}{path}"))
    } else {
        Url::parse(&format!("{scheme}://{host}:{port}{path}"))
    }
}

impl Debug for HttpWaitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWaitStrategy")
            .field("path", &self.path)
            .field("port", &self.port)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("auth", &self.auth)
            .field("use_tls", &self.use_tls)
            .field("allow_insecure", &self.allow_insecure)
            .field("read_timeout", &self.read_timeout)
            .field("status_codes", &self.status_codes)
            .field("startup_timeout", &self.startup_timeout)
            .finish()
    }
}
