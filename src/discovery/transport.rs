//! Transport bindings for capability discovery.
//!
//! Two bindings are supported: request/response over a single streamable
//! HTTP endpoint, and request/response layered on a server-push event
//! stream, where calls are POSTed to a message endpoint announced by the
//! stream and responses are correlated back by request id.

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::resource::remote::{RemoteProtocol, RemoteServerSpec};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

/// One bidirectional exchange channel to a remote endpoint.
#[async_trait]
pub trait CapabilityTransport: Send {
    /// Establish the connection. Must be called before the first request.
    async fn start(&mut self) -> Result<(), DiscoveryError>;

    /// Issue a call and wait for its response payload.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, DiscoveryError>;

    /// Send a one-way notification.
    async fn notify(&mut self, method: &str, params: Value) -> Result<(), DiscoveryError>;
}

/// Creates transports for remote server specs. Injected into the engine so
/// tests can substitute scripted transports.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        spec: &RemoteServerSpec,
        headers: Vec<(String, String)>,
    ) -> Box<dyn CapabilityTransport>;
}

/// Factory producing HTTP-backed transports per the spec's protocol field.
pub struct HttpTransportFactory {
    config: DiscoveryConfig,
}

impl HttpTransportFactory {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .timeout(self.config.rpc_timeout())
            .build()
            .unwrap_or_default()
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(
        &self,
        spec: &RemoteServerSpec,
        headers: Vec<(String, String)>,
    ) -> Box<dyn CapabilityTransport> {
        match spec.protocol {
            RemoteProtocol::Sse => Box::new(SseTransport::new(self.client(), spec.url.clone(), headers)),
            RemoteProtocol::StreamableHttp => Box::new(StreamableHttpTransport::new(
                self.client(),
                spec.url.clone(),
                headers,
            )),
        }
    }
}

fn next_request_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

fn rpc_envelope(id: Option<u64>, method: &str, params: Value) -> Value {
    let mut body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    });
    if let Some(id) = id {
        body["id"] = Value::from(id);
    }
    body
}

/// Extract the result from a response envelope, surfacing server errors.
fn unpack_response(method: &str, body: Value) -> Result<Value, DiscoveryError> {
    if let Some(err) = body.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error");
        return Err(DiscoveryError::rpc(method, message));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| DiscoveryError::Protocol("response carries neither result nor error".into()))
}

/// Request/response over one streamable HTTP endpoint.
pub struct StreamableHttpTransport {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    next_id: u64,
}

impl StreamableHttpTransport {
    pub fn new(client: reqwest::Client, url: String, headers: Vec<(String, String)>) -> Self {
        Self {
            client,
            url,
            headers,
            next_id: 0,
        }
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, DiscoveryError> {
        let mut req = self.client.post(&self.url).json(body);
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DiscoveryError::Connect {
                    url: self.url.clone(),
                    reason: e.to_string(),
                }
            } else {
                DiscoveryError::Protocol(e.to_string())
            }
        })?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::Protocol(format!(
                "server returned status {}",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl CapabilityTransport for StreamableHttpTransport {
    async fn start(&mut self) -> Result<(), DiscoveryError> {
        // Connection is established lazily by the first POST.
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, DiscoveryError> {
        let id = next_request_id(&mut self.next_id);
        let body = rpc_envelope(Some(id), method, params);
        let resp = self.post(&body).await?;
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| DiscoveryError::Protocol(e.to_string()))?;
        unpack_response(method, payload)
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), DiscoveryError> {
        let body = rpc_envelope(None, method, params);
        self.post(&body).await?;
        Ok(())
    }
}

/// Incremental decoder for a server-push event stream: accumulates bytes and
/// yields (event, data) pairs at each blank-line frame boundary.
#[derive(Default)]
pub struct EventStreamDecoder {
    buffer: String,
}

impl EventStreamDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Next complete event, if one is buffered.
    pub fn next_event(&mut self) -> Option<(String, String)> {
        let boundary = self.buffer.find("\n\n")?;
        let frame: String = self.buffer.drain(..boundary + 2).collect();

        let mut event = String::from("message");
        let mut data = String::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(rest.trim_start());
            }
        }
        Some((event, data))
    }
}

/// Request/response layered on a server-push event stream. The stream's first
/// `endpoint` event names the URL calls are POSTed to; responses arrive as
/// `message` events correlated by request id.
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    next_id: u64,
    message_url: Option<String>,
    stream: Option<BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>>,
    decoder: EventStreamDecoder,
}

impl SseTransport {
    pub fn new(client: reqwest::Client, url: String, headers: Vec<(String, String)>) -> Self {
        Self {
            client,
            url,
            headers,
            next_id: 0,
            message_url: None,
            stream: None,
            decoder: EventStreamDecoder::default(),
        }
    }

    /// Absolute message URL from an `endpoint` event payload, which may be
    /// origin-relative.
    fn resolve_message_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        match self.url.find('/').and_then(|_| {
            let scheme_end = self.url.find("://")? + 3;
            let origin_end = self.url[scheme_end..]
                .find('/')
                .map(|i| scheme_end + i)
                .unwrap_or(self.url.len());
            Some(&self.url[..origin_end])
        }) {
            Some(origin) => format!("{}{}", origin, endpoint),
            None => endpoint.to_string(),
        }
    }

    async fn read_event(&mut self) -> Result<(String, String), DiscoveryError> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Ok(event);
            }
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| DiscoveryError::Protocol("event stream not started".into()))?;
            match stream.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(e)) => return Err(DiscoveryError::Protocol(e.to_string())),
                None => {
                    return Err(DiscoveryError::Protocol(
                        "event stream closed by server".into(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl CapabilityTransport for SseTransport {
    async fn start(&mut self) -> Result<(), DiscoveryError> {
        let mut req = self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream");
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        let resp = req.send().await.map_err(|e| DiscoveryError::Connect {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::Connect {
                url: self.url.clone(),
                reason: format!("server returned status {}", resp.status()),
            });
        }
        self.stream = Some(resp.bytes_stream().boxed());

        // The server announces the message endpoint before anything else.
        let (event, data) = self.read_event().await?;
        if event != "endpoint" {
            return Err(DiscoveryError::Protocol(format!(
                "expected endpoint event, got {event:?}"
            )));
        }
        self.message_url = Some(self.resolve_message_url(&data));
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, DiscoveryError> {
        let message_url = self
            .message_url
            .clone()
            .ok_or_else(|| DiscoveryError::Protocol("transport not started".into()))?;
        let id = next_request_id(&mut self.next_id);
        let body = rpc_envelope(Some(id), method, params);

        let mut req = self.client.post(&message_url).json(&body);
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        req.send()
            .await
            .map_err(|e| DiscoveryError::rpc(method, e.to_string()))?;

        // Responses are interleaved with unrelated notifications; skip until
        // the matching id arrives.
        loop {
            let (event, data) = self.read_event().await?;
            if event != "message" {
                continue;
            }
            let payload: Value = serde_json::from_str(&data)
                .map_err(|e| DiscoveryError::Protocol(e.to_string()))?;
            if payload.get("id").and_then(Value::as_u64) == Some(id) {
                return unpack_response(method, payload);
            }
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), DiscoveryError> {
        let message_url = self
            .message_url
            .clone()
            .ok_or_else(|| DiscoveryError::Protocol("transport not started".into()))?;
        let body = rpc_envelope(None, method, params);
        let mut req = self.client.post(&message_url).json(&body);
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        req.send()
            .await
            .map_err(|e| DiscoveryError::rpc(method, e.to_string()))?;
        Ok(())
    }
}
