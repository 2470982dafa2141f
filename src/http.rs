//! Transport primitives for dispatching signed requests.
//!
//! The module exposes [`BridgeHttpClient`] so downstream crates can integrate custom HTTP
//! clients. Implementations execute one [`SignedRequest`] under a bounded timeout and
//! surface the raw status, headers, and body as an [`HttpReply`]; all protocol
//! interpretation (JSON-RPC parsing, session headers) stays above the transport.

// self
use crate::{_prelude::*, error::TransportError, sign::SignedRequest};

/// Boxed future returned by [`BridgeHttpClient::execute`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpReply, TransportError>> + 'a + Send>>;

/// Raw downstream reply; headers are lowercased on receipt.
#[derive(Clone, Debug)]
pub struct HttpReply {
	/// HTTP status code.
	pub status: u16,
	/// Lowercased response header names with values.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpReply {
	/// Returns the first header value with the provided (case-insensitive) name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Checks for a 2xx status.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Abstraction over HTTP transports capable of dispatching signed requests.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared behind `Arc`
/// across bridge instances, and the returned futures must be `Send` for the lifetime of
/// the in-flight call. Timeouts are enforced per call; exceeding the ceiling surfaces
/// [`TransportError::Timeout`], never a hung future.
pub trait BridgeHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Executes the signed request, resolving once the full response body has arrived or
	/// the timeout elapses.
	fn execute(&self, request: SignedRequest, timeout: Duration) -> HttpFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Signed requests must be replayed byte-for-byte, so the wrapped client must not follow
/// redirects or rewrite headers; the default client satisfies both.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestBridgeClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestBridgeClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestBridgeClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl BridgeHttpClient for ReqwestBridgeClient {
	fn execute(&self, request: SignedRequest, timeout: Duration) -> HttpFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let limit = timeout;
			let timeout = std::time::Duration::try_from(timeout)
				.unwrap_or(std::time::Duration::from_secs(120));
			let method = reqwest::Method::from_bytes(request.method.as_bytes())
				.map_err(TransportError::network)?;
			let mut builder =
				client.request(method, request.url.clone()).timeout(timeout).body(request.body);

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}

			let response = builder.send().await.map_err(|e| {
				if e.is_timeout() {
					TransportError::Timeout { limit }
				} else {
					TransportError::from(e)
				}
			})?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.map(|(name, value)| {
					(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
				})
				.collect();
			let body = response
				.bytes()
				.await
				.map_err(|e| {
					if e.is_timeout() {
						TransportError::Timeout { limit }
					} else {
						TransportError::from(e)
					}
				})?
				.to_vec();

			Ok(HttpReply { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn reply_header_lookup_is_case_insensitive() {
		let reply = HttpReply {
			status: 200,
			headers: vec![("mcp-session-id".into(), "abc".into())],
			body: Vec::new(),
		};

		assert_eq!(reply.header("Mcp-Session-Id"), Some("abc"));
		assert_eq!(reply.header("missing"), None);
		assert!(reply.is_success());
		assert!(!HttpReply { status: 504, headers: Vec::new(), body: Vec::new() }.is_success());
	}
}
