//! Protocol bridge tying policy, registry, broker, signer, and transport together.
//!
//! [`ProtocolBridge::invoke`] runs every request through the same pipeline: validate the
//! operation, authorize the caller against the target account, resolve the account in
//! the registry, obtain fresh credentials from the broker, establish (or reuse) the
//! downstream session, then sign and dispatch the JSON-RPC call. Stages fail closed in
//! that order, so no network traffic is spent on a request that would be rejected.

pub mod operation;
pub use operation::Operation;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{AccountId, Credential},
	broker::CredentialBroker,
	error::{ProtocolError, TransportError, ValidationError},
	http::{BridgeHttpClient, HttpReply},
	obs::{self, Stage, StageOutcome, StageSpan},
	policy::{AuthorizationPolicy, CallerContext},
	registry::{AccountInfo, AccountRegistry, RegistryError},
	sign::{self, SigningScope},
	sts::RoleAssumer,
};

/// Protocol revision announced during the initialization handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
/// Managed downstream endpoint used when none is configured.
pub const DEFAULT_MCP_ENDPOINT: &str = "https://aws-mcp.us-east-1.api.aws/mcp";

const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_SERVICE: &str = "aws-mcp";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT: Duration = Duration::seconds(120);
const BODY_PREVIEW_LIMIT: usize = 256;
const SESSION_HEADER: &str = "mcp-session-id";

/// Downstream endpoint with its signing scope.
#[derive(Clone, Debug)]
pub struct McpEndpoint {
	/// Endpoint URL every JSON-RPC call is POSTed to.
	pub url: Url,
	/// Service namespace the signatures are scoped to.
	pub service: String,
	/// Region the signatures are scoped to.
	pub region: String,
}
impl McpEndpoint {
	/// Creates an endpoint with the default signing scope.
	///
	/// Plain-HTTP URLs are rejected unless they target loopback, which keeps local test
	/// servers usable without ever signing toward an unencrypted remote.
	pub fn new(url: Url) -> Result<Self, ValidationError> {
		if url.scheme() != "https" && !is_loopback(&url) {
			return Err(ValidationError::InsecureEndpoint { url });
		}

		Ok(Self { url, service: DEFAULT_SERVICE.into(), region: DEFAULT_REGION.into() })
	}

	/// Overrides the signing service namespace.
	pub fn with_service(mut self, service: impl Into<String>) -> Self {
		self.service = service.into();

		self
	}

	/// Overrides the signing region.
	pub fn with_region(mut self, region: impl Into<String>) -> Self {
		self.region = region.into();

		self
	}
}
impl Default for McpEndpoint {
	fn default() -> Self {
		let url = Url::parse(DEFAULT_MCP_ENDPOINT).expect("Default endpoint URL should parse.");

		Self { url, service: DEFAULT_SERVICE.into(), region: DEFAULT_REGION.into() }
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		Some(url::Host::Domain(domain)) => domain == "localhost",
		None => false,
	}
}

/// End-to-end request pipeline over a shared registry, policy, broker, and transport.
///
/// Cheap to clone; clones share the downstream session cache and the broker's credential
/// cache.
pub struct ProtocolBridge<A, C>
where
	A: ?Sized + RoleAssumer,
	C: BridgeHttpClient,
{
	registry: Arc<dyn AccountRegistry>,
	policy: AuthorizationPolicy,
	broker: CredentialBroker<A>,
	http: Arc<C>,
	endpoint: McpEndpoint,
	timeout: Duration,
	sessions: Arc<Mutex<HashMap<AccountId, String>>>,
	next_request_id: Arc<AtomicU64>,
}
impl<A, C> ProtocolBridge<A, C>
where
	A: ?Sized + RoleAssumer,
	C: BridgeHttpClient,
{
	/// Creates a bridge over the provided components.
	pub fn new(
		registry: Arc<dyn AccountRegistry>,
		policy: AuthorizationPolicy,
		broker: CredentialBroker<A>,
		http: C,
		endpoint: McpEndpoint,
	) -> Self {
		Self {
			registry,
			policy,
			broker,
			http: Arc::new(http),
			endpoint,
			timeout: DEFAULT_TIMEOUT,
			sessions: Arc::new(Mutex::new(HashMap::new())),
			next_request_id: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Overrides the per-call downstream timeout (defaults to 120 seconds).
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Borrows the broker backing this bridge.
	pub fn broker(&self) -> &CredentialBroker<A> {
		&self.broker
	}

	/// Drops the cached downstream session for the account, forcing a fresh handshake on
	/// the next call.
	pub fn reset_session(&self, account_id: &AccountId) {
		self.sessions.lock().remove(account_id);
	}

	/// Runs one operation through the full pipeline and returns the downstream result.
	pub async fn invoke(&self, caller: &CallerContext, operation: Operation) -> Result<JsonValue> {
		operation.validate()?;

		match operation {
			Operation::ListAccounts => self.list_accounts(caller).await,
			Operation::ListTools { account_id } => self.list_tools(caller, &account_id).await,
			Operation::Query { account_id, tool, arguments, region } =>
				self.query(caller, &account_id, &tool, arguments, region.as_deref()).await,
			Operation::QueryAll { tool, arguments, region } =>
				self.query_all(caller, &tool, arguments, region.as_deref()).await,
		}
	}

	fn authorize(&self, caller: &CallerContext, account_id: &AccountId) -> Result<()> {
		const STAGE: Stage = Stage::Authorize;

		let _guard = StageSpan::new(STAGE, account_id).entered();

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		if self.policy.authorize(caller.groups(), account_id) {
			obs::record_stage_outcome(STAGE, StageOutcome::Success);

			Ok(())
		} else {
			obs::record_stage_outcome(STAGE, StageOutcome::Failure);

			Err(Error::Denied { account_id: account_id.clone() })
		}
	}

	async fn list_accounts(&self, caller: &CallerContext) -> Result<JsonValue> {
		let visible: Vec<AccountInfo> = self
			.registry
			.list()
			.await?
			.into_iter()
			.filter(|info| self.policy.authorize(caller.groups(), &info.account_id))
			.collect();

		serde_json::to_value(visible)
			.map_err(|e| RegistryError::Serialization { message: e.to_string() }.into())
	}

	async fn list_tools(&self, caller: &CallerContext, account_id: &AccountId) -> Result<JsonValue> {
		self.authorize(caller, account_id)?;
		self.registry.lookup(account_id).await?;

		const STAGE: Stage = Stage::Dispatch;

		let credential = self.broker.get_credentials(account_id, caller.label()).await?;
		let session = self.ensure_session(account_id, &credential).await?;
		let span = StageSpan::new(STAGE, account_id);

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let result = span
			.instrument(async {
				match self.call(&credential, Some(&session), "tools/list", serde_json::json!({})).await
				{
					// Listing carries no side effects downstream, so one transport-level retry
					// is safe; protocol errors are never retried.
					Err(Error::Transport(_)) =>
						self.call(&credential, Some(&session), "tools/list", serde_json::json!({}))
							.await,
					outcome => outcome,
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_stage_outcome(STAGE, StageOutcome::Success),
			Err(_) => obs::record_stage_outcome(STAGE, StageOutcome::Failure),
		}

		result.map(|(_, value)| value)
	}

	async fn query(
		&self,
		caller: &CallerContext,
		account_id: &AccountId,
		tool: &str,
		arguments: JsonMap<String, JsonValue>,
		region: Option<&str>,
	) -> Result<JsonValue> {
		self.authorize(caller, account_id)?;
		self.registry.lookup(account_id).await?;

		self.dispatch_tool_call(caller, account_id, tool, arguments, region).await
	}

	async fn query_all(
		&self,
		caller: &CallerContext,
		tool: &str,
		arguments: JsonMap<String, JsonValue>,
		region: Option<&str>,
	) -> Result<JsonValue> {
		let accounts = self.registry.list().await?;
		let mut outcomes = JsonMap::new();

		for info in accounts {
			// Fan-out isolates per-account failures; one misbehaving account never hides
			// the results of the others.
			let entry = match self.authorize(caller, &info.account_id) {
				Err(error) =>
					serde_json::json!({ "status": "denied", "error": error.to_string() }),
				Ok(()) => match self
					.dispatch_tool_call(caller, &info.account_id, tool, arguments.clone(), region)
					.await
				{
					Ok(data) => serde_json::json!({ "status": "success", "data": data }),
					Err(error) =>
						serde_json::json!({ "status": "error", "error": error.to_string() }),
				},
			};

			outcomes.insert(info.account_id.to_string(), entry);
		}

		Ok(JsonValue::Object(outcomes))
	}

	async fn dispatch_tool_call(
		&self,
		caller: &CallerContext,
		account_id: &AccountId,
		tool: &str,
		arguments: JsonMap<String, JsonValue>,
		region: Option<&str>,
	) -> Result<JsonValue> {
		const STAGE: Stage = Stage::Dispatch;

		let credential = self.broker.get_credentials(account_id, caller.label()).await?;
		let session = self.ensure_session(account_id, &credential).await?;
		let params = serde_json::json!({
			"name": tool,
			"arguments": JsonValue::Object(merge_region(arguments, region)),
		});
		let span = StageSpan::new(STAGE, account_id);

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		// Tool calls may mutate downstream state; never retried here.
		let result = span.instrument(self.call(&credential, Some(&session), "tools/call", params)).await;

		match &result {
			Ok(_) => obs::record_stage_outcome(STAGE, StageOutcome::Success),
			Err(_) => obs::record_stage_outcome(STAGE, StageOutcome::Failure),
		}

		result.map(|(_, value)| value)
	}

	async fn ensure_session(
		&self,
		account_id: &AccountId,
		credential: &Credential,
	) -> Result<String> {
		if let Some(session) = self.sessions.lock().get(account_id).cloned() {
			return Ok(session);
		}

		const STAGE: Stage = Stage::Handshake;

		let span = StageSpan::new(STAGE, account_id);

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		match span.instrument(self.initialize(credential)).await {
			Ok(session) => {
				obs::record_stage_outcome(STAGE, StageOutcome::Success);
				self.sessions.lock().insert(account_id.clone(), session.clone());

				Ok(session)
			},
			Err(error) => {
				obs::record_stage_outcome(STAGE, StageOutcome::Failure);

				Err(error)
			},
		}
	}

	async fn initialize(&self, credential: &Credential) -> Result<String> {
		let params = serde_json::json!({
			"protocolVersion": MCP_PROTOCOL_VERSION,
			"capabilities": {},
			"clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
		});
		let (reply, _) = match self.call(credential, None, "initialize", params).await {
			Ok(outcome) => outcome,
			Err(error @ Error::Transport(_)) => return Err(error),
			// An error-bearing or unparseable initialize reply still means no session
			// was established.
			Err(error) =>
				return Err(TransportError::Handshake { reason: error.to_string() }.into()),
		};
		let session = reply
			.header(SESSION_HEADER)
			.ok_or_else(|| TransportError::Handshake {
				reason: format!("response carried no `{SESSION_HEADER}` header"),
			})?
			.to_owned();

		Ok(session)
	}

	async fn call(
		&self,
		credential: &Credential,
		session: Option<&str>,
		method: &str,
		params: JsonValue,
	) -> Result<(HttpReply, JsonValue)> {
		let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
		let envelope = serde_json::json!({
			"jsonrpc": "2.0",
			"id": request_id,
			"method": method,
			"params": params,
		});
		let body = envelope.to_string().into_bytes();
		let mut headers = vec![
			("content-type".to_owned(), "application/json".to_owned()),
			("accept".to_owned(), "application/json".to_owned()),
		];

		if let Some(session) = session {
			headers.push((SESSION_HEADER.to_owned(), session.to_owned()));
		}

		let signed = sign::sign(
			credential.signing_key(),
			"POST",
			&self.endpoint.url,
			&headers,
			&body,
			SigningScope { service: &self.endpoint.service, region: &self.endpoint.region },
			self.broker.clock().now(),
		)?;
		let reply = self.http.execute(signed, self.timeout).await?;

		if !reply.is_success() {
			return Err(TransportError::Status {
				status: reply.status,
				body_preview: body_preview(&reply.body),
			}
			.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&reply.body);
		let parsed: RpcEnvelope = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| ProtocolError::ResponseParse { source: e })?;

		if let Some(error) = parsed.error {
			return Err(ProtocolError::Rpc { code: error.code, message: error.message }.into());
		}

		let result = parsed.result.ok_or(ProtocolError::MissingResult { request_id })?;

		Ok((reply, result))
	}
}
impl<A, C> Clone for ProtocolBridge<A, C>
where
	A: ?Sized + RoleAssumer,
	C: BridgeHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			registry: self.registry.clone(),
			policy: self.policy.clone(),
			broker: self.broker.clone(),
			http: self.http.clone(),
			endpoint: self.endpoint.clone(),
			timeout: self.timeout,
			sessions: self.sessions.clone(),
			next_request_id: self.next_request_id.clone(),
		}
	}
}

fn merge_region(
	mut arguments: JsonMap<String, JsonValue>,
	region: Option<&str>,
) -> JsonMap<String, JsonValue> {
	if let Some(region) = region {
		// Explicit per-call arguments win over the operation-level override.
		arguments.entry("region").or_insert_with(|| JsonValue::String(region.to_owned()));
	}

	arguments
}

fn body_preview(body: &[u8]) -> String {
	String::from_utf8_lossy(body).chars().take(BODY_PREVIEW_LIMIT).collect()
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
	#[serde(default)]
	result: Option<JsonValue>,
	#[serde(default)]
	error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
	code: i64,
	#[serde(default)]
	message: String,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn endpoints_must_use_https_outside_loopback() {
		let insecure = Url::parse("http://bridge.internal/mcp").expect("URL should parse.");

		assert!(matches!(
			McpEndpoint::new(insecure),
			Err(ValidationError::InsecureEndpoint { .. }),
		));

		for acceptable in
			["https://aws-mcp.us-east-1.api.aws/mcp", "http://127.0.0.1:8080/mcp", "http://localhost:8080/mcp"]
		{
			let url = Url::parse(acceptable).expect("URL should parse.");

			McpEndpoint::new(url).expect("Endpoint should be accepted.");
		}
	}

	#[test]
	fn default_endpoint_targets_the_managed_service() {
		let endpoint = McpEndpoint::default();

		assert_eq!(endpoint.url.as_str(), DEFAULT_MCP_ENDPOINT);
		assert_eq!(endpoint.service, "aws-mcp");
		assert_eq!(endpoint.region, "us-east-1");
	}

	#[test]
	fn region_overrides_never_clobber_explicit_arguments() {
		let mut arguments = JsonMap::new();

		arguments.insert("region".into(), JsonValue::String("eu-west-1".into()));

		let merged = merge_region(arguments, Some("us-east-1"));

		assert_eq!(merged["region"], JsonValue::String("eu-west-1".into()));

		let merged = merge_region(JsonMap::new(), Some("us-east-1"));

		assert_eq!(merged["region"], JsonValue::String("us-east-1".into()));
		assert!(merge_region(JsonMap::new(), None).is_empty());
	}

	#[test]
	fn rpc_envelopes_tolerate_extra_members() {
		let parsed: RpcEnvelope = serde_json::from_str(
			r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true},"extra":null}"#,
		)
		.expect("Envelope should parse.");

		assert!(parsed.error.is_none());
		assert_eq!(parsed.result, Some(serde_json::json!({"ok": true})));

		let parsed: RpcEnvelope =
			serde_json::from_str(r#"{"jsonrpc":"2.0","id":8,"error":{"code":-32601}}"#)
				.expect("Error envelope should parse.");
		let error = parsed.error.expect("Error member should be present.");

		assert_eq!(error.code, -32601);
		assert_eq!(error.message, "");
	}
}
