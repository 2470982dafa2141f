//! Role-assumption contracts and the HTTP identity-provider client.
//!
//! [`RoleAssumer`] is the broker's only dependency on the identity provider. The
//! built-in [`HttpRoleAssumer`] speaks the provider's form-encoded query API directly,
//! signing each call with the bridge's own source identity and requesting JSON responses
//! so the reply parses with the same tooling as the rest of the crate.

// self
use crate::{
	_prelude::*,
	auth::{AccountId, CredentialSecret},
	error::TransportError,
	sign::SigningError,
};
#[cfg(feature = "reqwest")]
use crate::{
	http::{BridgeHttpClient, HttpReply, ReqwestBridgeClient},
	sign::{self, SigningKey, SigningScope},
};

/// Boxed future returned by [`RoleAssumer::assume_role`].
pub type AssumeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<IssuedCredentials, AcquisitionError>> + 'a + Send>>;

/// Identity-provider contract for exchanging the bridge's identity for target-account
/// credentials.
pub trait RoleAssumer
where
	Self: Send + Sync,
{
	/// Issues temporary credentials for the provided account's designated role.
	fn assume_role<'a>(
		&'a self,
		account_id: &'a AccountId,
		request: AssumeRoleRequest,
	) -> AssumeFuture<'a>;
}

/// One role-assumption call's inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssumeRoleRequest {
	/// Full identifier of the role to assume.
	pub role_arn: String,
	/// Audit-readable session label; encodes caller + target account, never secrets.
	pub session_label: String,
	/// Requested session lifetime.
	pub duration: Duration,
}

/// Credentials returned by a successful issuance call.
#[derive(Clone, Debug)]
pub struct IssuedCredentials {
	/// Access key identifier.
	pub access_key: String,
	/// Secret signing key.
	pub secret_key: CredentialSecret,
	/// Session token proving the temporary session.
	pub session_token: CredentialSecret,
	/// Expiry instant reported by the identity provider.
	pub expires_at: OffsetDateTime,
}

/// Failures raised while obtaining temporary credentials.
#[derive(Debug, ThisError)]
pub enum AcquisitionError {
	/// Trust policy rejected the caller; fatal for the request, never retried.
	#[error("Role assumption was denied: {reason}.")]
	Denied {
		/// Provider-supplied denial reason.
		reason: String,
	},
	/// Provider throttled the issuance call; retryable with backoff.
	#[error("Role assumption was throttled.")]
	Throttled {
		/// Retry-After hint from the provider, if supplied.
		retry_after: Option<Duration>,
	},
	/// Requested session duration falls outside the permitted window; failing closed
	/// instead of truncating keeps callers honest about credential lifetimes.
	#[error("Session duration {requested} is outside the permitted {min}..={max} window.")]
	DurationOutOfRange {
		/// Requested session lifetime.
		requested: Duration,
		/// Minimum permitted lifetime.
		min: Duration,
		/// Maximum permitted lifetime.
		max: Duration,
	},
	/// Issued credentials would already be inside the refresh margin.
	#[error("Issued credentials expire too soon (at {expires_at}).")]
	ExpiringTooSoon {
		/// Expiry instant reported by the provider.
		expires_at: OffsetDateTime,
	},
	/// The bridge's own identity is not configured.
	#[error("Source credential environment variable `{variable}` is not set.")]
	SourceCredentialsMissing {
		/// Name of the absent environment variable.
		variable: &'static str,
	},
	/// Provider returned an unexpected response.
	#[error("Identity provider returned an unexpected response: {message}.")]
	Endpoint {
		/// Provider- or bridge-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider responded with malformed JSON that could not be parsed.
	#[error("Identity provider returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Transport failure while reaching the provider.
	#[error("{0}")]
	Transport(
		#[from]
		#[source]
		TransportError,
	),
	/// Signing the issuance call itself failed.
	#[error("{0}")]
	Signing(
		#[from]
		#[source]
		SigningError,
	),
}
impl AcquisitionError {
	/// Returns `true` for failures that are safe to retry with backoff.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Throttled { .. })
	}
}

/// The bridge's own long-lived identity used to sign issuance calls.
#[derive(Clone)]
pub struct SourceCredentials {
	/// Access key identifier.
	pub access_key: String,
	/// Secret signing key.
	pub secret_key: CredentialSecret,
	/// Session token when the source identity is itself temporary.
	pub session_token: Option<CredentialSecret>,
}
impl SourceCredentials {
	/// Creates source credentials from an access key pair.
	pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
		Self {
			access_key: access_key.into(),
			secret_key: CredentialSecret::new(secret_key),
			session_token: None,
		}
	}

	/// Attaches a session token for temporary source identities.
	pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
		self.session_token = Some(CredentialSecret::new(token));

		self
	}

	/// Loads source credentials from the conventional environment variables.
	pub fn from_env() -> Result<Self, AcquisitionError> {
		let read = |variable: &'static str| {
			std::env::var(variable)
				.map_err(|_| AcquisitionError::SourceCredentialsMissing { variable })
		};
		let mut source = Self::new(read("AWS_ACCESS_KEY_ID")?, read("AWS_SECRET_ACCESS_KEY")?);

		if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
			source = source.with_session_token(token);
		}

		Ok(source)
	}
}
impl Debug for SourceCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SourceCredentials")
			.field("access_key", &self.access_key)
			.field("secret_key", &"<redacted>")
			.field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Global identity-provider endpoint used when none is configured.
pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.amazonaws.com/";
/// Query API version sent with every issuance call.
const STS_API_VERSION: &str = "2011-06-15";

/// Reqwest-backed [`RoleAssumer`] speaking the provider's query API over HTTPS.
#[cfg(feature = "reqwest")]
pub struct HttpRoleAssumer {
	http: ReqwestBridgeClient,
	endpoint: Url,
	region: String,
	source: SourceCredentials,
	timeout: Duration,
}
#[cfg(feature = "reqwest")]
impl HttpRoleAssumer {
	const DEFAULT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates an assumer against the provided endpoint, signing with `source`.
	pub fn new(endpoint: Url, region: impl Into<String>, source: SourceCredentials) -> Self {
		Self {
			http: ReqwestBridgeClient::default(),
			endpoint,
			region: region.into(),
			source,
			timeout: Self::DEFAULT_TIMEOUT,
		}
	}

	/// Replaces the HTTP client (e.g. to accept test certificates).
	pub fn with_http_client(mut self, http: ReqwestBridgeClient) -> Self {
		self.http = http;

		self
	}

	/// Overrides the per-call timeout (defaults to 30 seconds).
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	fn form_body(request: &AssumeRoleRequest) -> Vec<u8> {
		let duration_seconds = request.duration.whole_seconds().to_string();
		let pairs = [
			("Action", "AssumeRole"),
			("Version", STS_API_VERSION),
			("RoleArn", request.role_arn.as_str()),
			("RoleSessionName", request.session_label.as_str()),
			("DurationSeconds", duration_seconds.as_str()),
		];

		pairs
			.iter()
			.map(|(name, value)| format!("{name}={}", sign::uri_encode(value, true)))
			.collect::<Vec<_>>()
			.join("&")
			.into_bytes()
	}
}
#[cfg(feature = "reqwest")]
impl RoleAssumer for HttpRoleAssumer {
	fn assume_role<'a>(
		&'a self,
		_account_id: &'a AccountId,
		request: AssumeRoleRequest,
	) -> AssumeFuture<'a> {
		Box::pin(async move {
			let body = Self::form_body(&request);
			let headers = vec![
				(
					"content-type".to_owned(),
					"application/x-www-form-urlencoded; charset=utf-8".to_owned(),
				),
				("accept".to_owned(), "application/json".to_owned()),
			];
			let key = SigningKey {
				access_key: &self.source.access_key,
				secret_key: self.source.secret_key.expose(),
				session_token: self.source.session_token.as_ref().map(CredentialSecret::expose),
			};
			let signed = sign::sign(
				key,
				"POST",
				&self.endpoint,
				&headers,
				&body,
				SigningScope { service: "sts", region: &self.region },
				OffsetDateTime::now_utc(),
			)?;
			let reply = self.http.execute(signed, self.timeout).await?;

			if !reply.is_success() {
				return Err(classify_failure(&reply));
			}

			let mut deserializer = serde_json::Deserializer::from_slice(&reply.body);
			let envelope: wire::ResponseEnvelope =
				serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
					AcquisitionError::ResponseParse { source: e, status: Some(reply.status) }
				})?;
			let credentials = envelope.assume_role_response.assume_role_result.credentials;

			Ok(IssuedCredentials {
				access_key: credentials.access_key_id,
				secret_key: CredentialSecret::new(credentials.secret_access_key),
				session_token: CredentialSecret::new(credentials.session_token),
				expires_at: credentials.expiration.resolve()?,
			})
		})
	}
}

#[cfg(feature = "reqwest")]
fn classify_failure(reply: &HttpReply) -> AcquisitionError {
	let retry_after = reply
		.header("retry-after")
		.and_then(|value| value.trim().parse::<i64>().ok())
		.map(Duration::seconds);
	let status = reply.status;
	let (code, message) = match serde_json::from_slice::<wire::ErrorEnvelope>(&reply.body) {
		Ok(envelope) => (envelope.error.code, envelope.error.message.unwrap_or_default()),
		Err(_) => (String::new(), String::from_utf8_lossy(&reply.body).into_owned()),
	};

	if status == 429
		|| matches!(code.as_str(), "Throttling" | "ThrottlingException" | "RequestLimitExceeded")
	{
		return AcquisitionError::Throttled { retry_after };
	}
	if status == 403 || matches!(code.as_str(), "AccessDenied" | "AccessDeniedException") {
		let reason = if code.is_empty() { message } else { format!("{code}: {message}") };

		return AcquisitionError::Denied { reason };
	}

	let message = if code.is_empty() { message } else { format!("{code}: {message}") };
	// Per character, not per byte; provider messages may carry multibyte text.
	let message = message.chars().take(256).collect();

	AcquisitionError::Endpoint { message, status: Some(status) }
}

mod wire {
	//! Provider response shapes for the query API's JSON rendering.

	// crates.io
	use time::format_description::well_known::Rfc3339;
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "PascalCase")]
	pub(super) struct ResponseEnvelope {
		pub assume_role_response: AssumeRoleResponse,
	}

	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "PascalCase")]
	pub(super) struct AssumeRoleResponse {
		pub assume_role_result: AssumeRoleResult,
	}

	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "PascalCase")]
	pub(super) struct AssumeRoleResult {
		pub credentials: WireCredentials,
	}

	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "PascalCase")]
	pub(super) struct WireCredentials {
		pub access_key_id: String,
		pub secret_access_key: String,
		pub session_token: String,
		pub expiration: WireExpiration,
	}

	/// The JSON rendering reports expiry as epoch seconds; some renderings use an
	/// RFC 3339 string instead. Accept both.
	#[derive(Debug, Deserialize)]
	#[serde(untagged)]
	pub(super) enum WireExpiration {
		Epoch(f64),
		Timestamp(String),
	}
	impl WireExpiration {
		pub fn resolve(self) -> Result<OffsetDateTime, AcquisitionError> {
			match self {
				// Providers report whole seconds; sub-second precision is not preserved.
				Self::Epoch(seconds) => OffsetDateTime::from_unix_timestamp(seconds as i64)
					.map_err(|e| AcquisitionError::Endpoint {
						message: format!("Expiration out of range: {e}"),
						status: None,
					}),
				Self::Timestamp(value) => OffsetDateTime::parse(&value, &Rfc3339).map_err(|e| {
					AcquisitionError::Endpoint {
						message: format!("Expiration is not RFC 3339: {e}"),
						status: None,
					}
				}),
			}
		}
	}

	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "PascalCase")]
	pub(super) struct ErrorEnvelope {
		pub error: WireError,
	}

	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "PascalCase")]
	pub(super) struct WireError {
		pub code: String,
		pub message: Option<String>,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn expiration_accepts_epoch_and_rfc3339() {
		let epoch = wire::WireExpiration::Epoch(1_735_689_600.0);

		assert_eq!(
			epoch.resolve().expect("Epoch expiration should resolve."),
			macros::datetime!(2025-01-01 00:00 UTC),
		);

		let stamp = wire::WireExpiration::Timestamp("2025-01-01T00:30:00Z".into());

		assert_eq!(
			stamp.resolve().expect("RFC 3339 expiration should resolve."),
			macros::datetime!(2025-01-01 00:30 UTC),
		);
	}

	#[cfg(feature = "reqwest")]
	mod classification {
		// self
		use super::*;
		use crate::http::HttpReply;

		fn reply(status: u16, body: &str) -> HttpReply {
			HttpReply { status, headers: Vec::new(), body: body.as_bytes().to_vec() }
		}

		#[test]
		fn throttling_is_retryable() {
			let error = classify_failure(&reply(
				400,
				r#"{"Error":{"Code":"Throttling","Message":"Rate exceeded"}}"#,
			));

			assert!(error.is_retryable());
			assert!(matches!(error, AcquisitionError::Throttled { retry_after: None }));

			let error = classify_failure(&HttpReply {
				status: 429,
				headers: vec![("retry-after".into(), "2".into())],
				body: Vec::new(),
			});

			assert!(matches!(
				error,
				AcquisitionError::Throttled { retry_after: Some(d) } if d == Duration::seconds(2),
			));
		}

		#[test]
		fn access_denied_is_fatal() {
			let error = classify_failure(&reply(
				403,
				r#"{"Error":{"Code":"AccessDenied","Message":"not authorized to perform sts:AssumeRole"}}"#,
			));

			assert!(!error.is_retryable());
			assert!(matches!(
				error,
				AcquisitionError::Denied { ref reason } if reason.contains("AssumeRole"),
			));
		}

		#[test]
		fn unknown_failures_surface_the_status() {
			let error = classify_failure(&reply(500, "meltdown"));

			assert!(matches!(
				error,
				AcquisitionError::Endpoint { status: Some(500), ref message } if message == "meltdown",
			));
		}

		#[test]
		fn endpoint_messages_truncate_on_character_boundaries() {
			let mut body = "a".repeat(255);

			body.push('é');
			body.push_str(&"b".repeat(64));

			let error = classify_failure(&reply(500, &body));

			assert!(matches!(
				error,
				AcquisitionError::Endpoint { status: Some(500), ref message }
					if message.chars().count() == 256 && message.ends_with('é'),
			));
		}

		#[test]
		fn form_body_percent_encodes_the_role_arn() {
			let body = HttpRoleAssumer::form_body(&AssumeRoleRequest {
				role_arn: "arn:aws:iam::111111111111:role/CentralOpsTargetRole".into(),
				session_label: "agent-x@111111111111".into(),
				duration: Duration::hours(1),
			});
			let body = String::from_utf8(body).expect("Form body should be UTF-8.");

			assert!(body.starts_with("Action=AssumeRole&Version=2011-06-15&RoleArn=arn%3Aaws"));
			assert!(body.contains("RoleSessionName=agent-x%40111111111111"));
			assert!(body.ends_with("DurationSeconds=3600"));
		}
	}
}
