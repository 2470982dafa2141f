//! Bridge-level error taxonomy shared across the broker, signer, and protocol layers.

// self
use crate::{_prelude::*, auth::AccountId};

/// Bridge-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical bridge error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller's group memberships do not permit the target account.
	///
	/// Surfaced as an explicit, non-retryable rejection; never degraded to an empty result.
	#[error("Caller is not authorized to act on account {account_id}.")]
	Denied {
		/// Target account the caller attempted to act on.
		account_id: AccountId,
	},
	/// Account registry lookup failure.
	#[error("{0}")]
	Registry(
		#[from]
		#[source]
		crate::registry::RegistryError,
	),
	/// Credential issuance failure.
	#[error("{0}")]
	Acquisition(
		#[from]
		#[source]
		crate::sts::AcquisitionError,
	),
	/// Malformed or unsafe operation arguments, rejected before any network call.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Request signing failure.
	#[error("{0}")]
	Signing(
		#[from]
		#[source]
		crate::sign::SigningError,
	),
	/// Network, timeout, or non-2xx failure from a downstream call.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Malformed or unparseable downstream response.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
}

/// Structural precondition failures detected before spending a signing or network round trip.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// A required operation argument is absent.
	#[error("Operation is missing the required argument `{name}`.")]
	MissingArgument {
		/// Name of the absent argument.
		name: &'static str,
	},
	/// A raw-command argument does not carry the mandatory literal prefix.
	#[error("Argument `{name}` must start with `{prefix}`.")]
	CommandPrefix {
		/// Name of the offending argument.
		name: &'static str,
		/// Required literal prefix.
		prefix: &'static str,
	},
	/// An argument has the wrong JSON type.
	#[error("Argument `{name}` must be a {expected}.")]
	ArgumentType {
		/// Name of the offending argument.
		name: &'static str,
		/// Expected JSON type label.
		expected: &'static str,
	},
	/// The downstream endpoint URL is not acceptable.
	#[error("Endpoint `{url}` must use https.")]
	InsecureEndpoint {
		/// Offending endpoint URL.
		url: Url,
	},
}

/// Transport-level failures (network, IO, timeouts, non-2xx statuses).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the downstream endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the downstream endpoint.")]
	Io(#[from] std::io::Error),
	/// The downstream call exceeded its bounded timeout.
	#[error("Downstream call exceeded the {limit} timeout.")]
	Timeout {
		/// Configured ceiling for the call.
		limit: Duration,
	},
	/// Downstream endpoint answered with a non-success status.
	#[error("Downstream endpoint returned status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Truncated response body for diagnosis.
		body_preview: String,
	},
	/// The protocol initialization handshake failed.
	#[error("Protocol handshake failed: {reason}.")]
	Handshake {
		/// Downstream- or bridge-supplied reason string.
		reason: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Downstream responses that arrived but could not be interpreted.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// Response body was not the expected JSON-RPC envelope.
	#[error("Downstream endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Downstream endpoint returned a JSON-RPC error object; surfaced verbatim.
	#[error("Downstream endpoint returned error {code}: {message}.")]
	Rpc {
		/// JSON-RPC error code.
		code: i64,
		/// JSON-RPC error message.
		message: String,
	},
	/// Response envelope carried neither a result nor an error member.
	#[error("Downstream response for request {request_id} carried no result.")]
	MissingResult {
		/// Request identifier of the call that produced the envelope.
		request_id: u64,
	},
}
