//! Stateless SigV4 request signing.
//!
//! Signing derives a time-bound signature from the canonical form of the request, so two
//! signings of identical inputs at different instants produce different (but equally
//! valid) signatures. Nothing here is cached: the signature window is governed by the
//! scheme's own clock-skew tolerance, independent of the credential's expiry.

// crates.io
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::{UtcOffset, format_description::BorrowedFormatItem, macros};
// self
use crate::_prelude::*;

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm label carried in the `Authorization` header.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const AMZ_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
	macros::format_description!("[year][month][day]T[hour][minute][second]Z");
const DATE_STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
	macros::format_description!("[year][month][day]");

/// Borrowed key material used for one signing pass.
#[derive(Clone, Copy)]
pub struct SigningKey<'a> {
	/// Access key identifier named in the credential scope.
	pub access_key: &'a str,
	/// Secret key feeding the HMAC derivation chain.
	pub secret_key: &'a str,
	/// Session token for temporary credentials; carried as `x-amz-security-token`.
	pub session_token: Option<&'a str>,
}
impl Debug for SigningKey<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SigningKey")
			.field("access_key", &self.access_key)
			.field("secret_key", &"<redacted>")
			.field("session_token", &self.session_token.map(|_| "<redacted>"))
			.finish()
	}
}

/// Service namespace + region pair that scopes a signature.
#[derive(Clone, Copy, Debug)]
pub struct SigningScope<'a> {
	/// Downstream service namespace (e.g. `sts`, `aws-mcp`).
	pub service: &'a str,
	/// Signing region.
	pub region: &'a str,
}

/// Ephemeral signed request, consumed immediately by the transport layer.
#[derive(Clone, Debug)]
pub struct SignedRequest {
	/// HTTP method.
	pub method: String,
	/// Target endpoint URL.
	pub url: Url,
	/// Lowercased header names with values, including the signature headers.
	pub headers: Vec<(String, String)>,
	/// Request body covered by the payload hash.
	pub body: Vec<u8>,
}
impl SignedRequest {
	/// Returns the first header value with the provided (case-insensitive) name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Failures raised while computing a signature.
#[derive(Debug, ThisError)]
pub enum SigningError {
	/// Target URL carries no host to sign.
	#[error("Endpoint `{url}` has no host component.")]
	MissingHost {
		/// Offending endpoint URL.
		url: Url,
	},
	/// Signing timestamp could not be rendered.
	#[error("Failed to format the signing timestamp.")]
	TimestampFormat(#[from] time::error::Format),
	/// HMAC key initialization rejected the derived key material.
	#[error("Failed to initialize the HMAC signing key.")]
	KeyLength,
}

/// Signs one request, returning the canonical-request-derived headers alongside the
/// original method, URL, and body.
///
/// The caller-supplied `headers` participate in the canonical form; `host`,
/// `x-amz-date`, and (for temporary credentials) `x-amz-security-token` are added
/// automatically. The emitted header set omits `host`, which the transport layer sends
/// itself from the URL.
pub fn sign(
	key: SigningKey<'_>,
	method: &str,
	url: &Url,
	headers: &[(String, String)],
	body: &[u8],
	scope: SigningScope<'_>,
	at: OffsetDateTime,
) -> Result<SignedRequest, SigningError> {
	let at = at.to_offset(UtcOffset::UTC);
	let amz_date = at.format(&AMZ_DATE_FORMAT)?;
	let date_stamp = at.format(&DATE_STAMP_FORMAT)?;
	let host = url.host_str().ok_or_else(|| SigningError::MissingHost { url: url.clone() })?;
	let host = match url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_owned(),
	};
	let mut canonical: BTreeMap<String, String> = headers
		.iter()
		.map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_owned()))
		.collect();

	canonical.insert("host".into(), host);
	canonical.insert("x-amz-date".into(), amz_date.clone());

	if let Some(token) = key.session_token {
		canonical.insert("x-amz-security-token".into(), token.to_owned());
	}

	let signed_headers = canonical.keys().cloned().collect::<Vec<_>>().join(";");
	let canonical_headers =
		canonical.iter().map(|(name, value)| format!("{name}:{value}\n")).collect::<String>();
	let canonical_uri = if url.path().is_empty() { "/" } else { url.path() };
	let canonical_query = canonical_query_string(url);
	let payload_hash = hex::encode(Sha256::digest(body));
	let canonical_request = format!(
		"{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
	);
	let credential_scope = format!("{date_stamp}/{}/{}/aws4_request", scope.region, scope.service);
	let string_to_sign = format!(
		"{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
		hex::encode(Sha256::digest(canonical_request.as_bytes())),
	);
	let mut derived = hmac_sha256(format!("AWS4{}", key.secret_key).as_bytes(), &date_stamp)?;

	for component in [scope.region, scope.service, "aws4_request"] {
		derived = hmac_sha256(&derived, component)?;
	}

	let signature = hex::encode(hmac_sha256(&derived, &string_to_sign)?);
	let authorization = format!(
		"{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
		key.access_key,
	);
	let mut out_headers: Vec<(String, String)> =
		canonical.into_iter().filter(|(name, _)| name != "host").collect();

	out_headers.push(("authorization".into(), authorization));

	Ok(SignedRequest {
		method: method.to_owned(),
		url: url.clone(),
		headers: out_headers,
		body: body.to_vec(),
	})
}

/// Percent-encodes a value with the SigV4 unreserved character set.
pub(crate) fn uri_encode(input: &str, encode_slash: bool) -> String {
	let mut out = String::with_capacity(input.len());

	for byte in input.bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' =>
				out.push(byte as char),
			b'/' if !encode_slash => out.push('/'),
			_ => {
				out.push('%');
				out.push_str(&format!("{byte:02X}"));
			},
		}
	}

	out
}

fn canonical_query_string(url: &Url) -> String {
	let mut pairs: Vec<(String, String)> = url
		.query_pairs()
		.map(|(name, value)| (uri_encode(&name, true), uri_encode(&value, true)))
		.collect();

	pairs.sort();

	pairs.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("&")
}

fn hmac_sha256(key: &[u8], data: impl AsRef<[u8]>) -> Result<[u8; 32], SigningError> {
	let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SigningError::KeyLength)?;

	mac.update(data.as_ref());

	Ok(mac.finalize().into_bytes().into())
}
