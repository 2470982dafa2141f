//! Immutable temporary-credential records, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{id::AccountId, secret::CredentialSecret},
	sign::SigningKey,
};

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access key value was provided.
	#[error("Access key is required.")]
	MissingAccessKey,
	/// Issued when no secret key value was provided.
	#[error("Secret key is required.")]
	MissingSecretKey,
	/// Issued when no session token value was provided.
	#[error("Session token is required.")]
	MissingSessionToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Immutable record describing temporary credentials issued for one target account.
///
/// Held exclusively by the broker cache between issuances; never persisted to durable
/// storage. Only `account_id` and `session_label` are safe to log.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Target account the credentials act as.
	pub account_id: AccountId,
	/// Audit-readable session label embedded in the issued session; contains no secrets.
	pub session_label: String,
	/// Access key identifier. Not secret on its own, but only useful with the secret key.
	pub access_key: String,
	/// Secret signing key; callers must avoid logging it.
	pub secret_key: CredentialSecret,
	/// Session token proving the temporary session; callers must avoid logging it.
	pub session_token: CredentialSecret,
	/// Instant the broker obtained the credentials.
	pub issued_at: OffsetDateTime,
	/// Expiry instant reported by the identity provider.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Returns a builder for the provided account + session label.
	pub fn builder(account_id: AccountId, session_label: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new(account_id, session_label)
	}

	/// Checks whether the credential remains usable for a full round trip starting at
	/// `instant`, i.e. `instant + margin < expires_at` strictly.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		instant + margin < self.expires_at
	}

	/// Returns `true` once the expiry instant has been reached.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Remaining validity at the provided instant; negative once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Borrows the credential as a SigV4 signing key.
	pub fn signing_key(&self) -> SigningKey<'_> {
		SigningKey {
			access_key: &self.access_key,
			secret_key: self.secret_key.expose(),
			session_token: Some(self.session_token.expose()),
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("account_id", &self.account_id)
			.field("session_label", &self.session_label)
			.field("access_key", &self.access_key)
			.field("secret_key", &"<redacted>")
			.field("session_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	account_id: AccountId,
	session_label: String,
	access_key: Option<String>,
	secret_key: Option<CredentialSecret>,
	session_token: Option<CredentialSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(account_id: AccountId, session_label: impl Into<String>) -> Self {
		Self {
			account_id,
			session_label: session_label.into(),
			access_key: None,
			secret_key: None,
			session_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the access key identifier.
	pub fn access_key(mut self, value: impl Into<String>) -> Self {
		self.access_key = Some(value.into());

		self
	}

	/// Provides the secret key value.
	pub fn secret_key(mut self, value: impl Into<String>) -> Self {
		self.secret_key = Some(CredentialSecret::new(value));

		self
	}

	/// Provides the session token value.
	pub fn session_token(mut self, value: impl Into<String>) -> Self {
		self.session_token = Some(CredentialSecret::new(value));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_key = self.access_key.ok_or(CredentialBuilderError::MissingAccessKey)?;
		let secret_key = self.secret_key.ok_or(CredentialBuilderError::MissingSecretKey)?;
		let session_token = self.session_token.ok_or(CredentialBuilderError::MissingSessionToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(Credential {
			account_id: self.account_id,
			session_label: self.session_label,
			access_key,
			secret_key,
			session_token,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn build_credential(expires_at: OffsetDateTime) -> Credential {
		let account_id = AccountId::new("111111111111").expect("Account fixture should be valid.");

		Credential::builder(account_id, "agent-x@111111111111")
			.access_key("ASIAEXAMPLE")
			.secret_key("wJalr-fixture-secret")
			.session_token("FwoG-fixture-token")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(expires_at)
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn freshness_respects_the_margin_strictly() {
		let credential = build_credential(macros::datetime!(2025-01-01 01:00 UTC));
		let margin = Duration::minutes(5);

		assert!(credential.is_fresh_at(macros::datetime!(2025-01-01 00:54 UTC), margin));
		// Exactly at the boundary counts as stale.
		assert!(!credential.is_fresh_at(macros::datetime!(2025-01-01 00:55 UTC), margin));
		assert!(!credential.is_fresh_at(macros::datetime!(2025-01-01 01:00 UTC), margin));
		assert!(credential.is_expired_at(macros::datetime!(2025-01-01 01:00 UTC)));
	}

	#[test]
	fn builder_handles_relative_expiry() {
		let account_id = AccountId::new("222222222222").expect("Account fixture should be valid.");
		let credential = Credential::builder(account_id, "label")
			.access_key("ASIAEXAMPLE")
			.secret_key("secret")
			.session_token("token")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Relative expiry should be supported.");

		assert_eq!(credential.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
	}

	#[test]
	fn builder_rejects_missing_fields() {
		let account_id = AccountId::new("333333333333").expect("Account fixture should be valid.");
		let err = Credential::builder(account_id.clone(), "label")
			.secret_key("secret")
			.session_token("token")
			.expires_in(Duration::hours(1))
			.build()
			.expect_err("Missing access key should be rejected.");

		assert_eq!(err, CredentialBuilderError::MissingAccessKey);

		let err = Credential::builder(account_id, "label")
			.access_key("ASIAEXAMPLE")
			.secret_key("secret")
			.session_token("token")
			.build()
			.expect_err("Missing expiry should be rejected.");

		assert_eq!(err, CredentialBuilderError::MissingExpiry);
	}

	#[test]
	fn debug_redacts_secret_material() {
		let credential = build_credential(macros::datetime!(2025-01-01 01:00 UTC));
		let rendered = format!("{credential:?}");

		assert!(rendered.contains("agent-x@111111111111"));
		assert!(!rendered.contains("wJalr-fixture-secret"), "Secret key must never render.");
		assert!(!rendered.contains("FwoG-fixture-token"), "Session token must never render.");
	}
}
