//! Cached credential brokering with refresh margins, single-flight issuance, and
//! bounded retry.
//!
//! The broker owns the only mutable state in the crate: a per-account credential cache.
//! A cached credential is served only while it stays fresh past the refresh margin;
//! anything closer to expiry is re-issued before use so a long downstream call never
//! runs on credentials that lapse mid-flight. Concurrent misses for the same account
//! collapse into one issuance call.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	auth::{AccountId, Credential, RoleName},
	obs::{self, Stage, StageOutcome, StageSpan},
	sts::{AcquisitionError, AssumeRoleRequest, RoleAssumer},
};

/// Freshness margin subtracted from every expiry check.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);
/// Session lifetime requested from the identity provider.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::hours(1);
/// Shortest session lifetime the provider accepts.
pub const MIN_SESSION_DURATION: Duration = Duration::minutes(15);
/// Longest session lifetime the provider accepts.
pub const MAX_SESSION_DURATION: Duration = Duration::hours(12);

const BACKOFF_BASE: Duration = Duration::milliseconds(200);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ROLE_NAME: &str = "CentralOpsTargetRole";
const SESSION_LABEL_MAX_LEN: usize = 64;

/// Boxed future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Time source used for freshness checks, signing timestamps, and backoff delays.
///
/// Injecting the clock keeps every expiry decision testable without real time passing.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Current instant.
	fn now(&self) -> OffsetDateTime;

	/// Resolves after the provided duration has elapsed.
	fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Wall-clock [`Clock`] used outside of tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		#[cfg(feature = "reqwest")]
		{
			let duration = std::time::Duration::try_from(duration).unwrap_or_default();

			Box::pin(tokio::time::sleep(duration))
		}
		#[cfg(not(feature = "reqwest"))]
		{
			// No async timer is available without the reqwest stack; block the thread so
			// backoff still spaces out retries.
			Box::pin(async move {
				if let Ok(duration) = std::time::Duration::try_from(duration) {
					std::thread::sleep(duration);
				}
			})
		}
	}
}

/// Per-account credential broker in front of a [`RoleAssumer`].
///
/// Cheap to clone; clones share the cache and in-flight issuance guards.
pub struct CredentialBroker<A>
where
	A: ?Sized + RoleAssumer,
{
	assumer: Arc<A>,
	clock: Arc<dyn Clock>,
	role_name: Option<RoleName>,
	refresh_margin: Duration,
	session_duration: Duration,
	max_attempts: u32,
	cache: Arc<Mutex<HashMap<AccountId, Credential>>>,
	guards: Arc<Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>>,
}
impl<A> CredentialBroker<A>
where
	A: ?Sized + RoleAssumer,
{
	/// Creates a broker with the default margin, session duration, and retry budget.
	pub fn new(assumer: Arc<A>) -> Self {
		Self {
			assumer,
			clock: Arc::new(SystemClock),
			role_name: None,
			refresh_margin: DEFAULT_REFRESH_MARGIN,
			session_duration: DEFAULT_SESSION_DURATION,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			cache: Arc::new(Mutex::new(HashMap::new())),
			guards: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Replaces the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the role name assumed inside each target account.
	pub fn with_role_name(mut self, role_name: RoleName) -> Self {
		self.role_name = Some(role_name);

		self
	}

	/// Overrides the refresh margin (defaults to five minutes).
	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin;

		self
	}

	/// Overrides the requested session duration; values outside the permitted window make
	/// every issuance fail closed rather than being silently clamped.
	pub fn with_session_duration(mut self, duration: Duration) -> Self {
		self.session_duration = duration;

		self
	}

	/// Overrides the issuance attempt budget (defaults to three).
	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts.max(1);

		self
	}

	/// Borrows the broker's time source.
	pub fn clock(&self) -> &dyn Clock {
		&*self.clock
	}

	/// Returns the cached credential for the account, fresh or not.
	pub fn cached(&self, account_id: &AccountId) -> Option<Credential> {
		self.cache.lock().get(account_id).cloned()
	}

	/// Drops the cached credential for the account, returning it if present.
	pub fn evict(&self, account_id: &AccountId) -> Option<Credential> {
		self.cache.lock().remove(account_id)
	}

	/// Returns usable credentials for the account, issuing fresh ones when the cache
	/// misses or the cached set sits inside the refresh margin.
	///
	/// `caller_label` feeds the audited session label; it carries no authority.
	pub async fn get_credentials(
		&self,
		account_id: &AccountId,
		caller_label: &str,
	) -> Result<Credential> {
		if let Some(credential) = self.fresh_cached(account_id) {
			return Ok(credential);
		}

		let guard = {
			let mut guards = self.guards.lock();

			guards.entry(account_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
		};
		let _held = guard.lock().await;

		// A concurrent holder may have refreshed while this task waited on the guard.
		if let Some(credential) = self.fresh_cached(account_id) {
			return Ok(credential);
		}

		const STAGE: Stage = Stage::AcquireCredentials;

		let span = StageSpan::new(STAGE, account_id);

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let acquired = span.instrument(self.acquire(account_id, caller_label)).await;

		match &acquired {
			Ok(_) => obs::record_stage_outcome(STAGE, StageOutcome::Success),
			Err(_) => obs::record_stage_outcome(STAGE, StageOutcome::Failure),
		}

		let credential = acquired?;

		self.cache.lock().insert(account_id.clone(), credential.clone());

		Ok(credential)
	}

	fn fresh_cached(&self, account_id: &AccountId) -> Option<Credential> {
		let now = self.clock.now();

		self.cache
			.lock()
			.get(account_id)
			.filter(|credential| credential.is_fresh_at(now, self.refresh_margin))
			.cloned()
	}

	async fn acquire(
		&self,
		account_id: &AccountId,
		caller_label: &str,
	) -> Result<Credential, AcquisitionError> {
		if self.session_duration < MIN_SESSION_DURATION
			|| self.session_duration > MAX_SESSION_DURATION
		{
			return Err(AcquisitionError::DurationOutOfRange {
				requested: self.session_duration,
				min: MIN_SESSION_DURATION,
				max: MAX_SESSION_DURATION,
			});
		}

		let request = AssumeRoleRequest {
			role_arn: self.role_arn(account_id),
			session_label: session_label(caller_label, account_id),
			duration: self.session_duration,
		};
		let mut attempt = 0_u32;

		loop {
			match self.assumer.assume_role(account_id, request.clone()).await {
				Ok(issued) => {
					let now = self.clock.now();

					// Credentials already inside the margin would be refreshed on the very
					// next call; surfacing the issue beats looping on issuance.
					if now + self.refresh_margin >= issued.expires_at {
						return Err(AcquisitionError::ExpiringTooSoon {
							expires_at: issued.expires_at,
						});
					}

					return Ok(Credential {
						account_id: account_id.clone(),
						session_label: request.session_label,
						access_key: issued.access_key,
						secret_key: issued.secret_key,
						session_token: issued.session_token,
						issued_at: now,
						expires_at: issued.expires_at,
					});
				},
				Err(error) => {
					attempt += 1;

					if attempt >= self.max_attempts || !error.is_retryable() {
						return Err(error);
					}

					let delay = match &error {
						AcquisitionError::Throttled { retry_after: Some(hint) } => *hint,
						_ => backoff_delay(attempt),
					};

					self.clock.sleep(delay).await;
				},
			}
		}
	}

	fn role_arn(&self, account_id: &AccountId) -> String {
		let role = self.role_name.as_deref().unwrap_or(DEFAULT_ROLE_NAME);

		format!("arn:aws:iam::{account_id}:role/{role}")
	}
}
impl<A> Clone for CredentialBroker<A>
where
	A: ?Sized + RoleAssumer,
{
	fn clone(&self) -> Self {
		Self {
			assumer: self.assumer.clone(),
			clock: self.clock.clone(),
			role_name: self.role_name.clone(),
			refresh_margin: self.refresh_margin,
			session_duration: self.session_duration,
			max_attempts: self.max_attempts,
			cache: self.cache.clone(),
			guards: self.guards.clone(),
		}
	}
}
impl<A> Debug for CredentialBroker<A>
where
	A: ?Sized + RoleAssumer,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialBroker")
			.field("role_name", &self.role_name)
			.field("refresh_margin", &self.refresh_margin)
			.field("session_duration", &self.session_duration)
			.field("max_attempts", &self.max_attempts)
			.finish_non_exhaustive()
	}
}

/// Builds the audited session label: the sanitized caller label joined to the target
/// account, truncated to the provider's length ceiling.
pub(crate) fn session_label(caller_label: &str, account_id: &AccountId) -> String {
	let mut label = String::with_capacity(caller_label.len());

	for c in caller_label.chars() {
		if c.is_ascii_alphanumeric() || matches!(c, '+' | '=' | ',' | '.' | '@' | '-' | '_') {
			label.push(c);
		} else {
			label.push('-');
		}
	}

	if label.is_empty() {
		label.push_str("anonymous");
	}

	// Only the caller component is truncated; the account suffix must always survive.
	// All retained characters are ASCII, so byte truncation is char-safe.
	label.truncate(SESSION_LABEL_MAX_LEN - account_id.len() - 1);

	format!("{label}@{account_id}")
}

fn backoff_delay(attempt: u32) -> Duration {
	let exponent = attempt.saturating_sub(1).min(8);
	let jitter = rand::rng().random_range(0..=100_i64);

	BACKOFF_BASE * 2_i32.pow(exponent) + Duration::milliseconds(jitter)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::build_test_broker;

	fn account() -> AccountId {
		AccountId::new("111111111111").expect("Account fixture should be valid.")
	}

	#[test]
	fn session_labels_are_sanitized_and_bounded() {
		let account = account();

		assert_eq!(session_label("agent-x", &account), "agent-x@111111111111");
		assert_eq!(session_label("agent x!", &account), "agent-x-@111111111111");
		assert_eq!(session_label("", &account), "anonymous@111111111111");

		let long = session_label(&"a".repeat(100), &account);

		assert_eq!(long.len(), SESSION_LABEL_MAX_LEN);
		assert!(long.starts_with("aaa"));
		assert!(long.ends_with("@111111111111"), "The account must survive truncation.");
	}

	#[test]
	fn role_arns_use_the_designated_role() {
		let (broker, _, _) = build_test_broker();

		assert_eq!(
			broker.role_arn(&account()),
			"arn:aws:iam::111111111111:role/CentralOpsTargetRole",
		);

		let broker = broker.with_role_name(
			RoleName::new("AuditRole").expect("Role fixture should be valid."),
		);

		assert_eq!(broker.role_arn(&account()), "arn:aws:iam::111111111111:role/AuditRole");
	}

	#[test]
	fn backoff_grows_with_attempts() {
		for attempt in 1..=3 {
			let delay = backoff_delay(attempt);
			let floor = BACKOFF_BASE * 2_i32.pow(attempt - 1);

			assert!(delay >= floor, "Delay {delay} must not undercut the floor {floor}.");
			assert!(delay <= floor + Duration::milliseconds(100));
		}
	}

	#[cfg(not(feature = "reqwest"))]
	#[tokio::test]
	async fn system_clock_sleep_spaces_out_retries() {
		let start = std::time::Instant::now();

		SystemClock.sleep(Duration::milliseconds(20)).await;

		assert!(start.elapsed() >= std::time::Duration::from_millis(20));
	}

	#[tokio::test]
	async fn out_of_range_durations_fail_closed() {
		let (broker, assumer, _) = build_test_broker();
		let broker = broker.with_session_duration(Duration::minutes(5));
		let error = broker
			.get_credentials(&account(), "agent-x")
			.await
			.expect_err("Undersized session durations should be rejected.");

		assert!(matches!(
			error,
			Error::Acquisition(AcquisitionError::DurationOutOfRange { .. }),
		));
		assert_eq!(assumer.calls(), 0, "Validation must run before any issuance call.");
	}

	#[tokio::test]
	async fn issuance_inside_the_margin_is_rejected() {
		let (broker, _, _) = build_test_broker();
		let broker = broker.with_refresh_margin(Duration::hours(2));
		let error = broker
			.get_credentials(&account(), "agent-x")
			.await
			.expect_err("Credentials expiring inside the margin should be rejected.");

		assert!(matches!(error, Error::Acquisition(AcquisitionError::ExpiringTooSoon { .. })));
	}
}
