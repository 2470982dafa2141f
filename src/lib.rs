//! Rust’s turnkey cross-account SigV4 bridge—broker short-lived STS credentials, enforce
//! group-to-account policy, and sign MCP calls in one crate built for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bridge;
pub mod broker;
pub mod error;
pub mod http;
pub mod obs;
pub mod policy;
pub mod registry;
pub mod sign;
pub mod sts;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience fixtures and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicU64, Ordering};
	// self
	use crate::{
		auth::{AccountId, CredentialSecret},
		broker::{Clock, CredentialBroker, SleepFuture},
		registry::AccountInfo,
		sts::{AcquisitionError, AssumeFuture, AssumeRoleRequest, IssuedCredentials, RoleAssumer},
	};
	#[cfg(feature = "reqwest")]
	use crate::{
		bridge::{McpEndpoint, ProtocolBridge},
		http::ReqwestBridgeClient,
		policy::AuthorizationPolicy,
		registry::MemoryRegistry,
	};

	/// Deterministic [`Clock`] that only moves when a test advances it.
	///
	/// `sleep` resolves immediately and records the requested delay so backoff behavior can be
	/// asserted without real time passing.
	#[derive(Debug)]
	pub struct ManualClock {
		now: Mutex<OffsetDateTime>,
		slept: Mutex<Vec<Duration>>,
	}
	impl ManualClock {
		/// Creates a clock frozen at the provided instant.
		pub fn starting_at(instant: OffsetDateTime) -> Self {
			Self { now: Mutex::new(instant), slept: Mutex::new(Vec::new()) }
		}

		/// Moves the clock forward by the provided delta.
		pub fn advance(&self, delta: Duration) {
			*self.now.lock() += delta;
		}

		/// Returns every delay that was requested through [`Clock::sleep`].
		pub fn slept(&self) -> Vec<Duration> {
			self.slept.lock().clone()
		}
	}
	impl Default for ManualClock {
		fn default() -> Self {
			Self::starting_at(OffsetDateTime::UNIX_EPOCH + Duration::days(20_000))
		}
	}
	impl Clock for ManualClock {
		fn now(&self) -> OffsetDateTime {
			*self.now.lock()
		}

		fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
			self.slept.lock().push(duration);

			Box::pin(async {})
		}
	}

	/// Scripted [`RoleAssumer`] that counts issuance calls and replays queued outcomes.
	///
	/// When the outcome queue is empty it issues a uniquely numbered credential set that expires
	/// one hour after the linked clock's current instant.
	pub struct StaticRoleAssumer {
		clock: Arc<ManualClock>,
		issue_ttl: Duration,
		calls: AtomicU64,
		outcomes: Mutex<Vec<Result<IssuedCredentials, AcquisitionError>>>,
		requests: Mutex<Vec<AssumeRoleRequest>>,
	}
	impl StaticRoleAssumer {
		/// Creates an assumer whose issued credentials last one hour of clock time.
		pub fn new(clock: Arc<ManualClock>) -> Self {
			Self {
				clock,
				issue_ttl: Duration::hours(1),
				calls: AtomicU64::new(0),
				outcomes: Mutex::new(Vec::new()),
				requests: Mutex::new(Vec::new()),
			}
		}

		/// Queues an outcome that the next issuance call will replay.
		pub fn push_outcome(&self, outcome: Result<IssuedCredentials, AcquisitionError>) {
			self.outcomes.lock().push(outcome);
		}

		/// Returns how many issuance calls have been made.
		pub fn calls(&self) -> u64 {
			self.calls.load(Ordering::SeqCst)
		}

		/// Returns the recorded issuance requests, oldest first.
		pub fn requests(&self) -> Vec<AssumeRoleRequest> {
			self.requests.lock().clone()
		}
	}
	impl RoleAssumer for StaticRoleAssumer {
		fn assume_role<'a>(
			&'a self,
			_account_id: &'a AccountId,
			request: AssumeRoleRequest,
		) -> AssumeFuture<'a> {
			let serial = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			self.requests.lock().push(request);

			let queued = {
				let mut outcomes = self.outcomes.lock();

				if outcomes.is_empty() { None } else { Some(outcomes.remove(0)) }
			};
			let issued = queued.unwrap_or_else(|| {
				Ok(IssuedCredentials {
					access_key: format!("ASIATEST{serial:08}"),
					secret_key: CredentialSecret::new(format!("secret-{serial}")),
					session_token: CredentialSecret::new(format!("token-{serial}")),
					expires_at: self.clock.now() + self.issue_ttl,
				})
			});

			Box::pin(async move { issued })
		}
	}

	/// Broker wired to a [`StaticRoleAssumer`] and [`ManualClock`] for deterministic tests.
	pub fn build_test_broker()
	-> (CredentialBroker<StaticRoleAssumer>, Arc<StaticRoleAssumer>, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::default());
		let assumer = Arc::new(StaticRoleAssumer::new(clock.clone()));
		let broker =
			CredentialBroker::new(assumer.clone()).with_clock(clock.clone() as Arc<dyn Clock>);

		(broker, assumer, clock)
	}

	/// Registry entry fixture for the provided account id.
	pub fn account_fixture(account_id: &str, name: &str, enabled: bool) -> AccountInfo {
		AccountInfo {
			account_id: AccountId::new(account_id).expect("Account fixture id should be valid."),
			display_name: name.into(),
			environment_tag: "test".into(),
			enabled,
		}
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_bridge_client() -> ReqwestBridgeClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestBridgeClient::with_client(client)
	}

	/// Bridge type alias used by reqwest-backed integration tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestBridge = ProtocolBridge<StaticRoleAssumer, ReqwestBridgeClient>;

	/// Constructs a [`ProtocolBridge`] backed by an in-memory registry, a scripted role assumer,
	/// and the reqwest transport used across integration tests.
	#[cfg(feature = "reqwest")]
	pub fn build_test_bridge(
		endpoint: McpEndpoint,
		policy: AuthorizationPolicy,
		accounts: impl IntoIterator<Item = AccountInfo>,
	) -> (ReqwestTestBridge, Arc<StaticRoleAssumer>, Arc<ManualClock>) {
		let (broker, assumer, clock) = build_test_broker();
		let registry = Arc::new(MemoryRegistry::from_iter(accounts));
		let bridge =
			ProtocolBridge::new(registry, policy, broker, test_reqwest_bridge_client(), endpoint);

		(bridge, assumer, clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
#[cfg(test)] use sigv4_bridge as _;
