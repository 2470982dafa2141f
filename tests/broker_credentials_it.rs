// self
use sigv4_bridge::{_preludet::*, auth::AccountId, sts::AcquisitionError};

fn account() -> AccountId {
	AccountId::new("111111111111").expect("Account identifier should be valid for broker tests.")
}

#[tokio::test]
async fn credentials_are_cached_until_the_refresh_margin() {
	let (broker, assumer, clock) = build_test_broker();
	let account = account();
	let first = broker
		.get_credentials(&account, "agent-x")
		.await
		.expect("Initial issuance should succeed.");
	let second = broker
		.get_credentials(&account, "agent-x")
		.await
		.expect("Cached issuance should succeed.");

	assert_eq!(assumer.calls(), 1, "Back-to-back calls must share one issuance.");
	assert_eq!(first.session_token.expose(), second.session_token.expose());

	// Issued lifetime is one hour; the five-minute margin makes minute 55 the boundary.
	clock.advance(Duration::minutes(54));
	broker
		.get_credentials(&account, "agent-x")
		.await
		.expect("Issuance just inside the margin should still hit the cache.");

	assert_eq!(assumer.calls(), 1);

	clock.advance(Duration::minutes(1));

	let refreshed = broker
		.get_credentials(&account, "agent-x")
		.await
		.expect("Issuance at the margin boundary should refresh.");

	assert_eq!(assumer.calls(), 2, "Exactly hitting the margin must count as stale.");
	assert_ne!(first.access_key, refreshed.access_key);
}

#[tokio::test]
async fn concurrent_misses_collapse_into_one_issuance() {
	let (broker, assumer, _clock) = build_test_broker();
	let account = account();
	let (first, second) = tokio::join!(
		broker.get_credentials(&account, "agent-x"),
		broker.get_credentials(&account, "agent-x"),
	);
	let first = first.expect("First concurrent issuance should succeed.");
	let second = second.expect("Second concurrent issuance should succeed.");

	assert_eq!(assumer.calls(), 1);
	assert_eq!(first.session_token.expose(), second.session_token.expose());
}

#[tokio::test]
async fn issuance_requests_carry_the_audited_session_label() {
	let (broker, assumer, _clock) = build_test_broker();
	let account = account();

	broker
		.get_credentials(&account, "agent x!")
		.await
		.expect("Issuance with an unsanitized caller label should succeed.");

	let requests = assumer.requests();

	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].role_arn, "arn:aws:iam::111111111111:role/CentralOpsTargetRole");
	assert_eq!(requests[0].session_label, "agent-x-@111111111111");
	assert_eq!(requests[0].duration, Duration::hours(1));
}

#[tokio::test]
async fn throttling_backs_off_before_retrying() {
	let (broker, assumer, clock) = build_test_broker();

	assumer.push_outcome(Err(AcquisitionError::Throttled { retry_after: None }));

	broker
		.get_credentials(&account(), "agent-x")
		.await
		.expect("Issuance should succeed after one throttled attempt.");

	assert_eq!(assumer.calls(), 2);

	let slept = clock.slept();

	assert_eq!(slept.len(), 1);
	assert!(
		slept[0] >= Duration::milliseconds(200) && slept[0] <= Duration::milliseconds(300),
		"First backoff delay {} should be the base plus bounded jitter.",
		slept[0],
	);
}

#[tokio::test]
async fn throttling_honors_the_retry_after_hint() {
	let (broker, assumer, clock) = build_test_broker();

	assumer.push_outcome(Err(AcquisitionError::Throttled {
		retry_after: Some(Duration::seconds(2)),
	}));

	broker
		.get_credentials(&account(), "agent-x")
		.await
		.expect("Issuance should succeed after the hinted delay.");

	assert_eq!(assumer.calls(), 2);
	assert_eq!(clock.slept(), [Duration::seconds(2)]);
}

#[tokio::test]
async fn denials_fail_immediately_without_retry() {
	let (broker, assumer, clock) = build_test_broker();

	assumer.push_outcome(Err(AcquisitionError::Denied { reason: "trust policy".into() }));

	let error = broker
		.get_credentials(&account(), "agent-x")
		.await
		.expect_err("Denied issuance should fail.");

	assert!(matches!(error, Error::Acquisition(AcquisitionError::Denied { .. })));
	assert_eq!(assumer.calls(), 1, "Fatal failures must never be retried.");
	assert!(clock.slept().is_empty());
	assert!(broker.cached(&account()).is_none(), "Failed issuances must not be cached.");
}

#[tokio::test]
async fn the_retry_budget_is_bounded() {
	let (broker, assumer, clock) = build_test_broker();

	for _ in 0..3 {
		assumer.push_outcome(Err(AcquisitionError::Throttled { retry_after: None }));
	}

	let error = broker
		.get_credentials(&account(), "agent-x")
		.await
		.expect_err("Persistent throttling should exhaust the budget.");

	assert!(matches!(error, Error::Acquisition(AcquisitionError::Throttled { .. })));
	assert_eq!(assumer.calls(), 3);
	assert_eq!(clock.slept().len(), 2, "The final attempt must fail without sleeping again.");
}

#[tokio::test]
async fn eviction_forces_a_fresh_issuance() {
	let (broker, assumer, _clock) = build_test_broker();
	let account = account();

	broker.get_credentials(&account, "agent-x").await.expect("Initial issuance should succeed.");

	let evicted = broker.evict(&account);

	assert!(evicted.is_some());
	assert!(broker.cached(&account).is_none());

	broker
		.get_credentials(&account, "agent-x")
		.await
		.expect("Post-eviction issuance should succeed.");

	assert_eq!(assumer.calls(), 2);
}
