//! Group-to-account authorization policy and the pure gate evaluated before issuance.

// std
use std::fmt;
// crates.io
use serde::{
	Deserializer, Serializer,
	de::{SeqAccess, Visitor},
};
// self
use crate::{
	_prelude::*,
	auth::{AccountId, GroupName},
};

/// Accounts a caller group is permitted to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountSelection {
	/// The group may act on every registered account.
	All,
	/// The group may act on the listed accounts only.
	Accounts(BTreeSet<AccountId>),
}
impl AccountSelection {
	const WILDCARD: &'static str = "*";

	/// Checks whether the selection permits the provided account.
	pub fn permits(&self, account_id: &AccountId) -> bool {
		match self {
			Self::All => true,
			Self::Accounts(accounts) => accounts.contains(account_id),
		}
	}
}
impl FromIterator<AccountId> for AccountSelection {
	fn from_iter<I: IntoIterator<Item = AccountId>>(iter: I) -> Self {
		Self::Accounts(iter.into_iter().collect())
	}
}
impl Serialize for AccountSelection {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Self::All => serializer.serialize_str(Self::WILDCARD),
			Self::Accounts(accounts) => serializer.collect_seq(accounts),
		}
	}
}
impl<'de> Deserialize<'de> for AccountSelection {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct SelectionVisitor;
		impl<'de> Visitor<'de> for SelectionVisitor {
			type Value = AccountSelection;

			fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str("\"*\" or a list of account identifiers")
			}

			fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
				if value == AccountSelection::WILDCARD {
					Ok(AccountSelection::All)
				} else {
					Err(E::custom("expected the wildcard \"*\""))
				}
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
				let mut accounts = BTreeSet::new();

				while let Some(account) = seq.next_element::<AccountId>()? {
					accounts.insert(account);
				}

				Ok(AccountSelection::Accounts(accounts))
			}
		}

		deserializer.deserialize_any(SelectionVisitor)
	}
}

/// Read-only mapping from caller group to permitted accounts, loaded once per process.
///
/// Evaluation is deny-by-default: a group absent from the policy grants nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationPolicy(HashMap<GroupName, AccountSelection>);
impl AuthorizationPolicy {
	/// Creates an empty policy that denies everything.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds (or replaces) a group's account selection.
	pub fn grant(mut self, group: GroupName, selection: AccountSelection) -> Self {
		self.0.insert(group, selection);

		self
	}

	/// Parses a policy from its JSON representation, e.g.
	/// `{"platform-admins": "*", "ops-prod": ["111111111111"]}`.
	pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(payload)
	}

	/// Decides whether a caller with the provided group memberships may act on the target
	/// account. Pure and deterministic; evaluated strictly before any credential issuance.
	pub fn authorize<'a>(
		&self,
		caller_groups: impl IntoIterator<Item = &'a GroupName>,
		account_id: &AccountId,
	) -> bool {
		caller_groups
			.into_iter()
			.any(|group| self.0.get(group).is_some_and(|selection| selection.permits(account_id)))
	}

	/// Returns `true` when no group has been granted anything.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Caller identity resolved by the external identity layer.
///
/// The bridge trusts these group memberships as-is; inbound token verification happens
/// upstream. The label feeds session-label construction for audit attribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
	label: String,
	groups: BTreeSet<GroupName>,
}
impl CallerContext {
	/// Creates a context for the provided audit label with no group memberships.
	pub fn new(label: impl Into<String>) -> Self {
		Self { label: label.into(), groups: BTreeSet::new() }
	}

	/// Adds one group membership.
	pub fn with_group(mut self, group: GroupName) -> Self {
		self.groups.insert(group);

		self
	}

	/// Adds several group memberships.
	pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupName>) -> Self {
		self.groups.extend(groups);

		self
	}

	/// Audit label identifying the caller; safe to log.
	pub fn label(&self) -> &str {
		&self.label
	}

	/// Iterates the caller's group memberships.
	pub fn groups(&self) -> impl Iterator<Item = &GroupName> {
		self.groups.iter()
	}
}
