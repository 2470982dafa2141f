//! Strongly typed identifiers enforced across the bridge domain.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const ACCOUNT_ID_LEN: usize = 12;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (group, role).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (group, role).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (group, role).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
	/// An account identifier was not exactly twelve ASCII digits.
	#[error("Account identifier must be exactly {ACCOUNT_ID_LEN} ASCII digits.")]
	MalformedAccountId,
}

def_id! { GroupName, "Caller group membership name resolved by the external identity layer.", "Group" }
def_id! { RoleName, "IAM role name assumed inside each target account.", "Role" }

/// Twelve-digit AWS account identifier; the key of the target identity namespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);
impl AccountId {
	/// Creates a new account identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_account(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for AccountId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for AccountId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<AccountId> for String {
	fn from(value: AccountId) -> Self {
		value.0
	}
}
impl TryFrom<String> for AccountId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_account(&value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for AccountId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for AccountId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Account({})", self.0)
	}
}
impl Display for AccountId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for AccountId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

fn validate_account(view: &str) -> Result<(), IdentifierError> {
	if view.len() != ACCOUNT_ID_LEN || !view.bytes().all(|b| b.is_ascii_digit()) {
		return Err(IdentifierError::MalformedAccountId);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn account_ids_require_twelve_digits() {
		AccountId::new("111111111111").expect("Twelve digits should be accepted.");

		assert!(AccountId::new("11111111111").is_err());
		assert!(AccountId::new("1111111111111").is_err());
		assert!(AccountId::new("11111111111a").is_err());
		assert!(AccountId::new("").is_err());
	}

	#[test]
	fn group_names_trim_and_validate() {
		assert!(GroupName::new(" ops-prod").is_err(), "Leading whitespace must be rejected.");
		assert!(GroupName::new("ops-prod ").is_err(), "Trailing whitespace must be rejected.");

		let group = GroupName::new("ops-prod").expect("Group fixture should be considered valid.");

		assert_eq!(group.as_ref(), "ops-prod");
		assert!(GroupName::new("").is_err());
		assert!(RoleName::new("with space").is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let account: AccountId = serde_json::from_str("\"222222222222\"")
			.expect("Account should deserialize successfully.");

		assert_eq!(account.as_ref(), "222222222222");
		assert!(serde_json::from_str::<AccountId>("\"not-an-account\"").is_err());
		assert!(serde_json::from_str::<GroupName>("\"with space\"").is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<AccountId, u8> = HashMap::from_iter([(
			AccountId::new("123456789012").expect("Account used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("123456789012"), Some(&7));
	}
}
