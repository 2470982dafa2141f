//! Account registry contracts and built-in read-only backends.

pub mod file;
pub mod memory;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

// self
use crate::{_prelude::*, auth::AccountId};

/// Boxed future returned by [`AccountRegistry`] implementations.
pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RegistryError>> + 'a + Send>>;

/// Read-only lookup contract for target-account metadata.
///
/// Intentionally dumb: no policy logic lives here. Backends only answer "what is this
/// account" and "which enabled accounts exist".
pub trait AccountRegistry
where
	Self: Send + Sync,
{
	/// Resolves metadata for the provided account identifier.
	///
	/// Fails with [`RegistryError::NotFound`] for unknown identifiers and with
	/// [`RegistryError::Disabled`] when the entry exists but is switched off.
	fn lookup<'a>(&'a self, account_id: &'a AccountId) -> RegistryFuture<'a, AccountInfo>;

	/// Lists every enabled account, ordered by account identifier.
	fn list(&self) -> RegistryFuture<'_, Vec<AccountInfo>>;
}

/// Immutable account metadata owned entirely by the external registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
	/// Twelve-digit account identifier; exactly matches the target identity namespace.
	pub account_id: AccountId,
	/// Human-readable account name.
	pub display_name: String,
	/// Environment tag (e.g. `prod`, `dev`).
	pub environment_tag: String,
	/// Whether the bridge may act on this account at all.
	pub enabled: bool,
}

/// Error type produced by [`AccountRegistry`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RegistryError {
	/// The account identifier is unknown to the registry.
	#[error("Account {account_id} is not registered.")]
	NotFound {
		/// Looked-up account identifier.
		account_id: AccountId,
	},
	/// The account exists but has been disabled.
	#[error("Account {account_id} is disabled.")]
	Disabled {
		/// Looked-up account identifier.
		account_id: AccountId,
	},
	/// Snapshot parsing failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

pub(crate) fn resolve_entry(
	entry: Option<&AccountInfo>,
	account_id: &AccountId,
) -> Result<AccountInfo, RegistryError> {
	match entry {
		Some(info) if info.enabled => Ok(info.clone()),
		Some(_) => Err(RegistryError::Disabled { account_id: account_id.clone() }),
		None => Err(RegistryError::NotFound { account_id: account_id.clone() }),
	}
}
