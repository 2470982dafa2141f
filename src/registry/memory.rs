//! Thread-safe in-memory [`AccountRegistry`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::AccountId,
	registry::{self, AccountInfo, AccountRegistry, RegistryFuture},
};

type RegistryMap = Arc<RwLock<BTreeMap<AccountId, AccountInfo>>>;

/// Registry backend that keeps account metadata in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryRegistry(RegistryMap);
impl MemoryRegistry {
	/// Inserts (or replaces) an account entry.
	pub fn insert(&self, info: AccountInfo) {
		self.0.write().insert(info.account_id.clone(), info);
	}
}
impl FromIterator<AccountInfo> for MemoryRegistry {
	fn from_iter<I: IntoIterator<Item = AccountInfo>>(iter: I) -> Self {
		let registry = Self::default();

		for info in iter {
			registry.insert(info);
		}

		registry
	}
}
impl AccountRegistry for MemoryRegistry {
	fn lookup<'a>(&'a self, account_id: &'a AccountId) -> RegistryFuture<'a, AccountInfo> {
		let map = self.0.clone();

		Box::pin(async move { registry::resolve_entry(map.read().get(account_id), account_id) })
	}

	fn list(&self) -> RegistryFuture<'_, Vec<AccountInfo>> {
		let map = self.0.clone();

		Box::pin(async move {
			Ok(map.read().values().filter(|info| info.enabled).cloned().collect())
		})
	}
}
