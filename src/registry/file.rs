//! Simple JSON-file [`AccountRegistry`] for lightweight deployments.
//!
//! The snapshot format is a flat array of account entries, matching what operators
//! typically check into configuration repositories:
//!
//! ```json
//! [{"account_id":"111111111111","display_name":"Prod","environment_tag":"prod","enabled":true}]
//! ```

// std
use std::{
	fs,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::AccountId,
	registry::{self, AccountInfo, AccountRegistry, RegistryError, RegistryFuture},
};

/// Read-only registry backed by a JSON snapshot loaded eagerly at open time.
///
/// The registry never mutates account metadata, so the snapshot is parsed once and the
/// file is not watched afterwards; reopen to pick up changes.
#[derive(Clone, Debug)]
pub struct FileRegistry {
	entries: Arc<BTreeMap<AccountId, AccountInfo>>,
}
impl FileRegistry {
	/// Opens a registry snapshot at the provided path.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
		let path = path.into();
		let bytes = fs::read(&path).map_err(|e| RegistryError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		Self::from_snapshot(&bytes, &path)
	}

	/// Parses a registry from an in-memory JSON payload (e.g. an environment variable).
	pub fn from_json_str(payload: &str) -> Result<Self, RegistryError> {
		Self::from_snapshot(payload.as_bytes(), Path::new("<inline>"))
	}

	fn from_snapshot(bytes: &[u8], origin: &Path) -> Result<Self, RegistryError> {
		let entries: Vec<AccountInfo> =
			serde_json::from_slice(bytes).map_err(|e| RegistryError::Serialization {
				message: format!("Failed to parse {}: {e}", origin.display()),
			})?;
		let entries =
			entries.into_iter().map(|info| (info.account_id.clone(), info)).collect();

		Ok(Self { entries: Arc::new(entries) })
	}
}
impl AccountRegistry for FileRegistry {
	fn lookup<'a>(&'a self, account_id: &'a AccountId) -> RegistryFuture<'a, AccountInfo> {
		let entries = self.entries.clone();

		Box::pin(async move { registry::resolve_entry(entries.get(account_id), account_id) })
	}

	fn list(&self) -> RegistryFuture<'_, Vec<AccountInfo>> {
		let entries = self.entries.clone();

		Box::pin(async move {
			Ok(entries.values().filter(|info| info.enabled).cloned().collect())
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, io::Write, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	const SNAPSHOT: &str = r#"[
		{"account_id":"111111111111","display_name":"Prod","environment_tag":"prod","enabled":true},
		{"account_id":"222222222222","display_name":"Dev","environment_tag":"dev","enabled":false}
	]"#;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"sigv4_bridge_file_registry_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn open_and_lookup_round_trip() {
		let path = temp_path();

		{
			let mut file = fs::File::create(&path).expect("Failed to create snapshot fixture.");

			file.write_all(SNAPSHOT.as_bytes()).expect("Failed to write snapshot fixture.");
		}

		let registry = FileRegistry::open(&path).expect("Failed to open registry snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for registry test.");
		let prod = AccountId::new("111111111111").expect("Account fixture should be valid.");
		let info = rt
			.block_on(registry.lookup(&prod))
			.expect("Enabled snapshot account should resolve.");

		assert_eq!(info.display_name, "Prod");

		let listed = rt.block_on(registry.list()).expect("List should succeed.");

		assert_eq!(listed.len(), 1, "Disabled accounts must not be listed.");

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary registry snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn malformed_snapshots_fail_with_serialization_errors() {
		let err = FileRegistry::from_json_str("{\"not\":\"a list\"}")
			.expect_err("Malformed snapshot should be rejected.");

		assert!(matches!(err, RegistryError::Serialization { .. }));

		let err = FileRegistry::open(temp_path())
			.expect_err("Missing snapshot files should be rejected.");

		assert!(matches!(err, RegistryError::Backend { .. }));
	}
}
