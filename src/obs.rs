//! Optional observability helpers for bridge request stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `sigv4_bridge.stage` with the `stage`
//!   (pipeline step) and `account` fields.
//! - Enable `metrics` to increment the `sigv4_bridge_stage_total` counter for every
//!   attempt/success/failure, labeled by `stage` + `outcome`.
//!
//! Only account identifiers and stage labels are ever emitted, never credential material.

mod metric;
mod trace;

pub use metric::*;
pub use trace::*;

// self
use crate::_prelude::*;

/// Request pipeline stages observed by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Group-to-account policy evaluation.
	Authorize,
	/// Credential issuance through the role assumer (cache misses only).
	AcquireCredentials,
	/// Downstream session establishment.
	Handshake,
	/// Signed downstream call dispatch.
	Dispatch,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Authorize => "authorize",
			Stage::AcquireCredentials => "acquire_credentials",
			Stage::Handshake => "handshake",
			Stage::Dispatch => "dispatch",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a bridge stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(Stage::Authorize.as_str(), "authorize");
		assert_eq!(Stage::AcquireCredentials.as_str(), "acquire_credentials");
		assert_eq!(Stage::Handshake.as_str(), "handshake");
		assert_eq!(Stage::Dispatch.to_string(), "dispatch");
		assert_eq!(StageOutcome::Attempt.as_str(), "attempt");
		assert_eq!(StageOutcome::Success.as_str(), "success");
		assert_eq!(StageOutcome::Failure.to_string(), "failure");
	}
}
