//! Closed set of operations accepted by the bridge.
//!
//! Requests deserialize into [`Operation`] directly, so an unknown action fails at the
//! serde boundary instead of reaching a string dispatcher. Structural validation runs
//! before any signing or network work.

// self
use crate::{_prelude::*, auth::AccountId, error::ValidationError};

/// Raw-command tool whose arguments carry an executable command line.
const CLI_TOOL: &str = "call_aws";
const CLI_ARGUMENT: &str = "cli_command";
const CLI_PREFIX: &str = "aws ";

/// One bridge request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Operation {
	/// Lists the registry accounts visible to the caller.
	ListAccounts,
	/// Lists the downstream tools available in one account.
	ListTools {
		/// Target account.
		account_id: AccountId,
	},
	/// Invokes one downstream tool in one account.
	Query {
		/// Target account.
		account_id: AccountId,
		/// Downstream tool name.
		tool: String,
		/// Tool arguments forwarded verbatim (after validation).
		#[serde(default)]
		arguments: JsonMap<String, JsonValue>,
		/// Optional region override merged into the tool arguments.
		#[serde(default)]
		region: Option<String>,
	},
	/// Invokes one downstream tool across every enabled account.
	QueryAll {
		/// Downstream tool name.
		tool: String,
		/// Tool arguments forwarded verbatim (after validation).
		#[serde(default)]
		arguments: JsonMap<String, JsonValue>,
		/// Optional region override merged into the tool arguments.
		#[serde(default)]
		region: Option<String>,
	},
}
impl Operation {
	/// Validates the operation's structure; always runs before authorization and network
	/// dispatch.
	pub fn validate(&self) -> Result<(), ValidationError> {
		match self {
			Self::ListAccounts | Self::ListTools { .. } => Ok(()),
			Self::Query { tool, arguments, .. } | Self::QueryAll { tool, arguments, .. } =>
				validate_tool_call(tool, arguments),
		}
	}
}

fn validate_tool_call(
	tool: &str,
	arguments: &JsonMap<String, JsonValue>,
) -> Result<(), ValidationError> {
	if tool.trim().is_empty() {
		return Err(ValidationError::MissingArgument { name: "tool" });
	}
	if tool == CLI_TOOL {
		let Some(command) = arguments.get(CLI_ARGUMENT) else {
			return Err(ValidationError::MissingArgument { name: CLI_ARGUMENT });
		};
		let Some(command) = command.as_str() else {
			return Err(ValidationError::ArgumentType { name: CLI_ARGUMENT, expected: "string" });
		};

		if !command.starts_with(CLI_PREFIX) {
			return Err(ValidationError::CommandPrefix { name: CLI_ARGUMENT, prefix: CLI_PREFIX });
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn query(tool: &str, arguments: JsonValue) -> Operation {
		let JsonValue::Object(arguments) = arguments else {
			panic!("Argument fixture must be a JSON object.");
		};

		Operation::Query {
			account_id: AccountId::new("111111111111").expect("Account fixture should be valid."),
			tool: tool.into(),
			arguments,
			region: None,
		}
	}

	#[test]
	fn actions_deserialize_from_tagged_json() {
		let operation: Operation = serde_json::from_str(
			r#"{"action":"query","account_id":"111111111111","tool":"call_aws","arguments":{"cli_command":"aws s3 ls"}}"#,
		)
		.expect("Tagged operation should deserialize.");

		assert_eq!(operation, query("call_aws", serde_json::json!({"cli_command": "aws s3 ls"})));

		let operation: Operation = serde_json::from_str(r#"{"action":"list_accounts"}"#)
			.expect("Argument-free operation should deserialize.");

		assert_eq!(operation, Operation::ListAccounts);
	}

	#[test]
	fn unknown_actions_are_rejected_at_the_serde_boundary() {
		assert!(serde_json::from_str::<Operation>(r#"{"action":"drop_tables"}"#).is_err());
		assert!(serde_json::from_str::<Operation>(r#"{"tool":"call_aws"}"#).is_err());
	}

	#[test]
	fn raw_commands_require_the_literal_prefix() {
		query("call_aws", serde_json::json!({"cli_command": "aws s3 ls"}))
			.validate()
			.expect("Prefixed command should validate.");

		assert_eq!(
			query("call_aws", serde_json::json!({})).validate(),
			Err(ValidationError::MissingArgument { name: "cli_command" }),
		);
		assert_eq!(
			query("call_aws", serde_json::json!({"cli_command": 42})).validate(),
			Err(ValidationError::ArgumentType { name: "cli_command", expected: "string" }),
		);
		assert_eq!(
			query("call_aws", serde_json::json!({"cli_command": "rm -rf /"})).validate(),
			Err(ValidationError::CommandPrefix { name: "cli_command", prefix: "aws " }),
		);
		// `awsx` must not satisfy the prefix; the trailing space is part of the contract.
		assert_eq!(
			query("call_aws", serde_json::json!({"cli_command": "awsx"})).validate(),
			Err(ValidationError::CommandPrefix { name: "cli_command", prefix: "aws " }),
		);
	}

	#[test]
	fn empty_tool_names_are_rejected_for_fan_out_too() {
		let operation = Operation::QueryAll {
			tool: " ".into(),
			arguments: JsonMap::new(),
			region: None,
		};

		assert_eq!(
			operation.validate(),
			Err(ValidationError::MissingArgument { name: "tool" }),
		);
	}
}
