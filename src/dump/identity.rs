// ABOUTME: Extraction of account rows from identity-namespace inserts
// ABOUTME: Keeps only id, email and profile metadata; accounts are provisioned, not copied

use super::decoder::{decode_value, split_insert};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An account from the source identity subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    #[serde(alias = "id")]
    pub source_id: String,
    /// Empty when the source sent none or null; such accounts are not migrated
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(
        default,
        alias = "user_metadata",
        alias = "raw_user_meta_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Parse `INSERT INTO auth.users (...) VALUES (...)` into an identity record
///
/// Every column other than `id`, `email` and `raw_user_meta_data` is ignored.
/// Returns `None` when the insert is malformed or when the id or email is
/// missing, null or empty. Metadata is kept only when it decodes to an object
/// or array.
///
/// The caller is expected to have routed only identity-namespace user inserts
/// here (see [`super::classifier::is_auth_users_statement`]).
pub fn parse_auth_user_insert(statement: &str) -> Option<IdentityRecord> {
    let raw = split_insert(statement)?;

    let mut source_id = None;
    let mut email = None;
    let mut metadata = None;

    for (column, token) in raw.columns.iter().zip(&raw.values) {
        match column.to_ascii_lowercase().as_str() {
            "id" => source_id = non_empty_string(decode_value(token)),
            "email" => email = non_empty_string(decode_value(token)),
            "raw_user_meta_data" => {
                metadata = match decode_value(token) {
                    structured @ (Value::Object(_) | Value::Array(_)) => Some(structured),
                    _ => None,
                }
            }
            _ => {}
        }
    }

    Some(IdentityRecord {
        source_id: source_id?,
        email: email?,
        metadata,
    })
}
