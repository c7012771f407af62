// ABOUTME: SQL dump parsing: tokenizer, classifier, value decoder and identity extraction
// ABOUTME: Turns dump text into replayable operations plus identity-namespace accounts

pub mod classifier;
pub mod decoder;
pub mod identity;
pub mod tokenizer;

pub use classifier::{
    extract_table_name, is_any_auth_statement, is_auth_users_statement, should_skip_statement,
    statement_target, UNKNOWN_TABLE,
};
pub use decoder::{
    decode_value, parse_delete_all, parse_insert_to_record, split_top_level, DeleteAll,
    InsertRecord,
};
pub use identity::{parse_auth_user_insert, IdentityRecord};
pub use tokenizer::{split_statements, StatementTokenizer, DOLLAR_TAG_WINDOW};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema assumed for inserts that do not name one
pub const DEFAULT_SCHEMA: &str = "public";

/// Column name to typed value, in declared column order
pub type Record = serde_json::Map<String, serde_json::Value>;

/// What a single dump statement asks the destination to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Insert { table: String, record: Record },
    DeleteAll { table: String },
    Skip,
}

/// Verdict for one statement, including identity rows routed away from the generic decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Operation(Operation),
    Identity(IdentityRecord),
    /// An identity-namespace user insert without a usable id or email
    RejectedIdentity,
    /// Outside the simple insert/delete shapes this decoder understands
    Unparsed,
}

/// Decode one statement into an operation, or `None` if it has no recognized shape
///
/// Statements that [`should_skip_statement`] rejects become [`Operation::Skip`].
pub fn parse_statement(statement: &str) -> Option<Operation> {
    if should_skip_statement(statement) {
        return Some(Operation::Skip);
    }
    if let Some(insert) = parse_insert_to_record(statement) {
        return Some(Operation::Insert {
            table: insert.table,
            record: insert.record,
        });
    }
    parse_delete_all(statement).map(|delete| Operation::DeleteAll {
        table: delete.table,
    })
}

/// Classify one statement, routing identity-schema statements away from row replay
pub fn classify_statement(statement: &str) -> Classified {
    if should_skip_statement(statement) {
        return Classified::Operation(Operation::Skip);
    }

    if is_auth_users_statement(statement) {
        return match parse_auth_user_insert(statement) {
            Some(identity) => Classified::Identity(identity),
            None => Classified::RejectedIdentity,
        };
    }

    // Everything else in the identity schema is rebuilt by the destination
    if is_any_auth_statement(statement) {
        return Classified::Operation(Operation::Skip);
    }

    match parse_statement(statement) {
        Some(operation) => Classified::Operation(operation),
        None => Classified::Unparsed,
    }
}

/// Counters collected while parsing a dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub statements: usize,
    pub inserts: usize,
    pub delete_alls: usize,
    pub identities: usize,
    pub skipped: usize,
    pub unparsed: usize,
    pub rejected_identities: usize,
}

/// Everything a dump contributes to a migration
#[derive(Debug, Clone, Default)]
pub struct ParsedDump {
    /// Insert and DeleteAll operations in dump order; skipped statements are dropped
    pub operations: Vec<Operation>,
    pub identities: Vec<IdentityRecord>,
    pub stats: ParseStats,
    /// Tables that receive inserts under more than one schema; their rows
    /// share a single table stream because records are keyed by bare name
    pub merged_tables: Vec<String>,
}

impl ParsedDump {
    /// Tables with inserts, in order of first appearance, with their row counts
    pub fn table_row_counts(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = Vec::new();
        for operation in &self.operations {
            if let Operation::Insert { table, .. } = operation {
                match counts.iter_mut().find(|(name, _)| name == table) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((table.clone(), 1)),
                }
            }
        }
        counts
    }

    /// Tables the dump clears with an unconditional delete
    pub fn cleared_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for operation in &self.operations {
            if let Operation::DeleteAll { table } = operation {
                if !tables.contains(table) {
                    tables.push(table.clone());
                }
            }
        }
        tables
    }

    /// Records inserted into `table`, in dump order
    pub fn rows_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.operations.iter().filter_map(move |operation| match operation {
            Operation::Insert { table: t, record } if t == table => Some(record),
            _ => None,
        })
    }
}

/// Remember which schema first fed `table` and flag it once a second schema appears
fn note_schema(
    table_schemas: &mut BTreeMap<String, String>,
    merged_tables: &mut Vec<String>,
    table: &str,
    statement: &str,
) {
    let schema = statement_target(statement)
        .and_then(|target| target.schema)
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

    if !table_schemas.contains_key(table) {
        table_schemas.insert(table.to_string(), schema);
        return;
    }
    let first = &table_schemas[table];
    if *first != schema && !merged_tables.iter().any(|t| t == table) {
        tracing::warn!(
            "Table '{}' appears in schemas '{}' and '{}'; their rows are merged",
            table,
            first,
            schema
        );
        merged_tables.push(table.to_string());
    }
}

/// Tokenize and classify a whole dump
///
/// Never fails: statements outside the understood shapes are counted as
/// unparsed and identity rows without id or email are counted as rejected.
///
/// # Examples
///
/// ```
/// # use dump_migrator::dump::parse_dump;
/// let dump = "SET client_encoding = 'UTF8';\n\
///             INSERT INTO patients (id, name) VALUES ('a1', 'Ana');\n\
///             INSERT INTO auth.users (id, email) VALUES ('u1', 'ana@example.com');";
/// let parsed = parse_dump(dump);
/// assert_eq!(parsed.operations.len(), 1);
/// assert_eq!(parsed.identities.len(), 1);
/// assert_eq!(parsed.stats.skipped, 1);
/// ```
pub fn parse_dump(text: &str) -> ParsedDump {
    let mut parsed = ParsedDump::default();
    let mut table_schemas: BTreeMap<String, String> = BTreeMap::new();

    for statement in StatementTokenizer::new(text) {
        parsed.stats.statements += 1;

        match classify_statement(&statement) {
            Classified::Operation(Operation::Skip) => parsed.stats.skipped += 1,
            Classified::Operation(operation) => {
                match &operation {
                    Operation::Insert { table, .. } => {
                        parsed.stats.inserts += 1;
                        note_schema(
                            &mut table_schemas,
                            &mut parsed.merged_tables,
                            table,
                            &statement,
                        );
                    }
                    Operation::DeleteAll { .. } => parsed.stats.delete_alls += 1,
                    Operation::Skip => {}
                }
                parsed.operations.push(operation);
            }
            Classified::Identity(identity) => {
                parsed.stats.identities += 1;
                parsed.identities.push(identity);
            }
            Classified::RejectedIdentity => {
                parsed.stats.rejected_identities += 1;
                tracing::warn!(
                    "Skipping identity row without id or email: {}",
                    crate::utils::sanitize_for_display(&statement)
                );
            }
            Classified::Unparsed => {
                parsed.stats.unparsed += 1;
                tracing::debug!(
                    "Unparsed statement for table '{}'",
                    extract_table_name(&statement)
                );
            }
        }
    }

    tracing::info!(
        "Parsed {} statement(s): {} insert(s), {} identity row(s), {} skipped, {} unparsed",
        parsed.stats.statements,
        parsed.stats.inserts,
        parsed.stats.identities,
        parsed.stats.skipped,
        parsed.stats.unparsed
    );

    parsed
}
