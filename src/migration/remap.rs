// ABOUTME: Value-level rewriting of source identity ids inside exported rows
// ABOUTME: Replaces string columns equal to a mapped source id with the destination id

use super::mapping::IdentityMapping;
use crate::dump::Record;
use serde_json::Value;

/// Which columns of a row may carry identity references
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapScope {
    /// Every string-valued column is a candidate (column-blind matching)
    AllColumns,
    /// Only the named columns are candidates
    Columns(Vec<String>),
}

impl RemapScope {
    fn covers(&self, column: &str) -> bool {
        match self {
            RemapScope::AllColumns => true,
            RemapScope::Columns(columns) => columns.iter().any(|c| c == column),
        }
    }
}

/// Rewrite identity references in `row`, returning how many values changed
///
/// Only top-level string values that exactly equal a mapped source id are
/// replaced. This is value matching, not a foreign-key walk: with
/// [`RemapScope::AllColumns`] any column holding such a string is rewritten.
pub fn remap_row(row: &mut Record, mapping: &IdentityMapping, scope: &RemapScope) -> usize {
    if mapping.is_empty() {
        return 0;
    }

    let mut replaced = 0;
    for (column, value) in row.iter_mut() {
        if !scope.covers(column) {
            continue;
        }
        if let Value::String(current) = value {
            if let Some(destination) = mapping.get(current) {
                *value = Value::String(destination.to_string());
                replaced += 1;
            }
        }
    }
    replaced
}
