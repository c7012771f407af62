// ABOUTME: Statement classification for dump replay
// ABOUTME: Finds target tables and filters out session, DDL and identity-infrastructure statements

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel returned by [`extract_table_name`] when no target table is found
pub const UNKNOWN_TABLE: &str = "unknown";

/// Schema holding the identity subsystem's account tables
pub const IDENTITY_SCHEMA: &str = "auth";

/// Identity-schema table whose rows become provisioned accounts
pub const IDENTITY_USERS_TABLE: &str = "users";

/// Leading keywords of statements that never carry row data
const SKIP_KEYWORDS: &[&str] = &[
    "set", "create", "alter", "drop", "comment", "grant", "revoke", "select", "begin", "commit",
];

/// Identity-subsystem tables that are rebuilt by the destination itself
const IDENTITY_INFRASTRUCTURE_TABLES: &[&str] = &[
    "sessions",
    "refresh_tokens",
    "mfa_factors",
    "mfa_challenges",
    "mfa_amr_claims",
    "audit_log_entries",
    "identities",
];

/// Identifier: double-quoted (with `""` escapes) or bare
pub(crate) const IDENT: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

static TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*(?:insert\s+into|update(?:\s+only)?|delete\s+from(?:\s+only)?)\s+(?P<first>{id})(?:\s*\.\s*(?P<second>{id}))?",
        id = IDENT
    ))
    .expect("target regex is valid")
});

static QUALIFIED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?P<first>{id})(?:\s*\.\s*(?P<second>{id}))?\s*$",
        id = IDENT
    ))
    .expect("qualified name regex is valid")
});

static AUTH_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|[^A-Za-z0-9_$])"?auth"?\s*\.\s*"?[A-Za-z_]"#)
        .expect("auth reference regex is valid")
});

/// A possibly schema-qualified table name with quotes removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    /// Parse `name`, `schema.name`, `"Schema"."Name"` and mixed forms
    pub fn parse(text: &str) -> Option<Self> {
        let caps = QUALIFIED_RE.captures(text)?;
        Some(Self::from_parts(
            caps.name("first")?.as_str(),
            caps.name("second").map(|m| m.as_str()),
        ))
    }

    fn from_parts(first: &str, second: Option<&str>) -> Self {
        match second {
            Some(name) => QualifiedName {
                schema: Some(unquote_identifier(first)),
                name: unquote_identifier(name),
            },
            None => QualifiedName {
                schema: None,
                name: unquote_identifier(first),
            },
        }
    }

    /// True when the name lives in the identity schema
    pub fn is_identity_schema(&self) -> bool {
        self.schema
            .as_deref()
            .is_some_and(|schema| schema.eq_ignore_ascii_case(IDENTITY_SCHEMA))
    }
}

/// Strip surrounding double quotes and collapse `""` escapes
pub fn unquote_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        trimmed.to_string()
    }
}

/// Lowercased leading keyword of a statement
fn leading_keyword(statement: &str) -> String {
    statement
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Target table of an insert/update/delete statement
pub fn statement_target(statement: &str) -> Option<QualifiedName> {
    let caps = TARGET_RE.captures(statement)?;
    Some(QualifiedName::from_parts(
        caps.name("first")?.as_str(),
        caps.name("second").map(|m| m.as_str()),
    ))
}

/// Extract the unqualified, unquoted table targeted by an insert/update/delete
///
/// Returns [`UNKNOWN_TABLE`] when the statement does not start with one of
/// those verbs.
///
/// # Examples
///
/// ```
/// # use dump_migrator::dump::classifier::extract_table_name;
/// assert_eq!(extract_table_name(r#"INSERT INTO "public"."patients" (id) VALUES (1)"#), "patients");
/// assert_eq!(extract_table_name("UPDATE members SET x = 1"), "members");
/// assert_eq!(extract_table_name("VACUUM"), "unknown");
/// ```
pub fn extract_table_name(statement: &str) -> String {
    statement_target(statement)
        .map(|target| target.name)
        .unwrap_or_else(|| UNKNOWN_TABLE.to_string())
}

/// Whether a statement should be dropped before decoding
///
/// Session and schema-control statements (`SET`, `CREATE`, `ALTER`, ...) carry
/// no rows, and inserts into identity infrastructure tables (sessions, tokens,
/// MFA, audit log, identity links) are regenerated by the destination.
pub fn should_skip_statement(statement: &str) -> bool {
    let trimmed = statement.trim_start();
    if trimmed.starts_with("--") {
        return true;
    }

    let keyword = leading_keyword(trimmed);
    if SKIP_KEYWORDS.contains(&keyword.as_str()) {
        return true;
    }

    if keyword == "insert" {
        if let Some(target) = statement_target(trimmed) {
            return target.is_identity_schema()
                && IDENTITY_INFRASTRUCTURE_TABLES
                    .iter()
                    .any(|table| target.name.eq_ignore_ascii_case(table));
        }
    }

    false
}

/// True only for inserts into the identity namespace's user table
pub fn is_auth_users_statement(statement: &str) -> bool {
    if leading_keyword(statement) != "insert" {
        return false;
    }
    statement_target(statement).is_some_and(|target| {
        target.is_identity_schema() && target.name.eq_ignore_ascii_case(IDENTITY_USERS_TABLE)
    })
}

/// True for any statement referencing the identity schema outside string literals
pub fn is_any_auth_statement(statement: &str) -> bool {
    if statement_target(statement).is_some_and(|target| target.is_identity_schema()) {
        return true;
    }
    AUTH_REFERENCE_RE.is_match(&without_string_literals(statement))
}

/// Remove single-quoted literals so their contents cannot look like identifiers
fn without_string_literals(statement: &str) -> String {
    let mut result = String::with_capacity(statement.len());
    let mut in_string = false;

    for c in statement.chars() {
        if c == '\'' {
            // Toggling handles doubled quotes: they close and reopen immediately
            in_string = !in_string;
            result.push(' ');
        } else if !in_string {
            result.push(c);
        }
    }
    result
}
