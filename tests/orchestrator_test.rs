// ABOUTME: Orchestrator tests over a dump source and in-memory destination fakes
// ABOUTME: Covers identity matching, remapping, idempotent re-runs, error sampling and fatal aborts

use dump_migrator::config::MigrationConfig;
use dump_migrator::destination::{
    emails_match, IdentityProvider, NewIdentity, Offline, RowStore, UpsertOutcome,
};
use dump_migrator::dump::{IdentityRecord, Record};
use dump_migrator::error::{MigrateError, Result};
use dump_migrator::migration::{IdentityMapping, Migrator, PhaseRequest, MAX_ERROR_SAMPLES};
use dump_migrator::source::{DumpSource, Manifest, Source};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const DUMP: &str = r#"
SET statement_timeout = 0;
INSERT INTO auth.users (id, email, raw_user_meta_data) VALUES ('src-ana', 'Ana@Clinic.org', '{"full_name":"Ana"}');
INSERT INTO auth.users (id, email) VALUES ('src-ben', 'ben@clinic.org');
INSERT INTO auth.users (id, encrypted_password) VALUES ('src-ghost', 'x');
INSERT INTO auth.sessions (id, user_id) VALUES ('s1', 'src-ana');
INSERT INTO public.members (id, user_id, invited_by, name) VALUES (1, 'src-ana', 'src-ben', 'Ana');
INSERT INTO public.members (id, user_id, invited_by, name) VALUES (2, 'src-ben', NULL, 'O''Brien');
INSERT INTO public.notes (id, author_id, body) VALUES (10, 'src-ana', 'src-ben');
"#;

const CONFIG: &str = r#"
[tables.members]
remap_identities = true

[tables.notes]
remap_identities = true
identity_columns = ["author_id"]
"#;

fn config() -> MigrationConfig {
    MigrationConfig::from_toml(CONFIG).unwrap()
}

/// Rows keyed by (table, primary key value)
#[derive(Default)]
struct MemoryRows {
    rows: Mutex<BTreeMap<(String, String), Record>>,
    /// Primary key values the store refuses
    reject_keys: Vec<String>,
    calls: AtomicUsize,
}

impl MemoryRows {
    fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn get(&self, table: &str, key: &str) -> Option<Record> {
        self.rows
            .lock()
            .unwrap()
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }
}

fn key_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl RowStore for MemoryRows {
    async fn upsert(&self, table: &str, primary_key: &str, row: &Record) -> Result<UpsertOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = key_text(row.get(primary_key));
        if self.reject_keys.contains(&key) {
            return Err(MigrateError::DestinationRejected(format!(
                "null value in column \"name\" violates not-null constraint ({})",
                key
            )));
        }

        let mut rows = self.rows.lock().unwrap();
        let slot = (table.to_string(), key);
        if rows.contains_key(&slot) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        rows.insert(slot, row.clone());
        Ok(UpsertOutcome::Inserted)
    }
}

#[derive(Default)]
struct MemoryIdentities {
    accounts: Mutex<Vec<(String, String)>>,
    created: Mutex<Vec<NewIdentity>>,
    reject_emails: Vec<String>,
    unauthorized: bool,
}

impl MemoryIdentities {
    fn with_account(id: &str, email: &str) -> Self {
        let identities = Self::default();
        identities
            .accounts
            .lock()
            .unwrap()
            .push((id.to_string(), email.to_string()));
        identities
    }

    fn created(&self) -> Vec<NewIdentity> {
        self.created.lock().unwrap().clone()
    }
}

impl IdentityProvider for MemoryIdentities {
    async fn find_by_email(&self, email: &str) -> Result<Option<String>> {
        if self.unauthorized {
            return Err(MigrateError::DestinationUnauthorized(401));
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(_, existing)| emails_match(existing, email))
            .map(|(id, _)| id.clone()))
    }

    async fn create(&self, identity: &NewIdentity) -> Result<String> {
        if self.reject_emails.contains(&identity.email) {
            return Err(MigrateError::DestinationRejected(
                "email address is invalid".to_string(),
            ));
        }
        let mut accounts = self.accounts.lock().unwrap();
        let id = format!("dst-{}", accounts.len() + 1);
        accounts.push((id.clone(), identity.email.clone()));
        self.created.lock().unwrap().push(identity.clone());
        Ok(id)
    }
}

/// Source whose credentials are always refused
struct LockedSource;

impl Source for LockedSource {
    async fn summary(&self) -> Result<Manifest> {
        Err(MigrateError::SourceUnauthorized(401))
    }

    async fn identities_page(&self, _page: usize, _limit: usize) -> Result<Vec<IdentityRecord>> {
        Err(MigrateError::SourceUnauthorized(401))
    }

    async fn export_page(&self, _table: &str, _page: usize, _limit: usize) -> Result<Vec<Record>> {
        Err(MigrateError::SourceUnauthorized(401))
    }
}

fn mapping(pairs: &[(&str, &str)]) -> IdentityMapping {
    pairs
        .iter()
        .map(|(s, d)| (s.to_string(), d.to_string()))
        .collect()
}

#[tokio::test]
async fn test_identities_match_existing_email_and_create_missing() {
    let identities = MemoryIdentities::with_account("dst-existing", "ana@clinic.org");
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        identities,
        config(),
    );

    let result = migrator.import_identities(false).await.unwrap();

    // The account without an email never reaches the counters
    assert_eq!(result.skipped, 1);
    assert_eq!(result.created, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.mapping.len(), 2);
    assert_eq!(result.mapping.get("src-ana"), Some("dst-existing"));
    assert!(result.mapping.get("src-ben").is_some());
    assert!(!result.mapping.contains("src-ghost"));
}

#[tokio::test]
async fn test_created_identity_carries_metadata_and_password() {
    let config = MigrationConfig::from_toml(
        r#"
[identities]
initial_password = "change-me-now"
"#,
    )
    .unwrap();
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        MemoryIdentities::default(),
        config,
    );

    migrator.import_identities(false).await.unwrap();

    let created = migrator.identities().created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].email, "Ana@Clinic.org");
    assert_eq!(created[0].metadata, Some(json!({"full_name": "Ana"})));
    assert_eq!(created[0].password.as_deref(), Some("change-me-now"));
}

#[tokio::test]
async fn test_rejected_identity_is_omitted_not_fatal() {
    let identities = MemoryIdentities {
        reject_emails: vec!["ben@clinic.org".to_string()],
        ..MemoryIdentities::default()
    };
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        identities,
        config(),
    );

    let result = migrator.import_identities(false).await.unwrap();

    assert_eq!(result.created, 1);
    assert_eq!(result.failed, 1);
    assert!(result.mapping.contains("src-ana"));
    assert!(!result.mapping.contains("src-ben"));
}

#[tokio::test]
async fn test_unauthorized_destination_aborts_identities() {
    let identities = MemoryIdentities {
        unauthorized: true,
        ..MemoryIdentities::default()
    };
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        identities,
        config(),
    );

    let err = migrator.import_identities(false).await.unwrap_err();
    assert!(matches!(err, MigrateError::DestinationUnauthorized(401)));
}

#[tokio::test]
async fn test_dry_run_identities_never_contact_destination() {
    let migrator = Migrator::new(DumpSource::from_text(DUMP), Offline, Offline, config());

    let result = migrator.import_identities(true).await.unwrap();

    assert_eq!(result.created, 2);
    assert_eq!(result.skipped, 0);
    let placeholder = result.mapping.get("src-ana").unwrap();
    assert!(uuid::Uuid::parse_str(placeholder).is_ok());
}

#[tokio::test]
async fn test_table_import_remaps_identity_references() {
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        MemoryIdentities::default(),
        config(),
    );
    let mapping = mapping(&[("src-ana", "dst-1"), ("src-ben", "dst-2")]);

    let result = migrator
        .import_table("members", &mapping, false)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.imported_count, 2);
    assert_eq!(result.remapped_values, 3);

    let first = migrator.rows().get("members", "1").unwrap();
    assert_eq!(first["user_id"], json!("dst-1"));
    assert_eq!(first["invited_by"], json!("dst-2"));
    assert_eq!(first["name"], json!("Ana"));
    let second = migrator.rows().get("members", "2").unwrap();
    assert_eq!(second["name"], json!("O'Brien"));
    assert_eq!(second["invited_by"], Value::Null);
}

#[tokio::test]
async fn test_declared_identity_columns_narrow_the_remap() {
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        MemoryIdentities::default(),
        config(),
    );
    let mapping = mapping(&[("src-ana", "dst-1"), ("src-ben", "dst-2")]);

    let result = migrator.import_table("notes", &mapping, false).await.unwrap();

    assert_eq!(result.remapped_values, 1);
    let note = migrator.rows().get("notes", "10").unwrap();
    assert_eq!(note["author_id"], json!("dst-1"));
    // Same value outside the declared column stays untouched
    assert_eq!(note["body"], json!("src-ben"));
}

#[tokio::test]
async fn test_table_without_remap_rules_is_copied_verbatim() {
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        MemoryIdentities::default(),
        MigrationConfig::default(),
    );
    let mapping = mapping(&[("src-ana", "dst-1")]);

    let result = migrator
        .import_table("members", &mapping, false)
        .await
        .unwrap();

    assert_eq!(result.remapped_values, 0);
    let first = migrator.rows().get("members", "1").unwrap();
    assert_eq!(first["user_id"], json!("src-ana"));
}

#[tokio::test]
async fn test_table_rerun_is_idempotent() {
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        MemoryRows::default(),
        MemoryIdentities::default(),
        config(),
    );
    let mapping = mapping(&[("src-ana", "dst-1")]);

    let first = migrator
        .import_table("members", &mapping, false)
        .await
        .unwrap();
    let rows_after_first = migrator.rows().count();

    let second = migrator
        .import_table("members", &mapping, false)
        .await
        .unwrap();

    assert_eq!(first.imported_count, 2);
    assert_eq!(second.imported_count, 0);
    assert_eq!(second.skipped_count, 2);
    assert!(second.success);
    assert_eq!(migrator.rows().count(), rows_after_first);
}

#[tokio::test]
async fn test_row_failures_are_sampled_and_import_continues() {
    let mut dump = String::new();
    for id in 1..=10 {
        dump.push_str(&format!(
            "INSERT INTO visits (id, note) VALUES ({}, 'visit {}');\n",
            id, id
        ));
    }
    let rows = MemoryRows {
        reject_keys: (1..=8).map(|id| id.to_string()).collect(),
        ..MemoryRows::default()
    };
    let migrator = Migrator::new(
        DumpSource::from_text(&dump),
        rows,
        MemoryIdentities::default(),
        MigrationConfig::default(),
    )
    .with_page_size(3);

    let result = migrator
        .import_table("visits", &IdentityMapping::new(), false)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_count, 8);
    assert_eq!(result.imported_count, 2);
    assert_eq!(result.error_samples.len(), MAX_ERROR_SAMPLES);
    assert!(result.error_samples[0].starts_with("row 1:"));
    assert_eq!(migrator.rows().count(), 2);
}

#[tokio::test]
async fn test_dry_run_table_counts_without_writing() {
    let migrator = Migrator::new(DumpSource::from_text(DUMP), Offline, Offline, config());
    let mapping = mapping(&[("src-ana", "placeholder")]);

    let result = migrator.import_table("members", &mapping, true).await.unwrap();

    assert!(result.success);
    assert_eq!(result.imported_count, 2);
    assert_eq!(result.remapped_values, 1);
}

#[tokio::test]
async fn test_custom_primary_key_is_passed_to_store() {
    let config = MigrationConfig::from_toml(
        r#"
[tables.dues]
primary_key = "due_id"
"#,
    )
    .unwrap();
    let dump = "INSERT INTO dues (due_id, amount) VALUES ('d-1', 25.5);\n\
                INSERT INTO dues (due_id, amount) VALUES ('d-1', 30);";
    let migrator = Migrator::new(
        DumpSource::from_text(dump),
        MemoryRows::default(),
        MemoryIdentities::default(),
        config,
    );

    let result = migrator
        .import_table("dues", &IdentityMapping::new(), false)
        .await
        .unwrap();

    assert_eq!(result.imported_count, 1);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(migrator.rows().get("dues", "d-1").unwrap()["amount"], json!(25.5));
}

#[tokio::test]
async fn test_phase_envelope_reports_fatal_source_error() {
    let migrator = Migrator::new(
        LockedSource,
        MemoryRows::default(),
        MemoryIdentities::default(),
        MigrationConfig::default(),
    );

    let envelope = migrator
        .run_phase(PhaseRequest::Table {
            table_name: "members".to_string(),
            identity_mapping: IdentityMapping::new(),
            dry_run: false,
        })
        .await;

    assert!(!envelope.ok);
    assert!(envelope.data.is_none());
    let error = envelope.error.unwrap();
    assert_eq!(error.kind, "source_unauthorized");
    assert_eq!(migrator.rows().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_phase_envelope_separates_run_success_from_table_detail() {
    let rows = MemoryRows {
        reject_keys: vec!["2".to_string()],
        ..MemoryRows::default()
    };
    let migrator = Migrator::new(
        DumpSource::from_text(DUMP),
        rows,
        MemoryIdentities::default(),
        config(),
    );

    let request: PhaseRequest = serde_json::from_value(json!({
        "phase": "table",
        "tableName": "members",
        "identityMapping": {"src-ana": "dst-1"}
    }))
    .unwrap();
    let envelope = migrator.run_phase(request).await;

    assert!(envelope.ok);
    let data = envelope.data.unwrap();
    assert_eq!(data["table"], json!("members"));
    assert_eq!(data["success"], json!(false));
    assert_eq!(data["importedCount"], json!(1));
    assert_eq!(data["failedCount"], json!(1));
}

#[tokio::test]
async fn test_summary_phase_envelope() {
    let migrator = Migrator::new(DumpSource::from_text(DUMP), Offline, Offline, config());

    let envelope = migrator.run_phase(PhaseRequest::Summary).await;

    assert!(envelope.ok);
    let data = envelope.data.unwrap();
    assert_eq!(data["identityCount"], json!(2));
    assert_eq!(
        data["tables"],
        json!([
            {"name": "members", "rowCount": 2},
            {"name": "notes", "rowCount": 1}
        ])
    );
}
