// ABOUTME: HTTP source and admin API tests against a local stub server with canned responses
// ABOUTME: Checks request shape, status-to-error mapping, admin pagination and per-identity failure policy

use dump_migrator::config::MigrationConfig;
use dump_migrator::destination::{AdminIdentityProvider, IdentityProvider, NewIdentity, Offline};
use dump_migrator::error::MigrateError;
use dump_migrator::migration::Migrator;
use dump_migrator::source::{DumpSource, HttpSource, Source};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Responder = Arc<dyn Fn(&str) -> (u16, String) + Send + Sync>;

/// One-connection-at-a-time HTTP/1.1 server that answers every request
/// with whatever the responder returns for the raw request text
struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    async fn start(respond: impl Fn(&str) -> (u16, String) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let respond: Responder = Arc::new(respond);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                let (status, body) = respond(&request);
                seen.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        StubServer { base_url, requests }
    }

    async fn fixed(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::start(move |_| (status, body.clone())).await
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..end]).to_ascii_lowercase();
            let body_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + body_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn request_line(request: &str) -> &str {
    request.lines().next().unwrap_or_default()
}

fn has_header(request: &str, header: &str) -> bool {
    request
        .to_ascii_lowercase()
        .lines()
        .any(|line| line.trim() == header.to_ascii_lowercase())
}

#[tokio::test]
async fn test_source_sends_secret_and_paging_parameters() {
    let stub = StubServer::start(|request| {
        if request_line(request).contains("action=export") {
            (200, r#"{"rows": [{"id": 1}]}"#.to_string())
        } else {
            (200, r#"{"identities": [{"id": "u1", "email": "a@b.c"}]}"#.to_string())
        }
    })
    .await;
    let source = HttpSource::new(format!("{}/export", stub.base_url), "s3cret").unwrap();

    let identities = source.identities_page(2, 50).await.unwrap();
    let rows = source.export_page("members", 0, 10).await.unwrap();

    assert_eq!(identities.len(), 1);
    assert_eq!(rows.len(), 1);

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert!(request_line(&requests[0])
        .starts_with("GET /export?action=identities&page=2&limit=50 "));
    assert!(request_line(&requests[1])
        .starts_with("GET /export?action=export&table=members&page=0&limit=10 "));
    assert!(requests
        .iter()
        .all(|r| has_header(r, "x-migration-secret: s3cret")));
}

#[tokio::test]
async fn test_source_refusals_map_to_unauthorized() {
    for status in [401u16, 403] {
        let stub = StubServer::fixed(status, r#"{"error": "bad secret"}"#).await;
        let source = HttpSource::new(format!("{}/export", stub.base_url), "wrong").unwrap();

        let err = source.summary().await.err().expect("refused source must fail");

        assert!(matches!(err, MigrateError::SourceUnauthorized(s) if s == status));
        assert!(err.is_fatal());
    }
}

#[tokio::test]
async fn test_source_server_error_keeps_status_and_body() {
    let stub = StubServer::fixed(503, "down for maintenance").await;
    let source = HttpSource::new(format!("{}/export", stub.base_url), "s3cret").unwrap();

    let err = source
        .export_page("members", 0, 10)
        .await
        .err()
        .expect("server error must fail");

    match err {
        MigrateError::SourceStatus { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("maintenance"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_null_email_identity_does_not_sink_its_page() {
    let stub = StubServer::start(|request| {
        if request_line(request).contains("page=0&") {
            (
                200,
                r#"{"identities": [
                    {"id": "u1", "email": "ana@clinic.org"},
                    {"id": "u2", "email": null, "phone": "+100"},
                    {"id": "u3"}
                ]}"#
                .to_string(),
            )
        } else {
            (200, r#"{"identities": []}"#.to_string())
        }
    })
    .await;
    let source = HttpSource::new(format!("{}/export", stub.base_url), "s3cret").unwrap();
    let migrator = Migrator::new(source, Offline, Offline, MigrationConfig::default());

    let result = migrator.import_identities(true).await.unwrap();

    assert_eq!(result.created, 1);
    assert_eq!(result.failed, 0);
    assert!(result.mapping.contains("u1"));
    assert!(!result.mapping.contains("u2"));
    assert!(!result.mapping.contains("u3"));
}

#[tokio::test]
async fn test_admin_sends_service_key_and_creates_confirmed_user() {
    let stub = StubServer::start(|request| {
        if request_line(request).starts_with("POST") {
            (200, r#"{"id": "d9", "email": "new@clinic.org"}"#.to_string())
        } else {
            (200, r#"{"users": []}"#.to_string())
        }
    })
    .await;
    let admin = AdminIdentityProvider::new(&stub.base_url, "service-key").unwrap();

    assert_eq!(admin.find_by_email("new@clinic.org").await.unwrap(), None);
    let id = admin
        .create(&NewIdentity {
            email: "new@clinic.org".to_string(),
            password: None,
            metadata: None,
        })
        .await
        .unwrap();
    assert_eq!(id, "d9");

    let requests = stub.requests();
    assert!(request_line(&requests[0]).starts_with("GET /auth/v1/admin/users?page=1&per_page="));
    assert!(request_line(&requests[1]).starts_with("POST /auth/v1/admin/users "));
    assert!(requests[1].contains(r#""email_confirm":true"#));
    for request in &requests {
        assert!(has_header(request, "apikey: service-key"));
        assert!(has_header(request, "authorization: bearer service-key"));
    }
}

#[tokio::test]
async fn test_admin_lookup_follows_short_pages_until_empty() {
    // The server caps per_page at 2 regardless of what was asked for
    let stub = StubServer::start(|request| {
        let line = request_line(request);
        let body = if line.contains("?page=1&") {
            r#"{"users": [{"id": "d1", "email": "a@clinic.org"}, {"id": "d2", "email": "b@clinic.org"}]}"#
        } else if line.contains("?page=2&") {
            r#"{"users": [{"id": "d3", "email": "Late@Clinic.org"}]}"#
        } else {
            r#"{"users": []}"#
        };
        (200, body.to_string())
    })
    .await;
    let admin = AdminIdentityProvider::new(&stub.base_url, "service-key").unwrap();

    assert_eq!(
        admin.find_by_email("late@clinic.org").await.unwrap(),
        Some("d3".to_string())
    );
    assert_eq!(admin.find_by_email("nobody@clinic.org").await.unwrap(), None);

    // Second lookup walked pages 1, 2 and the empty page 3
    let requests = stub.requests();
    assert_eq!(requests.len(), 5);
    assert!(request_line(&requests[4]).contains("?page=3&"));
}

#[tokio::test]
async fn test_admin_auth_failures_are_fatal_and_rejections_are_not() {
    for status in [401u16, 403] {
        let stub = StubServer::fixed(status, r#"{"msg": "invalid JWT"}"#).await;
        let admin = AdminIdentityProvider::new(&stub.base_url, "stale-key").unwrap();

        let err = admin
            .find_by_email("a@clinic.org")
            .await
            .err()
            .expect("refused key must fail");
        assert!(matches!(err, MigrateError::DestinationUnauthorized(s) if s == status));
        assert!(err.is_fatal());
    }

    let stub = StubServer::fixed(422, r#"{"msg": "Unable to validate email address"}"#).await;
    let admin = AdminIdentityProvider::new(&stub.base_url, "service-key").unwrap();
    let err = admin
        .create(&NewIdentity {
            email: "not-an-email".to_string(),
            password: None,
            metadata: None,
        })
        .await
        .err()
        .expect("invalid email must be rejected");
    assert!(matches!(err, MigrateError::DestinationRejected(ref m) if m.contains("422")));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_unreachable_admin_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let admin = AdminIdentityProvider::new(&base_url, "service-key").unwrap();
    let err = admin
        .find_by_email("a@clinic.org")
        .await
        .err()
        .expect("closed port must fail");
    assert!(matches!(err, MigrateError::DestinationUnavailable(_)));
    assert!(err.is_fatal());
}

const TWO_ACCOUNTS: &str = "\
INSERT INTO auth.users (id, email) VALUES ('src-ok', 'ok@clinic.org');
INSERT INTO auth.users (id, email) VALUES ('src-bad', 'bad@clinic');
";

#[tokio::test]
async fn test_identities_phase_counts_admin_rejection_and_continues() {
    let stub = StubServer::start(|request| {
        if !request_line(request).starts_with("POST") {
            (200, r#"{"users": []}"#.to_string())
        } else if request.contains("bad@clinic") {
            (422, r#"{"msg": "Unable to validate email address"}"#.to_string())
        } else {
            (200, r#"{"id": "dst-ok"}"#.to_string())
        }
    })
    .await;
    let admin = AdminIdentityProvider::new(&stub.base_url, "service-key").unwrap();
    let migrator = Migrator::new(
        DumpSource::from_text(TWO_ACCOUNTS),
        Offline,
        admin,
        MigrationConfig::default(),
    );

    let result = migrator.import_identities(false).await.unwrap();

    assert_eq!(result.created, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.mapping.get("src-ok"), Some("dst-ok"));
    assert!(!result.mapping.contains("src-bad"));
}

#[tokio::test]
async fn test_identities_phase_aborts_on_revoked_service_key() {
    let stub = StubServer::fixed(401, r#"{"msg": "invalid JWT"}"#).await;
    let admin = AdminIdentityProvider::new(&stub.base_url, "revoked").unwrap();
    let migrator = Migrator::new(
        DumpSource::from_text(TWO_ACCOUNTS),
        Offline,
        admin,
        MigrationConfig::default(),
    );

    let err = migrator
        .import_identities(false)
        .await
        .err()
        .expect("revoked key must abort the phase");
    assert_eq!(err.kind(), "destination_unauthorized");
}
