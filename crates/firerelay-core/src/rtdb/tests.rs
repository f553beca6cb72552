use alloc::{collections::VecDeque, string::String, vec::Vec};

use embassy_futures::block_on;

use super::*;
use crate::{
    remote::{AUTH_TAG, INIT_READ_TAG, STREAM_TAG},
    text::exact,
};

/// Replays canned responses and records every request written.
#[derive(Default)]
struct ScriptedTransport {
    replies: VecDeque<Result<&'static str, ()>>,
    requests: Vec<(String, String)>,
}

impl ScriptedTransport {
    fn reply(mut self, raw: &'static str) -> Self {
        self.replies.push_back(Ok(raw));
        self
    }

    fn fail(mut self) -> Self {
        self.replies.push_back(Err(()));
        self
    }
}

impl RestTransport for ScriptedTransport {
    type Error = ();

    async fn round_trip(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut Vec<u8>,
    ) -> Result<(), Self::Error> {
        self.requests.push((
            String::from(host),
            String::from_utf8_lossy(request).into_owned(),
        ));
        let raw = self.replies.pop_front().unwrap_or(Err(()))?;
        response.extend_from_slice(raw.as_bytes());
        Ok(())
    }
}

const SIGNED_IN: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n\
                         {\"idToken\":\"tok1\",\"expiresIn\":\"3600\"}";
const BAD_PASSWORD: &str = "HTTP/1.1 400 Bad Request\r\n\r\n\
                            {\"error\":{\"code\":400,\"message\":\"INVALID_PASSWORD\"}}";
const RELAY_TRUE: &str = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ntrue";
const RELAY_FALSE: &str = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nfalse";
const DENIED: &str = "HTTP/1.1 401 Unauthorized\r\n\r\n{\"error\" : \"Permission denied\"}";

fn credentials() -> UserCredentials {
    UserCredentials {
        api_key: exact("key").unwrap(),
        email: exact("e@x.com").unwrap(),
        password: exact("p").unwrap(),
    }
}

fn started(
    auth: ScriptedTransport,
    db: ScriptedTransport,
) -> RestApp<ScriptedTransport, ScriptedTransport> {
    let mut app = RestApp::new(auth, db);
    app.initialize(credentials(), AUTH_TAG);
    app.bind_database("https://db.example/").unwrap();
    app
}

#[test]
fn parses_database_urls() {
    let url = DatabaseUrl::parse("https://proj-default-rtdb.firebaseio.com/").unwrap();
    assert_eq!(url.host(), "proj-default-rtdb.firebaseio.com");
    assert_eq!(
        url.value_target("/control/relay", "t"),
        "/control/relay.json?auth=t"
    );

    let prefixed = DatabaseUrl::parse("db.example/tenant/").unwrap();
    assert_eq!(prefixed.host(), "db.example");
    assert_eq!(
        prefixed.value_target("control/relay/", "t"),
        "/tenant/control/relay.json?auth=t"
    );

    assert_eq!(DatabaseUrl::parse("https://"), None);
    assert_eq!(DatabaseUrl::parse("   "), None);
}

#[test]
fn sign_in_makes_app_ready_and_reports_auth() {
    let mut app = started(ScriptedTransport::default().reply(SIGNED_IN), ScriptedTransport::default());
    let mut results = ResultQueue::new();
    assert!(!app.ready());

    block_on(app.poll(0, &mut results));

    assert!(app.ready());
    let auth = results.pop().unwrap();
    assert_eq!(auth.uid(), AUTH_TAG);
    assert!(auth.is_result());
    assert!(!auth.is_error());
    assert!(!auth.available());

    let (host, request) = &app.auth_transport.requests[0];
    assert_eq!(host, identity::IDENTITY_HOST);
    assert!(request.starts_with("POST /v1/accounts:signInWithPassword?key=key HTTP/1.1\r\n"));
    assert!(request.ends_with("{\"email\":\"e@x.com\",\"password\":\"p\",\"returnSecureToken\":true}"));
}

#[test]
fn rejected_sign_in_is_reported_and_retried() {
    let auth = ScriptedTransport::default().reply(BAD_PASSWORD).reply(SIGNED_IN);
    let mut app = started(auth, ScriptedTransport::default());
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));
    let failure = results.pop().unwrap();
    assert!(failure.is_error());
    assert_eq!(failure.error_info().unwrap().message(), "INVALID_PASSWORD");
    assert_eq!(failure.error_info().unwrap().code(), 400);
    assert!(!app.ready());

    block_on(app.poll(AUTH_RETRY_MS - 1, &mut results));
    assert_eq!(app.auth_transport.requests.len(), 1);

    block_on(app.poll(AUTH_RETRY_MS, &mut results));
    assert!(app.ready());
}

#[test]
fn transport_failure_uses_connection_code() {
    let mut app = started(ScriptedTransport::default().fail(), ScriptedTransport::default());
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));

    let failure = results.pop().unwrap();
    assert_eq!(failure.error_info().unwrap().code(), CODE_CONNECTION_FAILED);
}

#[test]
fn get_reads_value_with_token() {
    let db = ScriptedTransport::default().reply(RELAY_TRUE);
    let mut app = started(ScriptedTransport::default().reply(SIGNED_IN), db);
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));
    let _ = results.pop();
    assert!(app.get("/control/relay", INIT_READ_TAG));
    block_on(app.poll(10, &mut results));

    let read = results.pop().unwrap();
    assert_eq!(read.uid(), INIT_READ_TAG);
    assert!(read.available());
    assert_eq!(read.path(), "/control/relay");
    assert_eq!(read.data(), "true");

    let (host, request) = &app.db_transport.requests[0];
    assert_eq!(host, "db.example");
    assert!(request.starts_with("GET /control/relay.json?auth=tok1 HTTP/1.1\r\nHost: db.example\r\n"));
}

#[test]
fn database_error_forces_resign_in() {
    let auth = ScriptedTransport::default().reply(SIGNED_IN).reply(SIGNED_IN);
    let db = ScriptedTransport::default().reply(DENIED);
    let mut app = started(auth, db);
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));
    let _ = results.pop();
    app.get("/control/relay", INIT_READ_TAG);
    block_on(app.poll(10, &mut results));

    let failure = results.pop().unwrap();
    assert_eq!(failure.error_info().unwrap().message(), "Permission denied");
    assert_eq!(failure.error_info().unwrap().code(), 401);

    block_on(app.poll(20, &mut results));
    assert_eq!(app.auth_transport.requests.len(), 2);
    assert!(app.ready());
}

#[test]
fn watch_reports_only_changes() {
    let db = ScriptedTransport::default()
        .reply(RELAY_TRUE)
        .reply(RELAY_TRUE)
        .reply(RELAY_FALSE);
    let mut app = started(ScriptedTransport::default().reply(SIGNED_IN), db);
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));
    let _ = results.pop();
    assert!(app.stream("/control/relay", STREAM_TAG));

    block_on(app.poll(100, &mut results));
    assert_eq!(results.pop().unwrap().data(), "true");

    block_on(app.poll(100 + WATCH_INTERVAL_MS / 2, &mut results));
    assert_eq!(app.db_transport.requests.len(), 1);

    block_on(app.poll(100 + WATCH_INTERVAL_MS, &mut results));
    assert!(results.is_empty());

    block_on(app.poll(100 + 2 * WATCH_INTERVAL_MS, &mut results));
    let change = results.pop().unwrap();
    assert_eq!(change.uid(), STREAM_TAG);
    assert_eq!(change.data(), "false");
}

#[test]
fn forgotten_watch_value_is_delivered_again() {
    let db = ScriptedTransport::default()
        .reply(RELAY_TRUE)
        .reply(RELAY_TRUE)
        .reply(RELAY_TRUE);
    let mut app = started(ScriptedTransport::default().reply(SIGNED_IN), db);
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));
    let _ = results.pop();
    app.stream("/control/relay", STREAM_TAG);

    block_on(app.poll(100, &mut results));
    assert_eq!(results.pop().unwrap().data(), "true");

    app.forget_delivered("/other/path");
    block_on(app.poll(100 + WATCH_INTERVAL_MS, &mut results));
    assert!(results.is_empty());

    app.forget_delivered("/control/relay/");
    block_on(app.poll(100 + 2 * WATCH_INTERVAL_MS, &mut results));
    let again = results.pop().unwrap();
    assert_eq!(again.uid(), STREAM_TAG);
    assert_eq!(again.data(), "true");
}

#[test]
fn token_is_refreshed_before_expiry() {
    let auth = ScriptedTransport::default().reply(SIGNED_IN).reply(SIGNED_IN);
    let mut app = started(auth, ScriptedTransport::default());
    let mut results = ResultQueue::new();

    block_on(app.poll(0, &mut results));
    let refresh_at = 3_600_000 - TOKEN_REFRESH_MARGIN_MS;

    block_on(app.poll(refresh_at - 1, &mut results));
    assert_eq!(app.auth_transport.requests.len(), 1);

    block_on(app.poll(refresh_at, &mut results));
    assert_eq!(app.auth_transport.requests.len(), 2);
    assert!(app.ready());
}

#[test]
fn invalid_database_url_is_rejected() {
    let mut app = RestApp::new(ScriptedTransport::default(), ScriptedTransport::default());
    assert_eq!(app.bind_database(""), Err(BindError::InvalidDatabaseUrl));
    assert!(app.database().is_none());
}
