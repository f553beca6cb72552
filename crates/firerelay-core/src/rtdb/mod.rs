//! Realtime-database client over the REST API.
//!
//! [`RestApp`] implements [`RemoteApp`] with one HTTPS exchange per `poll`:
//! sign-in (and re-sign-in before the ID token expires), queued one-shot
//! reads, then the change watch. Every exchange ends in an [`AsyncResult`].

pub mod http;
pub mod identity;

#[cfg(test)]
mod tests;

use alloc::{string::String, vec::Vec};
use core::fmt::Write;

use heapless::{Deque, String as HeaplessString};
use log::{info, warn};
use serde::Deserialize;

use crate::{
    auth::UserCredentials,
    remote::{
        AsyncResult, BindError, CODE_CONNECTION_FAILED, CODE_MALFORMED_RESPONSE, PATH_BYTES,
        PAYLOAD_BYTES, RemoteApp, RemoteError, ResultQueue,
    },
    text::{exact, same_path, truncated},
};

use self::http::{HttpResponse, Method};

pub const HOST_BYTES: usize = 96;
pub const BASE_PATH_BYTES: usize = 32;
pub const PENDING_READS: usize = 4;
/// Delay before retrying a failed sign-in.
pub const AUTH_RETRY_MS: u64 = 5_000;
/// Sign in again this long before the ID token expires.
pub const TOKEN_REFRESH_MARGIN_MS: u64 = 60_000;
/// Interval between reads of a watched path.
pub const WATCH_INTERVAL_MS: u64 = 2_000;

/// Secure byte pipe to a remote host.
#[allow(async_fn_in_trait)]
pub trait RestTransport {
    type Error: core::fmt::Debug;

    /// Connects to `host`, writes `request` and appends everything read until
    /// the peer closes the connection.
    async fn round_trip(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut Vec<u8>,
    ) -> Result<(), Self::Error>;
}

/// Database base URL split into host and optional path prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseUrl {
    host: HeaplessString<HOST_BYTES>,
    base_path: HeaplessString<BASE_PATH_BYTES>,
}

impl DatabaseUrl {
    /// Accepts `https://host[/prefix]`, `http://host` or a bare host.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        let (host, base_path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].trim_end_matches('/')),
            None => (rest, ""),
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            host: exact(host)?,
            base_path: exact(base_path)?,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Request target for reading `path` as JSON.
    pub fn value_target(&self, path: &str, id_token: &str) -> String {
        let path = path.trim_matches('/');
        let mut target = String::new();
        let _ = write!(target, "{}/{}.json?auth={}", self.base_path, path, id_token);
        target
    }
}

#[derive(Deserialize)]
struct DatabaseError {
    error: String,
}

fn database_error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<DatabaseError>(body)
        .ok()
        .map(|err| err.error)
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Session {
    Idle,
    SignInDue { at_ms: u64 },
    SignedIn { id_token: String, refresh_at_ms: u64 },
}

#[derive(Clone, Debug)]
struct PendingRead {
    path: HeaplessString<PATH_BYTES>,
    tag: &'static str,
}

#[derive(Clone, Debug)]
struct Watch {
    path: HeaplessString<PATH_BYTES>,
    tag: &'static str,
    last_payload: Option<HeaplessString<PAYLOAD_BYTES>>,
    next_read_ms: u64,
}

pub struct RestApp<A, D> {
    auth_transport: A,
    db_transport: D,
    credentials: Option<UserCredentials>,
    auth_tag: &'static str,
    database: Option<DatabaseUrl>,
    session: Session,
    reads: Deque<PendingRead, PENDING_READS>,
    watch: Option<Watch>,
    response: Vec<u8>,
}

impl<A, D> RestApp<A, D>
where
    A: RestTransport,
    D: RestTransport,
{
    /// `auth_transport` talks to the identity endpoint, `db_transport` to the database host.
    pub fn new(auth_transport: A, db_transport: D) -> Self {
        Self {
            auth_transport,
            db_transport,
            credentials: None,
            auth_tag: "",
            database: None,
            session: Session::Idle,
            reads: Deque::new(),
            watch: None,
            response: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn database(&self) -> Option<&DatabaseUrl> {
        self.database.as_ref()
    }

    fn sign_in_due(&self, now_ms: u64) -> bool {
        match self.session {
            Session::Idle => false,
            Session::SignInDue { at_ms } => now_ms >= at_ms,
            Session::SignedIn { refresh_at_ms, .. } => now_ms >= refresh_at_ms,
        }
    }

    async fn sign_in(&mut self, now_ms: u64, results: &mut ResultQueue) {
        let Some(credentials) = self.credentials.as_ref() else {
            return;
        };
        let target = identity::sign_in_target(&credentials.api_key);
        let body = identity::sign_in_body(credentials);
        let request = http::encode_request(Method::Post, identity::IDENTITY_HOST, &target, Some(&body));

        let outcome = exchange(
            &mut self.auth_transport,
            identity::IDENTITY_HOST,
            &request,
            &mut self.response,
        )
        .await;

        let failure = match outcome {
            Ok(response) if response.status == 200 => match identity::parse_sign_in(&response.body) {
                Some(token) => {
                    let lifetime_ms = token.lifetime_secs.saturating_mul(1_000);
                    let refresh_in_ms = lifetime_ms
                        .saturating_sub(TOKEN_REFRESH_MARGIN_MS)
                        .max(AUTH_RETRY_MS);
                    info!("auth: signed in; token valid for {}s", token.lifetime_secs);
                    self.session = Session::SignedIn {
                        id_token: token.token,
                        refresh_at_ms: now_ms.saturating_add(refresh_in_ms),
                    };
                    results.push(AsyncResult::completed(self.auth_tag));
                    return;
                }
                None => RemoteError::new("malformed sign-in response", CODE_MALFORMED_RESPONSE),
            },
            Ok(response) => {
                let message = identity::parse_error_message(&response.body)
                    .unwrap_or_else(|| String::from("sign-in rejected"));
                RemoteError::new(&message, i32::from(response.status))
            }
            Err(err) => err,
        };

        let retry_at_ms = now_ms.saturating_add(AUTH_RETRY_MS);
        self.session = match core::mem::replace(&mut self.session, Session::Idle) {
            Session::SignedIn { id_token, .. } => Session::SignedIn {
                id_token,
                refresh_at_ms: retry_at_ms,
            },
            _ => Session::SignInDue { at_ms: retry_at_ms },
        };
        results.push(AsyncResult::error(self.auth_tag, failure.message(), failure.code()));
    }

    async fn read_value(&mut self, now_ms: u64, path: &str, tag: &str) -> AsyncResult {
        let (Session::SignedIn { id_token, .. }, Some(database)) = (&self.session, &self.database)
        else {
            return AsyncResult::error(tag, "app not ready", CODE_CONNECTION_FAILED);
        };
        let target = database.value_target(path, id_token);
        let request = http::encode_request(Method::Get, database.host(), &target, None);

        match exchange(&mut self.db_transport, database.host(), &request, &mut self.response).await {
            Ok(response) if response.status == 200 => {
                AsyncResult::payload(tag, path, response.body_text().trim())
            }
            Ok(response) => {
                if response.status == 401 {
                    // Token revoked or expired early; sign in again on the next poll.
                    if let Session::SignedIn { refresh_at_ms, .. } = &mut self.session {
                        *refresh_at_ms = now_ms;
                    }
                }
                let message = database_error_message(&response.body)
                    .unwrap_or_else(|| String::from("request rejected"));
                AsyncResult::error(tag, &message, i32::from(response.status))
            }
            Err(err) => AsyncResult::error(tag, err.message(), err.code()),
        }
    }

    async fn poll_watch(&mut self, now_ms: u64, results: &mut ResultQueue) -> bool {
        let Some(watch) = self.watch.as_ref() else {
            return false;
        };
        if now_ms < watch.next_read_ms {
            return false;
        }
        let path = watch.path.clone();
        let tag = watch.tag;

        let result = self.read_value(now_ms, &path, tag).await;

        let Some(watch) = self.watch.as_mut() else {
            return true;
        };
        watch.next_read_ms = now_ms.saturating_add(WATCH_INTERVAL_MS);
        if result.is_error() {
            results.push(result);
        } else if watch.last_payload.as_deref() != Some(result.data()) {
            // Cleared by `forget_delivered` when the value could not be applied.
            watch.last_payload = Some(truncated(result.data()));
            results.push(result);
        }
        true
    }
}

async fn exchange<T: RestTransport>(
    transport: &mut T,
    host: &str,
    request: &[u8],
    response: &mut Vec<u8>,
) -> Result<HttpResponse, RemoteError> {
    response.clear();
    if let Err(err) = transport.round_trip(host, request, response).await {
        warn!("rest: exchange with {} failed: {:?}", host, err);
        return Err(RemoteError::new("connection failed", CODE_CONNECTION_FAILED));
    }
    http::parse_response(response).map_err(|err| {
        warn!("rest: bad response from {}: {:?}", host, err);
        RemoteError::new("malformed response", CODE_MALFORMED_RESPONSE)
    })
}

impl<A, D> RemoteApp for RestApp<A, D>
where
    A: RestTransport,
    D: RestTransport,
{
    fn initialize(&mut self, credentials: UserCredentials, tag: &'static str) {
        self.credentials = Some(credentials);
        self.auth_tag = tag;
        self.session = Session::SignInDue { at_ms: 0 };
    }

    fn bind_database(&mut self, url: &str) -> Result<(), BindError> {
        let database = DatabaseUrl::parse(url).ok_or(BindError::InvalidDatabaseUrl)?;
        info!("rest: database host {}", database.host());
        self.database = Some(database);
        Ok(())
    }

    fn ready(&self) -> bool {
        matches!(self.session, Session::SignedIn { .. }) && self.database.is_some()
    }

    async fn poll(&mut self, now_ms: u64, results: &mut ResultQueue) {
        if self.sign_in_due(now_ms) {
            self.sign_in(now_ms, results).await;
            return;
        }
        if !self.ready() {
            return;
        }

        if let Some(read) = self.reads.pop_front() {
            let result = self.read_value(now_ms, &read.path, read.tag).await;
            results.push(result);
            return;
        }

        self.poll_watch(now_ms, results).await;
    }

    fn get(&mut self, path: &str, tag: &'static str) -> bool {
        let Some(path) = exact(path) else {
            warn!("rest: path too long: {}", path);
            return false;
        };
        self.reads.push_back(PendingRead { path, tag }).is_ok()
    }

    fn stream(&mut self, path: &str, tag: &'static str) -> bool {
        let Some(path) = exact(path) else {
            warn!("rest: path too long: {}", path);
            return false;
        };
        self.watch = Some(Watch {
            path,
            tag,
            last_payload: None,
            next_read_ms: 0,
        });
        true
    }

    fn forget_delivered(&mut self, path: &str) {
        if let Some(watch) = self.watch.as_mut()
            && same_path(&watch.path, path)
        {
            watch.last_payload = None;
        }
    }
}
