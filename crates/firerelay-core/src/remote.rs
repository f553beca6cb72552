//! Contract with the remote database client.
//!
//! The client reports the outcome of every asynchronous operation as an
//! [`AsyncResult`] pushed into a [`ResultQueue`]. Results are only produced
//! from inside [`RemoteApp::poll`], so all consumers run on the caller's stack.

use heapless::{Deque, String as HeaplessString};
use log::warn;

use crate::{auth::UserCredentials, text::truncated};

pub const UID_BYTES: usize = 24;
pub const PATH_BYTES: usize = 64;
pub const PAYLOAD_BYTES: usize = 256;
pub const ERROR_MESSAGE_BYTES: usize = 96;
pub const RESULT_QUEUE_DEPTH: usize = 8;

/// Correlation tag for the auth/app lifecycle.
pub const AUTH_TAG: &str = "AUTH";
/// Correlation tag for the one-shot read issued when the app becomes ready.
pub const INIT_READ_TAG: &str = "INIT_READ";
/// Correlation tag for change notifications on the watched path.
pub const STREAM_TAG: &str = "RELAY_STREAM";

/// Transport could not reach the server or the exchange broke off.
pub const CODE_CONNECTION_FAILED: i32 = -1;
/// Server answered with something that is not a valid HTTP/JSON response.
pub const CODE_MALFORMED_RESPONSE: i32 = -2;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteError {
    message: HeaplessString<ERROR_MESSAGE_BYTES>,
    code: i32,
}

impl RemoteError {
    pub fn new(message: &str, code: i32) -> Self {
        Self {
            message: truncated(message),
            code,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Outcome {
    Pending,
    Completed,
    Failed(RemoteError),
    Payload {
        path: HeaplessString<PATH_BYTES>,
        data: HeaplessString<PAYLOAD_BYTES>,
    },
}

/// Outcome of one remote operation, read once and then dropped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AsyncResult {
    uid: HeaplessString<UID_BYTES>,
    outcome: Outcome,
}

impl AsyncResult {
    /// Operation still in flight; carries no information.
    pub fn pending(uid: &str) -> Self {
        Self::with(uid, Outcome::Pending)
    }

    /// Operation finished without a payload (e.g. sign-in).
    pub fn completed(uid: &str) -> Self {
        Self::with(uid, Outcome::Completed)
    }

    pub fn error(uid: &str, message: &str, code: i32) -> Self {
        Self::with(uid, Outcome::Failed(RemoteError::new(message, code)))
    }

    pub fn payload(uid: &str, path: &str, data: &str) -> Self {
        Self::with(
            uid,
            Outcome::Payload {
                path: truncated(path),
                data: truncated(data),
            },
        )
    }

    fn with(uid: &str, outcome: Outcome) -> Self {
        Self {
            uid: truncated(uid),
            outcome,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// True once the operation has reached a terminal state.
    pub fn is_result(&self) -> bool {
        !matches!(self.outcome, Outcome::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn error_info(&self) -> Option<&RemoteError> {
        match &self.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn available(&self) -> bool {
        matches!(self.outcome, Outcome::Payload { .. })
    }

    pub fn data(&self) -> &str {
        match &self.outcome {
            Outcome::Payload { data, .. } => data,
            _ => "",
        }
    }

    pub fn path(&self) -> &str {
        match &self.outcome {
            Outcome::Payload { path, .. } => path,
            _ => "",
        }
    }
}

/// Bounded FIFO of results waiting for dispatch. Drops the oldest entry when full.
#[derive(Debug, Default)]
pub struct ResultQueue {
    entries: Deque<AsyncResult, RESULT_QUEUE_DEPTH>,
}

impl ResultQueue {
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    pub fn push(&mut self, result: AsyncResult) {
        if self.entries.is_full() {
            if let Some(dropped) = self.entries.pop_front() {
                warn!("result queue full; dropping [{}]", dropped.uid());
            }
        }
        let _ = self.entries.push_back(result);
    }

    pub fn pop(&mut self) -> Option<AsyncResult> {
        self.entries.pop_front()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BindError {
    InvalidDatabaseUrl,
}

/// Remote application handle: auth lifecycle plus realtime-database access.
///
/// `get` and `stream` only enqueue work; network I/O happens in `poll`.
#[allow(async_fn_in_trait)]
pub trait RemoteApp {
    /// Starts the asynchronous sign-in. Completion is reported tagged `tag`.
    fn initialize(&mut self, credentials: UserCredentials, tag: &'static str);

    /// Binds the database handle to its base URL.
    fn bind_database(&mut self, url: &str) -> Result<(), BindError>;

    fn ready(&self) -> bool;

    /// Advances pending work and pushes any finished results.
    async fn poll(&mut self, now_ms: u64, results: &mut ResultQueue);

    /// Queues a one-shot read of `path`. Returns false if it could not be queued.
    fn get(&mut self, path: &str, tag: &'static str) -> bool;

    /// Watches `path`, reporting a result each time its value changes.
    fn stream(&mut self, path: &str, tag: &'static str) -> bool;

    /// Forgets the last value delivered for a watched `path`, so the next
    /// watch read reports it even when unchanged.
    fn forget_delivered(&mut self, _path: &str) {}
}
