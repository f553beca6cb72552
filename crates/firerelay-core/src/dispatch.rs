//! Interprets finished remote operations and drives the relay.

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::{
    relay::{RelayController, RelayDriver},
    remote::AsyncResult,
    text::same_path,
};

/// Database path whose value switches the relay.
pub const RELAY_PATH: &str = "/control/relay";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelayCommandDecodeError {
    NotJson,
    UnsupportedValue,
}

/// Decodes a relay command from the raw payload text.
///
/// Accepts JSON booleans, the integers 0/1 and the strings "true"/"false".
pub fn decode_relay_command(payload: &str) -> Result<bool, RelayCommandDecodeError> {
    let value: Value =
        serde_json::from_str(payload.trim()).map_err(|_| RelayCommandDecodeError::NotJson)?;
    match value {
        Value::Bool(on) => Ok(on),
        Value::Number(number) => match number.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(RelayCommandDecodeError::UnsupportedValue),
        },
        Value::String(text) => match text.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(RelayCommandDecodeError::UnsupportedValue),
        },
        _ => Err(RelayCommandDecodeError::UnsupportedValue),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    /// Not a terminal result; nothing happened.
    Pending,
    /// Remote error, logged and dropped.
    Failed,
    /// Terminal result without payload.
    Completed,
    /// Payload for a path other than the watched one.
    Ignored,
    RelayUpdated(bool),
    RelayDecodeFailed(RelayCommandDecodeError),
    RelayWriteFailed,
}

#[derive(Clone, Copy, Debug)]
pub struct ResultDispatcher {
    watched_path: &'static str,
}

impl Default for ResultDispatcher {
    fn default() -> Self {
        Self::new(RELAY_PATH)
    }
}

impl ResultDispatcher {
    pub const fn new(watched_path: &'static str) -> Self {
        Self { watched_path }
    }

    pub fn watched_path(&self) -> &'static str {
        self.watched_path
    }

    /// Handles one result. Safe to call repeatedly with results that carry no news.
    pub fn handle<D: RelayDriver>(
        &self,
        result: &AsyncResult,
        relay: &mut RelayController<D>,
    ) -> DispatchOutcome {
        if !result.is_result() {
            return DispatchOutcome::Pending;
        }

        if let Some(err) = result.error_info() {
            error!("[{}] {} (code {})", result.uid(), err.message(), err.code());
            return DispatchOutcome::Failed;
        }

        if !result.available() {
            debug!("[{}] completed", result.uid());
            return DispatchOutcome::Completed;
        }

        info!("[{}] payload: {}", result.uid(), result.data());

        if !same_path(result.path(), self.watched_path) {
            debug!("[{}] ignoring path {}", result.uid(), result.path());
            return DispatchOutcome::Ignored;
        }

        let on = match decode_relay_command(result.data()) {
            Ok(on) => on,
            Err(err) => {
                warn!(
                    "[{}] cannot decode relay command {:?}: {:?}",
                    result.uid(),
                    result.data(),
                    err
                );
                return DispatchOutcome::RelayDecodeFailed(err);
            }
        };

        match relay.set_relay(on) {
            Ok(()) => DispatchOutcome::RelayUpdated(on),
            Err(err) => {
                error!("[{}] relay write failed: {:?}", result.uid(), err);
                DispatchOutcome::RelayWriteFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::fake::RecordingRelay;

    fn relay() -> RelayController<RecordingRelay> {
        RelayController::new(RecordingRelay::default()).unwrap()
    }

    #[test]
    fn pending_result_is_a_no_op() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();
        let pending = AsyncResult::pending("INIT_READ");

        for _ in 0..5 {
            assert_eq!(dispatcher.handle(&pending, &mut relay), DispatchOutcome::Pending);
        }
        assert_eq!(relay.driver().writes.as_slice(), &[false]);
        assert!(!relay.state());
    }

    #[test]
    fn false_payload_turns_relay_off() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();
        relay.set_relay(true).unwrap();

        let result = AsyncResult::payload("INIT_READ", RELAY_PATH, "false");
        assert_eq!(
            dispatcher.handle(&result, &mut relay),
            DispatchOutcome::RelayUpdated(false)
        );
        assert!(!relay.state());
        assert_eq!(relay.driver().level(), Some(false));
    }

    #[test]
    fn true_payload_turns_relay_on() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();

        let result = AsyncResult::payload("RELAY_STREAM", RELAY_PATH, " true\n");
        assert_eq!(
            dispatcher.handle(&result, &mut relay),
            DispatchOutcome::RelayUpdated(true)
        );
        assert!(relay.state());
        assert_eq!(relay.driver().level(), Some(true));
    }

    #[test]
    fn other_paths_leave_state_unchanged() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();

        let result = AsyncResult::payload("INIT_READ", "/control/fan", "true");
        assert_eq!(dispatcher.handle(&result, &mut relay), DispatchOutcome::Ignored);
        assert!(!relay.state());
        assert_eq!(relay.driver().writes.len(), 1);
    }

    #[test]
    fn error_results_are_swallowed() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();
        relay.set_relay(true).unwrap();

        let result = AsyncResult::error("INIT_READ", "Permission denied", 401);
        assert_eq!(dispatcher.handle(&result, &mut relay), DispatchOutcome::Failed);
        assert!(relay.state());
    }

    #[test]
    fn undecodable_payload_keeps_state() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();

        let null = AsyncResult::payload("INIT_READ", RELAY_PATH, "null");
        assert_eq!(
            dispatcher.handle(&null, &mut relay),
            DispatchOutcome::RelayDecodeFailed(RelayCommandDecodeError::UnsupportedValue)
        );

        let garbage = AsyncResult::payload("INIT_READ", RELAY_PATH, "tru");
        assert_eq!(
            dispatcher.handle(&garbage, &mut relay),
            DispatchOutcome::RelayDecodeFailed(RelayCommandDecodeError::NotJson)
        );
        assert!(!relay.state());
    }

    #[test]
    fn rejected_write_is_reported() {
        let dispatcher = ResultDispatcher::default();
        let mut relay = relay();
        relay.driver_mut().fail = true;

        let result = AsyncResult::payload("INIT_READ", RELAY_PATH, "true");
        assert_eq!(
            dispatcher.handle(&result, &mut relay),
            DispatchOutcome::RelayWriteFailed
        );
        assert!(!relay.state());
    }

    #[test]
    fn decodes_supported_encodings() {
        assert_eq!(decode_relay_command("true"), Ok(true));
        assert_eq!(decode_relay_command("false"), Ok(false));
        assert_eq!(decode_relay_command("1"), Ok(true));
        assert_eq!(decode_relay_command("0"), Ok(false));
        assert_eq!(decode_relay_command("\"true\""), Ok(true));
        assert_eq!(decode_relay_command("\"false\""), Ok(false));
        assert_eq!(
            decode_relay_command("2"),
            Err(RelayCommandDecodeError::UnsupportedValue)
        );
        assert_eq!(
            decode_relay_command("{\"on\":true}"),
            Err(RelayCommandDecodeError::UnsupportedValue)
        );
    }
}
