//! Email/password sign-in against the identity REST endpoint.

use alloc::string::String;
use core::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::auth::UserCredentials;

pub const IDENTITY_HOST: &str = "identitytoolkit.googleapis.com";
const SIGN_IN_PATH: &str = "/v1/accounts:signInWithPassword";
/// Used when the server omits or garbles `expiresIn`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3_600;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Request target carrying the project API key.
pub fn sign_in_target(api_key: &str) -> String {
    let mut target = String::new();
    let _ = write!(target, "{}?key={}", SIGN_IN_PATH, api_key);
    target
}

pub fn sign_in_body(credentials: &UserCredentials) -> String {
    serde_json::to_string(&SignInRequest {
        email: &credentials.email,
        password: &credentials.password,
        return_secure_token: true,
    })
    .unwrap_or_default()
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdToken {
    pub token: String,
    pub lifetime_secs: u64,
}

/// Extracts the ID token from a successful sign-in body.
pub fn parse_sign_in(body: &[u8]) -> Option<IdToken> {
    let response: SignInResponse = serde_json::from_slice(body).ok()?;
    if response.id_token.is_empty() {
        return None;
    }
    let lifetime_secs = response
        .expires_in
        .and_then(|secs| secs.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Some(IdToken {
        token: response.id_token,
        lifetime_secs,
    })
}

/// Extracts `error.message` from an identity error body, e.g. `INVALID_PASSWORD`.
pub fn parse_error_message(body: &[u8]) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).ok()?;
    Some(envelope.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::exact;

    #[test]
    fn body_uses_camel_case_fields() {
        let credentials = UserCredentials {
            api_key: exact("k").unwrap(),
            email: exact("e@x.com").unwrap(),
            password: exact("p\"w").unwrap(),
        };
        assert_eq!(
            sign_in_body(&credentials),
            r#"{"email":"e@x.com","password":"p\"w","returnSecureToken":true}"#
        );
        assert_eq!(
            sign_in_target("AIza"),
            "/v1/accounts:signInWithPassword?key=AIza"
        );
    }

    #[test]
    fn parses_token_and_lifetime() {
        let body = br#"{"kind":"x","localId":"u1","idToken":"eyJ.abc","refreshToken":"r","expiresIn":"1800"}"#;
        assert_eq!(
            parse_sign_in(body),
            Some(IdToken {
                token: String::from("eyJ.abc"),
                lifetime_secs: 1_800
            })
        );

        let no_expiry = br#"{"idToken":"t"}"#;
        assert_eq!(parse_sign_in(no_expiry).unwrap().lifetime_secs, 3_600);
        assert_eq!(parse_sign_in(br#"{"idToken":""}"#), None);
    }

    #[test]
    fn parses_error_message() {
        let body = br#"{"error":{"code":400,"message":"INVALID_PASSWORD","errors":[]}}"#;
        assert_eq!(parse_error_message(body).as_deref(), Some("INVALID_PASSWORD"));
        assert_eq!(parse_error_message(b"<html>"), None);
    }
}
