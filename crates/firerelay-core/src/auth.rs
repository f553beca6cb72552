//! Account credentials and the app/auth start-up sequence.

use heapless::String as HeaplessString;
use log::{error, info};

use crate::{
    config::{ACCOUNT_PASSWORD_BYTES, API_KEY_BYTES, DeviceConfig, EMAIL_BYTES},
    remote::{AUTH_TAG, BindError, RemoteApp},
};

/// Email/password account used to sign in to the database project.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserCredentials {
    pub api_key: HeaplessString<API_KEY_BYTES>,
    pub email: HeaplessString<EMAIL_BYTES>,
    pub password: HeaplessString<ACCOUNT_PASSWORD_BYTES>,
}

impl UserCredentials {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            email: config.account_email.clone(),
            password: config.account_password.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthError {
    InvalidDatabaseUrl,
}

impl From<BindError> for AuthError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::InvalidDatabaseUrl => Self::InvalidDatabaseUrl,
        }
    }
}

pub struct AuthSession;

impl AuthSession {
    /// Starts sign-in and binds the database URL. Sign-in completes later,
    /// inside `poll`; readiness must be observed through [`RemoteApp::ready`].
    pub fn begin<A: RemoteApp>(app: &mut A, config: &DeviceConfig) -> Result<(), AuthError> {
        app.initialize(UserCredentials::from_config(config), AUTH_TAG);
        if let Err(err) = app.bind_database(&config.database_url) {
            error!("auth: cannot bind database url {}", config.database_url);
            return Err(err.into());
        }
        info!("auth: sign-in started for {}", config.account_email);
        Ok(())
    }
}
