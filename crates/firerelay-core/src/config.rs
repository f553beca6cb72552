//! Device configuration loaded from persistent storage.

use alloc::string::{String, ToString};

use heapless::String as HeaplessString;
use log::{error, info};
use serde::Deserialize;

use crate::text::{exact, truncated};

/// Largest config document accepted from storage.
pub const CONFIG_DOCUMENT_MAX_BYTES: usize = 1024;

pub const SSID_BYTES: usize = 32;
pub const WIFI_PASSWORD_BYTES: usize = 64;
pub const API_KEY_BYTES: usize = 64;
pub const EMAIL_BYTES: usize = 96;
pub const ACCOUNT_PASSWORD_BYTES: usize = 64;
pub const DATABASE_URL_BYTES: usize = 128;
pub const PARSE_MESSAGE_BYTES: usize = 96;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    pub ssid: HeaplessString<SSID_BYTES>,
    pub wifi_password: HeaplessString<WIFI_PASSWORD_BYTES>,
    pub api_key: HeaplessString<API_KEY_BYTES>,
    pub account_email: HeaplessString<EMAIL_BYTES>,
    pub account_password: HeaplessString<ACCOUNT_PASSWORD_BYTES>,
    pub database_url: HeaplessString<DATABASE_URL_BYTES>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Storage could not be opened or held no document.
    StorageOpen,
    /// Parser diagnostic, truncated to fit.
    ConfigParse(HeaplessString<PARSE_MESSAGE_BYTES>),
    ConfigFieldMissing(&'static str),
    ConfigFieldTooLong(&'static str),
}

/// Persistent storage holding the raw config document.
pub trait ConfigSource {
    type Error: core::fmt::Debug;

    /// Fills `buf` with the document and returns its length; `Ok(0)` means empty.
    fn read_document(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// In-memory document, used when config is baked into the image and in tests.
#[derive(Clone, Copy, Debug)]
pub struct SliceConfigSource<'a> {
    document: &'a [u8],
}

impl<'a> SliceConfigSource<'a> {
    pub const fn new(document: &'a [u8]) -> Self {
        Self { document }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DocumentTooLarge;

impl ConfigSource for SliceConfigSource<'_> {
    type Error = DocumentTooLarge;

    fn read_document(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = self.document.len();
        if len > buf.len() {
            return Err(DocumentTooLarge);
        }
        buf[..len].copy_from_slice(self.document);
        Ok(len)
    }
}

/// Why a raw document region could not be read as a config document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoredDocumentError {
    /// No terminator inside the bytes read and the region continues past them.
    TooLarge,
    /// The region holds something other than raw JSON, e.g. a filesystem image.
    NotRawJson,
}

/// Length of a raw JSON document stored at the start of a flash region.
///
/// `window` holds the first bytes of a region of `region_len` bytes. The
/// document ends at the first erased (`0xFF`) or NUL byte; a document that
/// fills the whole region needs no terminator. `Ok(0)` means the region is empty.
pub fn stored_document_len(window: &[u8], region_len: usize) -> Result<usize, StoredDocumentError> {
    let len = match window.iter().position(|byte| *byte == 0xFF || *byte == 0x00) {
        Some(end) => end,
        None if window.len() >= region_len => window.len(),
        None => return Err(StoredDocumentError::TooLarge),
    };

    let document = &window[..len];
    match document.iter().find(|byte| !byte.is_ascii_whitespace()) {
        None | Some(b'{') => Ok(len),
        Some(_) => Err(StoredDocumentError::NotRawJson),
    }
}

#[derive(Deserialize)]
struct RawDocument {
    wifi: Option<RawWifi>,
    firebase: Option<RawFirebase>,
}

#[derive(Deserialize)]
struct RawWifi {
    ssid: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct RawFirebase {
    api_key: Option<String>,
    email: Option<String>,
    password: Option<String>,
    database_url: Option<String>,
}

/// Reads and parses the config document from `source`.
pub fn load_config<S: ConfigSource>(source: &mut S) -> Result<DeviceConfig, ConfigError> {
    let mut buf = [0u8; CONFIG_DOCUMENT_MAX_BYTES];
    let len = match source.read_document(&mut buf) {
        Ok(0) => {
            error!("config: storage holds no document");
            return Err(ConfigError::StorageOpen);
        }
        Ok(len) => len,
        Err(err) => {
            error!("config: failed to open storage: {:?}", err);
            return Err(ConfigError::StorageOpen);
        }
    };

    let config = parse_config(&buf[..len])?;
    info!("config: parsed ssid={} db={}", config.ssid, config.database_url);
    Ok(config)
}

/// Parses a config document. Every field must be present and non-empty.
pub fn parse_config(document: &[u8]) -> Result<DeviceConfig, ConfigError> {
    let raw: RawDocument = serde_json::from_slice(document).map_err(|err| {
        let message = err.to_string();
        error!("config: JSON parse error: {}", message);
        ConfigError::ConfigParse(truncated(&message))
    })?;

    let wifi = raw.wifi.unwrap_or(RawWifi {
        ssid: None,
        password: None,
    });
    let firebase = raw.firebase.unwrap_or(RawFirebase {
        api_key: None,
        email: None,
        password: None,
        database_url: None,
    });

    Ok(DeviceConfig {
        ssid: required("wifi.ssid", wifi.ssid)?,
        wifi_password: required("wifi.password", wifi.password)?,
        api_key: required("firebase.api_key", firebase.api_key)?,
        account_email: required("firebase.email", firebase.email)?,
        account_password: required("firebase.password", firebase.password)?,
        database_url: required("firebase.database_url", firebase.database_url)?,
    })
}

fn required<const N: usize>(
    key: &'static str,
    value: Option<String>,
) -> Result<HeaplessString<N>, ConfigError> {
    let value = value.filter(|value| !value.is_empty()).ok_or_else(|| {
        error!("config: missing field {}", key);
        ConfigError::ConfigFieldMissing(key)
    })?;
    exact(&value).ok_or_else(|| {
        error!("config: field {} exceeds {} bytes", key, N);
        ConfigError::ConfigFieldTooLong(key)
    })
}
