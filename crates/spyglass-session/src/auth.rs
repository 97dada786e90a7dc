//! Identity verification.
//!
//! Spyglass runs inside a Telegram WebApp. Every request carries the
//! WebApp's `initData` query string, which Telegram signs with a key
//! derived from the bot token:
//!
//! ```text
//! secret = HMAC-SHA256(key = "WebAppData", msg = bot_token)
//! hash   = hex(HMAC-SHA256(key = secret, msg = data_check_string))
//! ```
//!
//! where `data_check_string` is every field except `hash`, as `key=value`,
//! sorted by key and joined with `\n`.
//!
//! The server only depends on the [`Authenticator`] trait; tests and
//! local development plug in [`InitDataAuthenticator::bypass`].

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use spyglass_protocol::{Identity, UserId};

use crate::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Validates a client's credential and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// request handler for the life of the server.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        init_data: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Verifies Telegram WebApp `initData`.
#[derive(Debug, Clone)]
pub struct InitDataAuthenticator {
    bot_token: Option<String>,
    bypass: bool,
}

impl InitDataAuthenticator {
    pub fn new(bot_token: impl Into<String>) -> Self {
        let token = bot_token.into();
        Self {
            bot_token: (!token.is_empty()).then_some(token),
            bypass: false,
        }
    }

    /// Trusts the `user` field without checking the signature.
    /// For local development and tests only.
    pub fn bypass() -> Self {
        Self {
            bot_token: None,
            bypass: true,
        }
    }

    pub fn from_settings(bot_token: Option<String>, bypass: bool) -> Self {
        Self {
            bot_token: bot_token.filter(|t| !t.is_empty()),
            bypass,
        }
    }

    pub fn is_bypass(&self) -> bool {
        self.bypass
    }

    /// Synchronous core of [`Authenticator::authenticate`].
    pub fn verify(&self, init_data: &str) -> Result<Identity, SessionError> {
        let mut fields = parse_init_data(init_data)?;

        if !self.bypass {
            let Some(token) = self.bot_token.as_deref() else {
                return Err(SessionError::Misconfigured("bot token is not configured".into()));
            };
            let received = fields
                .remove("hash")
                .ok_or_else(|| SessionError::IdentityFailed("initData hash missing".into()))?;
            if !signature_matches(token, &fields, &received) {
                return Err(SessionError::IdentityFailed("initData signature invalid".into()));
            }
        }

        let user = fields
            .get("user")
            .ok_or_else(|| SessionError::IdentityFailed("user not provided in initData".into()))?;
        let user: TelegramUser = serde_json::from_str(user)
            .map_err(|_| SessionError::IdentityFailed("user data invalid".into()))?;
        Ok(user.into_identity())
    }
}

impl Authenticator for InitDataAuthenticator {
    async fn authenticate(&self, init_data: &str) -> Result<Identity, SessionError> {
        self.verify(init_data)
    }
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TelegramUser {
    fn into_identity(self) -> Identity {
        let display_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Identity {
            user_id: UserId(self.id),
            username: normalize_username(self.username.as_deref()),
            display_name,
        }
    }
}

/// Lower-cases a Telegram handle and strips the leading `@`.
pub fn normalize_username(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim().trim_start_matches('@').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Splits a query string into decoded fields. Later duplicates win.
fn parse_init_data(raw: &str) -> Result<BTreeMap<String, String>, SessionError> {
    let mut fields = BTreeMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields.insert(decode_component(key)?, decode_component(value)?);
    }
    Ok(fields)
}

fn decode_component(raw: &str) -> Result<String, SessionError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|_| SessionError::IdentityFailed("initData is not valid UTF-8".into()))
}

fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn secret_key(bot_token: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(b"WebAppData").ok()?;
    mac.update(bot_token.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

fn signature_matches(bot_token: &str, fields: &BTreeMap<String, String>, received: &str) -> bool {
    let Ok(expected) = hex::decode(received) else {
        return false;
    };
    let Some(secret) = secret_key(bot_token) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(&secret) else {
        return false;
    };
    mac.update(data_check_string(fields).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Builds a signed `initData` string the way Telegram does. Used by
/// integration tests and local tooling.
pub fn sign_init_data(bot_token: &str, fields: &[(&str, &str)]) -> String {
    let map: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let hash = secret_key(bot_token)
        .and_then(|secret| HmacSha256::new_from_slice(&secret).ok())
        .map(|mut mac| {
            mac.update(data_check_string(&map).as_bytes());
            hex::encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default();
    let mut parts: Vec<String> = map
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    parts.push(format!("hash={hash}"));
    parts.join("&")
}
