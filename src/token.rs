//! Client-side reading of bearer credentials.
//!
//! The credential is a three-part `header.claims.signature` string. Only the
//! claims segment is read, and its signature is never checked: the API verifies
//! signatures, the client only uses claims to decide what to show.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

/// Standard alphabet, padding optional. The url-safe characters are mapped onto
/// it before decoding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Stored role ids that count as admin tier.
pub const ADMIN_TIER_IDS: &[&str] = &["1", "2", "3"];

/// Claims decoded from the middle segment of a credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub", default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "exp", default)]
    pub expiry: Option<i64>,
    #[serde(rename = "iat", default)]
    pub issued_at: Option<i64>,
}

impl Claims {
    /// A missing `exp` counts as expired. `exp == now` is still valid.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expiry {
            Some(exp) => exp < now,
            None => true,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.subject.as_deref().filter(|s| !s.is_empty())
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_deref().filter(|s| !s.is_empty())
    }
}

/// Coarse role classification derived from the role claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleId {
    Admin,
    User,
}

impl RoleId {
    /// Map a raw role claim to a role id. Unknown names map to `User`.
    pub fn from_role_name(name: &str) -> Self {
        match name {
            "ROLE_ADMIN" | "ADMIN" => RoleId::Admin,
            _ => RoleId::User,
        }
    }

    /// Read a role id back from session storage
    pub fn from_stored(id: &str) -> Self {
        if ADMIN_TIER_IDS.contains(&id) {
            RoleId::Admin
        } else {
            RoleId::User
        }
    }

    /// Value written to session storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::Admin => "1",
            RoleId::User => "4",
        }
    }

    /// Role name assumed when the credential carries no role claim
    pub fn default_name(&self) -> &'static str {
        match self {
            RoleId::Admin => "ADMIN",
            RoleId::User => "USER",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, RoleId::Admin)
    }
}

/// Decode the claims of a credential. Any malformed input yields `None`.
pub fn decode(token: &str) -> Option<Claims> {
    let segment = token.split('.').nth(1)?;
    if segment.is_empty() {
        debug!("credential has an empty claims segment");
        return None;
    }

    let standard = segment.replace('-', "+").replace('_', "/");
    let bytes = match PAYLOAD_ENGINE.decode(standard.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("credential claims are not base64: {}", e);
            return None;
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("credential claims are not utf-8: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<Claims>(&text) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!("credential claims are not a claims object: {}", e);
            None
        }
    }
}

/// Check expiry against the wall clock
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

/// Undecodable credentials are treated as expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode(token) {
        Some(claims) => claims.is_expired_at(now),
        None => true,
    }
}

pub fn extract_role(token: &str) -> Option<String> {
    decode(token)?.role_name().map(String::from)
}

pub fn extract_username(token: &str) -> Option<String> {
    decode(token)?.username().map(String::from)
}

pub fn is_admin_role(name: &str) -> bool {
    RoleId::from_role_name(name).is_admin()
}

#[cfg(test)]
pub(crate) mod testing {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;

    /// Build an unsigned credential around the given claims
    pub fn token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    pub fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}
