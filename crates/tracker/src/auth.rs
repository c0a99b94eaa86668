//! HMAC-signed, time-bounded session tokens.
//!
//! A token is `hex(payload) . hex(HMAC-SHA256(secret, payload))` where the
//! payload is `username|issued_at` (unix seconds). The tracker keeps no
//! per-token state; validation recomputes the tag and checks the age.

use chrono::Utc;
use gshare_core::error::{ShareError, ShareResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const INVALID_TOKEN: &str = "invalid or expired token";

pub struct TokenService {
    secret: Vec<u8>,
    expiry_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, expiry_secs: i64) -> TokenService {
        TokenService {
            secret: secret.as_bytes().to_vec(),
            expiry_secs,
        }
    }

    /// Mint a token binding `username` to the current instant.
    pub fn mint(&self, username: &str) -> String {
        let payload = format!("{}|{}", username, Utc::now().timestamp());
        let tag = self.sign(payload.as_bytes());
        format!("{}.{}", hex::encode(payload.as_bytes()), hex::encode(tag))
    }

    /// Check the tag and the age; yields the bound username.
    pub fn validate(&self, token: &str) -> ShareResult<String> {
        let (payload_hex, tag_hex) = token
            .split_once('.')
            .ok_or_else(|| ShareError::auth(INVALID_TOKEN))?;
        let payload =
            hex::decode(payload_hex).map_err(|_| ShareError::auth(INVALID_TOKEN))?;
        let tag = hex::decode(tag_hex).map_err(|_| ShareError::auth(INVALID_TOKEN))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(&payload);
        mac.verify_slice(&tag)
            .map_err(|_| ShareError::auth(INVALID_TOKEN))?;

        let payload =
            String::from_utf8(payload).map_err(|_| ShareError::auth(INVALID_TOKEN))?;
        let (username, issued_at) = payload
            .rsplit_once('|')
            .ok_or_else(|| ShareError::auth(INVALID_TOKEN))?;
        let issued_at: i64 = issued_at
            .parse()
            .map_err(|_| ShareError::auth(INVALID_TOKEN))?;

        if Utc::now().timestamp() - issued_at >= self.expiry_secs {
            return Err(ShareError::auth(INVALID_TOKEN));
        }
        Ok(username.to_string())
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
