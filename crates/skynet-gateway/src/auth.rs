//! Device pairing and the API-key store (spec.md §3, §4.10, §6).
//!
//! Constant-time comparison and loopback detection are ported from
//! `original_source/openclaw/gateway/auth.py::safe_equal`/
//! `is_loopback_address`, using the `subtle` crate's `ConstantTimeEq`
//! instead of `hmac.compare_digest`. Device pairing and the API-key SQLite
//! store have no predecessor source — `original_source` authenticates with
//! token/password only — so both are designed fresh against the
//! `DevicePairingRequest`/`DeviceToken`/`ApiKey` shapes and the `api_keys`
//! schema spec.md §3/§6 give directly.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Which authentication path a connection succeeded through (spec.md
/// §4.10 step 1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Token,
    Password,
    DeviceToken,
    LocalDirect,
    Tailscale,
    TrustedProxy,
    None,
}

/// Timing-safe string comparison (ported from `auth.py::safe_equal`).
pub fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// True for loopback addresses (ported from `auth.py::is_loopback_address`).
pub fn is_loopback_address(ip: &str) -> bool {
    ip == "127.0.0.1" || ip.starts_with("127.") || ip == "::1" || ip.starts_with("::ffff:127.")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Pairing requests left `pending` longer than this flip to `expired`
/// (spec.md §4.10: "Requests expire after a configured TTL").
pub const PAIRING_REQUEST_TTL_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePairingRequest {
    pub request_id: String,
    pub device_id: String,
    pub public_key: String,
    pub display_name: Option<String>,
    pub platform: Option<String>,
    pub remote_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: PairingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    pub scopes: Vec<String>,
    pub device_id: String,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DeviceToken {
    fn is_live(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[derive(Default)]
struct DeviceState {
    requests: HashMap<String, DevicePairingRequest>,
    /// Keyed by device_id — one live token per device, rotation replaces it.
    tokens: HashMap<String, DeviceToken>,
}

/// Device pairing (in-memory — pairing and approval happen at human speed,
/// not on the per-message hot path, so nothing here needs to survive a
/// restart beyond re-pairing) plus the persistent API-key SQLite store.
pub struct AuthStore {
    devices: Mutex<DeviceState>,
    db: Mutex<Connection>,
}

impl AuthStore {
    pub fn new(db: Connection) -> rusqlite::Result<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_keys (
                key_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                permissions TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                last_used_at INTEGER,
                enabled INTEGER NOT NULL DEFAULT 1,
                rate_limit INTEGER,
                metadata TEXT NOT NULL DEFAULT '{}'
            )",
        )?;
        Ok(Self {
            devices: Mutex::new(DeviceState::default()),
            db: Mutex::new(db),
        })
    }

    // ── Device pairing (spec.md §4.10) ──────────────────────────────────

    pub fn create_pairing_request(
        &self,
        device_id: impl Into<String>,
        public_key: impl Into<String>,
        display_name: Option<String>,
        platform: Option<String>,
        remote_ip: Option<String>,
    ) -> String {
        let request_id = Uuid::new_v4().to_string();
        let req = DevicePairingRequest {
            request_id: request_id.clone(),
            device_id: device_id.into(),
            public_key: public_key.into(),
            display_name,
            platform,
            remote_ip,
            created_at: Utc::now(),
            status: PairingStatus::Pending,
        };
        self.devices.lock().unwrap().requests.insert(request_id.clone(), req);
        request_id
    }

    /// Pending requests, after flipping any that have aged past the TTL to
    /// `expired`.
    pub fn list_pending(&self) -> Vec<DevicePairingRequest> {
        let mut state = self.devices.lock().unwrap();
        let now = Utc::now();
        for req in state.requests.values_mut() {
            if req.status == PairingStatus::Pending
                && now.signed_duration_since(req.created_at).num_milliseconds() > PAIRING_REQUEST_TTL_MS
            {
                req.status = PairingStatus::Expired;
            }
        }
        state
            .requests
            .values()
            .filter(|r| r.status == PairingStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn approve(&self, request_id: &str) -> Result<DeviceToken, String> {
        let mut state = self.devices.lock().unwrap();
        let device_id = {
            let req = state
                .requests
                .get_mut(request_id)
                .ok_or_else(|| "unknown pairing request".to_string())?;
            if req.status != PairingStatus::Pending {
                return Err(format!("request is {:?}, not pending", req.status));
            }
            req.status = PairingStatus::Approved;
            req.device_id.clone()
        };
        let token = DeviceToken {
            token: Uuid::new_v4().to_string(),
            scopes: vec!["gateway".to_string()],
            device_id: device_id.clone(),
            issued_at: Utc::now(),
            revoked_at: None,
        };
        state.tokens.insert(device_id, token.clone());
        Ok(token)
    }

    pub fn reject(&self, request_id: &str) -> Result<(), String> {
        let mut state = self.devices.lock().unwrap();
        let req = state
            .requests
            .get_mut(request_id)
            .ok_or_else(|| "unknown pairing request".to_string())?;
        req.status = PairingStatus::Rejected;
        Ok(())
    }

    pub fn rotate_token(&self, device_id: &str) -> Result<DeviceToken, String> {
        let mut state = self.devices.lock().unwrap();
        if !state.tokens.contains_key(device_id) {
            return Err("device has no issued token".to_string());
        }
        let token = DeviceToken {
            token: Uuid::new_v4().to_string(),
            scopes: vec!["gateway".to_string()],
            device_id: device_id.to_string(),
            issued_at: Utc::now(),
            revoked_at: None,
        };
        state.tokens.insert(device_id.to_string(), token.clone());
        Ok(token)
    }

    pub fn revoke_token(&self, device_id: &str) -> Result<(), String> {
        let mut state = self.devices.lock().unwrap();
        match state.tokens.get_mut(device_id) {
            Some(t) => {
                t.revoked_at = Some(Utc::now());
                Ok(())
            }
            None => Err("device has no issued token".to_string()),
        }
    }

    /// Verify a `(deviceId, deviceToken)` pair against a live, non-revoked
    /// token scoped for `gateway` (spec.md §4.10 step 2).
    pub fn verify_device_token(&self, device_id: &str, token: &str) -> bool {
        let state = self.devices.lock().unwrap();
        match state.tokens.get(device_id) {
            Some(t) => {
                t.is_live() && safe_equal(&t.token, token) && t.scopes.iter().any(|s| s == "gateway")
            }
            None => false,
        }
    }

    // ── API keys (spec.md §6) ───────────────────────────────────────────

    /// Create a new API key. Returns `(key_id, plaintext_secret)` — the
    /// secret is shown once and never persisted, only its SHA-256 hash.
    pub fn create_api_key(
        &self,
        name: &str,
        permissions: Vec<String>,
    ) -> rusqlite::Result<(String, String)> {
        let key_id = Uuid::new_v4().to_string();
        let secret = Uuid::new_v4().to_string();
        let key_hash = hex::encode(Sha256::digest(secret.as_bytes()));
        let perms = serde_json::to_string(&permissions).unwrap_or_else(|_| "[]".to_string());
        self.db.lock().unwrap().execute(
            "INSERT INTO api_keys (key_id, name, key_hash, permissions, created_at, enabled, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, '{}')",
            params![key_id, name, key_hash, perms, now_ms()],
        )?;
        Ok((key_id, secret))
    }

    /// Verify a presented API key's hash against the store (constant-time
    /// over the stored hash), stamping `last_used_at` on success. Returns
    /// the matching `key_id`.
    pub fn verify_api_key(&self, presented: &str) -> rusqlite::Result<Option<String>> {
        let hash = hex::encode(Sha256::digest(presented.as_bytes()));
        let conn = self.db.lock().unwrap();
        let candidates: Vec<(String, String)> = {
            let mut stmt = conn.prepare(
                "SELECT key_id, key_hash FROM api_keys WHERE enabled = 1
                 AND (expires_at IS NULL OR expires_at > ?1)",
            )?;
            let rows = stmt.query_map(params![now_ms()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (key_id, stored_hash) in candidates {
            if safe_equal(&stored_hash, &hash) {
                conn.execute(
                    "UPDATE api_keys SET last_used_at = ?1 WHERE key_id = ?2",
                    params![now_ms(), key_id],
                )?;
                return Ok(Some(key_id));
            }
        }
        Ok(None)
    }

    pub fn revoke_api_key(&self, key_id: &str) -> rusqlite::Result<bool> {
        let rows = self.db.lock().unwrap().execute(
            "UPDATE api_keys SET enabled = 0 WHERE key_id = ?1",
            params![key_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AuthStore {
        AuthStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn safe_equal_rejects_length_mismatch_without_panicking() {
        assert!(!safe_equal("abc", "ab"));
        assert!(safe_equal("abc", "abc"));
    }

    #[test]
    fn loopback_detection_matches_predecessor() {
        assert!(is_loopback_address("127.0.0.1"));
        assert!(is_loopback_address("127.5.5.5"));
        assert!(is_loopback_address("::1"));
        assert!(!is_loopback_address("10.0.0.1"));
    }

    #[test]
    fn pairing_flow_approve_then_verify() {
        let store = store();
        let request_id = store.create_pairing_request("phone1", "pubkey", None, None, None);
        assert_eq!(store.list_pending().len(), 1);

        let token = store.approve(&request_id).unwrap();
        assert!(store.list_pending().is_empty());
        assert!(store.verify_device_token("phone1", &token.token));

        store.revoke_token("phone1").unwrap();
        assert!(!store.verify_device_token("phone1", &token.token));
    }

    #[test]
    fn api_key_round_trips_and_revokes() {
        let store = store();
        let (key_id, secret) = store.create_api_key("ci", vec!["read".into()]).unwrap();
        assert_eq!(store.verify_api_key(&secret).unwrap(), Some(key_id.clone()));

        store.revoke_api_key(&key_id).unwrap();
        assert_eq!(store.verify_api_key(&secret).unwrap(), None);
    }
}
