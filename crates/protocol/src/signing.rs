use serde::Serialize;
use thiserror::Error;

use cortege_common::clock::Clock;
use cortege_common::crypto::{sign_bytes, verify_signature};

use crate::messages::{Envelope, SetActiveRoute};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("signature does not match payload and password")]
    BadSignature,
    #[error("timestamp {timestamp} is {skew_ms} ms away from now")]
    Stale { timestamp: i64, skew_ms: i64 },
}

pub fn envelope<T: Serialize>(
    message_type: &str,
    id: &str,
    ts: i64,
    payload: &T,
) -> anyhow::Result<Envelope> {
    let payload_value = serde_json::to_value(payload)?;
    Ok(Envelope {
        message_type: message_type.to_string(),
        id: id.to_string(),
        ts,
        payload: payload_value,
    })
}

fn signable_bytes(payload: &str, timestamp: i64) -> Vec<u8> {
    format!("{timestamp}:{payload}").into_bytes()
}

pub fn sign_command(payload: &str, password: &str, timestamp: i64) -> String {
    sign_bytes(password, &signable_bytes(payload, timestamp))
}

/// Checks the signature, then that `timestamp` lies within `window_ms` of the
/// clock in either direction.
pub fn verify_command(
    payload: &str,
    timestamp: i64,
    signature: &str,
    password: &str,
    window_ms: i64,
    clock: &dyn Clock,
) -> Result<(), VerifyError> {
    if !verify_signature(password, &signable_bytes(payload, timestamp), signature) {
        return Err(VerifyError::BadSignature);
    }
    let skew_ms = clock.now_ms().saturating_sub(timestamp).saturating_abs();
    if skew_ms > window_ms {
        return Err(VerifyError::Stale { timestamp, skew_ms });
    }
    Ok(())
}

impl SetActiveRoute {
    pub fn signed(route_name: &str, password: &str, timestamp: i64) -> Self {
        Self {
            route_name: Some(route_name.to_string()),
            timestamp,
            signature: sign_command(route_name, password, timestamp),
        }
    }

    pub fn verify(&self, password: &str, window_ms: i64, clock: &dyn Clock) -> Result<(), VerifyError> {
        verify_command(
            self.route_name.as_deref().unwrap_or_default(),
            self.timestamp,
            &self.signature,
            password,
            window_ms,
            clock,
        )
    }
}
