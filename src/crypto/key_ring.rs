//! Signing key ring for escalation tokens
//!
//! The current key signs; retired keys stay available for verification so a
//! rotation does not log out every live session. The startup key is derived
//! from the configured seed, which lets several instances verify each other's
//! tokens. Rotations are manual; there is no background rotation task.

use crate::crypto::SecureKeyPair;
use crate::{Result, crypto_error};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Rotation history kept in memory
const MAX_ROTATION_EVENTS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RotationEventType {
    Startup,
    Manual,
    Emergency,
}

/// Metadata about a key rotation event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRotationEvent {
    pub timestamp: u64,
    pub event_type: RotationEventType,
    pub old_key_id: Option<String>,
    pub new_key_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRingStats {
    pub current_key_id: String,
    pub current_key_age_seconds: u64,
    pub previous_keys_count: usize,
    pub total_rotations: u64,
    pub last_rotation_timestamp: Option<u64>,
}

pub struct KeyRing {
    max_previous_keys: usize,
    current: RwLock<Arc<SecureKeyPair>>,
    previous: RwLock<VecDeque<Arc<SecureKeyPair>>>,
    events: RwLock<Vec<KeyRotationEvent>>,
}

impl KeyRing {
    /// Key ring whose first key is derived from `seed`
    pub fn from_seed(seed: &[u8; 32], max_previous_keys: usize) -> Self {
        let initial = SecureKeyPair::from_seed(seed);
        let startup_event = KeyRotationEvent {
            timestamp: now_secs(),
            event_type: RotationEventType::Startup,
            old_key_id: None,
            new_key_id: initial.key_id(),
            reason: "Signing key derived from configured seed".to_string(),
        };

        tracing::info!(
            key_id = %initial.key_id(),
            max_previous_keys,
            "🔑 Token key ring initialized"
        );

        Self {
            max_previous_keys,
            current: RwLock::new(Arc::new(initial)),
            previous: RwLock::new(VecDeque::new()),
            events: RwLock::new(vec![startup_event]),
        }
    }

    /// Key ring with a random key
    pub fn for_testing() -> Self {
        Self::from_seed(&crate::crypto::SecureMemory::secure_random_bytes::<32>(), 2)
    }

    /// Current signing key
    pub fn current(&self) -> Result<Arc<SecureKeyPair>> {
        self.current
            .read()
            .map(|key| key.clone())
            .map_err(|_| crypto_error!("Key ring read error"))
    }

    /// Find a key (current or retired) by its id
    pub fn find(&self, key_id: &str) -> Result<Option<Arc<SecureKeyPair>>> {
        let current = self.current()?;
        if current.key_id() == key_id {
            return Ok(Some(current));
        }

        let previous = self
            .previous
            .read()
            .map_err(|_| crypto_error!("Key ring read error"))?;

        Ok(previous.iter().find(|key| key.key_id() == key_id).cloned())
    }

    /// Replace the current key with a fresh random one
    pub fn rotate(&self, event_type: RotationEventType, reason: &str) -> Result<String> {
        let new_key = Arc::new(SecureKeyPair::generate());
        let new_key_id = new_key.key_id();

        let old_key_id = {
            let mut current = self
                .current
                .write()
                .map_err(|_| crypto_error!("Key ring write error"))?;
            let mut previous = self
                .previous
                .write()
                .map_err(|_| crypto_error!("Key ring write error"))?;

            let old_key = std::mem::replace(&mut *current, new_key);
            let old_key_id = old_key.key_id();
            previous.push_back(old_key);

            while previous.len() > self.max_previous_keys {
                previous.pop_front();
            }

            old_key_id
        };

        {
            let mut events = self
                .events
                .write()
                .map_err(|_| crypto_error!("Key ring write error"))?;
            events.push(KeyRotationEvent {
                timestamp: now_secs(),
                event_type: event_type.clone(),
                old_key_id: Some(old_key_id.clone()),
                new_key_id: new_key_id.clone(),
                reason: reason.to_string(),
            });

            let len = events.len();
            if len > MAX_ROTATION_EVENTS {
                events.drain(0..len - MAX_ROTATION_EVENTS);
            }
        }

        if event_type == RotationEventType::Emergency {
            tracing::warn!(old_key = %old_key_id, new_key = %new_key_id, reason, "🚨 Emergency token key rotation");
        } else {
            tracing::info!(old_key = %old_key_id, new_key = %new_key_id, reason, "🔄 Token key rotated");
        }

        Ok(new_key_id)
    }

    pub fn stats(&self) -> Result<KeyRingStats> {
        let current = self.current()?;
        let previous_keys_count = self
            .previous
            .read()
            .map_err(|_| crypto_error!("Key ring read error"))?
            .len();
        let events = self
            .events
            .read()
            .map_err(|_| crypto_error!("Key ring read error"))?;

        let rotations: Vec<&KeyRotationEvent> = events
            .iter()
            .filter(|event| event.event_type != RotationEventType::Startup)
            .collect();

        Ok(KeyRingStats {
            current_key_id: current.key_id(),
            current_key_age_seconds: now_secs().saturating_sub(current.created_at()),
            previous_keys_count,
            total_rotations: rotations.len() as u64,
            last_rotation_timestamp: rotations.last().map(|event| event.timestamp),
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
