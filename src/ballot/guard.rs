//! Ballot casting
//!
//! A ballot is accepted only with a `BallotCast` token for its election, only
//! once per `(principal, election)`, and is stored encrypted. The datastore's
//! unique insert is the final arbiter when two casts race.

use crate::crypto::{BallotCast, BallotCipher, CryptoUtils, TokenSigner};
use crate::store::Datastore;
use crate::types::{Ballot, ElectionId, PrincipalId, Selections};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Proof of a committed ballot returned to the voter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastReceipt {
    pub ballot_id: Uuid,
    pub election_id: ElectionId,
    pub cast_at: DateTime<Utc>,
    /// BLAKE3 of the stored envelope, hex
    pub receipt_hash: String,
}

pub struct BallotGuard {
    store: Arc<dyn Datastore>,
    signer: Arc<TokenSigner>,
    cipher: BallotCipher,
}

impl BallotGuard {
    pub fn new(store: Arc<dyn Datastore>, signer: Arc<TokenSigner>, cipher: BallotCipher) -> Self {
        Self {
            store,
            signer,
            cipher,
        }
    }

    /// Commit `selections` under the authorization in `ballot_token`
    pub async fn cast(&self, ballot_token: &str, selections: &Selections) -> Result<CastReceipt> {
        let authorization = self.signer.verify::<BallotCast>(ballot_token)?;
        let BallotCast {
            principal_id,
            election_id,
        } = authorization.claims;

        validate_selections(selections)?;

        if self.store.has_ballot(&principal_id, &election_id).await? {
            tracing::info!(principal = %principal_id, election = %election_id, "Repeat ballot rejected");
            return Err(Error::conflict("You have already voted in this election"));
        }

        let plaintext = serde_json::to_vec(selections)?;
        let encrypted_payload = self.cipher.seal(&principal_id, &election_id, &plaintext)?;
        let receipt_hash = CryptoUtils::hash_to_hex(&CryptoUtils::hash(&encrypted_payload));

        let ballot = Ballot {
            ballot_id: Uuid::new_v4(),
            principal_id: principal_id.clone(),
            election_id,
            encrypted_payload,
            cast_at: Utc::now(),
        };
        let receipt = CastReceipt {
            ballot_id: ballot.ballot_id,
            election_id,
            cast_at: ballot.cast_at,
            receipt_hash,
        };

        self.store.insert_ballot_unique(ballot).await.inspect_err(|e| {
            if matches!(e, Error::Conflict { .. }) {
                tracing::warn!(principal = %principal_id, election = %election_id, "Concurrent ballot lost the insert race");
            }
        })?;

        tracing::info!(
            principal = %principal_id,
            election = %election_id,
            ballot_id = %receipt.ballot_id,
            positions = selections.len(),
            "🗳️ Ballot cast"
        );

        Ok(receipt)
    }

    /// Decrypt a stored ballot
    pub fn open(&self, ballot: &Ballot) -> Result<Selections> {
        let plaintext =
            self.cipher
                .open(&ballot.principal_id, &ballot.election_id, &ballot.encrypted_payload)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Load and decrypt the ballot of `principal` in `election`
    pub async fn open_stored(
        &self,
        principal: &PrincipalId,
        election: &ElectionId,
    ) -> Result<Option<Selections>> {
        match self.store.get_ballot(principal, election).await? {
            Some(ballot) => self.open(&ballot).map(Some),
            None => Ok(None),
        }
    }
}

/// Reject empty ballots and empty or repeated identifiers
pub fn validate_selections(selections: &Selections) -> Result<()> {
    if selections.is_empty() {
        return Err(Error::invalid_input("Ballot has no selections"));
    }

    for (position, candidates) in selections {
        if position.trim().is_empty() {
            return Err(Error::invalid_input("Ballot contains an empty position"));
        }
        if candidates.is_empty() {
            return Err(Error::invalid_input(format!(
                "No candidate selected for position {position}"
            )));
        }

        let mut seen = HashSet::new();
        for candidate in candidates {
            if candidate.trim().is_empty() {
                return Err(Error::invalid_input(format!(
                    "Empty candidate for position {position}"
                )));
            }
            if !seen.insert(candidate.as_str()) {
                return Err(Error::invalid_input(format!(
                    "Candidate {candidate} selected twice for position {position}"
                )));
            }
        }
    }

    Ok(())
}
