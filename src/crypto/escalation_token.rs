//! Escalation tokens: signed, purpose-scoped, time-boxed capabilities
//!
//! Each stage of the login protocol is proven by one token purpose:
//! 1. `PendingCredential` - password accepted, code sent (client-held marker)
//! 2. `SelectionVerified` - one-time code accepted
//! 3. `VoterPreAuth` - voter may enroll or verify a face
//! 4. `FullSession` - authenticated session
//! 5. `BallotCast` - one election, issued after a fresh face match
//!
//! Claims are a closed tagged union. Callers ask for a concrete claims type
//! (`signer.verify::<BallotCast>(..)`) and a token of any other purpose is
//! rejected even when its signature and expiry are valid.
//!
//! Wire format: `base64url(envelope json) "." base64url(ed25519 signature)`.
//! Tokens are stateless; there is no server-side revocation list.

use crate::crypto::{KeyRing, SecureMemory};
use crate::types::{ElectionId, PrincipalId, Role, Timestamp};
use crate::{Result, auth_error};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Tolerated clock skew for `iat` in the future (seconds)
const MAX_CLOCK_SKEW: i64 = 60;

/// Longest token string accepted before any decoding
const MAX_TOKEN_LENGTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    PendingCredential,
    SelectionVerified,
    VoterPreAuth,
    FullSession,
    BallotCast,
}

impl Purpose {
    pub const ALL: [Purpose; 5] = [
        Purpose::PendingCredential,
        Purpose::SelectionVerified,
        Purpose::VoterPreAuth,
        Purpose::FullSession,
        Purpose::BallotCast,
    ];
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::PendingCredential => "pending_credential",
            Purpose::SelectionVerified => "selection_verified",
            Purpose::VoterPreAuth => "voter_pre_auth",
            Purpose::FullSession => "full_session",
            Purpose::BallotCast => "ballot_cast",
        };
        f.write_str(name)
    }
}

/// Lifetimes per purpose in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLifetimes {
    pub pending_credential: u64,
    pub selection_verified: u64,
    pub voter_pre_auth: u64,
    pub full_session: u64,
    pub ballot_cast: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            pending_credential: 600,
            selection_verified: 600,
            voter_pre_auth: 600,
            full_session: 7 * 24 * 3600,
            ballot_cast: 300,
        }
    }
}

impl TokenLifetimes {
    pub fn for_purpose(&self, purpose: Purpose) -> u64 {
        match purpose {
            Purpose::PendingCredential => self.pending_credential,
            Purpose::SelectionVerified => self.selection_verified,
            Purpose::VoterPreAuth => self.voter_pre_auth,
            Purpose::FullSession => self.full_session,
            Purpose::BallotCast => self.ballot_cast,
        }
    }
}

/// Which escalation a verified selection may be spent on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTarget {
    AdminSession,
    VoterPreAuth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCredential {
    pub principal_id: PrincipalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionVerified {
    pub principal_id: PrincipalId,
    pub otp_verified: bool,
    pub target: SelectionTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterPreAuth {
    pub principal_id: PrincipalId,
    pub role: Role,
    pub pre_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSession {
    pub principal_id: PrincipalId,
    pub role: Role,
    pub mfa: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallotCast {
    pub principal_id: PrincipalId,
    pub election_id: ElectionId,
}

/// Closed set of token payloads, tagged by purpose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum Claims {
    PendingCredential(PendingCredential),
    SelectionVerified(SelectionVerified),
    VoterPreAuth(VoterPreAuth),
    FullSession(FullSession),
    BallotCast(BallotCast),
}

impl Claims {
    pub fn purpose(&self) -> Purpose {
        match self {
            Claims::PendingCredential(_) => Purpose::PendingCredential,
            Claims::SelectionVerified(_) => Purpose::SelectionVerified,
            Claims::VoterPreAuth(_) => Purpose::VoterPreAuth,
            Claims::FullSession(_) => Purpose::FullSession,
            Claims::BallotCast(_) => Purpose::BallotCast,
        }
    }

    pub fn principal_id(&self) -> &PrincipalId {
        match self {
            Claims::PendingCredential(c) => &c.principal_id,
            Claims::SelectionVerified(c) => &c.principal_id,
            Claims::VoterPreAuth(c) => &c.principal_id,
            Claims::FullSession(c) => &c.principal_id,
            Claims::BallotCast(c) => &c.principal_id,
        }
    }
}

/// A claims type bound to exactly one purpose
pub trait ScopedClaims: Sized {
    const PURPOSE: Purpose;

    fn into_claims(self) -> Claims;

    fn from_claims(claims: Claims) -> Option<Self>;
}

macro_rules! scoped_claims {
    ($ty:ident) => {
        impl ScopedClaims for $ty {
            const PURPOSE: Purpose = Purpose::$ty;

            fn into_claims(self) -> Claims {
                Claims::$ty(self)
            }

            fn from_claims(claims: Claims) -> Option<Self> {
                match claims {
                    Claims::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

scoped_claims!(PendingCredential);
scoped_claims!(SelectionVerified);
scoped_claims!(VoterPreAuth);
scoped_claims!(FullSession);
scoped_claims!(BallotCast);

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kid: String,
    jti: String,
    iat: Timestamp,
    exp: Timestamp,
    claims: Claims,
}

/// A freshly minted token string
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub token: String,
    pub purpose: Purpose,
    pub token_id: String,
    pub expires_at: Timestamp,
    pub lifetime_seconds: u64,
}

/// Claims of a token that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken<C> {
    pub claims: C,
    pub token_id: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Mints and verifies escalation tokens
pub struct TokenSigner {
    keys: Arc<KeyRing>,
    lifetimes: TokenLifetimes,
}

impl TokenSigner {
    pub fn new(keys: Arc<KeyRing>, lifetimes: TokenLifetimes) -> Self {
        Self { keys, lifetimes }
    }

    /// Signer with a random key and default lifetimes
    pub fn for_testing() -> Self {
        Self::new(Arc::new(KeyRing::for_testing()), TokenLifetimes::default())
    }

    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    pub fn key_ring(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Mint a token for `claims`, valid from now for the purpose's lifetime
    pub fn issue<C: ScopedClaims>(&self, claims: C) -> Result<IssuedToken> {
        self.issue_at(claims, Utc::now().timestamp())
    }

    pub(crate) fn issue_at<C: ScopedClaims>(
        &self,
        claims: C,
        issued_at: Timestamp,
    ) -> Result<IssuedToken> {
        let lifetime_seconds = self.lifetimes.for_purpose(C::PURPOSE);
        let key = self.keys.current()?;
        let token_id = hex::encode(SecureMemory::secure_random_bytes::<16>());

        let envelope = Envelope {
            kid: key.key_id(),
            jti: token_id.clone(),
            iat: issued_at,
            exp: issued_at + lifetime_seconds as i64,
            claims: claims.into_claims(),
        };

        let payload = serde_json::to_vec(&envelope)?;
        let signature = key.sign(&payload);
        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        );

        tracing::debug!(
            purpose = %C::PURPOSE,
            principal = %envelope.claims.principal_id(),
            token_id = %token_id,
            "🎫 Escalation token issued"
        );

        Ok(IssuedToken {
            token,
            purpose: C::PURPOSE,
            token_id,
            expires_at: envelope.exp,
            lifetime_seconds,
        })
    }

    /// Verify `token` and return its claims if it was minted for `C`'s purpose
    ///
    /// Signature, expiry and purpose are all evaluated before the outcome is
    /// decided, so a wrong-purpose token is rejected whatever its other state.
    pub fn verify<C: ScopedClaims>(&self, token: &str) -> Result<VerifiedToken<C>> {
        if token.is_empty() || token.len() > MAX_TOKEN_LENGTH {
            return Err(auth_error!("Malformed token"));
        }

        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| auth_error!("Malformed token"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| auth_error!("Malformed token"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| auth_error!("Malformed token"))?;
        let envelope: Envelope =
            serde_json::from_slice(&payload).map_err(|_| auth_error!("Malformed token"))?;

        let signature_valid = match self.keys.find(&envelope.kid)? {
            Some(key) => key.verify(&payload, &signature).is_ok(),
            None => false,
        };

        let now = Utc::now().timestamp();
        let expired = now > envelope.exp;
        let issued_in_future = envelope.iat > now + MAX_CLOCK_SKEW;
        let actual_purpose = envelope.claims.purpose();
        let purpose_matches = actual_purpose == C::PURPOSE;

        if !signature_valid {
            tracing::warn!(purpose = %actual_purpose, "Token signature rejected");
            return Err(auth_error!("Token signature invalid"));
        }
        if !purpose_matches {
            tracing::warn!(
                expected = %C::PURPOSE,
                actual = %actual_purpose,
                principal = %envelope.claims.principal_id(),
                "Token presented outside its purpose"
            );
            return Err(auth_error!(
                "Token purpose {} is not accepted here (requires {})",
                actual_purpose,
                C::PURPOSE
            ));
        }
        if expired {
            return Err(auth_error!("Token expired"));
        }
        if issued_in_future {
            return Err(auth_error!("Token issued in the future"));
        }

        let claims =
            C::from_claims(envelope.claims).ok_or_else(|| auth_error!("Token purpose mismatch"))?;

        Ok(VerifiedToken {
            claims,
            token_id: envelope.jti,
            issued_at: envelope.iat,
            expires_at: envelope.exp,
        })
    }
}
