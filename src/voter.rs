//! Voter records, identities, and one-time invite tokens.

use crate::config;
use crate::eligibility::normalize_email;
use crate::zkp::Identity;
use crate::Error;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const DEFAULT_TOKEN_EXPIRY_HOURS: i64 = 72;

/// Derive the proving identity for a voter in one election.
///
/// Deterministic in the `(email, election)` pair; the same voter gets
/// independent identities in different elections.
pub fn derive_identity(email: &str, election_id: &str) -> Identity {
    let email = email.trim().to_lowercase();
    Identity::from_secret(&format!("{}:{}", email, election_id))
}

/// A one-time voting token. Only the SHA-256 hash needs to be persisted;
/// the opaque token itself is handed to the voter once.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VoterToken {
    pub token: String,
    /// Hex SHA-256 of the opaque token.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Voter {
    /// `"<election_id>-<email>"`.
    pub id: String,
    pub email: String,
    /// Identity commitment, decimal.
    pub commitment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<VoterToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_at: Option<DateTime<Utc>>,
}

impl Voter {
    pub fn new(election_id: &str, email: &str) -> Result<Self, Error> {
        let email =
            normalize_email(email).ok_or_else(|| Error::InvalidEmail(email.to_owned()))?;
        let commitment = derive_identity(&email, election_id).commitment_string();
        Ok(Voter {
            id: format!("{}-{}", election_id, email),
            email,
            commitment,
            token: None,
            invited_at: None,
        })
    }

    /// The identity this voter proves with, for the given election.
    pub fn identity(&self, election_id: &str) -> Identity {
        derive_identity(&self.email, election_id)
    }

    /// Issue a fresh token, replacing any previous one unconditionally.
    /// Returns the opaque token for delivery to the voter.
    pub fn generate_token(&mut self, expiry_hours: i64) -> String {
        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        let token = format!("{}:{}", self.id, hex::encode(random));
        self.token = Some(VoterToken {
            token_hash: hex::encode(Sha256::digest(token.as_bytes())),
            token: token.clone(),
            expires_at: Utc::now() + Duration::hours(expiry_hours),
            used: false,
        });
        self.invited_at = Some(Utc::now());
        token
    }

    /// True when `candidate` hashes to the stored token hash and the token
    /// is unused. Expiry is reported separately by [`Voter::is_token_expired`].
    pub fn verify_token(&self, candidate: &str) -> bool {
        match &self.token {
            Some(token) => {
                hex::encode(Sha256::digest(candidate.as_bytes())) == token.token_hash
                    && !token.used
            }
            None => false,
        }
    }

    pub fn is_token_expired(&self) -> bool {
        match &self.token {
            Some(token) => Utc::now() > token.expires_at,
            None => true,
        }
    }

    pub fn mark_token_used(&mut self) -> Result<(), Error> {
        match &mut self.token {
            Some(token) => {
                token.used = true;
                Ok(())
            }
            None => Err(Error::NoToken(self.id.clone())),
        }
    }

    /// Extract the voter id from an opaque token.
    pub fn parse_token(token: &str) -> Option<&str> {
        let mut parts = token.splitn(2, ':');
        let first = parts.next()?;
        parts.next()?;
        Some(first)
    }

    /// `<base>/vote/<token>`; fails when no token has been issued.
    pub fn invite_link(&self, base_url: Option<&str>) -> Result<String, Error> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| Error::NoToken(self.id.clone()))?;
        let base = match base_url {
            Some(base) => base.to_owned(),
            None => config::invite_base_url(),
        };
        Ok(format!("{}/vote/{}", base.trim_end_matches('/'), token.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_is_stable_per_election() {
        let v1 = Voter::new("e1", "Alice@Example.com ").unwrap();
        let v2 = Voter::new("e1", "alice@example.com").unwrap();
        let v3 = Voter::new("e2", "alice@example.com").unwrap();
        assert_eq!(v1.commitment, v2.commitment);
        assert_ne!(v1.commitment, v3.commitment);
        assert_eq!(v1.id, "e1-alice@example.com");
    }

    #[test]
    fn invalid_email_rejected() {
        assert!(Voter::new("e1", "not-an-email").is_err());
        assert!(Voter::new("e1", "   ").is_err());
    }

    #[test]
    fn token_lifecycle() {
        let mut voter = Voter::new("e1", "alice@example.com").unwrap();
        assert!(voter.is_token_expired());
        assert!(voter.invite_link(None).is_err());

        let token = voter.generate_token(DEFAULT_TOKEN_EXPIRY_HOURS);
        assert!(voter.verify_token(&token));
        assert!(!voter.verify_token("wrong"));
        assert!(!voter.is_token_expired());

        voter.mark_token_used().unwrap();
        assert!(!voter.verify_token(&token));
    }

    #[test]
    fn reissue_replaces_previous_token() {
        let mut voter = Voter::new("e1", "alice@example.com").unwrap();
        let first = voter.generate_token(72);
        let second = voter.generate_token(72);
        assert_ne!(first, second);
        assert!(!voter.verify_token(&first));
        assert!(voter.verify_token(&second));
    }

    #[test]
    fn expired_token_reported() {
        let mut voter = Voter::new("e1", "alice@example.com").unwrap();
        let token = voter.generate_token(-1);
        assert!(voter.is_token_expired());
        // Hash still matches; callers must combine the two checks.
        assert!(voter.verify_token(&token));
    }

    #[test]
    fn parse_token_extracts_voter_id() {
        let mut voter = Voter::new("e1", "alice@example.com").unwrap();
        let token = voter.generate_token(72);
        assert_eq!(Voter::parse_token(&token), Some(voter.id.as_str()));
        assert_eq!(Voter::parse_token("no-separator"), None);
    }

    #[test]
    fn invite_link_uses_base_url() {
        let mut voter = Voter::new("e1", "alice@example.com").unwrap();
        let token = voter.generate_token(72);
        let link = voter.invite_link(Some("https://polls.test/")).unwrap();
        assert_eq!(link, format!("https://polls.test/vote/{}", token));
    }
}
