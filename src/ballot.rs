//! Anonymous ballots.
//!
//! A ballot encodes the chosen candidate as a one-hot vector of ElGamal
//! ciphertexts, binds the vector into a membership proof whose nullifier
//! prevents double voting, and carries a tamper-evident receipt.
//!
//! The server does not prove the vector is actually one-hot; a dishonest
//! client can encrypt out-of-range counts. Slot-level range proofs belong
//! in the proof-system seam.

use crate::elgamal::{ElGamalCiphertext, ElGamalPublicKey};
use crate::zkp::{parse_decimal, DleqProofSystem, Group, Identity, MembershipProof, ProofSystem};
use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// One ciphertext per candidate, in the election's candidate order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoteVector {
    pub encrypted_votes: Vec<ElGamalCiphertext>,
    pub candidate_order: Vec<String>,
}

impl VoteVector {
    /// Encrypt a one-hot selection: 1 at the chosen candidate's position,
    /// 0 everywhere else, fresh randomness per position.
    pub fn new(
        selected: &str,
        candidate_order: &[String],
        public_key: &ElGamalPublicKey,
    ) -> Result<Self, Error> {
        if !candidate_order.iter().any(|id| id.as_str() == selected) {
            return Err(Error::UnknownCandidate(selected.to_owned()));
        }
        let encrypted_votes = candidate_order
            .iter()
            .map(|id| public_key.encrypt(u64::from(id.as_str() == selected)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VoteVector {
            encrypted_votes,
            candidate_order: candidate_order.to_vec(),
        })
    }

    /// The canonical JSON form the vote-vector hash commits to: fixed key
    /// order, no whitespace, minimal string escaping.
    ///
    /// `{"encrypted_votes":[{"c1":"<hex>","c2":"<hex>"},...],"candidate_order":[...]}`
    pub fn canonical_json(&self) -> String {
        let mut out = String::from("{\"encrypted_votes\":[");
        for (i, ct) in self.encrypted_votes.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&format!(
                "{{\"c1\":\"{}\",\"c2\":\"{}\"}}",
                ct.c1.to_hex(),
                ct.c2.to_hex()
            ));
        }
        out.push_str("],\"candidate_order\":[");
        for (i, id) in self.candidate_order.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&serde_json::to_string(id).expect("veilvote: unable to serialize candidate id"));
        }
        out.push_str("]}");
        out
    }

    /// Reduce the canonical JSON into the proof message field: byte-wise
    /// Horner evaluation `acc = acc*256 + byte (mod 2^253)`.
    pub fn hash(&self) -> BigUint {
        horner_field_hash(self.canonical_json().as_bytes())
    }
}

fn horner_field_hash(bytes: &[u8]) -> BigUint {
    let modulus = BigUint::from(1u8) << 253usize;
    let mut acc = BigUint::default();
    for byte in bytes {
        acc = ((acc << 8usize) + BigUint::from(*byte)) % &modulus;
    }
    acc
}

/// Proof of acceptance handed back to the voter.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Receipt {
    /// Hex SHA-256 over `"<election_id>:<hash>:<nullifier>:<timestamp>"`.
    pub receipt_id: String,
    pub election_id: String,
    /// Vote-vector hash, decimal.
    pub vote_vector_hash: String,
    pub nullifier: String,
    pub timestamp: DateTime<Utc>,
}

impl Receipt {
    pub fn new(
        election_id: &str,
        vote_vector_hash: &BigUint,
        nullifier: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let vote_vector_hash = vote_vector_hash.to_str_radix(10);
        Receipt {
            receipt_id: Self::compute_id(election_id, &vote_vector_hash, nullifier, timestamp),
            election_id: election_id.to_owned(),
            vote_vector_hash,
            nullifier: nullifier.to_owned(),
            timestamp,
        }
    }

    fn compute_id(
        election_id: &str,
        vote_vector_hash: &str,
        nullifier: &str,
        timestamp: DateTime<Utc>,
    ) -> String {
        let preimage = format!(
            "{}:{}:{}:{}",
            election_id,
            vote_vector_hash,
            nullifier,
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }

    /// Recompute the receipt id from the fields.
    pub fn verify(&self) -> bool {
        self.receipt_id
            == Self::compute_id(
                &self.election_id,
                &self.vote_vector_hash,
                &self.nullifier,
                self.timestamp,
            )
    }
}

/// An immutable cast ballot.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Ballot {
    pub vote_vector: VoteVector,
    pub proof: MembershipProof,
    /// Copy of the proof's nullifier, decimal.
    pub nullifier: String,
    pub receipt: Receipt,
    pub timestamp: DateTime<Utc>,
}

impl Ballot {
    /// Cast with the default proof backend.
    pub fn cast(
        identity: &Identity,
        group: &Group,
        selected: &str,
        candidate_order: &[String],
        public_key: &ElGamalPublicKey,
        election_id: &str,
    ) -> Result<Self, Error> {
        Self::cast_with(
            &DleqProofSystem,
            identity,
            group,
            selected,
            candidate_order,
            public_key,
            election_id,
        )
    }

    /// Cast with an explicit proof backend. The election id doubles as the
    /// proof scope, which is what makes the nullifier election-local.
    pub fn cast_with<P: ProofSystem>(
        system: &P,
        identity: &Identity,
        group: &Group,
        selected: &str,
        candidate_order: &[String],
        public_key: &ElGamalPublicKey,
        election_id: &str,
    ) -> Result<Self, Error> {
        let vote_vector = VoteVector::new(selected, candidate_order, public_key)?;
        let message = vote_vector.hash();
        let proof = system.generate_proof(identity, group, &message, election_id)?;
        let nullifier = proof.nullifier.clone();
        let timestamp = Utc::now();
        let receipt = Receipt::new(election_id, &message, &nullifier, timestamp);
        Ok(Ballot {
            vote_vector,
            proof,
            nullifier,
            receipt,
            timestamp,
        })
    }

    /// Cryptographic verification with the default backend. Policy checks
    /// (nullifier novelty, candidate order, election status) belong to the
    /// election.
    pub fn verify(&self) -> bool {
        self.verify_with(&DleqProofSystem)
    }

    pub fn verify_with<P: ProofSystem>(&self, system: &P) -> bool {
        // The proof binds its message; the message must be the hash of the
        // vote vector actually shipped with this ballot.
        match parse_decimal(&self.proof.message) {
            Some(message) if message == self.vote_vector.hash() => {}
            _ => return false,
        }
        if self.proof.nullifier != self.nullifier {
            return false;
        }
        system.verify_proof(&self.proof)
    }
}
