//! Election orchestration: lifecycle, enrolment, vote intake, and tally.

use crate::ballot::Ballot;
use crate::elgamal::{aggregate, ElGamalKeyPair, ElGamalPublicKey};
use crate::eligibility::EligibilityTree;
use crate::voter::{Voter, DEFAULT_TOKEN_EXPIRY_HOURS};
use crate::zkp::{parse_decimal, Group};
use crate::Error;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{info, warn};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    Draft,
    Active,
    Ended,
}

/// Structured result of `submit_vote`; vote intake is a hot path expected
/// to see invalid input, so rejections are data rather than errors.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VoteOutcome {
    fn accepted() -> Self {
        VoteOutcome {
            success: true,
            error: None,
        }
    }

    fn rejected(reason: String) -> Self {
        VoteOutcome {
            success: false,
            error: Some(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ElectionStats {
    pub total_voters: usize,
    pub total_votes: usize,
    /// Percentage in `[0, 100]`; 0 when no voters are enrolled.
    pub turnout: f64,
}

/// Serialized election state: the contract with the external store.
/// Voter records and ballots live outside and are not part of it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ElectionState {
    pub id: String,
    pub title: String,
    pub status: ElectionStatus,
    /// Trustee public key, hex.
    pub public_key: String,
    /// Anonymity-group root, decimal.
    pub group_root: String,
    /// Group members in insertion order, decimal.
    pub group_members: Vec<String>,
    pub candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility_depth: Option<usize>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ElectionState {
    pub fn pack(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("veilvote: unable to serialize election state")
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A single election. Owns its keypair, anonymity group, voter registry,
/// ballots, and nullifier set; ballots are immutable once appended.
///
/// All mutations take `&mut self` and are sequentially consistent; callers
/// serialize `submit_vote` against itself per election.
pub struct Election {
    pub id: String,
    pub title: String,
    pub candidates: Vec<String>,
    keypair: ElGamalKeyPair,
    anonymity_group: Group,
    voters: IndexMap<String, Voter>,
    ballots: Vec<Ballot>,
    used_nullifiers: HashSet<String>,
    eligibility_tree: Option<EligibilityTree>,
    pub status: ElectionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Election {
    /// Create a draft election whose trustee keypair is derived from
    /// `trustee_password`.
    pub fn new(title: &str, candidates: Vec<String>, trustee_password: &str) -> Self {
        Election {
            id: Uuid::new_v4().to_string(),
            title: title.to_owned(),
            candidates,
            keypair: ElGamalKeyPair::from_password(trustee_password),
            anonymity_group: Group::new(),
            voters: IndexMap::new(),
            ballots: Vec::new(),
            used_nullifiers: HashSet::new(),
            eligibility_tree: None,
            status: ElectionStatus::Draft,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn public_key(&self) -> &ElGamalPublicKey {
        &self.keypair.public
    }

    pub fn group(&self) -> &Group {
        &self.anonymity_group
    }

    pub fn get_voter(&self, voter_id: &str) -> Option<&Voter> {
        self.voters.get(voter_id)
    }

    pub fn voters(&self) -> impl Iterator<Item = &Voter> {
        self.voters.values()
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn eligibility_tree(&self) -> Option<&EligibilityTree> {
        self.eligibility_tree.as_ref()
    }

    pub fn is_eligible(&self, email: &str) -> bool {
        self.eligibility_tree
            .as_ref()
            .map_or(false, |tree| tree.is_eligible(email))
    }

    /// Enrol voters by email. Each new voter's identity commitment joins
    /// the anonymity group. Fails without side effects on any invalid or
    /// duplicate address.
    pub fn add_voters(&mut self, emails: &[&str]) -> Result<Vec<Voter>, Error> {
        let mut new_voters = Vec::with_capacity(emails.len());
        for email in emails {
            let voter = Voter::new(&self.id, email)?;
            if self.voters.contains_key(&voter.id)
                || new_voters.iter().any(|v: &Voter| v.id == voter.id)
            {
                return Err(Error::DuplicateVoter(voter.email));
            }
            new_voters.push(voter);
        }
        for voter in &new_voters {
            self.anonymity_group
                .add_member(voter.identity(&self.id).commitment());
            self.voters.insert(voter.id.clone(), voter.clone());
        }
        Ok(new_voters)
    }

    /// Enrol a whole CSV roster and store its eligibility tree.
    pub fn upload_voters(&mut self, csv: &str) -> Result<Vec<Voter>, Error> {
        let tree = EligibilityTree::from_csv(csv)?;
        let emails: Vec<&str> = tree.emails().iter().map(|e| e.as_str()).collect();
        let new_voters = self.add_voters(&emails)?;
        self.eligibility_tree = Some(tree);
        Ok(new_voters)
    }

    /// Issue (or re-issue) a voting token for `voter_id` and return the
    /// invite link.
    pub fn generate_invite(&mut self, voter_id: &str) -> Result<String, Error> {
        let voter = self
            .voters
            .get_mut(voter_id)
            .ok_or_else(|| Error::UnknownVoter(voter_id.to_owned()))?;
        voter.generate_token(DEFAULT_TOKEN_EXPIRY_HOURS);
        voter.invite_link(None)
    }

    /// Redeem an opaque invite token: check its hash against the named
    /// voter's record, reject spent or expired tokens, and mark it used.
    /// Returns the voter id on success.
    pub fn redeem_token(&mut self, token: &str) -> Result<String, Error> {
        let voter_id =
            Voter::parse_token(token).ok_or_else(|| Error::NoToken(token.to_owned()))?;
        let voter = self
            .voters
            .get_mut(voter_id)
            .ok_or_else(|| Error::UnknownVoter(voter_id.to_owned()))?;
        if !voter.verify_token(token) || voter.is_token_expired() {
            return Err(Error::NoToken(voter.id.clone()));
        }
        voter.mark_token_used()?;
        Ok(voter.id.clone())
    }

    /// Look a stored ballot up by its receipt id.
    pub fn find_ballot(&self, receipt_id: &str) -> Option<&Ballot> {
        self.ballots
            .iter()
            .find(|ballot| ballot.receipt.receipt_id == receipt_id)
    }

    /// The nullifier index rows for the external store: one
    /// `(nullifier, election_id, timestamp)` triple per stored ballot.
    pub fn nullifier_records(&self) -> Vec<(String, String, DateTime<Utc>)> {
        self.ballots
            .iter()
            .map(|ballot| (ballot.nullifier.clone(), self.id.clone(), ballot.timestamp))
            .collect()
    }

    pub fn start(&mut self) -> Result<(), Error> {
        if self.status != ElectionStatus::Draft {
            return Err(Error::AlreadyStarted);
        }
        if self.voters.is_empty() {
            return Err(Error::NoVoters);
        }
        self.status = ElectionStatus::Active;
        self.started_at = Some(Utc::now());
        info!("election {}: started with {} voters", self.id, self.voters.len());
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), Error> {
        if self.status != ElectionStatus::Active {
            return Err(Error::ElectionNotActive);
        }
        self.status = ElectionStatus::Ended;
        self.ended_at = Some(Utc::now());
        info!(
            "election {}: ended with {} ballots",
            self.id,
            self.ballots.len()
        );
        Ok(())
    }

    /// Accept or reject a ballot.
    ///
    /// The nullifier check runs before proof verification so replays
    /// return fast; a malformed proof under a seen nullifier is therefore
    /// still rejected as a replay. Nullifier insertion is atomic with the
    /// ballot append.
    pub fn submit_vote(&mut self, ballot: Ballot) -> VoteOutcome {
        if self.status != ElectionStatus::Active {
            return self.reject(Error::ElectionNotActive.to_string());
        }
        if self.used_nullifiers.contains(&ballot.nullifier) {
            return self.reject(Error::DuplicateVote.to_string());
        }
        // The proof must speak about this election: our scope and the
        // current anonymity set.
        if ballot.proof.scope != self.id
            || ballot.proof.group_root != self.anonymity_group.root().to_str_radix(10)
        {
            return self.reject(Error::InvalidVoteProof.to_string());
        }
        if !ballot.verify() {
            return self.reject(Error::InvalidVoteProof.to_string());
        }
        if ballot.vote_vector.candidate_order != self.candidates {
            return self.reject(Error::CandidateOrderMismatch.to_string());
        }

        self.used_nullifiers.insert(ballot.nullifier.clone());
        self.ballots.push(ballot);
        VoteOutcome::accepted()
    }

    fn reject(&self, reason: String) -> VoteOutcome {
        warn!("election {}: ballot rejected: {}", self.id, reason);
        VoteOutcome::rejected(reason)
    }

    /// Aggregate every ballot position-wise and decrypt the per-candidate
    /// totals. Only valid once the election has ended; the password check
    /// is advisory (it re-derives the keypair and compares public keys).
    pub fn tally_results(&self, trustee_password: &str) -> Result<IndexMap<String, u64>, Error> {
        if self.status != ElectionStatus::Ended {
            return Err(Error::TallyBeforeEnd);
        }
        let candidate_keypair = ElGamalKeyPair::from_password(trustee_password);
        if candidate_keypair.public != self.keypair.public {
            return Err(Error::InvalidTrusteePassword);
        }

        let mut results = IndexMap::with_capacity(self.candidates.len());
        if self.ballots.is_empty() {
            for candidate in &self.candidates {
                results.insert(candidate.clone(), 0);
            }
            return Ok(results);
        }

        for (position, candidate) in self.candidates.iter().enumerate() {
            let column: Vec<_> = self
                .ballots
                .iter()
                .map(|ballot| ballot.vote_vector.encrypted_votes[position].clone())
                .collect();
            let total = self.keypair.decrypt(&aggregate(&column)?)?;
            results.insert(candidate.clone(), total);
        }
        Ok(results)
    }

    pub fn stats(&self) -> ElectionStats {
        let total_voters = self.voters.len();
        let total_votes = self.used_nullifiers.len();
        let turnout = if total_voters == 0 {
            0.0
        } else {
            100.0 * total_votes as f64 / total_voters as f64
        };
        ElectionStats {
            total_voters,
            total_votes,
            turnout,
        }
    }

    /// Snapshot the persistable state. Voter records and ballots live in
    /// the external store and are not included.
    pub fn export(&self) -> ElectionState {
        ElectionState {
            id: self.id.clone(),
            title: self.title.clone(),
            status: self.status,
            public_key: self.keypair.public.to_hex(),
            group_root: self.anonymity_group.root().to_str_radix(10),
            group_members: self.anonymity_group.member_strings(),
            candidates: self.candidates.clone(),
            eligibility_root: self.eligibility_tree.as_ref().map(|t| t.root()),
            eligibility_depth: self.eligibility_tree.as_ref().map(|t| t.depth()),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Reconstruct an election from exported state. The trustee password
    /// must re-derive the exported public key; the anonymity group is
    /// rebuilt from its members and checked against the exported root.
    pub fn import(state: ElectionState, trustee_password: &str) -> Result<Self, Error> {
        let keypair = ElGamalKeyPair::from_password(trustee_password);
        if keypair.public.to_hex() != state.public_key {
            return Err(Error::InvalidTrusteePassword);
        }

        let members = state
            .group_members
            .iter()
            .map(|m| parse_decimal(m).ok_or(Error::StateMismatch))
            .collect::<Result<Vec<_>, _>>()?;
        let anonymity_group = Group::from_members(members);
        if anonymity_group.root().to_str_radix(10) != state.group_root {
            return Err(Error::StateMismatch);
        }

        Ok(Election {
            id: state.id,
            title: state.title,
            candidates: state.candidates,
            keypair,
            anonymity_group,
            voters: IndexMap::new(),
            ballots: Vec::new(),
            used_nullifiers: HashSet::new(),
            eligibility_tree: None,
            status: state.status,
            created_at: state.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
        })
    }
}
