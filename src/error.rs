use thiserror::Error;

/// Error types
///
/// Protocol rejections that reach voters keep their exact user-visible
/// wording; internal failures carry a crate prefix.
#[derive(Debug, Error)]
pub enum Error {
    // Configuration
    #[error("veilvote: voter roster contains no valid email addresses")]
    EmptyRoster,

    #[error("Invalid trustee password")]
    InvalidTrusteePassword,

    #[error("veilvote: cannot start an election with no enrolled voters")]
    NoVoters,

    // Protocol
    #[error("Election is not active")]
    ElectionNotActive,

    #[error("Voter has already voted")]
    DuplicateVote,

    #[error("Invalid vote proof")]
    InvalidVoteProof,

    #[error("Invalid candidate order in vote vector")]
    CandidateOrderMismatch,

    // Crypto
    #[error("veilvote: plaintext {0} outside the encryptable range")]
    PlaintextOutOfRange(u64),

    #[error("veilvote: decryption failed - result outside the tabulated range")]
    DecryptionFailed,

    #[error("veilvote: cannot aggregate an empty ciphertext list")]
    EmptyAggregation,

    #[error("veilvote: malformed curve point encoding")]
    MalformedPoint,

    #[error("veilvote: malformed scalar encoding")]
    MalformedScalar,

    #[error("veilvote: identity commitment is not a member of the anonymity group")]
    IdentityNotInGroup,

    // Input
    #[error("veilvote: voter already enrolled: {0}")]
    DuplicateVoter(String),

    #[error("veilvote: no such voter: {0}")]
    UnknownVoter(String),

    #[error("veilvote: invalid email address: {0}")]
    InvalidEmail(String),

    #[error("veilvote: no token issued for voter {0}")]
    NoToken(String),

    #[error("veilvote: candidate not on the ballot: {0}")]
    UnknownCandidate(String),

    // State
    #[error("Cannot tally votes until election ends")]
    TallyBeforeEnd,

    #[error("veilvote: election has already started")]
    AlreadyStarted,

    #[error("veilvote: imported state does not match its reconstruction")]
    StateMismatch,

    #[error("veilvote: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("veilvote: hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}
