//! Group-membership proofs with scope-bound nullifiers.
//!
//! The proof system is a pluggable primitive behind [`ProofSystem`]: a
//! proof attests that the prover knows an identity whose commitment sits in
//! the anonymity group, that the nullifier is deterministically derived
//! from `(identity, scope)`, and that `message` and `scope` cannot be
//! altered after the fact.
//!
//! The default backend is a Chaum-Pedersen DLEQ transcript: the identity
//! commitment is `A = g*a`, the nullifier point is `N = U_scope * a` for a
//! scope-derived base point, and one shared-exponent proof links the two
//! while the Fiat-Shamir challenge binds the group root, nullifier,
//! message, and scope. Membership is shown by a Merkle path over the group.
//! This backend satisfies the contract but is not hiding - the proof
//! reveals which commitment voted. A Semaphore-style circuit can replace it
//! behind the same trait.

use crate::group::{Point, Scalar};
use crate::serde_hex::{PointHex, ScalarHex};
use crate::Error;
use hex_buffer_serde::Hex;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

const IDENTITY_DOMAIN: &str = "veilvote.identity.v1";
const SCOPE_DOMAIN: &str = "veilvote.scope.v1";
const CHALLENGE_DOMAIN: &str = "veilvote.dleq.v1";

/// A voter's proving identity, derived deterministically from a secret
/// string (here `"<email>:<election_id>"`).
#[derive(Clone, Debug)]
pub struct Identity {
    secret: Scalar,
    commitment_point: Point,
}

impl Identity {
    pub fn from_secret(secret: &str) -> Self {
        let mut material = Vec::with_capacity(IDENTITY_DOMAIN.len() + secret.len());
        material.extend_from_slice(IDENTITY_DOMAIN.as_bytes());
        material.extend_from_slice(secret.as_bytes());
        let secret = Scalar::from_hash_of(&material);
        Identity {
            secret,
            commitment_point: Point::generator() * secret,
        }
    }

    /// The public commitment, as the integer behind the canonical point
    /// encoding. This is what enters the anonymity group.
    pub fn commitment(&self) -> BigUint {
        point_to_int(&self.commitment_point)
    }

    pub fn commitment_string(&self) -> String {
        self.commitment().to_str_radix(10)
    }

    /// The nullifier this identity produces under `scope`. Reusing the
    /// identity under the same scope reproduces the same value.
    pub fn nullifier(&self, scope: &str) -> BigUint {
        point_to_int(&(nullifier_base(scope) * self.secret))
    }
}

/// The anonymity set: an ordered list of identity commitments with a
/// Merkle root over their decimal encodings.
#[derive(Clone, Debug, Default)]
pub struct Group {
    members: Vec<BigUint>,
}

impl Group {
    pub fn new() -> Self {
        Group::default()
    }

    pub fn from_members(members: Vec<BigUint>) -> Self {
        Group { members }
    }

    pub fn add_member(&mut self, commitment: BigUint) {
        self.members.push(commitment);
    }

    pub fn members(&self) -> &[BigUint] {
        &self.members
    }

    pub fn member_strings(&self) -> Vec<String> {
        self.members.iter().map(|m| m.to_str_radix(10)).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn index_of(&self, commitment: &BigUint) -> Option<usize> {
        self.members.iter().position(|m| m == commitment)
    }

    pub fn root(&self) -> BigUint {
        self.layers().pop().unwrap()[0].clone()
    }

    fn depth(&self) -> usize {
        match self.members.len() {
            0 => 1,
            n => n.next_power_of_two().trailing_zeros() as usize,
        }
    }

    fn layers(&self) -> Vec<Vec<BigUint>> {
        let mut layer = self.members.clone();
        layer.resize(1 << self.depth(), BigUint::default());

        let mut layers = vec![layer];
        while layers.last().unwrap().len() > 1 {
            let next: Vec<BigUint> = layers
                .last()
                .unwrap()
                .chunks(2)
                .map(|pair| group_node_hash(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }
        layers
    }

    fn proof_path(&self, mut idx: usize) -> (Vec<BigUint>, Vec<u8>) {
        let layers = self.layers();
        let mut elements = Vec::new();
        let mut indices = Vec::new();
        for layer in &layers[..layers.len() - 1] {
            elements.push(layer[idx ^ 1].clone());
            indices.push((idx & 1) as u8);
            idx >>= 1;
        }
        (elements, indices)
    }
}

fn group_node_hash(left: &BigUint, right: &BigUint) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update(left.to_str_radix(10).as_bytes());
    hasher.update(b":");
    hasher.update(right.to_str_radix(10).as_bytes());
    BigUint::from_bytes_be(hasher.finalize().as_slice())
}

/// Membership + nullifier proof, self-contained on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MembershipProof {
    pub scope: String,
    /// Message bound into the challenge, decimal.
    pub message: String,
    /// Deterministic `(identity, scope)` nullifier, decimal.
    pub nullifier: String,
    /// Group root the membership path authenticates against, decimal.
    pub group_root: String,
    /// The prover's commitment, decimal.
    pub commitment: String,
    pub path_elements: Vec<String>,
    pub path_indices: Vec<u8>,
    #[serde(with = "PointHex")]
    pub r1: Point,
    #[serde(with = "PointHex")]
    pub r2: Point,
    #[serde(with = "ScalarHex")]
    pub z: Scalar,
}

/// The pluggable proof primitive.
pub trait ProofSystem {
    fn generate_proof(
        &self,
        identity: &Identity,
        group: &Group,
        message: &BigUint,
        scope: &str,
    ) -> Result<MembershipProof, Error>;

    fn verify_proof(&self, proof: &MembershipProof) -> bool;
}

/// Default Chaum-Pedersen DLEQ backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct DleqProofSystem;

impl ProofSystem for DleqProofSystem {
    fn generate_proof(
        &self,
        identity: &Identity,
        group: &Group,
        message: &BigUint,
        scope: &str,
    ) -> Result<MembershipProof, Error> {
        let commitment = identity.commitment();
        let idx = group
            .index_of(&commitment)
            .ok_or(Error::IdentityNotInGroup)?;
        let (path_elements, path_indices) = group.proof_path(idx);
        let root = group.root();

        let base = nullifier_base(scope);
        let nullifier_point = base * identity.secret;
        let nullifier = point_to_int(&nullifier_point);

        let k = Scalar::random();
        let r1 = Point::generator() * k;
        let r2 = base * k;
        let c = challenge(
            &identity.commitment_point,
            &nullifier_point,
            &r1,
            &r2,
            &root,
            &nullifier,
            message,
            scope,
        );
        let z = k + c * identity.secret;

        Ok(MembershipProof {
            scope: scope.to_owned(),
            message: message.to_str_radix(10),
            nullifier: nullifier.to_str_radix(10),
            group_root: root.to_str_radix(10),
            commitment: commitment.to_str_radix(10),
            path_elements: path_elements.iter().map(|e| e.to_str_radix(10)).collect(),
            path_indices,
            r1,
            r2,
            z,
        })
    }

    fn verify_proof(&self, proof: &MembershipProof) -> bool {
        let commitment = match parse_decimal(&proof.commitment) {
            Some(v) => v,
            None => return false,
        };
        let a_point = match int_to_point(&commitment) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let nullifier = match parse_decimal(&proof.nullifier) {
            Some(v) => v,
            None => return false,
        };
        let nullifier_point = match int_to_point(&nullifier) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let root = match parse_decimal(&proof.group_root) {
            Some(v) => v,
            None => return false,
        };
        let message = match parse_decimal(&proof.message) {
            Some(v) => v,
            None => return false,
        };

        // DLEQ: one exponent links the commitment and the nullifier point,
        // with the challenge binding root, nullifier, message, and scope.
        let base = nullifier_base(&proof.scope);
        let c = challenge(
            &a_point,
            &nullifier_point,
            &proof.r1,
            &proof.r2,
            &root,
            &nullifier,
            &message,
            &proof.scope,
        );
        if Point::generator() * proof.z != proof.r1 + a_point * c {
            return false;
        }
        if base * proof.z != proof.r2 + nullifier_point * c {
            return false;
        }

        // Membership: walk the authentication path up to the group root.
        if proof.path_elements.len() != proof.path_indices.len() {
            return false;
        }
        let mut acc = commitment;
        for (sibling, side) in proof.path_elements.iter().zip(&proof.path_indices) {
            let sibling = match parse_decimal(sibling) {
                Some(v) => v,
                None => return false,
            };
            acc = match side {
                0 => group_node_hash(&acc, &sibling),
                1 => group_node_hash(&sibling, &acc),
                _ => return false,
            };
        }
        acc == root
    }
}

fn nullifier_base(scope: &str) -> Point {
    Point::hash_to_point(SCOPE_DOMAIN, scope.as_bytes())
}

#[allow(clippy::too_many_arguments)]
fn challenge(
    a_point: &Point,
    nullifier_point: &Point,
    r1: &Point,
    r2: &Point,
    root: &BigUint,
    nullifier: &BigUint,
    message: &BigUint,
    scope: &str,
) -> Scalar {
    let mut transcript = Vec::new();
    transcript.extend_from_slice(CHALLENGE_DOMAIN.as_bytes());
    for part in &[
        a_point.to_bytes().to_vec(),
        nullifier_point.to_bytes().to_vec(),
        r1.to_bytes().to_vec(),
        r2.to_bytes().to_vec(),
        root.to_str_radix(10).into_bytes(),
        nullifier.to_str_radix(10).into_bytes(),
        message.to_str_radix(10).into_bytes(),
        scope.as_bytes().to_vec(),
    ] {
        transcript.extend_from_slice(&(part.len() as u64).to_le_bytes());
        transcript.extend_from_slice(part);
    }
    Scalar::from_hash_of(&transcript)
}

pub(crate) fn point_to_int(point: &Point) -> BigUint {
    BigUint::from_bytes_be(&point.to_bytes())
}

pub(crate) fn int_to_point(value: &BigUint) -> Result<Point, Error> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(Error::MalformedPoint);
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    Point::from_bytes(&padded)
}

pub(crate) fn parse_decimal(s: &str) -> Option<BigUint> {
    if s.is_empty() {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_group(identities: &[&Identity]) -> Group {
        let mut group = Group::new();
        for identity in identities {
            group.add_member(identity.commitment());
        }
        group
    }

    #[test]
    fn identity_derivation_is_deterministic() {
        let a = Identity::from_secret("alice@example.com:election-1");
        let b = Identity::from_secret("alice@example.com:election-1");
        let c = Identity::from_secret("alice@example.com:election-2");
        assert_eq!(a.commitment(), b.commitment());
        assert_ne!(a.commitment(), c.commitment());
    }

    #[test]
    fn proof_round_trip() {
        let alice = Identity::from_secret("alice@example.com:e1");
        let bob = Identity::from_secret("bob@example.com:e1");
        let group = test_group(&[&alice, &bob]);

        let system = DleqProofSystem;
        let message = BigUint::from(42u32);
        let proof = system.generate_proof(&alice, &group, &message, "e1").unwrap();
        assert!(system.verify_proof(&proof));
        assert_eq!(proof.nullifier, alice.nullifier("e1").to_str_radix(10));
    }

    #[test]
    fn non_member_cannot_prove() {
        let alice = Identity::from_secret("alice@example.com:e1");
        let mallory = Identity::from_secret("mallory@example.com:e1");
        let group = test_group(&[&alice]);

        let result =
            DleqProofSystem.generate_proof(&mallory, &group, &BigUint::from(1u32), "e1");
        assert!(result.is_err());
    }

    #[test]
    fn nullifier_is_scope_bound() {
        let alice = Identity::from_secret("alice@example.com:e1");
        let group = test_group(&[&alice]);
        let system = DleqProofSystem;

        let p1 = system
            .generate_proof(&alice, &group, &BigUint::from(1u32), "e1")
            .unwrap();
        let p2 = system
            .generate_proof(&alice, &group, &BigUint::from(2u32), "e1")
            .unwrap();
        let p3 = system
            .generate_proof(&alice, &group, &BigUint::from(1u32), "e2")
            .unwrap();
        assert_eq!(p1.nullifier, p2.nullifier);
        assert_ne!(p1.nullifier, p3.nullifier);
    }

    #[test]
    fn tampered_proofs_fail() {
        let alice = Identity::from_secret("alice@example.com:e1");
        let bob = Identity::from_secret("bob@example.com:e1");
        let group = test_group(&[&alice, &bob]);
        let system = DleqProofSystem;
        let proof = system
            .generate_proof(&alice, &group, &BigUint::from(7u32), "e1")
            .unwrap();

        let mut tampered = proof.clone();
        tampered.message = "8".to_owned();
        assert!(!system.verify_proof(&tampered));

        let mut tampered = proof.clone();
        tampered.scope = "e2".to_owned();
        assert!(!system.verify_proof(&tampered));

        let mut tampered = proof.clone();
        tampered.nullifier = bob.nullifier("e1").to_str_radix(10);
        assert!(!system.verify_proof(&tampered));

        let mut tampered = proof.clone();
        tampered.group_root = "123456789".to_owned();
        assert!(!system.verify_proof(&tampered));
    }

    #[test]
    fn proof_survives_serialization() {
        let alice = Identity::from_secret("alice@example.com:e1");
        let group = test_group(&[&alice]);
        let proof = DleqProofSystem
            .generate_proof(&alice, &group, &BigUint::from(3u32), "e1")
            .unwrap();

        let json = serde_json::to_string(&proof).unwrap();
        let parsed: MembershipProof = serde_json::from_str(&json).unwrap();
        assert_eq!(proof, parsed);
        assert!(DleqProofSystem.verify_proof(&parsed));
    }

    #[test]
    fn group_root_tracks_membership() {
        let alice = Identity::from_secret("alice@example.com:e1");
        let bob = Identity::from_secret("bob@example.com:e1");
        let mut group = test_group(&[&alice]);
        let root_one = group.root();
        group.add_member(bob.commitment());
        assert_ne!(group.root(), root_one);

        let rebuilt = Group::from_members(group.members().to_vec());
        assert_eq!(rebuilt.root(), group.root());
    }
}
