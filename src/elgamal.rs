//! Exponential ElGamal over ristretto255.
//!
//! Plaintexts are small unsigned integers encoded in the exponent
//! (`m -> g^m`, with `0` encoded as the identity element), so ciphertexts
//! add homomorphically: `E(a) + E(b)` decrypts to `a + b`. Decryption
//! inverts the exponent through a precomputed discrete-log table covering
//! `[0, MAX_VOTES]`, which is enough for per-candidate totals.

use crate::group::{Point, Scalar};
use crate::serde_hex::PointHex;
use crate::Error;
use hex_buffer_serde::Hex;
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Upper bound on any decryptable plaintext.
///
/// Covers every per-candidate total for electorates up to this size.
pub const MAX_VOTES: u64 = 10_000;

lazy_static! {
    /// Canonical point encoding -> exponent, filled once on first decrypt
    /// and read-only afterwards. The identity encoding maps to 0.
    static ref DLOG_TABLE: HashMap<String, u64> = {
        let g = Point::generator();
        let mut table = HashMap::with_capacity(MAX_VOTES as usize + 1);
        let mut acc = Point::identity();
        for i in 0..=MAX_VOTES {
            table.insert(acc.to_hex(), i);
            acc = acc + g;
        }
        table
    };
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ElGamalPublicKey {
    #[serde(with = "PointHex")]
    pub h: Point,
}

impl ElGamalPublicKey {
    /// Encrypt a vote count under this key with fresh randomness.
    ///
    /// Zero is encoded as the identity element, whose canonical encoding
    /// the discrete-log table keys on.
    pub fn encrypt(&self, m: u64) -> Result<ElGamalCiphertext, Error> {
        self.encrypt_with_r(m, Scalar::random())
    }

    /// Encrypt with caller-supplied randomness. Useful for deterministic
    /// test vectors; production callers use [`ElGamalPublicKey::encrypt`].
    pub fn encrypt_with_r(&self, m: u64, r: Scalar) -> Result<ElGamalCiphertext, Error> {
        if m > MAX_VOTES {
            return Err(Error::PlaintextOutOfRange(m));
        }
        let c1 = Point::generator() * r;
        let c2 = self.h * r + encode(m);
        Ok(ElGamalCiphertext { c1, c2 })
    }

    pub fn to_hex(&self) -> String {
        self.h.to_hex()
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        Ok(ElGamalPublicKey {
            h: Point::from_hex(s)?,
        })
    }
}

#[derive(Clone)]
pub struct ElGamalKeyPair {
    x: Scalar,
    pub public: ElGamalPublicKey,
}

impl std::fmt::Debug for ElGamalKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The private scalar stays out of logs.
        f.debug_struct("ElGamalKeyPair")
            .field("x", &"<redacted>")
            .field("public", &self.public)
            .finish()
    }
}

impl ElGamalKeyPair {
    /// Derive a keypair deterministically from a trustee password.
    ///
    /// `x = SHA-256(password)` reduced into the scalar field; the same
    /// password always yields the same keypair.
    pub fn from_password(password: &str) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(Sha256::digest(password.as_bytes()).as_slice());
        let x = Scalar::from_bytes_mod_order(digest);
        let public = ElGamalPublicKey {
            h: Point::generator() * x,
        };
        ElGamalKeyPair { x, public }
    }

    /// Recover the plaintext exponent of `ct`.
    ///
    /// A lookup miss means a corrupt ciphertext, the wrong key, or a sum
    /// past `MAX_VOTES`; all three are hard errors, never a silent zero.
    pub fn decrypt(&self, ct: &ElGamalCiphertext) -> Result<u64, Error> {
        let m_point = ct.c2 - ct.c1 * self.x;
        DLOG_TABLE
            .get(&m_point.to_hex())
            .copied()
            .ok_or(Error::DecryptionFailed)
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ElGamalCiphertext {
    #[serde(with = "PointHex")]
    pub c1: Point,
    #[serde(with = "PointHex")]
    pub c2: Point,
}

impl ElGamalCiphertext {
    /// Componentwise addition; the plaintexts add under the same key.
    pub fn add(&self, other: &ElGamalCiphertext) -> ElGamalCiphertext {
        ElGamalCiphertext {
            c1: self.c1 + other.c1,
            c2: self.c2 + other.c2,
        }
    }
}

/// Left fold of [`ElGamalCiphertext::add`] over a non-empty slice.
pub fn aggregate(ciphertexts: &[ElGamalCiphertext]) -> Result<ElGamalCiphertext, Error> {
    let (first, rest) = ciphertexts.split_first().ok_or(Error::EmptyAggregation)?;
    Ok(rest.iter().fold(first.clone(), |acc, ct| acc.add(ct)))
}

fn encode(m: u64) -> Point {
    if m == 0 {
        Point::identity()
    } else {
        Point::generator() * Scalar::from(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        for m in &[0u64, 1, 2, 41, 9_999, MAX_VOTES] {
            let ct = keypair.public.encrypt(*m).unwrap();
            assert_eq!(keypair.decrypt(&ct).unwrap(), *m);
        }
    }

    #[test]
    fn plaintext_range_enforced() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        assert!(keypair.public.encrypt(MAX_VOTES + 1).is_err());
    }

    #[test]
    fn encryption_is_randomised() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let a = keypair.public.encrypt(1).unwrap();
        let b = keypair.public.encrypt(1).unwrap();
        assert_ne!(a.c1, b.c1);
        assert_ne!(a.c2, b.c2);
        assert_eq!(keypair.decrypt(&a).unwrap(), keypair.decrypt(&b).unwrap());
    }

    #[test]
    fn homomorphic_addition() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let sum = keypair
            .public
            .encrypt(3)
            .unwrap()
            .add(&keypair.public.encrypt(4).unwrap());
        assert_eq!(keypair.decrypt(&sum).unwrap(), 7);
    }

    #[test]
    fn aggregate_folds_left() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let cts: Vec<_> = (0..5u64)
            .map(|m| keypair.public.encrypt(m).unwrap())
            .collect();
        let agg = aggregate(&cts).unwrap();
        assert_eq!(keypair.decrypt(&agg).unwrap(), 0 + 1 + 2 + 3 + 4);
    }

    #[test]
    fn aggregate_rejects_empty_input() {
        assert!(aggregate(&[]).is_err());
    }

    #[test]
    fn fixed_randomness_is_reproducible() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let r = Scalar::from_hash_of(b"fixed");
        let a = keypair.public.encrypt_with_r(6, r).unwrap();
        let b = keypair.public.encrypt_with_r(6, r).unwrap();
        assert_eq!(a, b);
        assert_eq!(keypair.decrypt(&a).unwrap(), 6);
    }

    #[test]
    fn debug_redacts_private_key() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let rendered = format!("{:?}", keypair);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode(keypair.x.to_bytes())));
    }

    #[test]
    fn password_determinism() {
        let a = ElGamalKeyPair::from_password("correct horse");
        let b = ElGamalKeyPair::from_password("correct horse");
        let c = ElGamalKeyPair::from_password("battery staple");
        assert_eq!(a.public, b.public);
        assert_ne!(a.public, c.public);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let keypair = ElGamalKeyPair::from_password("right");
        let wrong = ElGamalKeyPair::from_password("wrong");
        let ct = keypair.public.encrypt(5).unwrap();
        assert!(wrong.decrypt(&ct).is_err());
    }

    #[test]
    fn over_range_sum_is_a_hard_error() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let big = keypair.public.encrypt(MAX_VOTES).unwrap();
        let overflow = big.add(&keypair.public.encrypt(1).unwrap());
        assert!(keypair.decrypt(&overflow).is_err());
    }

    #[test]
    fn ciphertext_hex_wire_format() {
        let keypair = ElGamalKeyPair::from_password("hunter2");
        let ct = keypair.public.encrypt(2).unwrap();
        let json = serde_json::to_string(&ct).unwrap();
        let parsed: ElGamalCiphertext = serde_json::from_str(&json).unwrap();
        assert_eq!(ct, parsed);
        assert!(json.contains(&ct.c1.to_hex()));
    }
}
