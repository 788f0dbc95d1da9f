//! Thin wrappers around the ristretto255 group.
//!
//! All points travel as lowercase hex of the 32-byte canonical compressed
//! encoding. The identity element has its own canonical encoding (32 zero
//! bytes), which the discrete-log table relies on.

use crate::Error;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar as RawScalar;
use curve25519_dalek::traits::Identity;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use std::ops::{Add, Mul, Neg, Sub};

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Point(pub(crate) RistrettoPoint);

impl Point {
    pub fn generator() -> Self {
        Point(RISTRETTO_BASEPOINT_POINT)
    }

    pub fn identity() -> Self {
        Point(RistrettoPoint::identity())
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 32 {
            return Err(Error::MalformedPoint);
        }
        CompressedRistretto::from_slice(bytes)
            .decompress()
            .map(Point)
            .ok_or(Error::MalformedPoint)
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s)?;
        Point::from_bytes(&bytes)
    }

    /// Hash arbitrary bytes onto the curve, domain-separated.
    ///
    /// Used to derive the per-scope nullifier base.
    pub fn hash_to_point(domain: &str, data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(domain.as_bytes());
        hasher.update(data);
        let mut wide = [0u8; 64];
        wide.copy_from_slice(hasher.finalize().as_slice());
        Point(RistrettoPoint::from_uniform_bytes(&wide))
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Scalar(pub(crate) RawScalar);

impl Scalar {
    pub fn zero() -> Self {
        Scalar(RawScalar::zero())
    }

    pub fn one() -> Self {
        Scalar(RawScalar::one())
    }

    pub fn random() -> Self {
        let mut wide = [0u8; 64];
        OsRng.fill_bytes(&mut wide);
        Scalar(RawScalar::from_bytes_mod_order_wide(&wide))
    }

    /// Deterministic scalar from a SHA-512 digest of `data`.
    pub fn from_hash_of(data: &[u8]) -> Self {
        let mut wide = [0u8; 64];
        wide.copy_from_slice(Sha512::digest(data).as_slice());
        Scalar(RawScalar::from_bytes_mod_order_wide(&wide))
    }

    pub fn from_bytes_mod_order(bytes: [u8; 32]) -> Self {
        Scalar(RawScalar::from_bytes_mod_order(bytes))
    }

    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Result<Self, Error> {
        RawScalar::from_canonical_bytes(bytes)
            .map(Scalar)
            .ok_or(Error::MalformedScalar)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar(RawScalar::from(v))
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point(self.0 + rhs.0)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point(self.0 - rhs.0)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point(-self.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;
    fn mul(self, rhs: Scalar) -> Point {
        Point(self.0 * rhs.0)
    }
}

impl Mul<Point> for Scalar {
    type Output = Point;
    fn mul(self, rhs: Point) -> Point {
        Point(self.0 * rhs.0)
    }
}

impl Add for Scalar {
    type Output = Scalar;
    fn add(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 + rhs.0)
    }
}

impl Sub for Scalar {
    type Output = Scalar;
    fn sub(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 - rhs.0)
    }
}

impl Mul for Scalar {
    type Output = Scalar;
    fn mul(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 * rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let p = Point::generator() * Scalar::random();
        let decoded = Point::from_hex(&p.to_hex()).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn identity_encoding_is_distinct() {
        let id = Point::identity();
        assert_eq!(id.to_hex(), "0".repeat(64));
        assert_ne!(id.to_hex(), Point::generator().to_hex());
    }

    #[test]
    fn malformed_point_rejected() {
        assert!(Point::from_hex("ff".repeat(32).as_str()).is_err());
        assert!(Point::from_bytes(&[1u8; 31]).is_err());
    }

    #[test]
    fn hash_to_scalar_deterministic() {
        let a = Scalar::from_hash_of(b"alice@example.com:election-1");
        let b = Scalar::from_hash_of(b"alice@example.com:election-1");
        let c = Scalar::from_hash_of(b"alice@example.com:election-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_to_point_domain_separated() {
        let u1 = Point::hash_to_point("scope", b"election-1");
        let u2 = Point::hash_to_point("scope", b"election-2");
        assert_ne!(u1, u2);
    }
}
