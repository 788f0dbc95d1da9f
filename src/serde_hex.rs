use crate::group::{Point, Scalar};
use crate::Error;
use std::borrow::Cow;
use std::convert::TryInto;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum PointHex {}

impl Hex<Point> for PointHex {
    type Error = Error;

    fn create_bytes(point: &Point) -> Cow<[u8]> {
        point.to_bytes().to_vec().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Point, Error> {
        Point::from_bytes(bytes)
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum ScalarHex {}

impl Hex<Scalar> for ScalarHex {
    type Error = Error;

    fn create_bytes(scalar: &Scalar) -> Cow<[u8]> {
        scalar.to_bytes().to_vec().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Scalar, Error> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| Error::MalformedScalar)?;
        Scalar::from_canonical_bytes(bytes)
    }
}
