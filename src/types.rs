//! Small newtype wrappers for domain-specific values.
//!
//! These exist to prevent mixing incompatible values (a raw `i16` QP vs. a
//! raw `i16` delta, say) and to centralize range validation at the one spot
//! values enter the system from the bitstream.

use crate::error::Av1Error;

/// Quantization parameter (base or effective), valid range `[0, 255]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qp(i16);

impl Qp {
    pub const MIN: i16 = 0;
    pub const MAX: i16 = 255;
    pub const DEFAULT: i16 = 32;

    #[inline]
    pub fn new(value: i16) -> Result<Self, Av1Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Av1Error::invalid_bitstream(
                0,
                format!("QP out of range: {value} (valid: {}-{})", Self::MIN, Self::MAX),
            ))
        }
    }

    /// # Safety
    /// Callers must ensure `value` is in `[0, 255]`.
    #[inline]
    #[must_use]
    pub const unsafe fn new_unchecked(value: i16) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> i16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        debug_assert!(self.0 <= 255);
        self.0 as u8
    }
}

impl From<Qp> for i16 {
    #[inline]
    fn from(qp: Qp) -> Self {
        qp.0
    }
}

impl From<Qp> for u8 {
    #[inline]
    fn from(qp: Qp) -> Self {
        debug_assert!(qp.0 <= 255);
        qp.0 as u8
    }
}

/// Picture order count — the decoded frame's display index.
pub type Poc = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qp_valid_and_invalid() {
        assert!(Qp::new(0).is_ok());
        assert!(Qp::new(255).is_ok());
        assert!(Qp::new(-1).is_err());
        assert!(Qp::new(256).is_err());
    }

    #[test]
    fn test_qp_accessors() {
        let qp = Qp::new(100).unwrap();
        assert_eq!(qp.value(), 100);
        assert_eq!(qp.as_u8(), 100);
        assert_eq!(u8::from(qp), 100);
    }

    #[test]
    fn test_qp_ord() {
        assert!(Qp::new(20).unwrap() < Qp::new(40).unwrap());
    }
}
