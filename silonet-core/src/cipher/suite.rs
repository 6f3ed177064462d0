//! Cipher suite of the additively homomorphic codec.
//!
//! See the [cipher module] documentation since this is a private module anyways.
//!
//! [cipher module]: crate::cipher

use num::{
    bigint::{BigInt, BigUint},
    rational::Ratio,
    traits::One,
};
use serde::{Deserialize, Serialize};

/// Number of fractional binary digits preserved by the fixed-point embedding.
///
/// Every finite `f64` is an integer multiple of `2^-1074`, so scaling by `2^1074` embeds the
/// values without loss and decryption recovers them exactly.
pub(super) const FRACTIONAL_BITS: u32 = 1074;

/// The parameters of the additively homomorphic codec.
///
/// A suite pins the finite group in which dataset values are embedded. The group order leaves
/// headroom for the sum of up to [`capacity`] encoded values, so that ciphertext addition never
/// wraps around.
///
/// [`capacity`]: CipherSuite::capacity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CipherSuite {
    /// Maximum number of datasets that may be folded into one ciphertext.
    pub capacity: usize,
}

impl Default for CipherSuite {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

impl CipherSuite {
    /// Gets the shift by which the values are shifted into the non-negative reals.
    pub fn add_shift(&self) -> Ratio<BigInt> {
        // safe unwrap: f64::MAX is finite
        Ratio::from_float(f64::MAX).unwrap()
    }

    /// Gets the shift by which the shifted values are scaled into the non-negative integers.
    pub fn exp_shift(&self) -> BigInt {
        BigInt::one() << FRACTIONAL_BITS
    }

    /// Gets the order of the finite group.
    pub fn order(&self) -> BigUint {
        // width of one embedded value: (x + add_shift) * exp_shift for x in [-MAX, MAX]
        let width = ((self.add_shift() * BigInt::from(2)) * self.exp_shift()).to_integer();
        // UNWRAP_SAFE: the width is non-negative
        width.to_biguint().unwrap() * self.capacity + 1_u8
    }
}

#[cfg(test)]
mod tests {
    use num::traits::Zero;

    use super::*;

    #[test]
    fn test_order_scales_with_capacity() {
        let one = CipherSuite { capacity: 1 }.order() - 1_u8;
        let four = CipherSuite { capacity: 4 }.order() - 1_u8;
        assert_eq!(four, one * 4_u8);
    }

    #[test]
    fn test_largest_embedded_value_fits() {
        let suite = CipherSuite { capacity: 1 };
        let largest = ((suite.add_shift() * BigInt::from(2)) * suite.exp_shift()).to_integer();
        assert!(largest.to_biguint().unwrap() < suite.order());
    }

    #[test]
    fn test_exp_shift_is_exact_for_subnormals() {
        // the smallest positive f64 scales to exactly one
        let value = Ratio::from_float(f64::from_bits(1)).unwrap();
        assert_eq!((value * CipherSuite::default().exp_shift()).to_integer(), BigInt::one());
        // and zero stays zero
        let value = Ratio::from_float(0_f64).unwrap();
        assert!((value * CipherSuite::default().exp_shift()).to_integer().is_zero());
    }
}
