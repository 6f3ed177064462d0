//! Seed expansion for the cipher primitives.
//!
//! Cipher masks and aggregation shares are expanded from 32-byte seeds with
//! these utilities.

use num::{bigint::BigUint, traits::identities::Zero};
use rand::RngCore;
use rand_chacha::ChaCha20Rng;

/// Draws a uniform pseudo-random integer from `[0, max_int)`.
///
/// Rejection sampling over `ChaCha20` output keeps the draw unbiased. A zero
/// `max_int` yields zero.
pub fn generate_integer(prng: &mut ChaCha20Rng, max_int: &BigUint) -> BigUint {
    if max_int.is_zero() {
        return BigUint::zero();
    }
    let mut bytes = max_int.to_bytes_le();
    let mut rand_int = max_int.clone();
    while &rand_int >= max_int {
        prng.fill_bytes(&mut bytes);
        rand_int = BigUint::from_bytes_le(&bytes);
    }
    rand_int
}

#[cfg(test)]
mod tests {
    use num::traits::pow::Pow;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_generate_integer_is_deterministic() {
        let mut fst = ChaCha20Rng::from_seed([17_u8; 32]);
        let mut snd = ChaCha20Rng::from_seed([17_u8; 32]);
        let max_int = BigUint::from(u128::max_value()).pow(2_usize);
        for _ in 0..5 {
            assert_eq!(
                generate_integer(&mut fst, &max_int),
                generate_integer(&mut snd, &max_int),
            );
        }
    }

    #[test]
    fn test_generate_integer_is_bounded() {
        let mut prng = ChaCha20Rng::from_seed([0_u8; 32]);
        let max_int = BigUint::from(1_000_u32);
        for _ in 0..100 {
            assert!(generate_integer(&mut prng, &max_int) < max_int);
        }
    }

    #[test]
    fn test_generate_integer_zero_bound() {
        let mut prng = ChaCha20Rng::from_seed([0_u8; 32]);
        assert_eq!(
            generate_integer(&mut prng, &BigUint::zero()),
            BigUint::zero()
        );
    }
}
