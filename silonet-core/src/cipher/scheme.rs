//! Encryption and decryption of datasets.
//!
//! See the [cipher module] documentation since this is a private module anyways.
//!
//! [cipher module]: crate::cipher

use num::{
    bigint::{BigInt, BigUint, Sign, ToBigInt},
    clamp,
    rational::Ratio,
    traits::{identities::Zero, One, ToPrimitive},
};
use thiserror::Error;

use crate::{
    cipher::{
        object::{CipherContext, Ciphertext},
        seed::CipherSeed,
        suite::{CipherSuite, FRACTIONAL_BITS},
    },
    crypto::{seal::UnsealError, ByteObject, SealingKeyPair},
    dataset::Dataset,
    CoordinatorPublicKey,
    PartyId,
};

#[derive(Debug, Error)]
/// Errors related to the decryption of a ciphertext.
pub enum DecodeError {
    /// The word buffer length contradicts the declared shape.
    #[error("the ciphertext holds {len} words but its context declares a ({rows}, {cols}) shape")]
    Length {
        /// Number of words in the buffer.
        len: usize,
        /// Declared number of rows.
        rows: usize,
        /// Declared number of columns.
        cols: usize,
    },

    /// The seed count contradicts the declared number of datasets.
    #[error("the ciphertext carries {seeds} seeds but its context declares {nb_datasets} datasets")]
    SeedCount {
        /// Number of sealed seeds.
        seeds: usize,
        /// Declared number of folded datasets.
        nb_datasets: usize,
    },

    /// The ciphertext does not contain any dataset.
    #[error("the ciphertext does not contain any dataset")]
    Empty,

    /// More datasets were folded than the suite allows.
    #[error("the ciphertext declares more datasets than the cipher suite capacity")]
    Capacity,

    /// A word lies outside the finite group.
    #[error("a word of the ciphertext lies outside the finite group")]
    Word,

    /// A sealed cipher seed could not be opened.
    #[error("a cipher seed could not be unsealed")]
    Seed(#[from] UnsealError),
}

/// An encryptor for datasets.
pub struct Encryptor {
    suite: CipherSuite,
    seed: CipherSeed,
}

impl Encryptor {
    /// Creates a new encryptor for the given cipher suite with a randomly generated seed.
    pub fn new(suite: CipherSuite) -> Self {
        Self {
            suite,
            seed: CipherSeed::generate(),
        }
    }

    /// Creates a new encryptor for the given cipher suite and seed.
    pub fn with_seed(suite: CipherSuite, seed: CipherSeed) -> Self {
        Self { suite, seed }
    }

    /// Encrypts the given dataset for the given party.
    ///
    /// The encryption proceeds in the following steps:
    /// - Bound the values (callers are expected to validate datasets first; a NaN is bounded to
    ///   zero and an infinity to the nearest finite value).
    /// - Shift the values into the non-negative reals.
    /// - Shift the values into the non-negative integers.
    /// - Mask the values with random elements from the finite group.
    ///
    /// The mask is expanded from the encryptor's seed and the seed is sealed to the given
    /// coordinator key, so only that coordinator can undo the masking. Decryption as performed in
    /// [`decrypt()`] proceeds in reverse order.
    ///
    /// [`decrypt()`]: decrypt
    pub fn encrypt(
        self,
        dataset: &Dataset,
        party: PartyId,
        pk: &CoordinatorPublicKey,
    ) -> Ciphertext {
        let Self { suite, seed } = self;
        let add_shift = suite.add_shift();
        let exp_shift = suite.exp_shift();
        let order = suite.order();

        let mask = seed.derive_mask(dataset.as_slice().len(), suite);
        let words = dataset
            .as_slice()
            .iter()
            .zip(mask)
            .map(|(value, mask_int)| {
                let bounded = bounded_ratio(*value);
                // PANIC_SAFE: the shifted value is guaranteed to be non-negative
                let shifted = ((bounded + &add_shift) * &exp_shift)
                    .to_integer()
                    .to_biguint()
                    .unwrap();
                (shifted + mask_int) % &order
            })
            .collect();

        let (rows, cols) = dataset.shape();
        let context = CipherContext {
            party,
            rows,
            cols,
            nb_datasets: 1,
            suite,
        };
        Ciphertext::new(context, words, vec![seed.seal(pk)])
    }
}

/// Decrypts the given ciphertext with the coordinator key pair it was sealed to.
///
/// Works for fresh ciphertexts as well as for sums of ciphertexts: the context's dataset count
/// determines the shift correction, and one mask per folded dataset is unsealed and removed.
///
/// The decrypted values of a sum are the exact element-wise sums of the folded datasets, rounded
/// once to the nearest `f64`. A sum that exceeds the finite range decrypts to an infinity, which
/// downstream validation rejects.
///
/// # Errors
/// Fails with a [`DecodeError`] if the words or seeds contradict the declared context, or if a
/// seed cannot be unsealed.
pub fn decrypt(ciphertext: &Ciphertext, keys: &SealingKeyPair) -> Result<Dataset, DecodeError> {
    let context = &ciphertext.context;
    let len = ciphertext.words.len();
    if len != context.word_count() {
        return Err(DecodeError::Length {
            len,
            rows: context.rows,
            cols: context.cols,
        });
    }
    if ciphertext.seeds.len() != context.nb_datasets {
        return Err(DecodeError::SeedCount {
            seeds: ciphertext.seeds.len(),
            nb_datasets: context.nb_datasets,
        });
    }
    if context.nb_datasets == 0 {
        return Err(DecodeError::Empty);
    }
    if context.nb_datasets > context.suite.capacity {
        return Err(DecodeError::Capacity);
    }
    let order = context.suite.order();
    if ciphertext.words.iter().any(|word| word >= &order) {
        return Err(DecodeError::Word);
    }

    let mut mask = vec![BigUint::zero(); len];
    for sealed in &ciphertext.seeds {
        let seed = sealed.unseal(&keys.public, &keys.secret)?;
        for (total, mask_int) in mask.iter_mut().zip(seed.derive_mask(len, context.suite)) {
            *total = (&*total + mask_int) % &order;
        }
    }

    let scaled_add_shift = context.suite.add_shift() * BigInt::from(context.nb_datasets);
    let exp_shift = context.suite.exp_shift();
    // the integer shift that was applied to the sum of the embedded values
    let shift = (scaled_add_shift * exp_shift).to_integer();
    let values = ciphertext
        .words
        .iter()
        .zip(mask)
        .map(|(word, mask_int)| {
            // PANIC_SAFE: the subtraction panics if it underflows, which cannot
            // happen since every mask element is reduced modulo the order
            let unmasked = (word + &order - mask_int) % &order;
            // UNWRAP_SAFE: to_bigint never fails for BigUint
            let embedded = unmasked.to_bigint().unwrap() - &shift;
            round_to_f64(&embedded)
        })
        .collect();
    Ok(Dataset::from_raw_parts(context.rows, context.cols, values))
}

/// Bounds a value into the finite reals.
///
/// Maps positive/negative infinity to `f64::MAX`/`f64::MIN` and NaN to zero.
fn bounded_ratio(value: f64) -> Ratio<BigInt> {
    if value.is_nan() {
        Ratio::zero()
    } else {
        let finite = clamp(value, f64::MIN, f64::MAX);
        // safe unwrap: the bounded value is guaranteed to be finite
        Ratio::from_float(finite).unwrap()
    }
}

/// Rounds `value * 2^-1074` to the nearest `f64`, ties to even.
///
/// Sums whose magnitude exceeds the finite range round to an infinity.
fn round_to_f64(value: &BigInt) -> f64 {
    let magnitude = value.magnitude();
    if magnitude.is_zero() {
        return 0.;
    }
    let bits = magnitude.bits();
    let (mantissa, exp) = if bits <= 53 {
        // a value this small is an exact multiple of the smallest subnormal
        // UNWRAP_SAFE: the magnitude fits into 53 bits
        (magnitude.to_u64().unwrap(), -i64::from(FRACTIONAL_BITS))
    } else {
        let shift = bits - 53;
        let truncated = magnitude >> shift;
        let remainder = magnitude - (&truncated << shift);
        let half = BigUint::one() << (shift - 1);
        // UNWRAP_SAFE: the truncated magnitude fits into 53 bits
        let mut mantissa = truncated.to_u64().unwrap();
        if remainder > half || (remainder == half && mantissa & 1 == 1) {
            mantissa += 1;
        }
        (mantissa, shift as i64 - i64::from(FRACTIONAL_BITS))
    };
    let composed = compose_f64(mantissa, exp);
    if value.sign() == Sign::Minus {
        -composed
    } else {
        composed
    }
}

/// Composes `mantissa * 2^exp` without a rounding step.
///
/// The mantissa must hold at most 53 significant bits after carry normalization and the exponent
/// must be at least `-1074`, which the caller guarantees.
fn compose_f64(mantissa: u64, exp: i64) -> f64 {
    let (mantissa, exp) = if mantissa == 1 << 53 {
        // the round-up carried into a new binary digit
        (1_u64 << 52, exp + 1)
    } else {
        (mantissa, exp)
    };
    if exp > f64::MAX_EXP as i64 - 1 {
        return f64::INFINITY;
    }
    let scale = if exp >= f64::MIN_EXP as i64 - 1 {
        f64::from_bits(((exp + 1023) as u64) << 52)
    } else {
        // a subnormal power of two
        f64::from_bits(1 << (exp + 1074))
    };
    mantissa as f64 * scale
}
