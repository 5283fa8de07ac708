//! Random string generation.
//!
//! A [`StringGenerator`] takes a word length from a length distribution and
//! fills the word with characters read from a [`Tape`].

use crate::distribution::Distribution;
use crate::error::GenerateError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stampede_core::CharRange;

/// ASCII upper and lower case letters.
pub const DEFAULT_ALPHABET: [CharRange; 2] = [
    CharRange { min: 65, max: 90 },
    CharRange { min: 97, max: 122 },
];

const SURROGATES: std::ops::RangeInclusive<u32> = 0xD800..=0xDFFF;

/// An endless source of characters.
pub trait Tape: Send {
    fn next_char(&mut self) -> char;
}

/// Tape drawing characters uniformly from a set of code point ranges.
///
/// A range is picked first, then a code point inside it, so small ranges
/// are not drowned out by large ones.
#[derive(Debug, Clone)]
pub struct CharTape {
    rng: ChaCha8Rng,
    ranges: Vec<CharRange>,
}

impl CharTape {
    /// Create a tape; an empty alphabet selects [`DEFAULT_ALPHABET`].
    pub fn new(seed: u64, alphabet: &[CharRange]) -> Result<Self, GenerateError> {
        let ranges = if alphabet.is_empty() {
            DEFAULT_ALPHABET.to_vec()
        } else {
            alphabet.to_vec()
        };

        for range in &ranges {
            let touches_surrogates =
                range.min <= *SURROGATES.end() && range.max >= *SURROGATES.start();
            if range.min > range.max || range.max > char::MAX as u32 || touches_surrogates {
                return Err(GenerateError::InvalidAlphabet {
                    min: range.min,
                    max: range.max,
                });
            }
        }

        // Separate stream so the tape stays independent from a length
        // distribution built from the same seed
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(1);

        Ok(Self { rng, ranges })
    }
}

impl Tape for CharTape {
    fn next_char(&mut self) -> char {
        let range = self.ranges[self.rng.gen_range(0..self.ranges.len())];
        let code = self.rng.gen_range(range.min..=range.max);
        char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

/// Generates words whose length follows a distribution.
pub struct StringGenerator<P: Tape = CharTape> {
    lengths: Box<dyn Distribution<u64>>,
    tape: P,
    word: String,
}

impl<P: Tape> StringGenerator<P> {
    pub fn new(lengths: Box<dyn Distribution<u64>>, tape: P) -> Self {
        Self {
            lengths,
            tape,
            word: String::new(),
        }
    }

    /// Produce the next word. The returned slice is valid until the next call.
    pub fn next_word(&mut self) -> &str {
        let len = self.lengths.next();
        self.word.clear();
        for _ in 0..len {
            self.word.push(self.tape.next_char());
        }
        &self.word
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLength(Vec<u64>);

    impl Distribution<u64> for FixedLength {
        fn next(&mut self) -> u64 {
            self.0.remove(0)
        }
    }

    fn in_alphabet(c: char, alphabet: &[CharRange]) -> bool {
        alphabet
            .iter()
            .any(|r| (r.min..=r.max).contains(&(c as u32)))
    }

    #[test]
    fn test_word_has_requested_length() {
        let tape = CharTape::new(42, &[]).unwrap();
        let mut generator = StringGenerator::new(Box::new(FixedLength(vec![12, 0, 3])), tape);

        let word = generator.next_word().to_string();
        assert_eq!(word.chars().count(), 12);
        assert!(word.chars().all(|c| in_alphabet(c, &DEFAULT_ALPHABET)));

        assert_eq!(generator.next_word(), "");
        assert_eq!(generator.next_word().chars().count(), 3);
    }

    #[test]
    fn test_custom_alphabet_multibyte() {
        let alphabet = [CharRange::new('а', 'я'), CharRange::new('0', '1')];
        let tape = CharTape::new(7, &alphabet).unwrap();
        let mut generator = StringGenerator::new(Box::new(FixedLength(vec![50])), tape);

        let word = generator.next_word();
        assert_eq!(word.chars().count(), 50);
        assert!(word.chars().all(|c| in_alphabet(c, &alphabet)));
    }

    #[test]
    fn test_single_code_point_range() {
        let mut tape = CharTape::new(1, &[CharRange::new('x', 'x')]).unwrap();
        assert!((0..20).all(|_| tape.next_char() == 'x'));
    }

    #[test]
    fn test_invalid_alphabets_rejected() {
        let inverted = [CharRange { min: 90, max: 65 }];
        assert!(matches!(
            CharTape::new(1, &inverted),
            Err(GenerateError::InvalidAlphabet { min: 90, max: 65 })
        ));

        let surrogates = [CharRange { min: 0xD000, max: 0xD900 }];
        assert!(CharTape::new(1, &surrogates).is_err());

        let beyond = [CharRange { min: 0x10_0000, max: 0x11_0000 }];
        assert!(CharTape::new(1, &beyond).is_err());
    }

    #[test]
    fn test_tape_deterministic() {
        let mut a = CharTape::new(5, &[]).unwrap();
        let mut b = CharTape::new(5, &[]).unwrap();
        let left: String = (0..64).map(|_| a.next_char()).collect();
        let right: String = (0..64).map(|_| b.next_char()).collect();
        assert_eq!(left, right);
    }
}
