//! Conversions between little-endian signal vectors and machine words.
//!
//! Channel `i` carries bit `i`.

use logikern_types::Signal;

/// Read `signals` as an unsigned word.  `None` when any channel is not a
/// driven `0`/`1`, or when there are more than 64 channels.
pub fn to_word(signals: &[Signal]) -> Option<u64> {
    if signals.len() > 64 {
        return None;
    }
    signals.iter().enumerate().try_fold(0_u64, |word, (bit, signal)| {
        signal.to_bool().map(|set| if set { word | (1 << bit) } else { word })
    })
}

/// The low `width` bits of `word` as driven signals.
pub fn from_word(word: u64, width: usize) -> Vec<Signal> {
    (0..width).map(|bit| word_bit(word, bit)).collect()
}

/// Bit `bit` of `word`; bits past 63 read as `0`.
pub fn word_bit(word: u64, bit: usize) -> Signal {
    Signal::from_bool(bit < 64 && (word >> bit) & 1 == 1)
}

/// All-ones mask of `width` bits.
pub fn mask(width: usize) -> u64 {
    if width >= 64 { u64::MAX } else { (1 << width) - 1 }
}
