//! Survey short codes.

use rand::Rng;

/// Characters a short code is drawn from. Matches what `/join` accepts.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const CODE_LEN: usize = 4;

/// Random four-character code. Uniqueness among open surveys is the caller's job.
pub fn generate_short_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
