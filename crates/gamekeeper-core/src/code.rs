//! Shareable session codes: two uppercase letters followed by six digits.

use anyhow::{Result, bail};
use rand::Rng;
use tracing::warn;

pub const CODE_LEN: usize = 8;

/// How many candidates are tried before giving up.
pub const MAX_ATTEMPTS: usize = 10;

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::with_capacity(CODE_LEN);
    for _ in 0..2 {
        code.push(char::from(rng.random_range(b'A'..=b'Z')));
    }
    for _ in 0..6 {
        code.push(char::from(rng.random_range(b'0'..=b'9')));
    }
    code
}

pub fn is_valid_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == CODE_LEN
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

/// Draws codes until `claim` accepts one. `claim` returns `false` when the
/// code is already taken; it is called at most `MAX_ATTEMPTS` times.
pub fn allocate_code<R, F>(rng: &mut R, mut claim: F) -> Result<String>
where
    R: Rng + ?Sized,
    F: FnMut(&str) -> Result<bool>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let code = generate_code(rng);
        if claim(&code)? {
            return Ok(code);
        }
        warn!(attempt, %code, "Session code collision");
    }
    bail!("no free session code after {MAX_ATTEMPTS} attempts")
}
