//! Pairing code generation
//!
//! Codes have the form `WORD-WORD-DIGITS`, e.g. `BLUE-STAR-1234`: an
//! adjective, a noun and four digits. Uniqueness is enforced by the
//! database; callers retry on collision.

use rand::Rng;

/// Number of digits in the numeric suffix
pub const CODE_DIGITS: usize = 4;

const ADJECTIVES: &[&str] = &[
    "BLUE", "RED", "GOLD", "JADE", "PINK", "CYAN", "LIME", "IRON", "NEON", "RUBY", "SILK",
    "AMBER", "CORAL", "FROST", "LUNAR", "SOLAR", "VIVID", "QUIET", "SWIFT", "BRAVE",
];

const NOUNS: &[&str] = &[
    "STAR", "MOON", "WAVE", "SHELL", "COMET", "RIVER", "CLOUD", "EMBER", "FERN", "HAWK",
    "ORBIT", "PEARL", "REEF", "STONE", "TIDE", "VALE", "WING", "NOVA", "DUNE", "GROVE",
];

/// Generate a random pairing code
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    let number: u32 = rng.random_range(0..10_000);
    format!("{}-{}-{:04}", adjective, noun, number)
}

/// Normalize user input before lookup (trim and uppercase)
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Check that a code has the `WORD-WORD-DIGITS` shape
pub fn is_well_formed(code: &str) -> bool {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.len() != 3 {
        return false;
    }
    let is_word = |w: &str| !w.is_empty() && w.chars().all(|c| c.is_ascii_uppercase());
    is_word(parts[0])
        && is_word(parts[1])
        && parts[2].len() == CODE_DIGITS
        && parts[2].chars().all(|c| c.is_ascii_digit())
}
