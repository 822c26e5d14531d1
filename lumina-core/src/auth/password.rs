use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::error::{CoreError, Result};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Adaptive hashing cost. Doubling time per unit keeps this a deliberate
/// choice; 12 is the calibrated value for this deployment class.
const BCRYPT_COST: u32 = 12;

/// Substrings that sink a password's score regardless of length.
const WEAK_TERMS: &[&str] = &[
    "123", "abc", "qwe", "asd", "zxc", "password", "admin", "user", "test",
];

const GENERATION_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*-_=+";

pub fn validate_password_length(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(CoreError::Validation(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    validate_password_length(password)?;
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| CoreError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| CoreError::Internal(format!("password verification failed: {e}")))
}

/// Strength score in 0–100: points for length and character variety, flat
/// penalties for repeated triples (−5), ascending letter triples (−5), and
/// any of the well-known weak substrings (−10).
pub fn score_password(password: &str) -> u8 {
    let chars: Vec<char> = password.chars().collect();

    let length_points = (chars.len().min(20) * 2) as i32;

    let mut variety_points = 0i32;
    if chars.iter().any(|c| c.is_ascii_lowercase()) {
        variety_points += 15;
    }
    if chars.iter().any(|c| c.is_ascii_uppercase()) {
        variety_points += 15;
    }
    if chars.iter().any(|c| c.is_ascii_digit()) {
        variety_points += 15;
    }
    if chars.iter().any(|c| !c.is_ascii_alphanumeric()) {
        variety_points += 15;
    }

    let mut penalties = 0i32;
    if chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2]) {
        penalties += 5;
    }
    if has_ascending_letter_triple(&chars) {
        penalties += 5;
    }
    let lowered = password.to_lowercase();
    if WEAK_TERMS.iter().any(|term| lowered.contains(term)) {
        penalties += 10;
    }

    (length_points + variety_points - penalties).clamp(0, 100) as u8
}

fn has_ascending_letter_triple(chars: &[char]) -> bool {
    chars.windows(3).any(|w| {
        w.iter().all(|c| c.is_ascii_alphabetic())
            && (w[1] as u32) == (w[0] as u32) + 1
            && (w[2] as u32) == (w[1] as u32) + 1
    })
}

/// Random password from the OS entropy source. The RNG here must be
/// cryptographically strong; a seeded generator is not acceptable for
/// credentials.
pub fn generate_password(len: usize) -> Result<String> {
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(CoreError::Validation(format!(
            "generated password length must be between \
             {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN}"
        )));
    }
    let mut bytes = vec![0u8; len * 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CoreError::Internal(format!("entropy source failed: {e}")))?;

    let password: String = bytes
        .chunks_exact(4)
        .map(|chunk| {
            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            GENERATION_CHARSET[(value as usize) % GENERATION_CHARSET.len()] as char
        })
        .collect();
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_bounds() {
        assert!(validate_password_length("short").is_err());
        assert!(validate_password_length(&"x".repeat(129)).is_err());
        assert!(validate_password_length("eightchr").is_ok());
    }

    #[test]
    fn hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn weak_terms_are_penalized() {
        assert!(score_password("Password1!") < score_password("Zrtmkle1!w"));
        assert!(score_password("qwerty") < score_password("fjrmwu"));
    }

    #[test]
    fn triples_are_penalized() {
        assert!(score_password("xxxKm91!pw") < score_password("xkqKm91!pw"));
        assert!(score_password("Krcde91!pw") < score_password("Krxkq91!pw"));
    }

    #[test]
    fn score_is_bounded() {
        assert_eq!(score_password(""), 0);
        let strong = "Tr0ub4dor&3xplicit!K";
        assert!(score_password(strong) <= 100);
        assert!(score_password(strong) >= 80);
    }

    #[test]
    fn generated_passwords_use_the_charset() {
        let password = generate_password(24).unwrap();
        assert_eq!(password.chars().count(), 24);
        assert!(password
            .bytes()
            .all(|b| GENERATION_CHARSET.contains(&b)));
        assert!(generate_password(4).is_err());
    }
}
