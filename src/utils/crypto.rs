use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

pub fn hash_password(plain: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2.hash_password(plain.as_bytes(), &salt)?.to_string();
    Ok(password_hash)
}

pub fn verify_password(plain: &str, hashed: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hashed)?;
    let ok = Argon2::default()
        .verify_password(plain.as_bytes(), &parsed_hash)
        .is_ok();
    Ok(ok)
}

/// Policy carried over from the portal: 8+ chars with upper, lower, digit and
/// a special character.
pub fn check_password_strength(plain: &str) -> Result<(), &'static str> {
    if plain.len() < 8 {
        return Err("Password must be at least 8 characters long");
    }
    if !plain.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !plain.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !plain.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number");
    }
    if !plain.chars().any(|c| "!@#$%^&*(),.?\":{}|<>".contains(c)) {
        return Err("Password must contain at least one special character");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() {
        let hash = hash_password("Secret#123").unwrap();
        assert!(verify_password("Secret#123", &hash).unwrap());
        assert!(!verify_password("Secret#124", &hash).unwrap());
    }

    #[test]
    fn strength_policy() {
        assert!(check_password_strength("Valid#Pass1").is_ok());
        assert!(check_password_strength("short1!").is_err());
        assert!(check_password_strength("nouppercase#1").is_err());
        assert!(check_password_strength("NOLOWERCASE#1").is_err());
        assert!(check_password_strength("NoDigits#here").is_err());
        assert!(check_password_strength("NoSpecial123a").is_err());
    }
}
