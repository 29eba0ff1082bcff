//! Utility functions and helpers
//!
//! Random tokens and constant-time comparison shared by the session layer
//! and the OAuth state handling.

use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Generate a secure random token (32 bytes, base64url without padding)
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two strings without leaking where they differ
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secure_token() {
        let a = generate_secure_token();
        let b = generate_secure_token();

        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("nonce", "nonce"));
        assert!(!constant_time_eq("nonce", "nonce "));
        assert!(!constant_time_eq("nonce", "Nonce"));
        assert!(!constant_time_eq("nonce", ""));
    }
}
