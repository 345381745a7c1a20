use rand::distributions::Alphanumeric;
use rand::Rng;

// ============================================================================
// Opaque Identifier Tokens
// ============================================================================
//
// Persisted identifiers are short random alphanumeric tokens rather than
// sequential integers, so they carry no ordering information and cannot be
// guessed from an earlier one. Lengths follow the entity they name:
// orders/events 8, bank accounts/payment requests 12, audit records 16.
//
// ============================================================================

pub const ORDER_TOKEN_LEN: usize = 8;
pub const ACCOUNT_TOKEN_LEN: usize = 12;
pub const REQUEST_TOKEN_LEN: usize = 12;
pub const AUDIT_TOKEN_LEN: usize = 16;

/// Generate a random alphanumeric token of the given length.
pub fn token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn order_id() -> String {
    token(ORDER_TOKEN_LEN)
}

pub fn account_id() -> String {
    token(ACCOUNT_TOKEN_LEN)
}

pub fn request_id() -> String {
    token(REQUEST_TOKEN_LEN)
}

pub fn audit_id() -> String {
    token(AUDIT_TOKEN_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_length_and_charset() {
        for len in [ORDER_TOKEN_LEN, ACCOUNT_TOKEN_LEN, AUDIT_TOKEN_LEN] {
            let id = token(len);
            assert_eq!(id.len(), len);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_tokens_are_not_repeated() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(order_id()), "duplicate token generated");
        }
    }
}
