//! Identifier helpers.
//!
//! Every persisted entity uses a UUIDv4 rendered in its canonical hyphenated
//! lowercase form. Ids arriving over the wire are validated before any
//! lookup so malformed input never reaches a storage backend.

use uuid::Uuid;

/// Generate a globally unique identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate that a string is a canonical UUIDv4.
pub fn validate_id(id: &str) -> bool {
    match Uuid::parse_str(id) {
        Ok(parsed) => {
            parsed.get_version_num() == 4 && parsed.to_string() == id
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_validate() {
        let id = generate_id();
        assert!(validate_id(&id));
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!validate_id(""));
        assert!(!validate_id("foo"));
        assert!(!validate_id("123e4567-e89b-12d3-a456-426614174000")); // v1 layout
        // uppercase is not the canonical rendering
        let upper = generate_id().to_uppercase();
        assert!(!validate_id(&upper));
    }
}
