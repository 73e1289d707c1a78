//! Authorization keys.
//!
//! A key is an unguessable 128-bit token issued at registration. It is only
//! meaningful to the connector that issued it, and only while its owner
//! stays registered.

use std::fmt;

use uuid::Uuid;

/// Opaque proof-of-registration token.
///
/// `Debug` never prints the token itself, so keys can be carried in structs
/// that get logged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuthorizationKey(Uuid);

impl AuthorizationKey {
    /// Generate a fresh random key.
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for AuthorizationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(AuthorizationKey::generate(), AuthorizationKey::generate());
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = AuthorizationKey::generate();
        assert_eq!(format!("{key:?}"), "AuthorizationKey(..)");
    }
}
