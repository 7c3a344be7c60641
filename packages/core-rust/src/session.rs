//! Process-lifetime session identifier.

use std::sync::OnceLock;

use uuid::Uuid;

/// Returns the identifier shared by every meter created in this process.
///
/// Generated once from a random UUID and rendered without hyphens.
#[must_use]
pub fn session_id() -> &'static str {
    static SESSION: OnceLock<String> = OnceLock::new();
    SESSION.get_or_init(|| Uuid::new_v4().simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_stable() {
        assert_eq!(session_id(), session_id());
        assert_eq!(session_id().len(), 32);
    }
}
