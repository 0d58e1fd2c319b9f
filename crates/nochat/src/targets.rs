//! Target address normalization for the `nochat:` channel prefix.

/// Normalize an outbound target address.
///
/// Accepts a bare conversation ID or a channel-prefixed address
/// (`nochat:<id>`); the prefix is stripped. An empty or
/// whitespace-only address normalizes to "no target".
pub fn normalize_target(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = trimmed.strip_prefix("nochat:").unwrap_or(trimmed).trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Heuristic check that a string plausibly names a NoChat conversation
/// or user (server IDs are opaque tokens, at least 6 chars, no spaces).
pub fn looks_like_target_id(candidate: &str) -> bool {
    let candidate = candidate.trim();
    candidate.len() >= 6
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn strips_channel_prefix() {
        assert_eq!(
            normalize_target("nochat:conv-123").as_deref(),
            Some("conv-123")
        );
    }

    #[test]
    fn bare_id_passes_through() {
        assert_eq!(normalize_target("conv-123").as_deref(), Some("conv-123"));
    }

    #[test]
    fn empty_is_no_target() {
        assert_eq!(normalize_target(""), None);
        assert_eq!(normalize_target("   "), None);
        assert_eq!(normalize_target("nochat:"), None);
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(
            normalize_target("  nochat:conv-123  ").as_deref(),
            Some("conv-123")
        );
    }

    #[test]
    fn target_id_plausibility() {
        assert!(looks_like_target_id("67793687-4a45-480a-862f-d1a5d7ec4632"));
        assert!(looks_like_target_id("conv_abc123"));
        assert!(!looks_like_target_id("abc"));
        assert!(!looks_like_target_id("has spaces here"));
        assert!(!looks_like_target_id("bad:char"));
    }
}
