//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! This module follows the hexagonal architecture pattern, providing concrete
//! implementations of domain port traits:
//!
//! - **odie**: reqwest-backed POI backend client
//! - **blob**: reqwest-backed object-storage sink for snapshot images
//! - **image_store**: cap-std-backed local snapshot image storage
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod blob;
pub mod image_store;
pub mod odie;

/// Compact, truncated rendering of an error response body for messages.
pub(crate) fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::body_preview;
    use rstest::rstest;

    #[rstest]
    #[case(b"".as_slice(), "")]
    #[case(b"  a \n b  ".as_slice(), "a b")]
    fn body_preview_compacts_whitespace(#[case] body: &[u8], #[case] expected: &str) {
        assert_eq!(body_preview(body), expected);
    }

    #[rstest]
    fn body_preview_truncates_long_bodies() {
        let long = "word ".repeat(100);

        let preview = body_preview(long.as_bytes());

        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 163);
    }
}
