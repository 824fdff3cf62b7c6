//! Generated placeholder avatars

use sha2::{Digest, Sha256};

/// Source of deterministic substitute images
pub trait PlaceholderAvatar: Send + Sync {
    /// Placeholder reference for `handle`; identical input gives identical output
    fn placeholder_for(&self, handle: &str) -> String;

    /// Whether `reference` was produced by [`placeholder_for`](Self::placeholder_for)
    fn is_placeholder(&self, reference: &str) -> bool;
}

/// Initials avatar rendered by an external avatar service
///
/// The background color is derived from a hash of the handle so that
/// each handle keeps the same color across calls.
#[derive(Debug, Clone)]
pub struct GeneratedAvatar {
    base_url: String,
}

impl GeneratedAvatar {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn background_for(handle: &str) -> String {
        let digest = Sha256::digest(handle.as_bytes());
        digest[..3].iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl PlaceholderAvatar for GeneratedAvatar {
    fn placeholder_for(&self, handle: &str) -> String {
        let handle = handle.trim().trim_start_matches('@').to_ascii_lowercase();
        format!(
            "{}/?name={}&background={}&color=ffffff&size=256",
            self.base_url,
            urlencoding::encode(&handle),
            Self::background_for(&handle)
        )
    }

    fn is_placeholder(&self, reference: &str) -> bool {
        reference.starts_with(&format!("{}/?", self.base_url))
    }
}
