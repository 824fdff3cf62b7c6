//! Image references
//!
//! - `sanitize`: rewrite raw image URLs into local proxy references
//! - `placeholder`: deterministic generated avatars

mod placeholder;
mod sanitize;

pub use placeholder::{GeneratedAvatar, PlaceholderAvatar};
pub use sanitize::ImageSanitizer;
