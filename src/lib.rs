//! Meme compositing core: text overlays on a base image, pointer-driven
//! placement, and flattening to PNG on a background worker.
//!
//! [`session::EditorSession`] ties the pieces together; the other modules
//! are usable on their own.

pub mod cancel;
pub mod collection;
pub mod color;
pub mod compositor;
pub mod error;
pub mod error_codes;
pub mod geometry;
pub mod manifest;
pub mod overlay;
pub mod placement;
pub mod session;
pub mod source;
pub mod templates;
pub mod text;
pub mod worker;
