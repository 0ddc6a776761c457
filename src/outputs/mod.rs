//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: Writes per-article records and the run summary as JSON
//!
//! Images are written by [`crate::images::materialize`] directly into the
//! article folder; this module only handles the JSON side.

pub mod json;
