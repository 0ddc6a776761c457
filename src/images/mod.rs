//! Lead-image pipeline: harvest → score → select → materialize.
//!
//! - [`harvest`]: ordered, score-gated candidate strategies
//! - [`score`]: relevance scoring and the exclusion rule
//! - [`select`]: dedupe, rank and size-check candidates
//! - [`materialize`]: download and re-encode the winner as JPEG

pub mod harvest;
pub mod materialize;
pub mod score;
pub mod select;

pub use harvest::ImageHarvester;
pub use materialize::ImageMaterializer;
pub use score::ImageScorer;
pub use select::ImageSelector;
