//! Text preparation ahead of synthesis.
//!
//! The engine accepts bounded inputs only, so long scripts are cut into
//! ordered segments. Where the cut may fall depends on the script of the
//! text: Chinese text breaks on full-width punctuation, everything else on
//! sentence terminators, clause separators and word boundaries.

pub mod classify;
pub mod segment;

pub use classify::{classify, Script};
pub use segment::{segment, segments, TextSegment};
