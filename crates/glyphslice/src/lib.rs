//! OpenType font subsetting and static instancing on byte slices.
//!
//! Given a source font and the codepoints (or raw glyph ids) to keep,
//! [`subset`] produces a self-consistent font containing only those
//! glyphs, with every cross-table reference (composite components,
//! layout coverage, CFF subroutine calls, cmap entries) rewritten to the
//! new glyph numbering. Pinning all variation axes on the [`Input`] bakes
//! the pinned location into the output and drops the variation tables.
//!
//! # Example
//!
//! ```no_run
//! use glyphslice::{Input, subset};
//!
//! let font_data = std::fs::read("font.ttf").unwrap();
//! let mut input = Input::new();
//! input.add_text("Hello");
//! let reduced = subset(&font_data, input).unwrap();
//! ```
//!
//! The source font is consumed through read-fonts; parsing problems in
//! optional tables degrade to dropping the affected table from the
//! output, never to an error.

mod builder;
mod closure;
mod emit;
mod error;
mod input;
mod instance;
mod plan;
mod tables;
mod types;

pub use builder::FontBuilder;
pub use error::{Error, Result};
pub use input::{Input, SubsetFlags};
pub use plan::Plan;
pub use types::{Codepoint, GlyphId};

use read_fonts::FontRef;

/// Subset `data` according to `input` and return the new font binary.
///
/// This is the one-shot convenience around [`Plan::new`] +
/// [`Plan::execute`].
pub fn subset(data: &[u8], input: Input) -> Result<Vec<u8>> {
    let font = FontRef::new(data)?;
    Plan::new(&font, input)?.execute()
}
