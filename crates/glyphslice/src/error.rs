//! Error types for font subsetting operations.

use std::result;

use font_types::Tag;
use read_fonts::ReadError;

use crate::types::GlyphId;

/// Errors that abort a subset operation.
///
/// Parse failures and unsupported structures inside optional tables never
/// surface here; the affected table or subtable is silently dropped from
/// the output instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse font: {0}")]
    Parse(#[from] ReadError),

    #[error("no tables supplied to the font builder")]
    NoTables,

    #[error("required table {0} is missing or unreadable")]
    MissingRequiredTable(Tag),

    #[error("glyph reference out of range: {0}")]
    InvalidGlyphReference(GlyphId),
}

pub type Result<T> = result::Result<T, Error>;
