//! Domain-specific newtypes for type safety
//!
//! These types prevent mixing up different kinds of identifiers and keep
//! conversions to the read-fonts view explicit at the call sites.

use std::fmt::{self, Display, Formatter};

/// A glyph index into a font's glyph array.
///
/// `GlyphId(0)` is `.notdef` and is always retained by a subset plan.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlyphId(pub u16);

impl GlyphId {
    /// The `.notdef` glyph.
    pub const NOTDEF: Self = Self(0);

    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn to_u16(self) -> u16 {
        self.0
    }

    pub const fn to_u32(self) -> u32 {
        self.0 as u32
    }

    /// Convert to the read-fonts glyph identifier.
    pub fn to_read(self) -> read_fonts::types::GlyphId {
        read_fonts::types::GlyphId::new(self.0 as u32)
    }
}

impl From<u16> for GlyphId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl From<GlyphId> for u16 {
    fn from(id: GlyphId) -> Self {
        id.0
    }
}

impl From<read_fonts::types::GlyphId16> for GlyphId {
    fn from(id: read_fonts::types::GlyphId16) -> Self {
        Self(id.to_u16())
    }
}

impl Display for GlyphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "GID{}", self.0)
    }
}

/// A Unicode scalar value.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Codepoint(pub u32);

impl Codepoint {
    pub const fn new(cp: u32) -> Self {
        Self(cp)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    /// True when the codepoint lies outside the Basic Multilingual Plane.
    pub const fn is_supplementary(self) -> bool {
        self.0 > 0xFFFF
    }
}

impl From<u32> for Codepoint {
    fn from(cp: u32) -> Self {
        Self(cp)
    }
}

impl From<char> for Codepoint {
    fn from(c: char) -> Self {
        Self(c as u32)
    }
}

impl From<Codepoint> for u32 {
    fn from(cp: Codepoint) -> Self {
        cp.0
    }
}

impl Display for Codepoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "U+{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_id_display() {
        let gid = GlyphId::new(42);
        assert_eq!(gid.to_u16(), 42);
        assert_eq!(format!("{gid}"), "GID42");
    }

    #[test]
    fn notdef_is_zero() {
        assert_eq!(GlyphId::NOTDEF, GlyphId::new(0));
    }

    #[test]
    fn codepoint_planes() {
        assert!(!Codepoint::from('A').is_supplementary());
        assert!(Codepoint::new(0x1F600).is_supplementary());
        assert_eq!(format!("{}", Codepoint::new(0x41)), "U+0041");
    }
}
