//! Subset input: what to keep, what to drop, how to instance.

use std::collections::{BTreeMap, BTreeSet};

use font_types::Tag;
use read_fonts::{FontRef, TableProvider};

use crate::types::{Codepoint, GlyphId};

/// Behavior flags for a subset operation.
///
/// The numbering mirrors the hb-subset flag set so callers migrating from
/// other subsetters keep their constants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubsetFlags(u16);

impl SubsetFlags {
    /// All flags at their default value of false.
    pub const DEFAULT: Self = Self(0x0000);

    /// Drop hinting tables and per-glyph instructions.
    pub const NO_HINTING: Self = Self(0x0001);

    /// Keep original glyph indices; dropped glyphs become empty slots.
    pub const RETAIN_GIDS: Self = Self(0x0002);

    /// Pass `name`, `post`, `gasp` and variation tables through untouched.
    pub const PASSTHROUGH_UNRECOGNIZED: Self = Self(0x0020);

    /// Reserved: keep the `.notdef` outline. No runtime effect yet.
    pub const NOTDEF_OUTLINE: Self = Self(0x0040);

    /// Reserved: keep PostScript glyph names. No runtime effect yet.
    pub const GLYPH_NAMES: Self = Self(0x0080);

    /// Skip the GSUB closure; composite closure still runs.
    pub const NO_LAYOUT_CLOSURE: Self = Self(0x0200);

    /// Force-drop `GSUB`, `GPOS` and `GDEF` from the output.
    pub const DROP_LAYOUT_TABLES: Self = Self(0x0400);

    /// Returns `true` if all of the flags in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for SubsetFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOrAssign for SubsetFlags {
    #[inline]
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Accumulates everything a caller wants from a subset.
///
/// All mutation is additive; once a plan is built from an input the input
/// is no longer consulted.
#[derive(Clone, Debug, Default)]
pub struct Input {
    unicodes: BTreeSet<Codepoint>,
    glyph_ids: BTreeSet<GlyphId>,
    drop_tables: BTreeSet<Tag>,
    passthrough_tables: BTreeSet<Tag>,
    layout_features: BTreeSet<Tag>,
    pinned_axes: BTreeMap<Tag, f64>,
    flags: SubsetFlags,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a single codepoint.
    pub fn add_unicode(&mut self, cp: impl Into<Codepoint>) -> &mut Self {
        self.unicodes.insert(cp.into());
        self
    }

    /// Request every codepoint in the iterator.
    pub fn add_unicodes(&mut self, cps: impl IntoIterator<Item = u32>) -> &mut Self {
        self.unicodes.extend(cps.into_iter().map(Codepoint::new));
        self
    }

    /// Request every scalar value of a string.
    pub fn add_text(&mut self, text: &str) -> &mut Self {
        self.unicodes.extend(text.chars().map(Codepoint::from));
        self
    }

    /// Request a glyph by index, bypassing the cmap.
    pub fn add_glyph_id(&mut self, gid: GlyphId) -> &mut Self {
        self.glyph_ids.insert(gid);
        self
    }

    pub fn add_glyph_ids(&mut self, gids: impl IntoIterator<Item = u16>) -> &mut Self {
        self.glyph_ids.extend(gids.into_iter().map(GlyphId::new));
        self
    }

    /// Exclude a table from the output regardless of other rules.
    pub fn drop_table(&mut self, tag: Tag) -> &mut Self {
        self.drop_tables.insert(tag);
        self
    }

    /// Copy a table into the output verbatim.
    pub fn passthrough_table(&mut self, tag: Tag) -> &mut Self {
        self.passthrough_tables.insert(tag);
        self
    }

    /// Widen the layout-feature filter. An empty filter keeps the default
    /// features (`liga` for GSUB, `kern` for GPOS).
    pub fn add_layout_feature(&mut self, tag: Tag) -> &mut Self {
        self.layout_features.insert(tag);
        self
    }

    /// Pin a variation axis to a design-space value.
    pub fn pin_axis(&mut self, tag: Tag, value: f64) -> &mut Self {
        self.pinned_axes.insert(tag, value);
        self
    }

    /// Pin one axis to its `fvar` default. Unknown tags are ignored.
    pub fn pin_axis_to_default(&mut self, font: &FontRef, tag: Tag) -> &mut Self {
        if let Ok(fvar) = font.fvar()
            && let Ok(axes) = fvar.axes()
            && let Some(axis) = axes.iter().find(|a| a.axis_tag() == tag)
        {
            self.pinned_axes.insert(tag, axis.default_value().to_f64());
        }
        self
    }

    /// Pin every axis in `fvar` to its default value.
    pub fn pin_all_axes_to_default(&mut self, font: &FontRef) -> &mut Self {
        if let Ok(fvar) = font.fvar()
            && let Ok(axes) = fvar.axes()
        {
            for axis in axes {
                self.pinned_axes
                    .insert(axis.axis_tag(), axis.default_value().to_f64());
            }
        }
        self
    }

    /// True when every axis of the font has a pinned value, or the font has
    /// no `fvar` at all.
    pub fn is_fully_instanced(&self, font: &FontRef) -> bool {
        match font.fvar().and_then(|fvar| fvar.axes()) {
            Ok(axes) => axes
                .iter()
                .all(|axis| self.pinned_axes.contains_key(&axis.axis_tag())),
            Err(_) => true,
        }
    }

    pub fn set_flags(&mut self, flags: SubsetFlags) -> &mut Self {
        self.flags |= flags;
        self
    }

    pub fn flags(&self) -> SubsetFlags {
        self.flags
    }

    pub fn unicodes(&self) -> &BTreeSet<Codepoint> {
        &self.unicodes
    }

    pub fn glyph_ids(&self) -> &BTreeSet<GlyphId> {
        &self.glyph_ids
    }

    pub fn drop_tables(&self) -> &BTreeSet<Tag> {
        &self.drop_tables
    }

    pub fn passthrough_tables(&self) -> &BTreeSet<Tag> {
        &self.passthrough_tables
    }

    pub fn layout_features(&self) -> &BTreeSet<Tag> {
        &self.layout_features
    }

    pub fn pinned_axes(&self) -> &BTreeMap<Tag, f64> {
        &self.pinned_axes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let flags = SubsetFlags::NO_HINTING | SubsetFlags::RETAIN_GIDS;
        assert!(flags.contains(SubsetFlags::NO_HINTING));
        assert!(flags.contains(SubsetFlags::RETAIN_GIDS));
        assert!(!flags.contains(SubsetFlags::DROP_LAYOUT_TABLES));
    }

    #[test]
    fn text_feeds_codepoints() {
        let mut input = Input::new();
        input.add_text("Hello");
        let cps: Vec<u32> = input.unicodes().iter().map(|c| c.to_u32()).collect();
        assert_eq!(cps, vec![0x48, 0x65, 0x6C, 0x6F]);
    }

    #[test]
    fn accumulators_are_additive() {
        let mut input = Input::new();
        input.add_unicodes([0x41, 0x42]).add_unicode(0x41u32);
        assert_eq!(input.unicodes().len(), 2);
        input.add_glyph_ids([7, 7, 9]);
        assert_eq!(input.glyph_ids().len(), 2);
    }
}
