//! Subset plan: glyph closure, old→new mapping, and execution.
//!
//! A plan is built once from a source font and an [`Input`], runs the
//! closure to a fixed point, freezes the glyph mapping, then `execute`
//! drives the table re-serializers in dependency order and hands the
//! buffers to the font builder. Nothing in the plan mutates after
//! construction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use font_types::Tag;
use log::debug;
use read_fonts::{
    FontRef, TableProvider,
    tables::{
        cff::Cff,
        gdef::Gdef,
        glyf::Glyf,
        gpos::Gpos,
        gsub::Gsub,
        hmtx::Hmtx,
        loca::Loca,
    },
    types::GlyphId16,
};
use skrifa::MetadataProvider;

use crate::{
    builder::FontBuilder,
    closure,
    emit::patch_u16,
    error::{Error, Result},
    input::{Input, SubsetFlags},
    instance::{Instancer, VARIATION_TABLES},
    tables,
    types::{Codepoint, GlyphId},
};

const OS2: Tag = Tag::new(b"OS/2");
const HINTING_TABLES: [Tag; 3] = [Tag::new(b"cvt "), Tag::new(b"fpgm"), Tag::new(b"prep")];
const PASSTHROUGH_TABLES: [Tag; 3] = [Tag::new(b"name"), Tag::new(b"post"), Tag::new(b"gasp")];

/// An immutable subset plan over one source font.
pub struct Plan<'a> {
    font: FontRef<'a>,
    input: Input,

    glyph_set: BTreeSet<GlyphId>,
    glyph_map: HashMap<GlyphId, GlyphId>,
    reverse_map: HashMap<GlyphId, GlyphId>,
    unicode_map: BTreeMap<Codepoint, GlyphId>,
    num_output_glyphs: u16,

    glyf: Option<Glyf<'a>>,
    loca: Option<Loca<'a>>,
    cff: Option<Cff<'a>>,
    hmtx: Option<Hmtx<'a>>,
    gsub: Option<Gsub<'a>>,
    gpos: Option<Gpos<'a>>,
    gdef: Option<Gdef<'a>>,
    instancer: Option<Instancer<'a>>,
}

impl<'a> Plan<'a> {
    /// Resolve the input against the font: seed the glyph set, close it
    /// over composites and substitutions, and freeze the mapping.
    pub fn new(font: &FontRef<'a>, input: Input) -> Result<Self> {
        let font_num_glyphs = font
            .maxp()
            .map_err(|_| Error::MissingRequiredTable(tables::maxp::MAXP))?
            .num_glyphs();

        let glyf = font.glyf().ok();
        let loca = font.loca(None).ok();
        let cff = font.cff().ok();
        let hmtx = font.hmtx().ok();
        let gsub = font.gsub().ok();
        let gpos = font.gpos().ok();
        let gdef = font.gdef().ok();

        // Seed: .notdef, the cmap image of every requested codepoint, and
        // the directly requested glyph ids.
        let mut glyph_set = BTreeSet::from([GlyphId::NOTDEF]);
        let charmap = font.charmap();
        for cp in input.unicodes() {
            if let Some(gid) = charmap.map(cp.to_u32()) {
                glyph_set.insert(GlyphId::new(gid.to_u32() as u16));
            }
        }
        for &gid in input.glyph_ids() {
            if gid.to_u16() < font_num_glyphs {
                glyph_set.insert(gid);
            } else {
                debug!("requested glyph {gid} is out of range; ignored");
            }
        }

        // Closure to a joint fixed point: substitution outputs may be
        // composites, whose components may in turn trigger lookups.
        let run_layout = !input.flags().contains(SubsetFlags::NO_LAYOUT_CLOSURE);
        loop {
            let before = glyph_set.len();
            if let (Some(glyf), Some(loca)) = (&glyf, &loca) {
                closure::composite_closure(glyf, loca, &mut glyph_set);
            }
            if run_layout && let Some(gsub) = &gsub {
                closure::gsub_closure(gsub, &mut glyph_set);
            }
            if glyph_set.len() == before {
                break;
            }
        }
        glyph_set.retain(|gid| gid.to_u16() < font_num_glyphs || *gid == GlyphId::NOTDEF);

        // Freeze the mapping.
        let retain_gids = input.flags().contains(SubsetFlags::RETAIN_GIDS);
        let mut glyph_map = HashMap::with_capacity(glyph_set.len());
        let mut reverse_map = HashMap::with_capacity(glyph_set.len());
        let num_output_glyphs = if retain_gids {
            for &gid in &glyph_set {
                glyph_map.insert(gid, gid);
                reverse_map.insert(gid, gid);
            }
            glyph_set.iter().next_back().map(|g| g.to_u16() + 1).unwrap_or(1)
        } else {
            for (new, &old) in glyph_set.iter().enumerate() {
                let new = GlyphId::new(new as u16);
                glyph_map.insert(old, new);
                reverse_map.insert(new, old);
            }
            glyph_set.len() as u16
        };

        // The cmap image restricted to the retained glyphs.
        let mut unicode_map = BTreeMap::new();
        for (cp, gid) in charmap.mappings() {
            let old = GlyphId::new(gid.to_u32() as u16);
            if let Some(&new) = glyph_map.get(&old) {
                unicode_map.insert(Codepoint::new(cp), new);
            }
        }

        let instancer = if input.is_fully_instanced(font) {
            Instancer::new(font, input.pinned_axes())
        } else {
            None
        };

        Ok(Self {
            font: font.clone(),
            input,
            glyph_set,
            glyph_map,
            reverse_map,
            unicode_map,
            num_output_glyphs,
            glyf,
            loca,
            cff,
            hmtx,
            gsub,
            gpos,
            gdef,
            instancer,
        })
    }

    /// Run every re-serializer and assemble the subset font.
    pub fn execute(&self) -> Result<Vec<u8>> {
        let flags = self.input.flags();
        let mut builder = FontBuilder::new();

        builder.add_table(tables::head::HEAD, tables::head::subset_head(self)?);
        builder.add_table(tables::maxp::MAXP, tables::maxp::subset_maxp(self)?);
        builder.add_table(tables::hhea::HHEA, tables::hhea::subset_hhea(self)?);
        builder.add_table(tables::hmtx::HMTX, tables::hmtx::subset_hmtx(self)?);

        if self.glyf.is_some() && self.loca.is_some() {
            let outlines = tables::glyf::subset_glyf(self)?;
            builder.add_table(tables::glyf::GLYF, outlines.glyf);
            builder.add_table(tables::glyf::LOCA, outlines.loca);
        } else if self.cff.is_some() {
            builder.add_table(tables::cff::CFF, tables::cff::subset_cff(self)?);
        } else {
            return Err(Error::MissingRequiredTable(tables::glyf::GLYF));
        }

        builder.add_table(tables::cmap::CMAP, tables::cmap::subset_cmap(self)?);

        if !flags.contains(SubsetFlags::DROP_LAYOUT_TABLES) {
            if let Some(gsub) = tables::gsub::subset_gsub(self)? {
                builder.add_table(tables::gsub::GSUB, gsub);
            }
            if let Some(gpos) = tables::gpos::subset_gpos(self)? {
                builder.add_table(tables::gpos::GPOS, gpos);
            }
            if let Some(gdef) = tables::gdef::subset_gdef(self)? {
                builder.add_table(tables::gdef::GDEF, gdef);
            }
        }

        if let Some(os2) = self.build_os2() {
            builder.add_table(OS2, os2);
        }

        if !flags.contains(SubsetFlags::NO_HINTING) {
            for tag in HINTING_TABLES {
                self.copy_raw(&mut builder, tag);
            }
        }

        if flags.contains(SubsetFlags::PASSTHROUGH_UNRECOGNIZED) {
            for tag in PASSTHROUGH_TABLES {
                self.copy_raw(&mut builder, tag);
            }
            if self.instancer.is_none() {
                for tag in VARIATION_TABLES {
                    self.copy_raw(&mut builder, tag);
                }
            }
        }
        for &tag in self.input.passthrough_tables() {
            self.copy_raw(&mut builder, tag);
        }

        // The drop set always wins.
        for &tag in self.input.drop_tables() {
            builder.remove_table(tag);
        }

        builder.build(self.font.table_directory.sfnt_version())
    }

    fn copy_raw(&self, builder: &mut FontBuilder, tag: Tag) {
        if let Some(data) = self.table_bytes(tag) {
            builder.add_table(tag, data.to_vec());
        }
    }

    /// OS/2 passes through with the first/last char indices refreshed to
    /// the retained codepoint range.
    fn build_os2(&self) -> Option<Vec<u8>> {
        let mut out = self.table_bytes(OS2)?.to_vec();
        if out.len() >= 68
            && let (Some(first), Some(last)) =
                (self.unicode_map.keys().next(), self.unicode_map.keys().next_back())
        {
            patch_u16(&mut out, 64, first.to_u32().min(0xFFFF) as u16);
            patch_u16(&mut out, 66, last.to_u32().min(0xFFFF) as u16);
        }
        Some(out)
    }

    // Accessors for the re-serializers.

    pub fn font(&self) -> &FontRef<'a> {
        &self.font
    }

    pub fn table_bytes(&self, tag: Tag) -> Option<&'a [u8]> {
        self.font.table_data(tag).map(|data| data.as_bytes())
    }

    /// Source loca offset width, from the source `head`.
    pub fn source_long_loca(&self) -> bool {
        self.font
            .head()
            .map(|head| head.index_to_loc_format() == 1)
            .unwrap_or(true)
    }

    pub fn glyph_set(&self) -> &BTreeSet<GlyphId> {
        &self.glyph_set
    }

    pub fn num_output_glyphs(&self) -> u16 {
        self.num_output_glyphs
    }

    /// New id for a retained source glyph.
    pub fn new_gid_for(&self, old: GlyphId) -> Option<GlyphId> {
        self.glyph_map.get(&old).copied()
    }

    /// Source glyph occupying an output slot; `None` for retain-GIDs
    /// filler slots.
    pub fn old_gid_for(&self, new: GlyphId) -> Option<GlyphId> {
        self.reverse_map.get(&new).copied()
    }

    /// Remap a glyph id as read-fonts hands them out.
    pub fn remap16(&self, gid: GlyphId16) -> Option<GlyphId> {
        self.new_gid_for(GlyphId::from(gid))
    }

    pub fn unicode_map(&self) -> &BTreeMap<Codepoint, GlyphId> {
        &self.unicode_map
    }

    pub fn feature_filter(&self) -> &BTreeSet<Tag> {
        self.input.layout_features()
    }

    /// Per-glyph instruction stripping applies only where glyphs are
    /// re-serialized anyway.
    pub fn strip_hinting(&self) -> bool {
        self.input.flags().contains(SubsetFlags::NO_HINTING)
    }

    pub fn glyf(&self) -> Option<&Glyf<'a>> {
        self.glyf.as_ref()
    }

    pub fn loca(&self) -> Option<&Loca<'a>> {
        self.loca.as_ref()
    }

    pub fn cff(&self) -> Option<&Cff<'a>> {
        self.cff.as_ref()
    }

    pub fn hmtx(&self) -> Option<&Hmtx<'a>> {
        self.hmtx.as_ref()
    }

    pub fn gsub(&self) -> Option<&Gsub<'a>> {
        self.gsub.as_ref()
    }

    pub fn gpos(&self) -> Option<&Gpos<'a>> {
        self.gpos.as_ref()
    }

    pub fn gdef(&self) -> Option<&Gdef<'a>> {
        self.gdef.as_ref()
    }

    pub fn instancer(&self) -> Option<&Instancer<'a>> {
        self.instancer.as_ref()
    }
}
