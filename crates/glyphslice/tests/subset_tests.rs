//! End-to-end subsetting tests against synthetic fonts.
//!
//! Source fonts are assembled with write-fonts and the subsetter's output
//! is re-parsed with read-fonts, so every assertion goes through an
//! independent serializer/parser pair.

use std::collections::HashMap;

use font_types::{F2Dot14, GlyphId16, Tag};
use glyphslice::{Input, SubsetFlags, subset};
use read_fonts::{FontRef, TableProvider, tables::glyf::Glyph};
use write_fonts::{
    FontBuilder,
    tables::{
        cmap::Cmap,
        glyf::{
            Anchor as GlyfAnchor, Bbox, Component, ComponentFlags, CompositeGlyph, Contour,
            GlyfLocaBuilder, Glyph as WriteGlyph, SimpleGlyph, Transform,
        },
        gpos as wgpos,
        gsub as wgsub,
        head::Head,
        hhea::Hhea,
        hmtx::{Hmtx, LongMetric},
        layout::{
            CoverageTable, Feature, FeatureList, FeatureRecord, LangSys, Lookup, LookupFlag,
            Script, ScriptList, ScriptRecord,
        },
        loca::LocaFormat,
        maxp::Maxp,
        os2::Os2,
        post::Post,
    },
};

// Source glyph roster. Advances are 400 + 10 * gid so every glyph is
// distinguishable in the output hmtx.
const NOTDEF: u16 = 0;
const F: u16 = 1;
const I: u16 = 2;
const H: u16 = 3;
const E: u16 = 4;
const L: u16 = 5;
const O: u16 = 6;
const FFI: u16 = 7;
const A: u16 = 8;
const ACUTE: u16 = 9;
const AACUTE: u16 = 10;
const V: u16 = 11;
const NUM_GLYPHS: u16 = 12;

fn advance(gid: u16) -> u16 {
    400 + 10 * gid
}

fn square_glyph() -> WriteGlyph {
    let points = vec![
        read_fonts::tables::glyf::CurvePoint::new(0, 0, true),
        read_fonts::tables::glyf::CurvePoint::new(500, 0, true),
        read_fonts::tables::glyf::CurvePoint::new(500, 700, true),
        read_fonts::tables::glyf::CurvePoint::new(0, 700, true),
    ];
    WriteGlyph::Simple(SimpleGlyph {
        bbox: Bbox { x_min: 0, y_min: 0, x_max: 500, y_max: 700 },
        contours: vec![Contour::from(points)],
        instructions: vec![],
    })
}

fn identity_transform() -> Transform {
    Transform {
        xx: F2Dot14::from_f32(1.0),
        yx: F2Dot14::from_f32(0.0),
        xy: F2Dot14::from_f32(0.0),
        yy: F2Dot14::from_f32(1.0),
    }
}

/// A composite of A and acute, the only composite in the roster.
fn aacute_glyph() -> WriteGlyph {
    let bbox = Bbox { x_min: 0, y_min: 0, x_max: 500, y_max: 900 };
    let base = Component::new(
        GlyphId16::new(A),
        GlyfAnchor::Offset { x: 0, y: 0 },
        identity_transform(),
        ComponentFlags::default(),
    );
    let mark = Component::new(
        GlyphId16::new(ACUTE),
        GlyfAnchor::Offset { x: 100, y: 200 },
        identity_transform(),
        ComponentFlags::default(),
    );
    let mut composite = CompositeGlyph::new(base, bbox);
    composite.add_component(mark, bbox);
    WriteGlyph::Composite(composite)
}

fn build_liga_gsub() -> wgsub::Gsub {
    let ligature = wgsub::Ligature::new(
        GlyphId16::new(FFI),
        vec![GlyphId16::new(F), GlyphId16::new(I)],
    );
    let subtable = wgsub::LigatureSubstFormat1::new(
        CoverageTable::format_1(vec![GlyphId16::new(F)]),
        vec![wgsub::LigatureSet::new(vec![ligature])],
    );
    let lookup =
        wgsub::SubstitutionLookup::Ligature(Lookup::new(LookupFlag::empty(), vec![subtable]));

    let script = Script::new(Some(LangSys::new(vec![0])), vec![]);
    let script_list = ScriptList::new(vec![ScriptRecord::new(Tag::new(b"DFLT"), script)]);
    let feature_list = FeatureList::new(vec![FeatureRecord::new(
        Tag::new(b"liga"),
        Feature::new(None, vec![0]),
    )]);
    wgsub::Gsub::new(
        script_list,
        feature_list,
        wgsub::SubstitutionLookupList::new(vec![lookup]),
    )
}

fn build_kern_gpos() -> wgpos::Gpos {
    let record = wgpos::PairValueRecord::new(
        GlyphId16::new(V),
        wgpos::ValueRecord::new().with_x_advance(-40),
        wgpos::ValueRecord::new(),
    );
    let subtable = wgpos::PairPos::Format1(wgpos::PairPosFormat1::new(
        CoverageTable::format_1(vec![GlyphId16::new(A)]),
        vec![wgpos::PairSet::new(vec![record])],
    ));
    let lookup = wgpos::PositionLookup::Pair(Lookup::new(LookupFlag::empty(), vec![subtable]));

    let script = Script::new(Some(LangSys::new(vec![0])), vec![]);
    let script_list = ScriptList::new(vec![ScriptRecord::new(Tag::new(b"DFLT"), script)]);
    let feature_list = FeatureList::new(vec![FeatureRecord::new(
        Tag::new(b"kern"),
        Feature::new(None, vec![0]),
    )]);
    wgpos::Gpos::new(
        script_list,
        feature_list,
        wgpos::PositionLookupList::new(vec![lookup]),
    )
}

struct SourceOptions {
    layout: bool,
    hinting: bool,
    extras: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self { layout: true, hinting: false, extras: false }
    }
}

/// A TrueType source font covering the roster above.
fn build_source_font(options: SourceOptions) -> Vec<u8> {
    let mut glyf_builder = GlyfLocaBuilder::new();
    for gid in 0..NUM_GLYPHS {
        let glyph = if gid == AACUTE { aacute_glyph() } else { square_glyph() };
        glyf_builder.add_glyph(&glyph).unwrap();
    }
    let (glyf, loca, loca_format) = glyf_builder.build();

    let cmap_entries: Vec<(char, u16)> = vec![
        ('f', F),
        ('i', I),
        ('H', H),
        ('e', E),
        ('l', L),
        ('o', O),
        ('A', A),
        ('\u{00B4}', ACUTE),
        ('\u{00C1}', AACUTE),
        ('V', V),
        ('\u{1F600}', O),
    ];
    let cmap = Cmap::from_mappings(
        cmap_entries
            .iter()
            .map(|(c, gid)| (*c, read_fonts::types::GlyphId::new(*gid as u32))),
    )
    .unwrap();

    let head = Head {
        font_revision: font_types::Fixed::from_f64(1.0),
        checksum_adjustment: 0,
        magic_number: 0x5F0F3CF5,
        flags: write_fonts::tables::head::Flags::empty(),
        units_per_em: 1000,
        created: font_types::LongDateTime::new(0),
        modified: font_types::LongDateTime::new(0),
        x_min: 0,
        y_min: 0,
        x_max: 500,
        y_max: 900,
        mac_style: write_fonts::tables::head::MacStyle::empty(),
        lowest_rec_ppem: 8,
        font_direction_hint: 2,
        index_to_loc_format: match loca_format {
            LocaFormat::Short => 0,
            LocaFormat::Long => 1,
        },
    };

    let hhea = Hhea {
        ascender: font_types::FWord::new(900),
        descender: font_types::FWord::new(-200),
        line_gap: font_types::FWord::new(0),
        advance_width_max: font_types::UfWord::new(advance(NUM_GLYPHS - 1)),
        min_left_side_bearing: font_types::FWord::new(0),
        min_right_side_bearing: font_types::FWord::new(0),
        x_max_extent: font_types::FWord::new(500),
        caret_slope_rise: 1,
        caret_slope_run: 0,
        caret_offset: 0,
        number_of_h_metrics: NUM_GLYPHS,
    };

    let hmtx = Hmtx {
        h_metrics: (0..NUM_GLYPHS)
            .map(|gid| LongMetric { advance: advance(gid), side_bearing: 10 })
            .collect(),
        left_side_bearings: vec![],
    };

    let maxp = Maxp {
        num_glyphs: NUM_GLYPHS,
        max_points: Some(4),
        max_contours: Some(1),
        max_composite_points: Some(8),
        max_composite_contours: Some(2),
        max_zones: Some(1),
        max_twilight_points: Some(0),
        max_storage: Some(0),
        max_function_defs: Some(0),
        max_instruction_defs: Some(0),
        max_stack_elements: Some(0),
        max_size_of_instructions: Some(0),
        max_component_elements: Some(2),
        max_component_depth: Some(1),
    };

    let os2 = Os2 {
        x_avg_char_width: 500,
        us_weight_class: 400,
        us_width_class: 5,
        fs_type: 0,
        y_subscript_x_size: 650,
        y_subscript_y_size: 600,
        y_subscript_x_offset: 0,
        y_subscript_y_offset: 75,
        y_superscript_x_size: 650,
        y_superscript_y_size: 600,
        y_superscript_x_offset: 0,
        y_superscript_y_offset: 350,
        y_strikeout_size: 50,
        y_strikeout_position: 300,
        s_family_class: 0,
        panose_10: [0; 10],
        ul_unicode_range_1: 0,
        ul_unicode_range_2: 0,
        ul_unicode_range_3: 0,
        ul_unicode_range_4: 0,
        ach_vend_id: Tag::new(b"NONE"),
        fs_selection: write_fonts::tables::os2::SelectionFlags::REGULAR,
        us_first_char_index: 0x20,
        us_last_char_index: 0x7E,
        s_typo_ascender: 700,
        s_typo_descender: -200,
        s_typo_line_gap: 0,
        us_win_ascent: 900,
        us_win_descent: 200,
        ul_code_page_range_1: None,
        ul_code_page_range_2: None,
        sx_height: None,
        s_cap_height: None,
        us_default_char: None,
        us_break_char: None,
        us_max_context: None,
        us_lower_optical_point_size: None,
        us_upper_optical_point_size: None,
    };

    let mut builder = FontBuilder::new();
    builder.add_table(&head).unwrap();
    builder.add_table(&hhea).unwrap();
    builder.add_table(&hmtx).unwrap();
    builder.add_table(&maxp).unwrap();
    builder.add_table(&cmap).unwrap();
    builder.add_table(&os2).unwrap();
    builder.add_table(&glyf).unwrap();
    builder.add_table(&loca).unwrap();

    if options.layout {
        builder.add_table(&build_liga_gsub()).unwrap();
        builder.add_table(&build_kern_gpos()).unwrap();
    }
    if options.hinting {
        builder.add_raw(Tag::new(b"fpgm"), vec![0xB0, 0x00]);
        builder.add_raw(Tag::new(b"prep"), vec![0xB0, 0x01]);
        builder.add_raw(Tag::new(b"cvt "), vec![0, 50, 0, 60]);
    }
    if options.extras {
        let post = Post {
            version: font_types::Version16Dot16::VERSION_3_0,
            italic_angle: font_types::Fixed::from_f64(0.0),
            underline_position: font_types::FWord::new(-100),
            underline_thickness: font_types::FWord::new(50),
            is_fixed_pitch: 0,
            min_mem_type42: 0,
            max_mem_type42: 0,
            min_mem_type1: 0,
            max_mem_type1: 0,
            num_glyphs: None,
            glyph_name_index: None,
            string_data: None,
        };
        builder.add_table(&post).unwrap();
        builder.add_raw(Tag::new(b"gasp"), vec![0, 0, 0, 1, 0xFF, 0xFF, 0, 3]);
    }

    builder.build()
}

fn output_cmap(font: &FontRef) -> HashMap<u32, u16> {
    let cmap = font.cmap().unwrap();
    let mut result = HashMap::new();
    for record in cmap.encoding_records() {
        if let Ok(subtable) = record.subtable(cmap.offset_data()) {
            for (cp, gid) in subtable.iter() {
                result.insert(cp, gid.to_u32() as u16);
            }
            break;
        }
    }
    result
}

#[test]
fn basic_latin_round_trip() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("Hello");
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    // .notdef + H, e, l, o; compact ids follow ascending source order.
    assert_eq!(font.maxp().unwrap().num_glyphs(), 5);

    let cmap = output_cmap(&font);
    assert_eq!(cmap[&('H' as u32)], 1);
    assert_eq!(cmap[&('e' as u32)], 2);
    assert_eq!(cmap[&('l' as u32)], 3);
    assert_eq!(cmap[&('o' as u32)], 4);
    assert!(!cmap.contains_key(&('A' as u32)));

    // Advances travel with their glyphs.
    let hmtx = font.hmtx().unwrap();
    for (old, new) in [(H, 1u16), (E, 2), (L, 3), (O, 4)] {
        assert_eq!(
            hmtx.advance(read_fonts::types::GlyphId::new(new as u32)),
            Some(advance(old)),
        );
    }
    // numberOfHMetrics covers every output glyph.
    assert_eq!(font.hhea().unwrap().number_of_h_metrics(), 5);
}

#[test]
fn requested_codepoints_without_cmap_entry_are_ignored() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("Hz"); // no z in the source cmap
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    assert_eq!(font.maxp().unwrap().num_glyphs(), 2);
}

#[test]
fn empty_input_keeps_notdef() {
    let source = build_source_font(SourceOptions::default());
    let out = subset(&source, Input::new()).unwrap();
    let font = FontRef::new(&out).unwrap();
    assert_eq!(font.maxp().unwrap().num_glyphs(), 1);
}

#[test]
fn ligature_closure_pulls_in_the_ligature_glyph() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("fi");
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    // .notdef, f, i, and the ffi glyph reached through the liga lookup.
    assert_eq!(font.maxp().unwrap().num_glyphs(), 4);

    let gsub = font.gsub().unwrap();
    let lookup_list = gsub.lookup_list().unwrap();
    assert_eq!(lookup_list.lookup_count(), 1);
    let lookup = lookup_list.lookups().get(0).unwrap();
    let read_fonts::tables::gsub::SubstitutionLookup::Ligature(lookup) = lookup else {
        panic!("expected a ligature lookup");
    };
    let subtable = lookup.subtables().get(0).unwrap();
    let covered: Vec<u16> = subtable
        .coverage()
        .unwrap()
        .iter()
        .map(|g| g.to_u16())
        .collect();
    assert_eq!(covered, vec![1]); // new id of f
    let set = subtable.ligature_sets().get(0).unwrap();
    let lig = set.ligatures().get(0).unwrap();
    assert_eq!(lig.ligature_glyph().to_u16(), 3); // new id of ffi
    let components: Vec<u16> = lig
        .component_glyph_ids()
        .iter()
        .map(|g| g.get().to_u16())
        .collect();
    assert_eq!(components, vec![1, 2]);
}

#[test]
fn no_layout_closure_skips_gsub_expansion() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("fi");
    input.set_flags(SubsetFlags::NO_LAYOUT_CLOSURE);
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    assert_eq!(font.maxp().unwrap().num_glyphs(), 3); // no ffi
}

#[test]
fn composite_components_are_closed_over_and_remapped() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("\u{00C1}");
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    // .notdef, A, acute, Aacute.
    assert_eq!(font.maxp().unwrap().num_glyphs(), 4);
    let cmap = output_cmap(&font);
    let new_aacute = cmap[&0xC1];
    assert_eq!(new_aacute, 3);

    let glyf = font.glyf().unwrap();
    let loca = font.loca(None).unwrap();
    let glyph = loca
        .get_glyf(read_fonts::types::GlyphId::new(new_aacute as u32), &glyf)
        .unwrap()
        .unwrap();
    let Glyph::Composite(composite) = glyph else {
        panic!("expected a composite glyph");
    };
    let components: Vec<u16> = composite
        .components()
        .map(|c| c.glyph.to_u16())
        .collect();
    assert_eq!(components, vec![1, 2]); // new ids of A and acute
}

#[test]
fn retain_gids_keeps_indices_and_pads_with_empty_slots() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("A");
    input.set_flags(SubsetFlags::RETAIN_GIDS);
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    assert_eq!(font.maxp().unwrap().num_glyphs(), A + 1);
    let cmap = output_cmap(&font);
    assert_eq!(cmap[&('A' as u32)], A);

    let hmtx = font.hmtx().unwrap();
    assert_eq!(
        hmtx.advance(read_fonts::types::GlyphId::new(A as u32)),
        Some(advance(A)),
    );
    for filler in 1..A {
        assert_eq!(
            hmtx.advance(read_fonts::types::GlyphId::new(filler as u32)),
            Some(0),
            "slot {filler} should be empty",
        );
    }

    // Filler slots have no outline.
    let glyf = font.glyf().unwrap();
    let loca = font.loca(None).unwrap();
    assert!(
        loca.get_glyf(read_fonts::types::GlyphId::new(3), &glyf)
            .unwrap()
            .is_none()
    );
}

#[test]
fn kern_pair_survives_when_both_glyphs_are_kept() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("AV");
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    let gpos = font.gpos().unwrap();
    let lookup_list = gpos.lookup_list().unwrap();
    assert_eq!(lookup_list.lookup_count(), 1);
    let lookup = lookup_list.lookups().get(0).unwrap();
    let read_fonts::tables::gpos::PositionLookup::Pair(lookup) = lookup else {
        panic!("expected a pair lookup");
    };
    let read_fonts::tables::gpos::PairPos::Format1(subtable) =
        lookup.subtables().get(0).unwrap()
    else {
        panic!("expected pair format 1");
    };
    let covered: Vec<u16> = subtable
        .coverage()
        .unwrap()
        .iter()
        .map(|g| g.to_u16())
        .collect();
    assert_eq!(covered, vec![1]); // new id of A
    let set = subtable.pair_sets().get(0).unwrap();
    let records: Vec<_> = set
        .pair_value_records()
        .iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].second_glyph().to_u16(), 2); // new id of V
    assert_eq!(records[0].value_record1().x_advance(), Some(-40));
}

#[test]
fn kern_pair_with_missing_second_drops_the_table() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("A"); // V is not retained
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    assert!(font.gpos().is_err());
}

#[test]
fn drop_layout_tables_flag() {
    let source = build_source_font(SourceOptions::default());

    let mut keep = Input::new();
    keep.add_text("fi");
    let with_layout = subset(&source, keep).unwrap();

    let mut drop = Input::new();
    drop.add_text("fi");
    drop.set_flags(SubsetFlags::DROP_LAYOUT_TABLES);
    let without_layout = subset(&source, drop).unwrap();

    let font = FontRef::new(&without_layout).unwrap();
    assert!(font.gsub().is_err());
    assert!(font.gpos().is_err());
    assert!(without_layout.len() < with_layout.len());
}

#[test]
fn hinting_tables_follow_the_flag() {
    let source = build_source_font(SourceOptions {
        hinting: true,
        ..Default::default()
    });

    let mut input = Input::new();
    input.add_text("H");
    let out = subset(&source, input).unwrap();
    let font = FontRef::new(&out).unwrap();
    assert!(font.table_data(Tag::new(b"fpgm")).is_some());
    assert!(font.table_data(Tag::new(b"prep")).is_some());
    assert!(font.table_data(Tag::new(b"cvt ")).is_some());

    let mut input = Input::new();
    input.add_text("H");
    input.set_flags(SubsetFlags::NO_HINTING);
    let out = subset(&source, input).unwrap();
    let font = FontRef::new(&out).unwrap();
    assert!(font.table_data(Tag::new(b"fpgm")).is_none());
    assert!(font.table_data(Tag::new(b"prep")).is_none());
    assert!(font.table_data(Tag::new(b"cvt ")).is_none());
}

#[test]
fn passthrough_tables_are_opt_in() {
    let source = build_source_font(SourceOptions {
        extras: true,
        ..Default::default()
    });

    let mut input = Input::new();
    input.add_text("H");
    let out = subset(&source, input).unwrap();
    let font = FontRef::new(&out).unwrap();
    assert!(font.table_data(Tag::new(b"post")).is_none());
    assert!(font.table_data(Tag::new(b"gasp")).is_none());

    let mut input = Input::new();
    input.add_text("H");
    input.set_flags(SubsetFlags::PASSTHROUGH_UNRECOGNIZED);
    let out = subset(&source, input).unwrap();
    let font = FontRef::new(&out).unwrap();
    assert!(font.table_data(Tag::new(b"post")).is_some());
    assert!(font.table_data(Tag::new(b"gasp")).is_some());
}

#[test]
fn explicit_drop_set_wins() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("H");
    input.drop_table(Tag::new(b"OS/2"));
    let out = subset(&source, input).unwrap();
    let font = FontRef::new(&out).unwrap();
    assert!(font.table_data(Tag::new(b"OS/2")).is_none());
}

#[test]
fn os2_char_range_is_refreshed() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("Hl");
    let out = subset(&source, input).unwrap();
    let font = FontRef::new(&out).unwrap();
    let os2 = font.os2().unwrap();
    assert_eq!(os2.us_first_char_index(), 'H' as u16);
    assert_eq!(os2.us_last_char_index(), 'l' as u16);
}

#[test]
fn supplementary_codepoints_use_format_12() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_unicodes([0x1F600]);
    let out = subset(&source, input).unwrap();

    let font = FontRef::new(&out).unwrap();
    let cmap = font.cmap().unwrap();
    let record = &cmap.encoding_records()[0];
    assert_eq!(record.platform_id(), read_fonts::tables::cmap::PlatformId::Windows);
    assert_eq!(record.encoding_id(), 10);
    assert_eq!(cmap.map_codepoint(0x1F600u32).map(|g| g.to_u32()), Some(1));
}

#[test]
fn subset_is_smaller_than_source() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("H");
    let out = subset(&source, input).unwrap();
    assert!(out.len() < source.len());
}

#[test]
fn output_is_a_well_formed_sfnt() {
    let source = build_source_font(SourceOptions::default());
    let mut input = Input::new();
    input.add_text("Hello");
    let out = subset(&source, input).unwrap();

    let num_tables = u16::from_be_bytes([out[4], out[5]]) as usize;
    let mut prev_tag = 0u32;
    for i in 0..num_tables {
        let record = 12 + i * 16;
        let tag = u32::from_be_bytes(out[record..record + 4].try_into().unwrap());
        assert!(tag > prev_tag, "table records must be sorted by tag");
        prev_tag = tag;

        let checksum = u32::from_be_bytes(out[record + 4..record + 8].try_into().unwrap());
        let offset =
            u32::from_be_bytes(out[record + 8..record + 12].try_into().unwrap()) as usize;
        let length =
            u32::from_be_bytes(out[record + 12..record + 16].try_into().unwrap()) as usize;
        assert_eq!(offset % 4, 0, "table data must be 4-byte aligned");
        assert_eq!(checksum, checksum_of(&out[offset..offset + length]));
    }

    // head.checksumAdjustment balances the whole file to the magic value.
    let head_record = (0..num_tables)
        .map(|i| 12 + i * 16)
        .find(|&r| &out[r..r + 4] == b"head")
        .unwrap();
    let head_offset =
        u32::from_be_bytes(out[head_record + 8..head_record + 12].try_into().unwrap()) as usize;
    let adjustment =
        u32::from_be_bytes(out[head_offset + 8..head_offset + 12].try_into().unwrap());
    let mut zeroed = out.clone();
    zeroed[head_offset + 8..head_offset + 12].fill(0);
    assert_eq!(adjustment, 0xB1B0AFBAu32.wrapping_sub(checksum_of(&zeroed)));
}

fn checksum_of(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from_be_bytes(chunk.try_into().unwrap()));
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut last = [0u8; 4];
        last[..tail.len()].copy_from_slice(tail);
        sum = sum.wrapping_add(u32::from_be_bytes(last));
    }
    sum
}

#[test]
fn pinning_axes_on_a_static_font_changes_nothing() {
    let source = build_source_font(SourceOptions::default());
    let font = FontRef::new(&source).unwrap();

    let mut pinned = Input::new();
    pinned.add_text("Hello");
    pinned.pin_all_axes_to_default(&font);
    assert!(pinned.is_fully_instanced(&font));
    let pinned_out = subset(&source, pinned).unwrap();

    let mut plain = Input::new();
    plain.add_text("Hello");
    let plain_out = subset(&source, plain).unwrap();

    assert_eq!(pinned_out, plain_out);
}
