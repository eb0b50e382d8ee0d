//! GPOS table rewrite.
//!
//! Lookups reachable from the harvested features (`kern` by default) are
//! rebuilt: coverage, class and anchor arrays are filtered against the
//! retained glyph set and remapped; device tables are stripped (zero
//! bytes fill the offset slots their ValueFormat bits still reserve);
//! anchors are always emitted in format 1. Extension-packed lookups are
//! unwrapped and re-emitted inline as their wrapped kind. Contextual and
//! chain-contextual lookups are soft-dropped.

use font_types::Tag;
use log::debug;
use read_fonts::tables::gpos::{
    AnchorTable, PairPos, PositionLookup, PositionSubtables, SinglePos,
    ValueRecord as ReadValueRecord,
};

use crate::{
    emit::{
        Anchor, ValueRecord, build_anchor, build_anchor_matrix, build_class_def, build_coverage,
        build_ligature_array, build_mark_array, push_u16, push_value_record, value_record_size,
    },
    error::Result,
    plan::Plan,
    tables::layout::{build_layout_table, build_lookup, harvest_lookup_indices},
    types::GlyphId,
};

pub const GPOS: Tag = Tag::new(b"GPOS");

const DEFAULT_FEATURE: Tag = Tag::new(b"kern");

const TYPE_SINGLE: u16 = 1;
const TYPE_PAIR: u16 = 2;
const TYPE_CURSIVE: u16 = 3;
const TYPE_MARK_BASE: u16 = 4;
const TYPE_MARK_LIG: u16 = 5;
const TYPE_MARK_MARK: u16 = 6;

/// Rewrite GPOS for the plan. `Ok(None)` drops the table.
pub fn subset_gpos(plan: &Plan) -> Result<Option<Vec<u8>>> {
    let Some(gpos) = plan.gpos() else {
        return Ok(None);
    };
    let (Ok(feature_list), Ok(lookup_list)) = (gpos.feature_list(), gpos.lookup_list()) else {
        return Ok(None);
    };

    let indices = harvest_lookup_indices(&feature_list, plan.feature_filter(), DEFAULT_FEATURE);

    let mut lookups: Vec<Vec<u8>> = Vec::new();
    for index in indices {
        let Ok(lookup) = lookup_list.lookups().get(index as usize) else {
            continue;
        };
        if let Some(built) = convert_lookup(&lookup, plan) {
            lookups.push(built);
        }
    }

    if lookups.is_empty() {
        return Ok(None);
    }
    Ok(Some(build_layout_table(DEFAULT_FEATURE, &lookups)))
}

fn convert_lookup(lookup: &PositionLookup, plan: &Plan) -> Option<Vec<u8>> {
    let flag = lookup.lookup_flag();
    // The enum-level subtable accessor unwraps extension indirection;
    // whatever the source packing, the rewritten lookup is emitted inline
    // as its wrapped kind.
    let (lookup_type, subtables) = match lookup.subtables().ok()? {
        PositionSubtables::Single(tables) => {
            let subtables: Vec<Vec<u8>> = tables
                .iter()
                .filter_map(|s| s.ok())
                .filter_map(|s| convert_single(&s, plan))
                .collect();
            (TYPE_SINGLE, subtables)
        }
        PositionSubtables::Pair(tables) => {
            let subtables: Vec<Vec<u8>> = tables
                .iter()
                .filter_map(|s| s.ok())
                .filter_map(|s| convert_pair(&s, plan))
                .collect();
            (TYPE_PAIR, subtables)
        }
        PositionSubtables::Cursive(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                let mut entries: Vec<(GlyphId, Option<Anchor>, Option<Anchor>)> = Vec::new();
                let data = subtable.offset_data();
                for (gid, record) in coverage.iter().zip(subtable.entry_exit_record()) {
                    let Some(new_gid) = plan.remap16(gid) else { continue };
                    let entry = record
                        .entry_anchor(data)
                        .and_then(|a| a.ok())
                        .map(|a| convert_anchor(&a));
                    let exit = record
                        .exit_anchor(data)
                        .and_then(|a| a.ok())
                        .map(|a| convert_anchor(&a));
                    entries.push((new_gid, entry, exit));
                }
                if !entries.is_empty() {
                    entries.sort_by_key(|(gid, _, _)| *gid);
                    subtables.push(build_cursive(&entries));
                }
            }
            (TYPE_CURSIVE, subtables)
        }
        PositionSubtables::MarkToBase(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let (Ok(mark_coverage), Ok(base_coverage)) =
                    (subtable.mark_coverage(), subtable.base_coverage())
                else {
                    continue;
                };
                let class_count = subtable.mark_class_count();

                let Ok(mark_array) = subtable.mark_array() else { continue };
                let marks = collect_marks(&mark_coverage, &mark_array, plan);

                let mut bases: Vec<(GlyphId, Vec<Option<Anchor>>)> = Vec::new();
                if let Ok(base_array) = subtable.base_array() {
                    let data = base_array.offset_data();
                    for (gid, record) in base_coverage
                        .iter()
                        .zip(base_array.base_records().iter().filter_map(|r| r.ok()))
                    {
                        let Some(new_gid) = plan.remap16(gid) else { continue };
                        let anchors: Vec<Option<Anchor>> = record
                            .base_anchors(data)
                            .iter()
                            .map(|a| a.and_then(|r| r.ok()).map(|a| convert_anchor(&a)))
                            .collect();
                        bases.push((new_gid, anchors));
                    }
                }
                if marks.is_empty() || bases.is_empty() {
                    continue;
                }
                bases.sort_by_key(|(gid, _)| *gid);
                subtables.push(build_mark_to_base(&marks, &bases, class_count));
            }
            (TYPE_MARK_BASE, subtables)
        }
        PositionSubtables::MarkToLig(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let (Ok(mark_coverage), Ok(lig_coverage)) =
                    (subtable.mark_coverage(), subtable.ligature_coverage())
                else {
                    continue;
                };
                let class_count = subtable.mark_class_count();

                let Ok(mark_array) = subtable.mark_array() else { continue };
                let marks = collect_marks(&mark_coverage, &mark_array, plan);

                let mut ligatures: Vec<(GlyphId, Vec<Vec<Option<Anchor>>>)> = Vec::new();
                if let Ok(lig_array) = subtable.ligature_array() {
                    for (gid, attach) in lig_coverage
                        .iter()
                        .zip(lig_array.ligature_attaches().iter())
                    {
                        let (Some(new_gid), Ok(attach)) = (plan.remap16(gid), attach) else {
                            continue;
                        };
                        let data = attach.offset_data();
                        let components: Vec<Vec<Option<Anchor>>> = attach
                            .component_records()
                            .iter()
                            .filter_map(|r| r.ok())
                            .map(|record| {
                                record
                                    .ligature_anchors(data)
                                    .iter()
                                    .map(|a| {
                                        a.and_then(|r| r.ok()).map(|a| convert_anchor(&a))
                                    })
                                    .collect()
                            })
                            .collect();
                        ligatures.push((new_gid, components));
                    }
                }
                if marks.is_empty() || ligatures.is_empty() {
                    continue;
                }
                ligatures.sort_by_key(|(gid, _)| *gid);
                subtables.push(build_mark_to_lig(&marks, &ligatures, class_count));
            }
            (TYPE_MARK_LIG, subtables)
        }
        PositionSubtables::MarkToMark(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let (Ok(mark1_coverage), Ok(mark2_coverage)) =
                    (subtable.mark1_coverage(), subtable.mark2_coverage())
                else {
                    continue;
                };
                let class_count = subtable.mark_class_count();

                let Ok(mark1_array) = subtable.mark1_array() else { continue };
                let marks = collect_marks(&mark1_coverage, &mark1_array, plan);

                let mut mark2s: Vec<(GlyphId, Vec<Option<Anchor>>)> = Vec::new();
                if let Ok(mark2_array) = subtable.mark2_array() {
                    let data = mark2_array.offset_data();
                    for (gid, record) in mark2_coverage
                        .iter()
                        .zip(mark2_array.mark2_records().iter().filter_map(|r| r.ok()))
                    {
                        let Some(new_gid) = plan.remap16(gid) else { continue };
                        let anchors: Vec<Option<Anchor>> = record
                            .mark2_anchors(data)
                            .iter()
                            .map(|a| a.and_then(|r| r.ok()).map(|a| convert_anchor(&a)))
                            .collect();
                        mark2s.push((new_gid, anchors));
                    }
                }
                if marks.is_empty() || mark2s.is_empty() {
                    continue;
                }
                mark2s.sort_by_key(|(gid, _)| *gid);
                subtables.push(build_mark_to_mark(&marks, &mark2s, class_count));
            }
            (TYPE_MARK_MARK, subtables)
        }
        PositionSubtables::Contextual(_) | PositionSubtables::ChainContextual(_) => {
            debug!("dropping unsupported GPOS lookup kind");
            return None;
        }
    };

    if subtables.is_empty() {
        return None;
    }
    Some(build_lookup(lookup_type, flag.to_bits(), &subtables))
}

fn convert_anchor(anchor: &AnchorTable) -> Anchor {
    // Contour points (format 2) and device tables (format 3) are
    // dropped; the design coordinates always survive.
    match anchor {
        AnchorTable::Format1(t) => Anchor { x: t.x_coordinate(), y: t.y_coordinate() },
        AnchorTable::Format2(t) => Anchor { x: t.x_coordinate(), y: t.y_coordinate() },
        AnchorTable::Format3(t) => Anchor { x: t.x_coordinate(), y: t.y_coordinate() },
    }
}

fn strip_value_record(record: &ReadValueRecord) -> ValueRecord {
    ValueRecord {
        x_placement: record.x_placement().unwrap_or(0),
        y_placement: record.y_placement().unwrap_or(0),
        x_advance: record.x_advance().unwrap_or(0),
        y_advance: record.y_advance().unwrap_or(0),
    }
}

fn collect_marks(
    coverage: &read_fonts::tables::layout::CoverageTable,
    mark_array: &read_fonts::tables::gpos::MarkArray,
    plan: &Plan,
) -> Vec<(GlyphId, u16, Anchor)> {
    let data = mark_array.offset_data();
    let mut marks: Vec<(GlyphId, u16, Anchor)> = coverage
        .iter()
        .zip(mark_array.mark_records())
        .filter_map(|(gid, record)| {
            let new_gid = plan.remap16(gid)?;
            let anchor = record.mark_anchor(data).ok()?;
            Some((new_gid, record.mark_class(), convert_anchor(&anchor)))
        })
        .collect();
    marks.sort_by_key(|(gid, _, _)| *gid);
    marks
}

fn convert_single(subtable: &SinglePos, plan: &Plan) -> Option<Vec<u8>> {
    match subtable {
        SinglePos::Format1(fmt) => {
            let coverage = fmt.coverage().ok()?;
            let mut glyphs: Vec<GlyphId> =
                coverage.iter().filter_map(|gid| plan.remap16(gid)).collect();
            if glyphs.is_empty() {
                return None;
            }
            glyphs.sort();

            let format = fmt.value_format().bits();
            let record = strip_value_record(&fmt.value_record());
            let mut out = Vec::new();
            push_u16(&mut out, 1);
            push_u16(&mut out, (6 + value_record_size(format)) as u16);
            push_u16(&mut out, format);
            push_value_record(&mut out, format, record);
            out.extend_from_slice(&build_coverage(&glyphs));
            Some(out)
        }
        SinglePos::Format2(fmt) => {
            let coverage = fmt.coverage().ok()?;
            let format = fmt.value_format().bits();
            let mut entries: Vec<(GlyphId, ValueRecord)> = coverage
                .iter()
                .zip(fmt.value_records().iter().filter_map(|r| r.ok()))
                .filter_map(|(gid, record)| {
                    plan.remap16(gid).map(|new| (new, strip_value_record(&record)))
                })
                .collect();
            if entries.is_empty() {
                return None;
            }
            entries.sort_by_key(|(gid, _)| *gid);

            let record_size = value_record_size(format);
            let mut out = Vec::new();
            push_u16(&mut out, 2);
            push_u16(&mut out, (8 + entries.len() * record_size) as u16);
            push_u16(&mut out, format);
            push_u16(&mut out, entries.len() as u16);
            for (_, record) in &entries {
                push_value_record(&mut out, format, *record);
            }
            let glyphs: Vec<GlyphId> = entries.iter().map(|(gid, _)| *gid).collect();
            out.extend_from_slice(&build_coverage(&glyphs));
            Some(out)
        }
    }
}

fn convert_pair(subtable: &PairPos, plan: &Plan) -> Option<Vec<u8>> {
    match subtable {
        PairPos::Format1(fmt) => {
            let coverage = fmt.coverage().ok()?;
            let format1 = fmt.value_format1().bits();
            let format2 = fmt.value_format2().bits();

            let mut entries: Vec<(GlyphId, Vec<(GlyphId, ValueRecord, ValueRecord)>)> =
                Vec::new();
            for (gid, pair_set) in coverage.iter().zip(fmt.pair_sets().iter()) {
                let (Some(new_first), Ok(pair_set)) = (plan.remap16(gid), pair_set) else {
                    continue;
                };
                // Pairs whose second glyph is gone are dropped; an empty
                // set drops the first glyph from coverage too.
                let pairs: Vec<(GlyphId, ValueRecord, ValueRecord)> = pair_set
                    .pair_value_records()
                    .iter()
                    .filter_map(|r| r.ok())
                    .filter_map(|record| {
                        let second = plan.remap16(record.second_glyph())?;
                        Some((
                            second,
                            strip_value_record(&record.value_record1()),
                            strip_value_record(&record.value_record2()),
                        ))
                    })
                    .collect();
                if !pairs.is_empty() {
                    entries.push((new_first, pairs));
                }
            }
            if entries.is_empty() {
                return None;
            }
            entries.sort_by_key(|(gid, _)| *gid);

            let record_size = 2 + value_record_size(format1) + value_record_size(format2);
            let sets: Vec<Vec<u8>> = entries
                .iter()
                .map(|(_, pairs)| {
                    let mut set = Vec::with_capacity(2 + pairs.len() * record_size);
                    push_u16(&mut set, pairs.len() as u16);
                    for (second, record1, record2) in pairs {
                        push_u16(&mut set, second.to_u16());
                        push_value_record(&mut set, format1, *record1);
                        push_value_record(&mut set, format2, *record2);
                    }
                    set
                })
                .collect();

            let header = 10 + 2 * sets.len();
            let sets_len: usize = sets.iter().map(Vec::len).sum();
            let mut out = Vec::new();
            push_u16(&mut out, 1);
            push_u16(&mut out, (header + sets_len) as u16);
            push_u16(&mut out, format1);
            push_u16(&mut out, format2);
            push_u16(&mut out, sets.len() as u16);
            let mut offset = header;
            for set in &sets {
                push_u16(&mut out, offset as u16);
                offset += set.len();
            }
            for set in sets {
                out.extend_from_slice(&set);
            }
            let firsts: Vec<GlyphId> = entries.iter().map(|(gid, _)| *gid).collect();
            out.extend_from_slice(&build_coverage(&firsts));
            Some(out)
        }
        PairPos::Format2(fmt) => {
            let coverage = fmt.coverage().ok()?;
            let mut glyphs: Vec<GlyphId> =
                coverage.iter().filter_map(|gid| plan.remap16(gid)).collect();
            if glyphs.is_empty() {
                return None;
            }
            glyphs.sort();

            let format1 = fmt.value_format1().bits();
            let format2 = fmt.value_format2().bits();
            let class1_count = fmt.class1_count();
            let class2_count = fmt.class2_count();

            let class_def1 = fmt.class_def1().ok().map(|cd| remap_class_def(&cd, plan));
            let class_def2 = fmt.class_def2().ok().map(|cd| remap_class_def(&cd, plan));
            let class_def1 = class_def1.unwrap_or_else(|| build_class_def(&[]));
            let class_def2 = class_def2.unwrap_or_else(|| build_class_def(&[]));

            // The class matrix survives intact; only the glyph-indexed
            // structures are rewritten.
            let record_size = value_record_size(format1) + value_record_size(format2);
            let header = 16 + class1_count as usize * class2_count as usize * record_size;

            let mut out = Vec::new();
            push_u16(&mut out, 2);
            push_u16(&mut out, (header + class_def1.len() + class_def2.len()) as u16);
            push_u16(&mut out, format1);
            push_u16(&mut out, format2);
            push_u16(&mut out, header as u16);
            push_u16(&mut out, (header + class_def1.len()) as u16);
            push_u16(&mut out, class1_count);
            push_u16(&mut out, class2_count);
            for class1_record in fmt.class1_records().iter() {
                let Ok(class1_record) = class1_record else {
                    // A short matrix would desynchronize the class
                    // indices; pad with empty records.
                    for _ in 0..class2_count {
                        push_value_record(&mut out, format1, ValueRecord::default());
                        push_value_record(&mut out, format2, ValueRecord::default());
                    }
                    continue;
                };
                for class2_record in class1_record.class2_records().iter() {
                    match class2_record {
                        Ok(record) => {
                            push_value_record(
                                &mut out,
                                format1,
                                strip_value_record(&record.value_record1()),
                            );
                            push_value_record(
                                &mut out,
                                format2,
                                strip_value_record(&record.value_record2()),
                            );
                        }
                        Err(_) => {
                            push_value_record(&mut out, format1, ValueRecord::default());
                            push_value_record(&mut out, format2, ValueRecord::default());
                        }
                    }
                }
            }
            out.extend_from_slice(&class_def1);
            out.extend_from_slice(&class_def2);
            out.extend_from_slice(&build_coverage(&glyphs));
            Some(out)
        }
    }
}

fn remap_class_def(
    class_def: &read_fonts::tables::layout::ClassDef,
    plan: &Plan,
) -> Vec<u8> {
    let mut pairs: Vec<(GlyphId, u16)> = class_def
        .iter()
        .filter_map(|(gid, class)| plan.remap16(gid).map(|new| (new, class)))
        .collect();
    pairs.sort_by_key(|(gid, _)| *gid);
    build_class_def(&pairs)
}

fn build_cursive(entries: &[(GlyphId, Option<Anchor>, Option<Anchor>)]) -> Vec<u8> {
    let header = 6 + entries.len() * 4;
    let mut out = Vec::new();
    push_u16(&mut out, 1);

    let mut anchors: Vec<u8> = Vec::new();
    let mut records: Vec<u8> = Vec::new();
    for (_, entry, exit) in entries {
        for anchor in [entry, exit] {
            match anchor {
                Some(anchor) => {
                    push_u16(&mut records, (header + anchors.len()) as u16);
                    anchors.extend_from_slice(&build_anchor(*anchor));
                }
                None => push_u16(&mut records, 0),
            }
        }
    }

    push_u16(&mut out, (header + anchors.len()) as u16); // coverage offset
    push_u16(&mut out, entries.len() as u16);
    out.extend_from_slice(&records);
    out.extend_from_slice(&anchors);
    let glyphs: Vec<GlyphId> = entries.iter().map(|(gid, _, _)| *gid).collect();
    out.extend_from_slice(&build_coverage(&glyphs));
    out
}

fn build_mark_to_base(
    marks: &[(GlyphId, u16, Anchor)],
    bases: &[(GlyphId, Vec<Option<Anchor>>)],
    class_count: u16,
) -> Vec<u8> {
    let mark_glyphs: Vec<GlyphId> = marks.iter().map(|(gid, _, _)| *gid).collect();
    let base_glyphs: Vec<GlyphId> = bases.iter().map(|(gid, _)| *gid).collect();
    let mark_coverage = build_coverage(&mark_glyphs);
    let base_coverage = build_coverage(&base_glyphs);
    let mark_entries: Vec<(u16, Anchor)> =
        marks.iter().map(|(_, class, anchor)| (*class, *anchor)).collect();
    let mark_array = build_mark_array(&mark_entries);
    let rows: Vec<Vec<Option<Anchor>>> = bases
        .iter()
        .map(|(_, anchors)| normalize_row(anchors, class_count))
        .collect();
    let base_array = build_anchor_matrix(&rows, class_count);

    let header = 12;
    let mut out = Vec::new();
    push_u16(&mut out, 1);
    push_u16(&mut out, header);
    push_u16(&mut out, header + mark_coverage.len() as u16);
    push_u16(&mut out, class_count);
    push_u16(&mut out, header + (mark_coverage.len() + base_coverage.len()) as u16);
    push_u16(
        &mut out,
        header + (mark_coverage.len() + base_coverage.len() + mark_array.len()) as u16,
    );
    out.extend_from_slice(&mark_coverage);
    out.extend_from_slice(&base_coverage);
    out.extend_from_slice(&mark_array);
    out.extend_from_slice(&base_array);
    out
}

fn build_mark_to_lig(
    marks: &[(GlyphId, u16, Anchor)],
    ligatures: &[(GlyphId, Vec<Vec<Option<Anchor>>>)],
    class_count: u16,
) -> Vec<u8> {
    let mark_glyphs: Vec<GlyphId> = marks.iter().map(|(gid, _, _)| *gid).collect();
    let lig_glyphs: Vec<GlyphId> = ligatures.iter().map(|(gid, _)| *gid).collect();
    let mark_coverage = build_coverage(&mark_glyphs);
    let lig_coverage = build_coverage(&lig_glyphs);
    let mark_entries: Vec<(u16, Anchor)> =
        marks.iter().map(|(_, class, anchor)| (*class, *anchor)).collect();
    let mark_array = build_mark_array(&mark_entries);
    let lig_rows: Vec<Vec<Vec<Option<Anchor>>>> = ligatures
        .iter()
        .map(|(_, components)| {
            components
                .iter()
                .map(|row| normalize_row(row, class_count))
                .collect()
        })
        .collect();
    let ligature_array = build_ligature_array(&lig_rows, class_count);

    let header = 12;
    let mut out = Vec::new();
    push_u16(&mut out, 1);
    push_u16(&mut out, header);
    push_u16(&mut out, header + mark_coverage.len() as u16);
    push_u16(&mut out, class_count);
    push_u16(&mut out, header + (mark_coverage.len() + lig_coverage.len()) as u16);
    push_u16(
        &mut out,
        header + (mark_coverage.len() + lig_coverage.len() + mark_array.len()) as u16,
    );
    out.extend_from_slice(&mark_coverage);
    out.extend_from_slice(&lig_coverage);
    out.extend_from_slice(&mark_array);
    out.extend_from_slice(&ligature_array);
    out
}

fn build_mark_to_mark(
    marks: &[(GlyphId, u16, Anchor)],
    mark2s: &[(GlyphId, Vec<Option<Anchor>>)],
    class_count: u16,
) -> Vec<u8> {
    // Same wire shape as mark-to-base with mark2 records as the matrix.
    build_mark_to_base(marks, mark2s, class_count)
}

/// Pad or truncate an anchor row to exactly `class_count` cells.
fn normalize_row(row: &[Option<Anchor>], class_count: u16) -> Vec<Option<Anchor>> {
    let mut row = row.to_vec();
    row.resize(class_count as usize, None);
    row
}
