//! GDEF table rewrite.
//!
//! Emitted independently of any feature: glyph classes, attachment
//! points, ligature carets and mark-attachment classes are filtered to
//! the retained glyphs and remapped. Mark glyph sets survive only for
//! source version 1.2; caret devices (format 3) are downgraded to plain
//! coordinates. The table is dropped when every substructure filters
//! empty.

use font_types::Tag;
use log::debug;
use read_fonts::tables::gdef::CaretValue;

use crate::{
    emit::{build_class_def, build_coverage, push_i16, push_u16, push_u32},
    error::Result,
    plan::Plan,
    types::GlyphId,
};

pub const GDEF: Tag = Tag::new(b"GDEF");

pub fn subset_gdef(plan: &Plan) -> Result<Option<Vec<u8>>> {
    let Some(gdef) = plan.gdef() else {
        return Ok(None);
    };

    let glyph_class_def = gdef
        .glyph_class_def()
        .and_then(|cd| cd.ok())
        .and_then(|cd| remap_class_def_bytes(&cd, plan));
    let attach_list = gdef
        .attach_list()
        .and_then(|al| al.ok())
        .and_then(|al| build_attach_list(&al, plan));
    let lig_caret_list = gdef
        .lig_caret_list()
        .and_then(|lc| lc.ok())
        .and_then(|lc| build_lig_caret_list(&lc, plan));
    let mark_attach_class_def = gdef
        .mark_attach_class_def()
        .and_then(|cd| cd.ok())
        .and_then(|cd| remap_class_def_bytes(&cd, plan));

    // Mark glyph sets exist from version 1.2 on; mirror the source
    // version in the output.
    let mark_glyph_sets = gdef
        .mark_glyph_sets_def()
        .and_then(|ms| ms.ok())
        .map(|ms| build_mark_glyph_sets(&ms, plan));

    if glyph_class_def.is_none()
        && attach_list.is_none()
        && lig_caret_list.is_none()
        && mark_attach_class_def.is_none()
        && mark_glyph_sets.is_none()
    {
        return Ok(None);
    }

    let minor_version: u16 = if mark_glyph_sets.is_some() { 2 } else { 0 };
    let header = if minor_version == 2 { 14 } else { 12 };

    let mut out = Vec::new();
    push_u16(&mut out, 1);
    push_u16(&mut out, minor_version);

    let mut offset = header;
    let mut offsets = Vec::new();
    for body in [
        &glyph_class_def,
        &attach_list,
        &lig_caret_list,
        &mark_attach_class_def,
    ] {
        match body {
            Some(bytes) => {
                offsets.push(offset as u16);
                offset += bytes.len();
            }
            None => offsets.push(0),
        }
    }
    let mark_sets_offset = mark_glyph_sets.as_ref().map(|bytes| {
        let at = offset as u16;
        offset += bytes.len();
        at
    });

    for o in offsets {
        push_u16(&mut out, o);
    }
    if minor_version == 2 {
        push_u16(&mut out, mark_sets_offset.unwrap_or(0));
    }
    for body in [
        glyph_class_def,
        attach_list,
        lig_caret_list,
        mark_attach_class_def,
        mark_glyph_sets,
    ]
    .into_iter()
    .flatten()
    {
        out.extend_from_slice(&body);
    }
    Ok(Some(out))
}

fn remap_class_def_bytes(
    class_def: &read_fonts::tables::layout::ClassDef,
    plan: &Plan,
) -> Option<Vec<u8>> {
    let mut pairs: Vec<(GlyphId, u16)> = class_def
        .iter()
        .filter(|(_, class)| *class != 0)
        .filter_map(|(gid, class)| plan.remap16(gid).map(|new| (new, class)))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|(gid, _)| *gid);
    Some(build_class_def(&pairs))
}

fn build_attach_list(
    attach_list: &read_fonts::tables::gdef::AttachList,
    plan: &Plan,
) -> Option<Vec<u8>> {
    let coverage = attach_list.coverage().ok()?;
    let mut entries: Vec<(GlyphId, Vec<u16>)> = Vec::new();
    for (gid, point) in coverage.iter().zip(attach_list.attach_points().iter()) {
        let (Some(new_gid), Ok(point)) = (plan.remap16(gid), point) else {
            continue;
        };
        // Contour point indices are glyph-internal and survive verbatim.
        let indices: Vec<u16> = point.point_indices().iter().map(|i| i.get()).collect();
        entries.push((new_gid, indices));
    }
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(|(gid, _)| *gid);

    let points: Vec<Vec<u8>> = entries
        .iter()
        .map(|(_, indices)| {
            let mut point = Vec::with_capacity(2 + indices.len() * 2);
            push_u16(&mut point, indices.len() as u16);
            for index in indices {
                push_u16(&mut point, *index);
            }
            point
        })
        .collect();

    let header = 4 + 2 * entries.len();
    let points_len: usize = points.iter().map(Vec::len).sum();
    let mut out = Vec::new();
    push_u16(&mut out, (header + points_len) as u16); // coverage offset
    push_u16(&mut out, entries.len() as u16);
    let mut offset = header;
    for point in &points {
        push_u16(&mut out, offset as u16);
        offset += point.len();
    }
    for point in points {
        out.extend_from_slice(&point);
    }
    let glyphs: Vec<GlyphId> = entries.iter().map(|(gid, _)| *gid).collect();
    out.extend_from_slice(&build_coverage(&glyphs));
    Some(out)
}

/// A caret value after device stripping.
enum Caret {
    Coordinate(i16),
    PointIndex(u16),
}

fn build_lig_caret_list(
    lig_caret_list: &read_fonts::tables::gdef::LigCaretList,
    plan: &Plan,
) -> Option<Vec<u8>> {
    let coverage = lig_caret_list.coverage().ok()?;
    let mut entries: Vec<(GlyphId, Vec<Caret>)> = Vec::new();
    for (gid, lig_glyph) in coverage.iter().zip(lig_caret_list.lig_glyphs().iter()) {
        let (Some(new_gid), Ok(lig_glyph)) = (plan.remap16(gid), lig_glyph) else {
            continue;
        };
        let carets: Vec<Caret> = lig_glyph
            .caret_values()
            .iter()
            .filter_map(|cv| cv.ok())
            .map(|cv| match cv {
                CaretValue::Format1(f) => Caret::Coordinate(f.coordinate()),
                CaretValue::Format2(f) => Caret::PointIndex(f.caret_value_point_index()),
                CaretValue::Format3(f) => {
                    debug!("downgrading device caret to a plain coordinate");
                    Caret::Coordinate(f.coordinate())
                }
            })
            .collect();
        if !carets.is_empty() {
            entries.push((new_gid, carets));
        }
    }
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(|(gid, _)| *gid);

    let lig_glyphs: Vec<Vec<u8>> = entries
        .iter()
        .map(|(_, carets)| {
            let header = 2 + 2 * carets.len();
            let mut body = Vec::new();
            push_u16(&mut body, carets.len() as u16);
            for (i, _) in carets.iter().enumerate() {
                push_u16(&mut body, (header + i * 4) as u16);
            }
            for caret in carets {
                match caret {
                    Caret::Coordinate(coordinate) => {
                        push_u16(&mut body, 1);
                        push_i16(&mut body, *coordinate);
                    }
                    Caret::PointIndex(index) => {
                        push_u16(&mut body, 2);
                        push_u16(&mut body, *index);
                    }
                }
            }
            body
        })
        .collect();

    let header = 4 + 2 * entries.len();
    let bodies_len: usize = lig_glyphs.iter().map(Vec::len).sum();
    let mut out = Vec::new();
    push_u16(&mut out, (header + bodies_len) as u16); // coverage offset
    push_u16(&mut out, entries.len() as u16);
    let mut offset = header;
    for body in &lig_glyphs {
        push_u16(&mut out, offset as u16);
        offset += body.len();
    }
    for body in lig_glyphs {
        out.extend_from_slice(&body);
    }
    let glyphs: Vec<GlyphId> = entries.iter().map(|(gid, _)| *gid).collect();
    out.extend_from_slice(&build_coverage(&glyphs));
    Some(out)
}

fn build_mark_glyph_sets(
    mark_glyph_sets: &read_fonts::tables::gdef::MarkGlyphSets,
    plan: &Plan,
) -> Vec<u8> {
    // Set indices are referenced by lookup flags, so every set survives
    // even when its coverage filters empty.
    let coverages: Vec<Vec<u8>> = mark_glyph_sets
        .coverages()
        .iter()
        .map(|coverage| {
            let mut glyphs: Vec<GlyphId> = coverage
                .ok()
                .map(|cov| cov.iter().filter_map(|gid| plan.remap16(gid)).collect())
                .unwrap_or_default();
            glyphs.sort();
            build_coverage(&glyphs)
        })
        .collect();

    let header = 4 + 4 * coverages.len();
    let mut out = Vec::new();
    push_u16(&mut out, 1);
    push_u16(&mut out, coverages.len() as u16);
    let mut offset = header;
    for coverage in &coverages {
        push_u32(&mut out, offset as u32);
        offset += coverage.len();
    }
    for coverage in coverages {
        out.extend_from_slice(&coverage);
    }
    out
}

#[cfg(test)]
mod tests {
    use read_fonts::{FontData, FontRead, tables::layout::CoverageTable};

    use super::*;

    #[test]
    fn mark_glyph_sets_header_uses_long_offsets() {
        // Hand-check the layout rules this builder relies on: the first
        // coverage must land right after the 32-bit offset array.
        let coverage = build_coverage(&[GlyphId::new(3)]);
        let header = 4 + 4 * 2;
        let mut out = Vec::new();
        push_u16(&mut out, 1);
        push_u16(&mut out, 2);
        push_u32(&mut out, header as u32);
        push_u32(&mut out, (header + coverage.len()) as u32);
        out.extend_from_slice(&coverage);
        out.extend_from_slice(&coverage);

        let parsed =
            read_fonts::tables::gdef::MarkGlyphSets::read(FontData::new(&out)).unwrap();
        assert_eq!(parsed.mark_glyph_set_count(), 2);
        let first = parsed.coverages().get(0).unwrap();
        match first {
            CoverageTable::Format1(f) => assert_eq!(f.glyph_count(), 1),
            CoverageTable::Format2(_) => panic!("expected format 1"),
        }
    }
}
