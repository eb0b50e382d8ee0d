//! glyf + loca rewrite (TrueType outlines).
//!
//! Glyph data passes through byte for byte; only composite component
//! indices are patched in place. When the plan is instanced, simple glyphs
//! are instead re-pointed through gvar and re-serialized from scratch.
//! Composite outlines are not delta-adjusted.

use font_types::Tag;
use log::debug;
use read_fonts::tables::glyf::Glyph;

use crate::{
    emit::{push_i16, push_u16, push_u32},
    error::{Error, Result},
    instance::{CurvePt, InstancedOutline},
    plan::Plan,
    types::GlyphId,
};

pub const GLYF: Tag = Tag::new(b"glyf");
pub const LOCA: Tag = Tag::new(b"loca");

// Composite component flags.
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

// Simple glyph point flags.
const ON_CURVE_POINT: u8 = 0x01;
const X_SHORT_VECTOR: u8 = 0x02;
const Y_SHORT_VECTOR: u8 = 0x04;
const X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR: u8 = 0x10;
const Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR: u8 = 0x20;

pub struct GlyfLoca {
    pub glyf: Vec<u8>,
    pub loca: Vec<u8>,
}

/// Rebuild `glyf` and emit a long-format `loca` for the output glyph
/// order.
pub fn subset_glyf(plan: &Plan) -> Result<GlyfLoca> {
    let glyf_data = plan
        .table_bytes(GLYF)
        .ok_or(Error::MissingRequiredTable(GLYF))?;
    let loca_offsets = parse_loca(plan)?;

    let mut glyf = Vec::new();
    let mut loca = Vec::with_capacity((plan.num_output_glyphs() as usize + 1) * 4);
    push_u32(&mut loca, 0);

    for new_gid in 0..plan.num_output_glyphs() {
        if let Some(old) = plan.old_gid_for(GlyphId::new(new_gid)) {
            let bytes = raw_glyph(glyf_data, &loca_offsets, old)?;
            if !bytes.is_empty() {
                let num_contours = i16::from_be_bytes([bytes[0], bytes[1]]);
                if num_contours < 0 {
                    glyf.extend_from_slice(&remap_composite(bytes, plan, old)?);
                } else if let Some(outline) = instanced_outline(plan, old) {
                    let instructions = if plan.strip_hinting() {
                        &[][..]
                    } else {
                        source_instructions(bytes, num_contours as usize)
                    };
                    glyf.extend_from_slice(&serialize_simple(&outline, instructions));
                } else {
                    glyf.extend_from_slice(bytes);
                }
            }
        }
        if glyf.len() % 2 != 0 {
            glyf.push(0);
        }
        push_u32(&mut loca, glyf.len() as u32);
    }

    Ok(GlyfLoca { glyf, loca })
}

/// Decode the source loca offsets, honoring the source
/// `indexToLocFormat`.
fn parse_loca(plan: &Plan) -> Result<Vec<u32>> {
    let data = plan
        .table_bytes(LOCA)
        .ok_or(Error::MissingRequiredTable(LOCA))?;
    let long = plan.source_long_loca();
    let mut offsets = Vec::new();
    if long {
        for chunk in data.chunks_exact(4) {
            offsets.push(u32::from_be_bytes(chunk.try_into().unwrap()));
        }
    } else {
        for chunk in data.chunks_exact(2) {
            offsets.push(u16::from_be_bytes(chunk.try_into().unwrap()) as u32 * 2);
        }
    }
    Ok(offsets)
}

fn raw_glyph<'a>(glyf: &'a [u8], offsets: &[u32], gid: GlyphId) -> Result<&'a [u8]> {
    let index = gid.to_u16() as usize;
    let (Some(&start), Some(&end)) = (offsets.get(index), offsets.get(index + 1)) else {
        return Err(Error::InvalidGlyphReference(gid));
    };
    glyf.get(start as usize..end as usize)
        .ok_or(Error::InvalidGlyphReference(gid))
}

/// Rewrite the component glyph indices of a composite glyph in place.
fn remap_composite(bytes: &[u8], plan: &Plan, gid: GlyphId) -> Result<Vec<u8>> {
    let mut out = bytes.to_vec();
    let mut pos = 10;
    loop {
        if pos + 4 > out.len() {
            return Err(Error::InvalidGlyphReference(gid));
        }
        let flags = u16::from_be_bytes([out[pos], out[pos + 1]]);
        let component = GlyphId::new(u16::from_be_bytes([out[pos + 2], out[pos + 3]]));
        let new = plan
            .new_gid_for(component)
            .ok_or(Error::InvalidGlyphReference(component))?;
        out[pos + 2..pos + 4].copy_from_slice(&new.to_u16().to_be_bytes());

        pos += 4;
        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            return Ok(out);
        }
    }
}

/// Re-pointed outline for an instanced plan, or `None` to pass the source
/// bytes through.
fn instanced_outline(plan: &Plan, old: GlyphId) -> Option<InstancedOutline> {
    let instancer = plan.instancer()?;
    let (glyf, loca) = (plan.glyf()?, plan.loca()?);
    match loca.get_glyf(old.to_read(), glyf) {
        Ok(Some(Glyph::Simple(simple))) => instancer.repoint_simple(&simple, old),
        Ok(_) => None,
        Err(e) => {
            debug!("skipping deltas for unreadable glyph {old}: {e}");
            None
        }
    }
}

/// Slice the instruction bytes out of a simple glyph's source data.
fn source_instructions(bytes: &[u8], num_contours: usize) -> &[u8] {
    let instr_len_at = 10 + num_contours * 2;
    let Some(len_bytes) = bytes.get(instr_len_at..instr_len_at + 2) else {
        return &[];
    };
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    bytes.get(instr_len_at + 2..instr_len_at + 2 + len).unwrap_or(&[])
}

/// Serialize a simple glyph from scratch: header with a recomputed
/// bounding box, flags with short/same compaction, delta-encoded
/// coordinates.
fn serialize_simple(outline: &InstancedOutline, instructions: &[u8]) -> Vec<u8> {
    let points: Vec<CurvePt> = outline.contours.iter().flatten().copied().collect();
    if points.is_empty() {
        return Vec::new();
    }

    let x_min = points.iter().map(|p| p.x).min().unwrap();
    let x_max = points.iter().map(|p| p.x).max().unwrap();
    let y_min = points.iter().map(|p| p.y).min().unwrap();
    let y_max = points.iter().map(|p| p.y).max().unwrap();

    let mut out = Vec::new();
    push_i16(&mut out, outline.contours.len() as i16);
    push_i16(&mut out, x_min);
    push_i16(&mut out, y_min);
    push_i16(&mut out, x_max);
    push_i16(&mut out, y_max);

    let mut end = 0usize;
    for contour in &outline.contours {
        end += contour.len();
        push_u16(&mut out, (end - 1) as u16);
    }

    push_u16(&mut out, instructions.len() as u16);
    out.extend_from_slice(instructions);

    let mut flags = Vec::with_capacity(points.len());
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let (mut prev_x, mut prev_y) = (0i16, 0i16);
    for point in &points {
        let dx = point.x as i32 - prev_x as i32;
        let dy = point.y as i32 - prev_y as i32;
        let mut flag = if point.on_curve { ON_CURVE_POINT } else { 0 };

        if dx == 0 {
            flag |= X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR;
        } else if dx.abs() <= 255 {
            flag |= X_SHORT_VECTOR;
            if dx > 0 {
                flag |= X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR;
            }
            xs.push(dx.unsigned_abs() as u8);
        } else {
            xs.extend_from_slice(&(dx as i16).to_be_bytes());
        }

        if dy == 0 {
            flag |= Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR;
        } else if dy.abs() <= 255 {
            flag |= Y_SHORT_VECTOR;
            if dy > 0 {
                flag |= Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR;
            }
            ys.push(dy.unsigned_abs() as u8);
        } else {
            ys.extend_from_slice(&(dy as i16).to_be_bytes());
        }

        flags.push(flag);
        (prev_x, prev_y) = (point.x, point.y);
    }

    out.extend_from_slice(&flags);
    out.extend_from_slice(&xs);
    out.extend_from_slice(&ys);
    out
}
