//! cmap table rewrite.
//!
//! The retained codepoint → new-glyph mapping is emitted as a single
//! subtable: format 12 under (3, 10) when any codepoint lies outside the
//! BMP, format 4 under (3, 1) otherwise.

use font_types::Tag;

use crate::{
    emit::{push_i16, push_u16, push_u32},
    error::Result,
    plan::Plan,
};

pub const CMAP: Tag = Tag::new(b"cmap");

const WINDOWS_PLATFORM: u16 = 3;
const WINDOWS_BMP: u16 = 1;
const WINDOWS_FULL: u16 = 10;

pub fn subset_cmap(plan: &Plan) -> Result<Vec<u8>> {
    let mappings: Vec<(u32, u16)> = plan
        .unicode_map()
        .iter()
        .map(|(cp, gid)| (cp.to_u32(), gid.to_u16()))
        .collect();

    let needs_full_repertoire = mappings.iter().any(|&(cp, _)| cp > 0xFFFF);
    let (encoding, subtable) = if needs_full_repertoire {
        (WINDOWS_FULL, build_format_12(&mappings))
    } else {
        (WINDOWS_BMP, build_format_4(&mappings))
    };

    let mut out = Vec::with_capacity(12 + subtable.len());
    push_u16(&mut out, 0); // version
    push_u16(&mut out, 1); // numTables
    push_u16(&mut out, WINDOWS_PLATFORM);
    push_u16(&mut out, encoding);
    push_u32(&mut out, 12); // subtable follows the single record
    out.extend_from_slice(&subtable);
    Ok(out)
}

/// Format 4 segment: inclusive codepoint range sharing one glyph delta.
struct Segment {
    start: u16,
    end: u16,
    delta: u16,
}

fn build_format_4(mappings: &[(u32, u16)]) -> Vec<u8> {
    let mut segments: Vec<Segment> = Vec::new();
    for &(cp, gid) in mappings {
        let cp = cp as u16;
        let delta = gid.wrapping_sub(cp);
        match segments.last_mut() {
            Some(seg) if seg.delta == delta && seg.end.wrapping_add(1) == cp => seg.end = cp,
            _ => segments.push(Segment { start: cp, end: cp, delta }),
        }
    }
    // Format 4 requires a final 0xFFFF segment. A real mapping for U+FFFF
    // already terminates the array.
    if segments.last().map(|s| s.end) != Some(0xFFFF) {
        segments.push(Segment { start: 0xFFFF, end: 0xFFFF, delta: 1 });
    }

    let seg_count = segments.len() as u16;
    let entry_selector = 15 - seg_count.leading_zeros() as u16;
    let search_range = 2 * (1u16 << entry_selector);
    let range_shift = 2 * seg_count - search_range;
    let length = 16 + 8 * seg_count as u32;

    let mut out = Vec::with_capacity(length as usize);
    push_u16(&mut out, 4);
    push_u16(&mut out, length as u16);
    push_u16(&mut out, 0); // language
    push_u16(&mut out, seg_count * 2);
    push_u16(&mut out, search_range);
    push_u16(&mut out, entry_selector);
    push_u16(&mut out, range_shift);
    for seg in &segments {
        push_u16(&mut out, seg.end);
    }
    push_u16(&mut out, 0); // reservedPad
    for seg in &segments {
        push_u16(&mut out, seg.start);
    }
    for seg in &segments {
        push_i16(&mut out, seg.delta as i16);
    }
    for _ in &segments {
        push_u16(&mut out, 0); // idRangeOffset: delta form only
    }
    out
}

fn build_format_12(mappings: &[(u32, u16)]) -> Vec<u8> {
    // Sequential groups: consecutive codepoints mapping to consecutive
    // glyph ids.
    let mut groups: Vec<(u32, u32, u32)> = Vec::new();
    for &(cp, gid) in mappings {
        let gid = gid as u32;
        match groups.last_mut() {
            Some((start, end, start_gid))
                if *end + 1 == cp && *start_gid + (cp - *start) == gid =>
            {
                *end = cp;
            }
            _ => groups.push((cp, cp, gid)),
        }
    }

    let length = 16 + 12 * groups.len() as u32;
    let mut out = Vec::with_capacity(length as usize);
    push_u16(&mut out, 12);
    push_u16(&mut out, 0); // reserved
    push_u32(&mut out, length);
    push_u32(&mut out, 0); // language
    push_u32(&mut out, groups.len() as u32);
    for (start, end, start_gid) in groups {
        push_u32(&mut out, start);
        push_u32(&mut out, end);
        push_u32(&mut out, start_gid);
    }
    out
}

#[cfg(test)]
mod tests {
    use read_fonts::{FontData, FontRead, tables::cmap::Cmap};

    use super::*;

    fn lookup(cmap_bytes: &[u8], cp: u32) -> Option<u32> {
        let cmap = Cmap::read(FontData::new(cmap_bytes)).unwrap();
        cmap.map_codepoint(cp).map(|gid| gid.to_u32())
    }

    fn wrap(subtable: Vec<u8>, encoding: u16) -> Vec<u8> {
        let mut out = Vec::new();
        push_u16(&mut out, 0);
        push_u16(&mut out, 1);
        push_u16(&mut out, WINDOWS_PLATFORM);
        push_u16(&mut out, encoding);
        push_u32(&mut out, 12);
        out.extend_from_slice(&subtable);
        out
    }

    #[test]
    fn format_4_round_trips() {
        // Two runs with distinct deltas plus an isolated mapping.
        let mappings = vec![(0x41, 1), (0x42, 2), (0x43, 3), (0x61, 9), (0x7A, 4)];
        let bytes = wrap(build_format_4(&mappings), WINDOWS_BMP);
        for &(cp, gid) in &mappings {
            assert_eq!(lookup(&bytes, cp), Some(gid as u32), "U+{cp:04X}");
        }
        assert_eq!(lookup(&bytes, 0x44), None);
        assert_eq!(lookup(&bytes, 0x40), None);
    }

    #[test]
    fn format_4_segment_runs_share_delta() {
        let mappings = vec![(0x41, 5), (0x42, 6), (0x43, 7)];
        let subtable = build_format_4(&mappings);
        // segCountX2 at offset 6: one shared-delta segment + terminator.
        assert_eq!(u16::from_be_bytes([subtable[6], subtable[7]]), 4);
    }

    #[test]
    fn format_4_search_params() {
        // Three segments (two runs + terminator): searchRange = 2*2^1,
        // entrySelector = 1, rangeShift = 2*3 - 4.
        let mappings = vec![(0x41, 1), (0x50, 9)];
        let subtable = build_format_4(&mappings);
        assert_eq!(u16::from_be_bytes([subtable[6], subtable[7]]), 6);
        assert_eq!(u16::from_be_bytes([subtable[8], subtable[9]]), 4);
        assert_eq!(u16::from_be_bytes([subtable[10], subtable[11]]), 1);
        assert_eq!(u16::from_be_bytes([subtable[12], subtable[13]]), 2);
    }

    #[test]
    fn format_12_round_trips_supplementary() {
        let mappings = vec![(0x41, 1), (0x1F600, 2), (0x1F601, 3)];
        let bytes = wrap(build_format_12(&mappings), WINDOWS_FULL);
        assert_eq!(lookup(&bytes, 0x41), Some(1));
        assert_eq!(lookup(&bytes, 0x1F600), Some(2));
        assert_eq!(lookup(&bytes, 0x1F601), Some(3));
        assert_eq!(lookup(&bytes, 0x1F602), None);
    }

    #[test]
    fn format_12_groups_consecutive_runs() {
        let mappings = vec![(0x1F600, 10), (0x1F601, 11), (0x1F603, 12)];
        let subtable = build_format_12(&mappings);
        let num_groups = u32::from_be_bytes(subtable[12..16].try_into().unwrap());
        assert_eq!(num_groups, 2);
    }
}
