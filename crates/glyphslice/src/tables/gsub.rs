//! GSUB table rewrite.
//!
//! Only the lookups reachable from the harvested features (`liga` by
//! default) survive. Each supported subtable is filtered against the
//! retained glyph set, remapped to new glyph ids and re-emitted; the rest
//! of the table is the minimal scaffolding from [`super::layout`].
//! Extension-packed lookups are unwrapped and re-emitted inline as their
//! wrapped kind. Contextual, chain-contextual and reverse lookups are
//! soft-dropped.

use font_types::Tag;
use log::debug;
use read_fonts::tables::gsub::{SingleSubst, SubstitutionLookup, SubstitutionSubtables};

use crate::{
    emit::{build_coverage, push_i16, push_u16},
    error::Result,
    plan::Plan,
    tables::layout::{build_layout_table, build_lookup, harvest_lookup_indices},
    types::GlyphId,
};

pub const GSUB: Tag = Tag::new(b"GSUB");

const DEFAULT_FEATURE: Tag = Tag::new(b"liga");

const TYPE_SINGLE: u16 = 1;
const TYPE_MULTIPLE: u16 = 2;
const TYPE_ALTERNATE: u16 = 3;
const TYPE_LIGATURE: u16 = 4;

/// Rewrite GSUB for the plan. `Ok(None)` means the table is dropped
/// entirely (no source table, or nothing survived the filter).
pub fn subset_gsub(plan: &Plan) -> Result<Option<Vec<u8>>> {
    let Some(gsub) = plan.gsub() else {
        return Ok(None);
    };
    let (Ok(feature_list), Ok(lookup_list)) = (gsub.feature_list(), gsub.lookup_list()) else {
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

fn convert_lookup(lookup: &SubstitutionLookup, plan: &Plan) -> Option<Vec<u8>> {
    let flag = lookup.lookup_flag();
    // The enum-level subtable accessor unwraps extension indirection;
    // whatever the source packing, the rewritten lookup is emitted inline
    // as its wrapped kind.
    let (lookup_type, subtables) = match lookup.subtables().ok()? {
        SubstitutionSubtables::Single(tables) => {
            let subtables: Vec<Vec<u8>> = tables
                .iter()
                .filter_map(|s| s.ok())
                .filter_map(|s| convert_single(&s, plan))
                .collect();
            (TYPE_SINGLE, subtables)
        }
        SubstitutionSubtables::Multiple(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                let mut entries: Vec<(GlyphId, Vec<GlyphId>)> = Vec::new();
                for (gid, sequence) in coverage.iter().zip(subtable.sequences().iter()) {
                    let (Some(new_in), Ok(sequence)) = (plan.remap16(gid), sequence) else {
                        continue;
                    };
                    let outs: Option<Vec<GlyphId>> = sequence
                        .substitute_glyph_ids()
                        .iter()
                        .map(|g| plan.remap16(g.get()))
                        .collect();
                    if let Some(outs) = outs {
                        entries.push((new_in, outs));
                    }
                }
                if !entries.is_empty() {
                    entries.sort_by_key(|(gid, _)| *gid);
                    subtables.push(build_sequence_subtable(&entries));
                }
            }
            (TYPE_MULTIPLE, subtables)
        }
        SubstitutionSubtables::Alternate(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                let mut entries: Vec<(GlyphId, Vec<GlyphId>)> = Vec::new();
                for (gid, set) in coverage.iter().zip(subtable.alternate_sets().iter()) {
                    let (Some(new_in), Ok(set)) = (plan.remap16(gid), set) else {
                        continue;
                    };
                    // Alternates that fell out of the subset are dropped
                    // individually; the entry survives while any remain.
                    let alternates: Vec<GlyphId> = set
                        .alternate_glyph_ids()
                        .iter()
                        .filter_map(|g| plan.remap16(g.get()))
                        .collect();
                    if !alternates.is_empty() {
                        entries.push((new_in, alternates));
                    }
                }
                if !entries.is_empty() {
                    entries.sort_by_key(|(gid, _)| *gid);
                    subtables.push(build_sequence_subtable(&entries));
                }
            }
            (TYPE_ALTERNATE, subtables)
        }
        SubstitutionSubtables::Ligature(tables) => {
            let mut subtables = Vec::new();
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                let mut entries: Vec<(GlyphId, Vec<Ligature>)> = Vec::new();
                for (first, set) in coverage.iter().zip(subtable.ligature_sets().iter()) {
                    let (Some(new_first), Ok(set)) = (plan.remap16(first), set) else {
                        continue;
                    };
                    let ligatures: Vec<Ligature> = set
                        .ligatures()
                        .iter()
                        .filter_map(|l| l.ok())
                        .filter_map(|lig| {
                            let glyph = plan.remap16(lig.ligature_glyph())?;
                            let components: Option<Vec<GlyphId>> = lig
                                .component_glyph_ids()
                                .iter()
                                .map(|g| plan.remap16(g.get()))
                                .collect();
                            Some(Ligature { glyph, components: components? })
                        })
                        .collect();
                    if !ligatures.is_empty() {
                        entries.push((new_first, ligatures));
                    }
                }
                if !entries.is_empty() {
                    entries.sort_by_key(|(gid, _)| *gid);
                    subtables.push(build_ligature_subtable(&entries));
                }
            }
            (TYPE_LIGATURE, subtables)
        }
        SubstitutionSubtables::Contextual(_)
        | SubstitutionSubtables::ChainContextual(_)
        | SubstitutionSubtables::Reverse(_) => {
            debug!("dropping unsupported GSUB lookup kind");
            return None;
        }
    };

    if subtables.is_empty() {
        return None;
    }
    Some(build_lookup(lookup_type, flag.to_bits(), &subtables))
}

/// Remapped (input, output) pairs of a single substitution, sorted by
/// input. Pairs where either side fell out of the subset are dropped.
fn convert_single(subtable: &SingleSubst, plan: &Plan) -> Option<Vec<u8>> {
    let mut pairs: Vec<(GlyphId, GlyphId)> = Vec::new();
    match subtable {
        SingleSubst::Format1(fmt) => {
            let coverage = fmt.coverage().ok()?;
            let delta = fmt.delta_glyph_id() as i32;
            for gid in coverage.iter() {
                let out_old = ((gid.to_u32() as i32 + delta) & 0xFFFF) as u16;
                if let (Some(new_in), Some(new_out)) = (
                    plan.remap16(gid),
                    plan.new_gid_for(GlyphId::new(out_old)),
                ) {
                    pairs.push((new_in, new_out));
                }
            }
        }
        SingleSubst::Format2(fmt) => {
            let coverage = fmt.coverage().ok()?;
            for (gid, out) in coverage.iter().zip(fmt.substitute_glyph_ids()) {
                if let (Some(new_in), Some(new_out)) =
                    (plan.remap16(gid), plan.remap16(out.get()))
                {
                    pairs.push((new_in, new_out));
                }
            }
        }
    }
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|(input, _)| *input);
    Some(build_single_subst(&pairs))
}

/// Format 1 when the inputs are consecutive and share one delta, else
/// format 2.
fn build_single_subst(pairs: &[(GlyphId, GlyphId)]) -> Vec<u8> {
    let delta = pairs[0].1.to_u16().wrapping_sub(pairs[0].0.to_u16());
    let uniform_delta = pairs
        .iter()
        .all(|(input, output)| output.to_u16().wrapping_sub(input.to_u16()) == delta);
    let consecutive = pairs
        .windows(2)
        .all(|w| w[0].0.to_u16() + 1 == w[1].0.to_u16());

    let inputs: Vec<GlyphId> = pairs.iter().map(|(input, _)| *input).collect();
    let coverage = build_coverage(&inputs);

    let mut out = Vec::new();
    if uniform_delta && consecutive {
        push_u16(&mut out, 1);
        push_u16(&mut out, 6);
        push_i16(&mut out, delta as i16);
    } else {
        push_u16(&mut out, 2);
        push_u16(&mut out, (6 + 2 * pairs.len()) as u16);
        push_u16(&mut out, pairs.len() as u16);
        for (_, output) in pairs {
            push_u16(&mut out, output.to_u16());
        }
    }
    out.extend_from_slice(&coverage);
    out
}

/// MultipleSubst / AlternateSubst share one wire shape: coverage plus one
/// glyph sequence per covered glyph.
fn build_sequence_subtable(entries: &[(GlyphId, Vec<GlyphId>)]) -> Vec<u8> {
    let sequences: Vec<Vec<u8>> = entries
        .iter()
        .map(|(_, glyphs)| {
            let mut seq = Vec::with_capacity(2 + glyphs.len() * 2);
            push_u16(&mut seq, glyphs.len() as u16);
            for glyph in glyphs {
                push_u16(&mut seq, glyph.to_u16());
            }
            seq
        })
        .collect();

    let header = 6 + 2 * entries.len();
    let sequences_len: usize = sequences.iter().map(Vec::len).sum();

    let mut out = Vec::new();
    push_u16(&mut out, 1);
    push_u16(&mut out, (header + sequences_len) as u16);
    push_u16(&mut out, entries.len() as u16);
    let mut offset = header;
    for seq in &sequences {
        push_u16(&mut out, offset as u16);
        offset += seq.len();
    }
    for seq in sequences {
        out.extend_from_slice(&seq);
    }
    let inputs: Vec<GlyphId> = entries.iter().map(|(gid, _)| *gid).collect();
    out.extend_from_slice(&build_coverage(&inputs));
    out
}

struct Ligature {
    glyph: GlyphId,
    /// Components after the first (which is the coverage glyph).
    components: Vec<GlyphId>,
}

fn build_ligature_subtable(entries: &[(GlyphId, Vec<Ligature>)]) -> Vec<u8> {
    let sets: Vec<Vec<u8>> = entries
        .iter()
        .map(|(_, ligatures)| {
            let bodies: Vec<Vec<u8>> = ligatures
                .iter()
                .map(|lig| {
                    let mut body = Vec::new();
                    push_u16(&mut body, lig.glyph.to_u16());
                    push_u16(&mut body, (lig.components.len() + 1) as u16);
                    for component in &lig.components {
                        push_u16(&mut body, component.to_u16());
                    }
                    body
                })
                .collect();

            let header = 2 + 2 * bodies.len();
            let mut set = Vec::new();
            push_u16(&mut set, bodies.len() as u16);
            let mut offset = header;
            for body in &bodies {
                push_u16(&mut set, offset as u16);
                offset += body.len();
            }
            for body in bodies {
                set.extend_from_slice(&body);
            }
            set
        })
        .collect();

    let header = 6 + 2 * entries.len();
    let sets_len: usize = sets.iter().map(Vec::len).sum();

    let mut out = Vec::new();
    push_u16(&mut out, 1);
    push_u16(&mut out, (header + sets_len) as u16);
    push_u16(&mut out, entries.len() as u16);
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
    out
}
