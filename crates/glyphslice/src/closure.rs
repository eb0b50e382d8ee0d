//! Glyph-set closure over composite components and GSUB substitutions.
//!
//! Both closures are fixed-point iterations on a shared set. Cycles in
//! composite references terminate naturally because membership is checked
//! before insertion; there is no recursive descent.

use std::collections::BTreeSet;

use log::debug;
use read_fonts::tables::{
    glyf::{Glyf, Glyph},
    gsub::{Gsub, SingleSubst, SubstitutionLookup, SubstitutionSubtables},
    loca::Loca,
};

use crate::types::GlyphId;

/// Expand `glyph_set` with every glyph referenced as a composite
/// component, transitively.
pub fn composite_closure(glyf: &Glyf, loca: &Loca, glyph_set: &mut BTreeSet<GlyphId>) {
    loop {
        let mut additions: Vec<GlyphId> = Vec::new();
        for &gid in glyph_set.iter() {
            let Ok(Some(Glyph::Composite(composite))) = loca.get_glyf(gid.to_read(), glyf) else {
                continue;
            };
            for component in composite.components() {
                let component = GlyphId::from(component.glyph);
                if !glyph_set.contains(&component) {
                    additions.push(component);
                }
            }
        }
        if additions.is_empty() {
            return;
        }
        glyph_set.extend(additions);
    }
}

/// Expand `glyph_set` with every glyph a GSUB lookup can produce from it.
///
/// Single, multiple, alternate and ligature substitutions participate;
/// extension-packed lookups are resolved to their wrapped kind first.
/// Contextual, chain-contextual and reverse lookups are out of scope and
/// contribute nothing.
pub fn gsub_closure(gsub: &Gsub, glyph_set: &mut BTreeSet<GlyphId>) {
    let Ok(lookup_list) = gsub.lookup_list() else {
        return;
    };

    loop {
        let mut additions: Vec<GlyphId> = Vec::new();
        for lookup in lookup_list.lookups().iter().filter_map(|l| l.ok()) {
            collect_lookup_outputs(&lookup, glyph_set, &mut additions);
        }
        additions.retain(|gid| !glyph_set.contains(gid));
        if additions.is_empty() {
            return;
        }
        glyph_set.extend(additions);
    }
}

fn collect_lookup_outputs(
    lookup: &SubstitutionLookup,
    glyph_set: &BTreeSet<GlyphId>,
    additions: &mut Vec<GlyphId>,
) {
    // The enum-level subtable accessor unwraps extension indirection, so
    // extension-packed lookups close exactly like inline ones.
    let Ok(subtables) = lookup.subtables() else {
        return;
    };
    match subtables {
        SubstitutionSubtables::Single(tables) => {
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                match subtable {
                    SingleSubst::Format1(fmt) => {
                        let Ok(coverage) = fmt.coverage() else { continue };
                        let delta = fmt.delta_glyph_id() as i32;
                        for gid in coverage.iter() {
                            let input = GlyphId::from(gid);
                            if glyph_set.contains(&input) {
                                let out = ((input.to_u16() as i32 + delta) & 0xFFFF) as u16;
                                additions.push(GlyphId::new(out));
                            }
                        }
                    }
                    SingleSubst::Format2(fmt) => {
                        let Ok(coverage) = fmt.coverage() else { continue };
                        for (gid, out) in coverage.iter().zip(fmt.substitute_glyph_ids()) {
                            if glyph_set.contains(&GlyphId::from(gid)) {
                                additions.push(GlyphId::from(out.get()));
                            }
                        }
                    }
                }
            }
        }
        SubstitutionSubtables::Multiple(tables) => {
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                for (gid, sequence) in coverage.iter().zip(subtable.sequences().iter()) {
                    let Ok(sequence) = sequence else { continue };
                    if glyph_set.contains(&GlyphId::from(gid)) {
                        additions.extend(
                            sequence
                                .substitute_glyph_ids()
                                .iter()
                                .map(|g| GlyphId::from(g.get())),
                        );
                    }
                }
            }
        }
        SubstitutionSubtables::Alternate(tables) => {
            // Conservative: any alternate can be selected, keep them all.
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                for (gid, set) in coverage.iter().zip(subtable.alternate_sets().iter()) {
                    let Ok(set) = set else { continue };
                    if glyph_set.contains(&GlyphId::from(gid)) {
                        additions.extend(
                            set.alternate_glyph_ids()
                                .iter()
                                .map(|g| GlyphId::from(g.get())),
                        );
                    }
                }
            }
        }
        SubstitutionSubtables::Ligature(tables) => {
            for subtable in tables.iter().filter_map(|s| s.ok()) {
                let Ok(coverage) = subtable.coverage() else { continue };
                for (first, set) in coverage.iter().zip(subtable.ligature_sets().iter()) {
                    let Ok(set) = set else { continue };
                    if !glyph_set.contains(&GlyphId::from(first)) {
                        continue;
                    }
                    for ligature in set.ligatures().iter().filter_map(|l| l.ok()) {
                        let all_components_retained = ligature
                            .component_glyph_ids()
                            .iter()
                            .all(|g| glyph_set.contains(&GlyphId::from(g.get())));
                        if all_components_retained {
                            additions.push(GlyphId::from(ligature.ligature_glyph()));
                        }
                    }
                }
            }
        }
        SubstitutionSubtables::Contextual(_)
        | SubstitutionSubtables::ChainContextual(_)
        | SubstitutionSubtables::Reverse(_) => {
            debug!("glyph closure skips contextual/reverse GSUB lookups");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The closure logic is exercised end to end in tests/subset_tests.rs
    // against synthetic GSUB tables; here we only pin down the set
    // semantics that do not need a font.

    #[test]
    fn additions_do_not_grow_without_new_glyphs() {
        let mut set: BTreeSet<GlyphId> = [GlyphId::new(0), GlyphId::new(3)].into();
        let mut additions = vec![GlyphId::new(3), GlyphId::new(0)];
        additions.retain(|gid| !set.contains(gid));
        assert!(additions.is_empty());
        set.extend(additions);
        assert_eq!(set.len(), 2);
    }
}
