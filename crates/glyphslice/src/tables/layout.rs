//! Shared GSUB/GPOS assembly: feature harvesting, lookup wrapping, and
//! the minimal script/feature scaffolding of an emitted layout table.

use std::collections::BTreeSet;

use font_types::Tag;
use log::debug;
use read_fonts::tables::layout::FeatureList;

use crate::emit::{push_u16, push_u32};

pub const DFLT_SCRIPT: Tag = Tag::new(b"DFLT");

/// `lookupFlag` bit for mark-filtering sets; stripped on output because
/// the set indices are not carried across the subset.
const USE_MARK_FILTERING_SET: u16 = 0x0010;

/// Lookup indices referenced by the harvested features, deduplicated and
/// in source order. An empty `filter` selects `default_feature` only.
pub fn harvest_lookup_indices(
    feature_list: &FeatureList,
    filter: &BTreeSet<Tag>,
    default_feature: Tag,
) -> BTreeSet<u16> {
    let mut indices = BTreeSet::new();
    let records = feature_list.feature_records();
    for record in records {
        let tag = record.feature_tag();
        let selected = if filter.is_empty() {
            tag == default_feature
        } else {
            filter.contains(&tag)
        };
        if !selected {
            continue;
        }
        if let Ok(feature) = record.feature(feature_list.offset_data()) {
            indices.extend(feature.lookup_list_indices().iter().map(|idx| idx.get()));
        }
    }
    indices
}

/// Wrap rewritten subtables into a lookup table:
/// `{type, flag, count, offsets…, bodies…}`.
pub fn build_lookup(lookup_type: u16, lookup_flag: u16, subtables: &[Vec<u8>]) -> Vec<u8> {
    let mut flag = lookup_flag;
    if flag & USE_MARK_FILTERING_SET != 0 {
        debug!("stripping mark-filtering-set from lookup type {lookup_type}");
        flag &= !USE_MARK_FILTERING_SET;
    }

    let header = 6 + 2 * subtables.len();
    let mut out = Vec::with_capacity(header);
    push_u16(&mut out, lookup_type);
    push_u16(&mut out, flag);
    push_u16(&mut out, subtables.len() as u16);
    let mut offset = header;
    for subtable in subtables {
        push_u16(&mut out, offset as u16);
        offset += subtable.len();
    }
    for subtable in subtables {
        out.extend_from_slice(subtable);
    }
    out
}

/// Assemble a complete GSUB or GPOS table around the given lookups: one
/// `DFLT` script with a default language system referencing feature 0,
/// and a single feature (tagged `feature_tag`) pointing at every lookup.
pub fn build_layout_table(feature_tag: Tag, lookups: &[Vec<u8>]) -> Vec<u8> {
    let lookup_count = lookups.len();

    // ScriptList: one record, one script, one default LangSys.
    let mut script_list = Vec::new();
    push_u16(&mut script_list, 1);
    script_list.extend_from_slice(&DFLT_SCRIPT.to_be_bytes());
    push_u16(&mut script_list, 8); // script table follows the record
    // Script: default LangSys at 4, no LangSysRecords.
    push_u16(&mut script_list, 4);
    push_u16(&mut script_list, 0);
    // LangSys: no reordering, no required feature, feature index 0.
    push_u16(&mut script_list, 0);
    push_u16(&mut script_list, 0xFFFF);
    push_u16(&mut script_list, 1);
    push_u16(&mut script_list, 0);

    // FeatureList: a single feature holding every lookup index.
    let mut feature_list = Vec::new();
    push_u16(&mut feature_list, 1);
    feature_list.extend_from_slice(&feature_tag.to_be_bytes());
    push_u16(&mut feature_list, 8); // feature table follows the record
    push_u16(&mut feature_list, 0); // featureParams
    push_u16(&mut feature_list, lookup_count as u16);
    for index in 0..lookup_count {
        push_u16(&mut feature_list, index as u16);
    }

    // LookupList.
    let mut lookup_list = Vec::new();
    push_u16(&mut lookup_list, lookup_count as u16);
    let lookup_header = 2 + 2 * lookup_count;
    let mut offset = lookup_header;
    for lookup in lookups {
        push_u16(&mut lookup_list, offset as u16);
        offset += lookup.len();
    }
    for lookup in lookups {
        lookup_list.extend_from_slice(lookup);
    }

    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000);
    let header = 10;
    push_u16(&mut out, header);
    push_u16(&mut out, (header as usize + script_list.len()) as u16);
    push_u16(
        &mut out,
        (header as usize + script_list.len() + feature_list.len()) as u16,
    );
    out.extend_from_slice(&script_list);
    out.extend_from_slice(&feature_list);
    out.extend_from_slice(&lookup_list);
    out
}
