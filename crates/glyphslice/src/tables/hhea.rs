//! hhea table rewrite.

use font_types::Tag;

use crate::{
    emit::patch_u16,
    error::{Error, Result},
    plan::Plan,
};

pub const HHEA: Tag = Tag::new(b"hhea");

const NUMBER_OF_H_METRICS_OFFSET: usize = 34;
const HHEA_LEN: usize = 36;

/// Copy the source `hhea` and overwrite `numberOfHMetrics`: the subset
/// hmtx always carries one long metric per output glyph.
pub fn subset_hhea(plan: &Plan) -> Result<Vec<u8>> {
    let data = plan
        .table_bytes(HHEA)
        .ok_or(Error::MissingRequiredTable(HHEA))?;
    if data.len() < HHEA_LEN {
        return Err(Error::MissingRequiredTable(HHEA));
    }
    let mut out = data.to_vec();
    patch_u16(&mut out, NUMBER_OF_H_METRICS_OFFSET, plan.num_output_glyphs());
    Ok(out)
}
