//! maxp table rewrite.

use font_types::Tag;

use crate::{
    emit::patch_u16,
    error::{Error, Result},
    plan::Plan,
};

pub const MAXP: Tag = Tag::new(b"maxp");

const NUM_GLYPHS_OFFSET: usize = 4;

/// Copy the source `maxp` and overwrite `numGlyphs`.
pub fn subset_maxp(plan: &Plan) -> Result<Vec<u8>> {
    let data = plan
        .table_bytes(MAXP)
        .ok_or(Error::MissingRequiredTable(MAXP))?;
    if data.len() < NUM_GLYPHS_OFFSET + 2 {
        return Err(Error::MissingRequiredTable(MAXP));
    }
    let mut out = data.to_vec();
    patch_u16(&mut out, NUM_GLYPHS_OFFSET, plan.num_output_glyphs());
    Ok(out)
}
