//! head table rewrite.

use font_types::Tag;

use crate::{
    emit::{patch_u16, patch_u32},
    error::{Error, Result},
    plan::Plan,
};

pub const HEAD: Tag = Tag::new(b"head");

const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
const INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;
const HEAD_LEN: usize = 54;

/// Copy the source `head`, zero `checksumAdjustment` (the font builder
/// finalizes it) and force long loca offsets.
pub fn subset_head(plan: &Plan) -> Result<Vec<u8>> {
    let data = plan
        .table_bytes(HEAD)
        .ok_or(Error::MissingRequiredTable(HEAD))?;
    if data.len() < HEAD_LEN {
        return Err(Error::MissingRequiredTable(HEAD));
    }
    let mut out = data.to_vec();
    patch_u32(&mut out, CHECKSUM_ADJUSTMENT_OFFSET, 0);
    patch_u16(&mut out, INDEX_TO_LOC_FORMAT_OFFSET, 1);
    Ok(out)
}
