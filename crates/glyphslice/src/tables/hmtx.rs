//! hmtx table rewrite.

use font_types::Tag;

use crate::{
    emit::{push_i16, push_u16},
    error::{Error, Result},
    plan::Plan,
    types::GlyphId,
};

pub const HMTX: Tag = Tag::new(b"hmtx");

/// Emit one long metric per output glyph, in new-glyph order.
///
/// Source metrics honor the `numberOfHMetrics` run-out rule (the hmtx view
/// applies the last advance to trailing glyphs). Instanced plans replace
/// each advance with its HVAR-adjusted value. Filler slots in retain-GIDs
/// mode are `(0, 0)`.
pub fn subset_hmtx(plan: &Plan) -> Result<Vec<u8>> {
    let hmtx = plan.hmtx().ok_or(Error::MissingRequiredTable(HMTX))?;

    let count = plan.num_output_glyphs();
    let mut out = Vec::with_capacity(count as usize * 4);
    for new_gid in 0..count {
        let (advance, lsb) = match plan.old_gid_for(GlyphId::new(new_gid)) {
            Some(old) => {
                let advance = hmtx.advance(old.to_read()).unwrap_or(0);
                let lsb = hmtx.side_bearing(old.to_read()).unwrap_or(0);
                let advance = match plan.instancer() {
                    Some(instancer) => {
                        let delta = instancer.advance_delta(plan.glyf(), plan.loca(), old);
                        (advance as i32 + delta).max(0) as u16
                    }
                    None => advance,
                };
                (advance, lsb)
            }
            None => (0, 0),
        };
        push_u16(&mut out, advance);
        push_i16(&mut out, lsb);
    }
    Ok(out)
}
