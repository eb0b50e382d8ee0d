//! Per-table re-serializers.
//!
//! Each module rewrites one source table into its subset form. All of them
//! consume the shared [`Plan`](crate::plan::Plan) for the glyph mapping and
//! cached source views, and produce owned byte buffers for the font
//! builder.

pub mod cff;
pub mod cmap;
pub mod gdef;
pub mod glyf;
pub mod gpos;
pub mod gsub;
pub mod head;
pub mod hhea;
pub mod hmtx;
pub mod layout;
pub mod maxp;
