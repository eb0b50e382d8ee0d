//! Static instancing support: pinned axes, gvar outline deltas, HVAR
//! advance deltas.
//!
//! When every variation axis is pinned, the plan bakes the pinned location
//! into the subset: simple-glyph outlines are re-pointed through gvar
//! (with IUP interpolation for sparse tuples), horizontal advances pick up
//! HVAR deltas (phantom-point deltas as fallback), and the variation
//! tables themselves are dropped. Composite glyphs keep their source
//! outlines; only their component indices are rewritten.

use std::collections::BTreeMap;

use font_types::{F2Dot14, Fixed, Tag};
use read_fonts::{
    FontRef, TableProvider,
    tables::{
        glyf::{Glyf, SimpleGlyph},
        gvar::Gvar,
        hvar::Hvar,
        loca::Loca,
    },
    types::Point,
};
use skrifa::MetadataProvider;

use crate::types::GlyphId;

/// Tables that describe variations and are dropped from an instanced
/// subset.
pub const VARIATION_TABLES: [Tag; 8] = [
    Tag::new(b"fvar"),
    Tag::new(b"gvar"),
    Tag::new(b"avar"),
    Tag::new(b"cvar"),
    Tag::new(b"HVAR"),
    Tag::new(b"MVAR"),
    Tag::new(b"VVAR"),
    Tag::new(b"STAT"),
];

const PHANTOM_POINTS: usize = 4;

/// An outline point after delta application, rounded to font units.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CurvePt {
    pub x: i16,
    pub y: i16,
    pub on_curve: bool,
}

/// A re-pointed simple glyph ready for byte serialization.
#[derive(Clone, Debug, Default)]
pub struct InstancedOutline {
    pub contours: Vec<Vec<CurvePt>>,
}

/// Normalized location plus the delta sources needed at subset time.
pub struct Instancer<'a> {
    coords: Vec<F2Dot14>,
    hvar: Option<Hvar<'a>>,
    gvar: Option<Gvar<'a>>,
}

impl<'a> Instancer<'a> {
    /// Build the instancing state for a fully pinned font. Returns `None`
    /// when nothing is pinned or the font is not variable.
    pub fn new(font: &FontRef<'a>, pinned: &BTreeMap<Tag, f64>) -> Option<Self> {
        if pinned.is_empty() || font.fvar().is_err() {
            return None;
        }
        let location = font
            .axes()
            .location(pinned.iter().map(|(tag, value)| (*tag, *value as f32)));
        let coords: Vec<F2Dot14> = location.coords().to_vec();
        Some(Self {
            coords,
            hvar: font.hvar().ok(),
            gvar: font.gvar().ok(),
        })
    }

    /// Advance-width delta for a glyph at the pinned location, in font
    /// units. HVAR is authoritative; fonts without HVAR fall back to the
    /// gvar phantom points.
    pub fn advance_delta(&self, glyf: Option<&Glyf>, loca: Option<&Loca>, gid: GlyphId) -> i32 {
        if let Some(hvar) = &self.hvar
            && let Ok(delta) = hvar.advance_width_delta(gid.to_read(), &self.coords)
        {
            return delta.to_i32();
        }
        if let (Some(gvar), Some(glyf), Some(loca)) = (&self.gvar, glyf, loca)
            && let Ok(Some(deltas)) =
                gvar.phantom_point_deltas(glyf, loca, &self.coords, gid.to_read())
        {
            // Phantom point 1 carries the advance-width edge.
            return deltas.get(1).map(|d| d.x.to_i32()).unwrap_or(0);
        }
        0
    }

    /// Apply the pinned location's deltas to a simple glyph. Returns
    /// `None` when the glyph has no variation data, in which case the
    /// source bytes pass through unchanged.
    pub fn repoint_simple(&self, glyph: &SimpleGlyph, gid: GlyphId) -> Option<InstancedOutline> {
        let gvar = self.gvar.as_ref()?;
        let var_data = gvar.glyph_variation_data(gid.to_read()).ok()??;

        let num_points = glyph.num_points();
        let end_pts: Vec<usize> = glyph
            .end_pts_of_contours()
            .iter()
            .map(|x| x.get() as usize)
            .collect();

        // Accumulate in 16.16 so fractional deltas from stacked tuples
        // survive until the final rounding.
        let mut points: Vec<Point<Fixed>> = Vec::with_capacity(num_points + PHANTOM_POINTS);
        let mut on_curve: Vec<bool> = Vec::with_capacity(num_points);
        for point in glyph.points() {
            points.push(Point::new(
                Fixed::from_i32(point.x as i32),
                Fixed::from_i32(point.y as i32),
            ));
            on_curve.push(point.on_curve);
        }
        for _ in 0..PHANTOM_POINTS {
            points.push(Point::default());
        }

        for (tuple, scalar) in var_data.active_tuples_at(&self.coords) {
            if tuple.has_deltas_for_all_points() {
                for delta in tuple.deltas() {
                    let idx = delta.position as usize;
                    if let Some(point) = points.get_mut(idx) {
                        let scaled: Point<Fixed> = delta.apply_scalar(scalar);
                        point.x += scaled.x;
                        point.y += scaled.y;
                    }
                }
            } else {
                // Sparse tuple: untouched points take interpolated deltas.
                let mut touched = vec![false; points.len()];
                let mut deltas = vec![Point::new(0i32, 0i32); points.len()];
                for delta in tuple.deltas() {
                    let idx = delta.position as usize;
                    if let Some(slot) = deltas.get_mut(idx) {
                        touched[idx] = true;
                        let scaled: Point<Fixed> = delta.apply_scalar(scalar);
                        *slot = Point::new(scaled.x.to_i32(), scaled.y.to_i32());
                    }
                }

                let reference: Vec<Point<i32>> = points
                    .iter()
                    .map(|p| Point::new(p.x.to_i32(), p.y.to_i32()))
                    .collect();

                let mut start = 0;
                for &end in &end_pts {
                    iup_contour(&mut deltas, &touched, &reference, start, end);
                    start = end + 1;
                }

                for (point, delta) in points.iter_mut().zip(&deltas) {
                    point.x += Fixed::from_i32(delta.x);
                    point.y += Fixed::from_i32(delta.y);
                }
            }
        }

        let mut contours = Vec::with_capacity(end_pts.len());
        let mut start = 0;
        for &end in &end_pts {
            let contour: Vec<CurvePt> = (start..=end)
                .map(|i| CurvePt {
                    x: clamp_i16(points[i].x.round().to_i32()),
                    y: clamp_i16(points[i].y.round().to_i32()),
                    on_curve: on_curve[i],
                })
                .collect();
            contours.push(contour);
            start = end + 1;
        }

        Some(InstancedOutline { contours })
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Interpolate untouched points of one contour (IUP).
///
/// `start..=end` delimits the contour within the parallel `deltas`,
/// `touched` and `reference` slices.
fn iup_contour(
    deltas: &mut [Point<i32>],
    touched: &[bool],
    reference: &[Point<i32>],
    start: usize,
    end: usize,
) {
    if start > end {
        return;
    }
    let len = end - start + 1;
    let touched_idx: Vec<usize> = (0..len).filter(|&i| touched[start + i]).collect();
    let Some(&first) = touched_idx.first() else {
        // No deltas anywhere on this contour; it stays put.
        return;
    };

    if touched_idx.len() == 1 {
        // A single touched point shifts the whole contour rigidly.
        let d = deltas[start + first];
        for i in 0..len {
            if i != first {
                deltas[start + i] = d;
            }
        }
        return;
    }

    for window in touched_idx.windows(2) {
        iup_span(deltas, reference, start, len, window[0], window[1]);
    }
    let last = *touched_idx.last().unwrap();
    iup_span(deltas, reference, start, len, last, first);
}

/// Interpolate the untouched points strictly between two touched ones,
/// walking forward (cyclically) from `from` to `to`.
fn iup_span(
    deltas: &mut [Point<i32>],
    reference: &[Point<i32>],
    start: usize,
    len: usize,
    from: usize,
    to: usize,
) {
    if (from + 1) % len == to {
        return;
    }
    let p1 = reference[start + from];
    let p2 = reference[start + to];
    let d1 = deltas[start + from];
    let d2 = deltas[start + to];

    let mut i = (from + 1) % len;
    while i != to {
        let p = reference[start + i];
        deltas[start + i] = Point::new(
            iup_axis(p1.x, p2.x, p.x, d1.x, d2.x),
            iup_axis(p1.y, p2.y, p.y, d1.y, d2.y),
        );
        i = (i + 1) % len;
    }
}

/// One-dimensional IUP: a point between the two references interpolates
/// linearly, a point outside them snaps to the nearer delta.
fn iup_axis(c1: i32, c2: i32, c: i32, d1: i32, d2: i32) -> i32 {
    if c1 == c2 {
        return if d1 == d2 { d1 } else { 0 };
    }
    let (c1, c2, d1, d2) = if c1 > c2 { (c2, c1, d2, d1) } else { (c1, c2, d1, d2) };
    if c <= c1 {
        d1
    } else if c >= c2 {
        d2
    } else {
        let t = (c - c1) as f64 / (c2 - c1) as f64;
        (d1 as f64 + t * (d2 - d1) as f64).round() as i32
    }
}
