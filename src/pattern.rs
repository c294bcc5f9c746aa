use bitflags::bitflags;

use crate::grid::{wrap, GridView};
use crate::options::WfcOptions;

bitflags! {
    /// A D4 symmetry transform applied to a pattern before it's read out of
    /// the source grid. Bit values match the original library's `wfc__tf*`
    /// enum so options and patterns stay bit-compatible with it.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct Transform: u8 {
        const FLIP_ROW = 1 << 0;
        const FLIP_COL = 1 << 1;
        const ROT90 = 1 << 2;
        const ROT180 = 1 << 3;
    }
}

impl Transform {
    pub const ROT270: Transform = Transform::ROT90.union(Transform::ROT180);

    /// All 16 combinations of the four transform bits, in the same
    /// enumeration order the original library walks them in.
    pub fn all_combinations() -> impl Iterator<Item = Transform> {
        (0u8..16).map(Transform::from_bits_truncate)
    }
}

/// A candidate N×N window into the source, read through a symmetry
/// transform and anchored at a source coordinate.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub anchor_r: usize,
    pub anchor_c: usize,
    pub transform: Transform,
    pub edge_lo_r: bool,
    pub edge_hi_r: bool,
    pub edge_lo_c: bool,
    pub edge_hi_c: bool,
    pub freq: u32,
}

/// Maps a pattern-local coordinate `(i, j)` (both in `[0, n)`) to the source
/// coordinate it reads from, applying the pattern's transform (flips, then
/// rotations) and wrapping modulo the source extents.
pub(crate) fn coords_pattern_to_source(
    n: usize,
    patt: &Pattern,
    i: usize,
    j: usize,
    src_h: usize,
    src_w: usize,
) -> (usize, usize) {
    let n = n as isize;
    let mut t0 = i as isize;
    let mut t1 = j as isize;

    if patt.transform.contains(Transform::FLIP_ROW) {
        t0 = n - 1 - t0;
    }
    if patt.transform.contains(Transform::FLIP_COL) {
        t1 = n - 1 - t1;
    }
    if patt.transform.contains(Transform::ROT90) {
        let (old0, old1) = (t0, t1);
        t0 = old1;
        t1 = n - 1 - old0;
    }
    if patt.transform.contains(Transform::ROT180) {
        t0 = n - 1 - t0;
        t1 = n - 1 - t1;
    }

    let sr = wrap(patt.anchor_r as isize + t0, src_h);
    let sc = wrap(patt.anchor_c as isize + t1, src_w);
    (sr, sc)
}

/// Determines whether the untransformed window anchored at
/// `(anchor_r, anchor_c)` touches a source edge, then carries that fact
/// through the *inverse* transform order (rotations undone, then flips
/// undone) so the flags describe which edges of the *pattern* touch a
/// source edge after the transform is applied.
fn fill_pattern_edges(n: usize, src_h: usize, src_w: usize, patt: &mut Pattern) {
    let mut lo_r = patt.anchor_r == 0;
    let mut hi_r = patt.anchor_r + n == src_h;
    let mut lo_c = patt.anchor_c == 0;
    let mut hi_c = patt.anchor_c + n == src_w;

    if patt.transform.contains(Transform::ROT180) {
        std::mem::swap(&mut lo_r, &mut hi_r);
        std::mem::swap(&mut lo_c, &mut hi_c);
    }
    if patt.transform.contains(Transform::ROT90) {
        let (old_lo_r, old_hi_r, old_lo_c, old_hi_c) = (lo_r, hi_r, lo_c, hi_c);
        lo_r = old_hi_c;
        hi_r = old_lo_c;
        lo_c = old_lo_r;
        hi_c = old_hi_r;
    }
    if patt.transform.contains(Transform::FLIP_COL) {
        std::mem::swap(&mut lo_c, &mut hi_c);
    }
    if patt.transform.contains(Transform::FLIP_ROW) {
        std::mem::swap(&mut lo_r, &mut hi_r);
    }

    patt.edge_lo_r = lo_r;
    patt.edge_hi_r = hi_r;
    patt.edge_lo_c = lo_c;
    patt.edge_hi_c = hi_c;
}

fn satisfies_options(n: usize, options: WfcOptions, src_h: usize, src_w: usize, patt: &Pattern) -> bool {
    if patt.transform.contains(Transform::FLIP_ROW) && !options.contains(WfcOptions::FLIP_V) {
        return false;
    }
    if patt.transform.contains(Transform::FLIP_COL) && !options.contains(WfcOptions::FLIP_H) {
        return false;
    }
    if patt
        .transform
        .intersects(Transform::ROT90 | Transform::ROT180 | Transform::ROT270)
        && !options.contains(WfcOptions::ROTATE)
    {
        return false;
    }
    if options.contains(WfcOptions::EDGE_FIX_V) && patt.anchor_r + n > src_h {
        return false;
    }
    if options.contains(WfcOptions::EDGE_FIX_H) && patt.anchor_c + n > src_w {
        return false;
    }
    true
}

fn patterns_eq(n: usize, src: GridView, a: &Pattern, b: &Pattern) -> bool {
    for i in 0..n {
        for j in 0..n {
            let (ar, ac) = coords_pattern_to_source(n, a, i, j, src.height(), src.width());
            let (br, bc) = coords_pattern_to_source(n, b, i, j, src.height(), src.width());
            if src.get(ar, ac) != src.get(br, bc) {
                return false;
            }
        }
    }
    true
}

/// Enumerates every `anchor × transform` combination the options allow,
/// deduplicating byte-identical windows by direct pairwise comparison
/// against previously accepted patterns (not by hashing: equality here is
/// defined through `coords_pattern_to_source`, and the pool of candidates is
/// small enough in practice that `O(K^2 N^2 B)` comparison is the simplest
/// correct thing to do).
pub(crate) fn gather_patterns(src: GridView, n: usize, options: WfcOptions) -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = Vec::new();

    for anchor_r in 0..src.height() {
        for anchor_c in 0..src.width() {
            for transform in Transform::all_combinations() {
                let mut candidate = Pattern {
                    anchor_r,
                    anchor_c,
                    transform,
                    edge_lo_r: false,
                    edge_hi_r: false,
                    edge_lo_c: false,
                    edge_hi_c: false,
                    freq: 1,
                };
                if !satisfies_options(n, options, src.height(), src.width(), &candidate) {
                    continue;
                }
                fill_pattern_edges(n, src.height(), src.width(), &mut candidate);

                match patterns.iter_mut().find(|p| patterns_eq(n, src, &candidate, p)) {
                    Some(existing) => {
                        existing.edge_lo_r |= candidate.edge_lo_r;
                        existing.edge_hi_r |= candidate.edge_hi_r;
                        existing.edge_lo_c |= candidate.edge_lo_c;
                        existing.edge_hi_c |= candidate.edge_hi_c;
                        existing.freq += 1;
                    }
                    None => patterns.push(candidate),
                }
            }
        }
    }

    patterns
}
