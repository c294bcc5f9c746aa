use crate::grid::GridView;
use crate::pattern::{coords_pattern_to_source, Pattern};

/// The four cardinal directions a pattern can overlap its neighbour in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    RowLess = 0,
    RowMore = 1,
    ColLess = 2,
    ColMore = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::RowLess,
        Direction::RowMore,
        Direction::ColLess,
        Direction::ColMore,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::RowLess => Direction::RowMore,
            Direction::RowMore => Direction::RowLess,
            Direction::ColLess => Direction::ColMore,
            Direction::ColMore => Direction::ColLess,
        }
    }

    pub(crate) fn offset(self) -> (isize, isize) {
        match self {
            Direction::RowLess => (-1, 0),
            Direction::RowMore => (1, 0),
            Direction::ColLess => (0, -1),
            Direction::ColMore => (0, 1),
        }
    }
}

fn bit_words(pattern_count: usize) -> usize {
    pattern_count.div_ceil(32).max(1)
}

fn get_bit(words: &[u32], idx: usize) -> bool {
    (words[idx / 32] >> (idx % 32)) & 1 != 0
}

fn set_bit(words: &mut [u32], idx: usize, val: bool) {
    if val {
        words[idx / 32] |= 1 << (idx % 32);
    } else {
        words[idx / 32] &= !(1 << (idx % 32));
    }
}

/// A bit-packed `[direction][a][b]` compatibility relation: `b` may sit
/// immediately in `direction` from `a` iff the bit is set.
#[derive(Clone)]
pub(crate) struct OverlapTable {
    pattern_count: usize,
    words_per_row: usize,
    bits: Vec<u32>,
}

impl OverlapTable {
    fn new(pattern_count: usize) -> Self {
        let words_per_row = bit_words(pattern_count);
        Self {
            pattern_count,
            words_per_row,
            bits: vec![0u32; 4 * pattern_count.max(1) * words_per_row],
        }
    }

    fn row_offset(&self, dir: Direction, a: usize) -> usize {
        (dir as usize * self.pattern_count + a) * self.words_per_row
    }

    pub(crate) fn get(&self, dir: Direction, a: usize, b: usize) -> bool {
        let off = self.row_offset(dir, a);
        get_bit(&self.bits[off..off + self.words_per_row], b)
    }

    fn set(&mut self, dir: Direction, a: usize, b: usize, val: bool) {
        let off = self.row_offset(dir, a);
        set_bit(&mut self.bits[off..off + self.words_per_row], b, val);
    }

    fn set_row(&mut self, dir: Direction, a: usize, row: &[u32]) {
        let off = self.row_offset(dir, a);
        self.bits[off..off + self.words_per_row].copy_from_slice(row);
    }
}

/// Whether `b` may be placed immediately `dir` of `a`: their shared
/// `(N-|dr|) x (N-|dc|)` window must agree cell-by-cell.
fn overlap_matches(src: GridView, n: usize, dir: Direction, a: &Pattern, b: &Pattern) -> bool {
    let (off_r, off_c) = dir.offset();
    let overlap_h = n as isize - off_r.abs();
    let overlap_w = n as isize - off_c.abs();

    let a_r0 = off_r.max(0);
    let a_c0 = off_c.max(0);
    let b_r0 = (-off_r).max(0);
    let b_c0 = (-off_c).max(0);

    for i in 0..overlap_h {
        for j in 0..overlap_w {
            let (ar, ac) = ((a_r0 + i) as usize, (a_c0 + j) as usize);
            let (sr_a, sc_a) = coords_pattern_to_source(n, a, ar, ac, src.height(), src.width());

            let (br, bc) = ((b_r0 + i) as usize, (b_c0 + j) as usize);
            let (sr_b, sc_b) = coords_pattern_to_source(n, b, br, bc, src.height(), src.width());

            if src.get(sr_a, sc_a) != src.get(sr_b, sc_b) {
                return false;
            }
        }
    }
    true
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn build_overlap_table(src: GridView, n: usize, patterns: &[Pattern]) -> OverlapTable {
    let mut table = OverlapTable::new(patterns.len());
    for dir in Direction::ALL {
        for (i, a) in patterns.iter().enumerate() {
            for (j, b) in patterns.iter().enumerate() {
                if overlap_matches(src, n, dir, a, b) {
                    table.set(dir, i, j, true);
                }
            }
        }
    }
    table
}

#[cfg(feature = "parallel")]
pub(crate) fn build_overlap_table(src: GridView, n: usize, patterns: &[Pattern]) -> OverlapTable {
    use rayon::prelude::*;

    let mut table = OverlapTable::new(patterns.len());
    let words_per_row = table.words_per_row;

    let rows: Vec<((Direction, usize), Vec<u32>)> = Direction::ALL
        .into_iter()
        .flat_map(|dir| (0..patterns.len()).map(move |i| (dir, i)))
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(dir, i)| {
            let mut row = vec![0u32; words_per_row];
            for (j, b) in patterns.iter().enumerate() {
                if overlap_matches(src, n, dir, &patterns[i], b) {
                    set_bit(&mut row, j, true);
                }
            }
            ((dir, i), row)
        })
        .collect();

    for ((dir, i), row) in rows {
        table.set_row(dir, i, &row);
    }
    table
}
