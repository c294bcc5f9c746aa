use crate::grid::{wrap, GridView};
use crate::options::WfcOptions;
use crate::overlap::{Direction, OverlapTable};
use crate::pattern::{coords_pattern_to_source, Pattern};

fn padded_len(logical_len: usize) -> usize {
    let rem = logical_len % 4;
    if rem == 0 {
        logical_len
    } else {
        logical_len + (4 - rem)
    }
}

/// A bounded circular queue of pending eliminations, sized once at
/// construction so propagation never allocates.
#[derive(Clone, Copy)]
struct PendingEntry {
    r: u32,
    c: u32,
    p: u32,
}

#[derive(Clone)]
struct PendingQueue {
    buf: Vec<PendingEntry>,
    head: usize,
    tail: usize,
    len: usize,
}

impl PendingQueue {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![PendingEntry { r: 0, c: 0, p: 0 }; capacity.max(1)],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, r: usize, c: usize, p: usize) {
        debug_assert!(self.len < self.buf.len(), "pending queue overflowed its capacity");
        self.buf[self.tail] = PendingEntry {
            r: r as u32,
            c: c as u32,
            p: p as u32,
        };
        self.tail = (self.tail + 1) % self.buf.len();
        self.len += 1;
    }

    fn pop(&mut self) -> Option<(usize, usize, usize)> {
        if self.is_empty() {
            return None;
        }
        let e = self.buf[self.head];
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;
        Some((e.r as usize, e.c as usize, e.p as usize))
    }
}

/// The wave: per-point AC-4 support counters, a presence cache refreshed
/// from them at step boundaries, an entropy cache, and the bookkeeping
/// (`modified`, pending eliminations) that ties propagation to observation.
#[derive(Clone)]
pub(crate) struct Wave {
    pub(crate) wave_h: usize,
    pub(crate) wave_w: usize,
    pattern_count: usize,
    /// `[r, c, p, d]`, may go negative under stale re-decrements.
    support: Vec<i32>,
    /// `[r, c]`: how many patterns are currently present at that point.
    patt_count: Vec<u32>,
    /// `[r, c, slot]`: the present pattern ids, valid for `slot < patt_count[r,c]`.
    patt_list: Vec<u32>,
    /// `[r, c]`, padded at the tail with `+inf`.
    entropy: Vec<f32>,
    modified: Vec<bool>,
    pending: PendingQueue,
}

impl Wave {
    pub(crate) fn new(wave_h: usize, wave_w: usize, pattern_count: usize) -> Self {
        let logical_len = wave_h * wave_w;
        let padded = padded_len(logical_len);
        let mut entropy = vec![0f32; padded];
        for v in &mut entropy[logical_len..] {
            *v = f32::INFINITY;
        }
        Self {
            wave_h,
            wave_w,
            pattern_count,
            support: vec![0; logical_len * pattern_count * 4],
            patt_count: vec![0; logical_len],
            patt_list: vec![0; logical_len * pattern_count],
            entropy,
            modified: vec![true; logical_len],
            pending: PendingQueue::new(logical_len * pattern_count + 1),
        }
    }

    fn cell_idx(&self, r: usize, c: usize) -> usize {
        r * self.wave_w + c
    }

    fn support_idx(&self, r: usize, c: usize, p: usize, d: usize) -> usize {
        ((r * self.wave_w + c) * self.pattern_count + p) * 4 + d
    }

    fn list_idx(&self, r: usize, c: usize, slot: usize) -> usize {
        (r * self.wave_w + c) * self.pattern_count + slot
    }

    pub(crate) fn present(&self, r: usize, c: usize, p: usize) -> bool {
        self.support[self.support_idx(r, c, p, 0)] > 0
    }

    pub(crate) fn modified_at(&self, r: usize, c: usize) -> bool {
        self.modified[self.cell_idx(r, c)]
    }

    fn remove_pattern_and_enqueue(&mut self, r: usize, c: usize, p: usize) {
        for d in 0..4 {
            let idx = self.support_idx(r, c, p, d);
            self.support[idx] = 0;
        }
        self.pending.push(r, c, p);
    }

    /// Fills in the initial per-point support counters: how many patterns
    /// could sit in each direction given every other pattern is still
    /// possible everywhere. Points next to a fixed edge get a pass for the
    /// direction that would fall off the grid (there is no neighbour to
    /// disagree with), everything else with zero initial support is
    /// impossible and gets queued for elimination immediately.
    pub(crate) fn calc_start_wave(&mut self, options: WfcOptions, overlaps: &OverlapTable) {
        let p_cnt = self.pattern_count;
        let mut base = vec![0i32; p_cnt * 4];
        for p in 0..p_cnt {
            for (d, dir) in Direction::ALL.into_iter().enumerate() {
                base[p * 4 + d] = (0..p_cnt).filter(|&i| overlaps.get(dir, p, i)).count() as i32;
            }
        }

        for r in 0..self.wave_h {
            for c in 0..self.wave_w {
                for p in 0..p_cnt {
                    for d in 0..4 {
                        let idx = self.support_idx(r, c, p, d);
                        self.support[idx] = base[p * 4 + d];
                    }
                }
            }
        }

        for r in 0..self.wave_h {
            for c in 0..self.wave_w {
                for p in 0..p_cnt {
                    for (d, dir) in Direction::ALL.into_iter().enumerate() {
                        let idx = self.support_idx(r, c, p, d);
                        if self.support[idx] != 0 {
                            continue;
                        }
                        let mut edge_fix_exception = false;
                        if options.contains(WfcOptions::EDGE_FIX_V)
                            && ((r == 0 && dir == Direction::RowLess)
                                || (r + 1 == self.wave_h && dir == Direction::RowMore))
                        {
                            edge_fix_exception = true;
                        }
                        if options.contains(WfcOptions::EDGE_FIX_H)
                            && ((c == 0 && dir == Direction::ColLess)
                                || (c + 1 == self.wave_w && dir == Direction::ColMore))
                        {
                            edge_fix_exception = true;
                        }
                        if edge_fix_exception {
                            self.support[idx] = 1;
                        } else {
                            self.remove_pattern_and_enqueue(r, c, p);
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Drops patterns whose edge flag forbids the wave edge they'd sit at, for
/// whichever axes have their `EDGE_FIX` option set.
pub(crate) fn restrict_edges(options: WfcOptions, patterns: &[Pattern], wave: &mut Wave) {
    if options.contains(WfcOptions::EDGE_FIX_V) {
        for c in 0..wave.wave_w {
            for (p, patt) in patterns.iter().enumerate() {
                if wave.present(0, c, p) && !patt.edge_lo_r {
                    wave.remove_pattern_and_enqueue(0, c, p);
                }
                if wave.present(wave.wave_h - 1, c, p) && !patt.edge_hi_r {
                    wave.remove_pattern_and_enqueue(wave.wave_h - 1, c, p);
                }
            }
        }
    }
    if options.contains(WfcOptions::EDGE_FIX_H) {
        for r in 0..wave.wave_h {
            for (p, patt) in patterns.iter().enumerate() {
                if wave.present(r, 0, p) && !patt.edge_lo_c {
                    wave.remove_pattern_and_enqueue(r, 0, p);
                }
                if wave.present(r, wave.wave_w - 1, p) && !patt.edge_hi_c {
                    wave.remove_pattern_and_enqueue(r, wave.wave_w - 1, p);
                }
            }
        }
    }
}

/// Drops patterns that disagree with pre-seeded destination pixels at
/// `keep`-masked cells (row-major, `dst_h * dst_w`).
pub(crate) fn restrict_kept(
    n: usize,
    src: GridView,
    patterns: &[Pattern],
    dst: GridView,
    keep: &[bool],
    wave: &mut Wave,
) {
    for wr in 0..wave.wave_h {
        for wc in 0..wave.wave_w {
            for i in 0..n {
                for j in 0..n {
                    let dr = wrap((wr + i) as isize, dst.height());
                    let dc = wrap((wc + j) as isize, dst.width());
                    if !keep[dr * dst.width() + dc] {
                        continue;
                    }
                    let dst_px = dst.get(dr, dc);
                    for (p, patt) in patterns.iter().enumerate() {
                        if !wave.present(wr, wc, p) {
                            continue;
                        }
                        let (sr, sc) = coords_pattern_to_source(n, patt, i, j, src.height(), src.width());
                        if dst_px != src.get(sr, sc) {
                            wave.remove_pattern_and_enqueue(wr, wc, p);
                        }
                    }
                }
            }
        }
    }
}

/// AC-4 fixed point: drains the pending queue, decrementing the opposite
/// counters of neighbours each eliminated pattern had supported, cascading
/// further eliminations as counters hit zero. A no-op for `n == 1`, where
/// patterns carry no overlap constraint on each other.
pub(crate) fn propagate(n: usize, options: WfcOptions, overlaps: &OverlapTable, wave: &mut Wave) {
    if n == 1 {
        while wave.pending.pop().is_some() {}
        return;
    }

    while let Some((r, c, p)) = wave.pending.pop() {
        for dir in Direction::ALL {
            let (dr, dc) = dir.offset();
            let nr = r as isize + dr;
            let nc = c as isize + dc;

            if options.contains(WfcOptions::EDGE_FIX_V) && (nr < 0 || nr >= wave.wave_h as isize) {
                continue;
            }
            if options.contains(WfcOptions::EDGE_FIX_H) && (nc < 0 || nc >= wave.wave_w as isize) {
                continue;
            }

            let nr = wrap(nr, wave.wave_h);
            let nc = wrap(nc, wave.wave_w);
            let opp = dir.opposite();
            let cell = wave.cell_idx(nr, nc);
            let neighbour_patt_cnt = wave.patt_count[cell] as usize;

            for slot in 0..neighbour_patt_cnt {
                let q = wave.patt_list[wave.list_idx(nr, nc, slot)] as usize;
                if !overlaps.get(dir, p, q) {
                    continue;
                }
                let idx = wave.support_idx(nr, nc, q, opp as usize);
                wave.support[idx] -= 1;
                if wave.support[idx] == 0 {
                    wave.remove_pattern_and_enqueue(nr, nc, q);
                    wave.modified[cell] = true;
                }
            }
        }
    }
}

/// Refreshes `patt_count`/`patt_list` for every modified cell. When
/// `collapsed_delta` is given, bumps it once for each cell that newly
/// settled to exactly one present pattern.
pub(crate) fn refresh_presence(wave: &mut Wave, mut collapsed_delta: Option<&mut u32>) {
    for r in 0..wave.wave_h {
        for c in 0..wave.wave_w {
            let cell = wave.cell_idx(r, c);
            if !wave.modified[cell] {
                continue;
            }
            let mut cnt = 0u32;
            for p in 0..wave.pattern_count {
                if wave.present(r, c, p) {
                    let idx = wave.list_idx(r, c, cnt as usize);
                    wave.patt_list[idx] = p as u32;
                    cnt += 1;
                }
            }
            wave.patt_count[cell] = cnt;
            if cnt == 1 {
                if let Some(delta) = collapsed_delta.as_mut() {
                    **delta += 1;
                }
            }
        }
    }
}

/// Recomputes Shannon entropy (frequency-weighted over present patterns)
/// for every modified cell; `+inf` once a cell has one or zero patterns
/// left, so it's never picked again.
pub(crate) fn calc_entropies(patterns: &[Pattern], wave: &mut Wave) {
    for r in 0..wave.wave_h {
        for c in 0..wave.wave_w {
            let cell = wave.cell_idx(r, c);
            if !wave.modified[cell] {
                continue;
            }

            let mut total_freq = 0u32;
            let mut present_cnt = 0u32;
            for (p, patt) in patterns.iter().enumerate() {
                if wave.present(r, c, p) {
                    total_freq += patt.freq;
                    present_cnt += 1;
                }
            }

            wave.entropy[cell] = if present_cnt > 1 {
                let mut entropy = 0f32;
                for (p, patt) in patterns.iter().enumerate() {
                    if wave.present(r, c, p) {
                        let prob = patt.freq as f32 / total_freq as f32;
                        entropy -= prob * prob.log2();
                    }
                }
                entropy
            } else {
                f32::INFINITY
            };
        }
    }
}

/// `Failed` if some cell ran out of patterns, `Completed` once every cell
/// carries exactly one, `InProgress` otherwise.
pub(crate) fn calc_status(wave: &Wave) -> crate::options::Status {
    use crate::options::Status;

    let mut min_cnt = wave.pattern_count as u32;
    let mut max_cnt = 0u32;
    for &cnt in &wave.patt_count {
        min_cnt = min_cnt.min(cnt);
        max_cnt = max_cnt.max(cnt);
    }

    if min_cnt == 0 {
        Status::Failed
    } else if max_cnt == 1 {
        Status::Completed
    } else {
        Status::InProgress
    }
}

pub(crate) fn clear_modified(wave: &mut Wave) {
    wave.modified.fill(false);
}

pub(crate) fn mark_modified(wave: &mut Wave, r: usize, c: usize) {
    let idx = wave.cell_idx(r, c);
    wave.modified[idx] = true;
}

/// Bit-distance equality for non-negative floats: true when the two values'
/// IEEE-754 bit patterns differ by fewer than 8 ULPs. Relies on the fact
/// that non-negative `f32` bit patterns, read as integers, are monotonic in
/// value.
pub(crate) fn approx_eq_non_neg_f32(a: f32, b: f32) -> bool {
    let ai = a.to_bits() as i32;
    let bi = b.to_bits() as i32;
    ai.wrapping_sub(bi).abs() < 8
}

fn find_min_entropy(entropy: &[f32]) -> f32 {
    let mut lanes = [f32::INFINITY; 4];
    for chunk in entropy.chunks_exact(4) {
        for (lane, &v) in lanes.iter_mut().zip(chunk) {
            *lane = lane.min(v);
        }
    }
    lanes.iter().copied().fold(f32::INFINITY, f32::min)
}

/// Picks a minimum-entropy cell (uniformly among near-ties) and collapses it
/// to a single, frequency-weighted pattern, eliminating the rest.
pub(crate) fn observe_one(patterns: &[Pattern], wave: &mut Wave, rng: &mut dyn crate::rng::WfcRng) {
    use crate::rng::rand_index;

    let smallest = find_min_entropy(&wave.entropy);
    let logical_len = wave.wave_h * wave.wave_w;

    let smallest_cnt = (0..logical_len)
        .filter(|&i| approx_eq_non_neg_f32(wave.entropy[i], smallest))
        .count();

    let mut skip = rand_index(rng, smallest_cnt);
    let mut chosen_cell = 0usize;
    for i in 0..logical_len {
        if approx_eq_non_neg_f32(wave.entropy[i], smallest) {
            chosen_cell = i;
            if skip == 0 {
                break;
            }
            skip -= 1;
        }
    }
    let chosen_r = chosen_cell / wave.wave_w;
    let chosen_c = chosen_cell % wave.wave_w;

    let p_cnt = wave.pattern_count;
    let total_freq: u32 = (0..p_cnt)
        .filter(|&p| wave.present(chosen_r, chosen_c, p))
        .map(|p| patterns[p].freq)
        .sum();

    let mut draw = rand_index(rng, total_freq as usize) as u32;
    let mut chosen_patt = 0usize;
    for p in 0..p_cnt {
        if wave.present(chosen_r, chosen_c, p) {
            if draw < patterns[p].freq {
                chosen_patt = p;
                break;
            }
            draw -= patterns[p].freq;
        }
    }

    for p in 0..p_cnt {
        if p != chosen_patt && wave.present(chosen_r, chosen_c, p) {
            wave.remove_pattern_and_enqueue(chosen_r, chosen_c, p);
        }
    }
    mark_modified(wave, chosen_r, chosen_c);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_eq_treats_identical_values_as_equal() {
        assert!(approx_eq_non_neg_f32(1.5, 1.5));
        assert!(approx_eq_non_neg_f32(f32::INFINITY, f32::INFINITY));
    }

    #[test]
    fn approx_eq_rejects_clearly_different_values() {
        assert!(!approx_eq_non_neg_f32(1.0, 2.0));
        assert!(!approx_eq_non_neg_f32(0.0, f32::INFINITY));
    }

    #[test]
    fn find_min_entropy_reads_padding_safely() {
        // logical_len=5 pads to 8; padding must never beat a real minimum.
        let mut entropy = vec![3.0f32, 1.0, 2.0, 4.0, 5.0];
        entropy.resize(8, f32::INFINITY);
        assert_eq!(find_min_entropy(&entropy), 1.0);
    }

    #[test]
    fn pending_queue_is_fifo_and_wraps() {
        let mut q = PendingQueue::new(3);
        q.push(0, 0, 0);
        q.push(0, 0, 1);
        assert_eq!(q.pop(), Some((0, 0, 0)));
        q.push(0, 0, 2);
        assert_eq!(q.pop(), Some((0, 0, 1)));
        assert_eq!(q.pop(), Some((0, 0, 2)));
        assert!(q.pop().is_none());
    }
}
