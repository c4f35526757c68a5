// Copyright Anysphere Inc.
// Greedy binary block splitting: finds byte/LZ77-symbol offsets that split
// the input into independently-Huffman-coded DEFLATE blocks.

use crate::block::calculate_block_size_auto_type;
use crate::lz77::lz77_greedy;
use crate::types::{BlockState, Hash, LZ77Store, Options, WINDOW_SIZE};

/// Number of points sampled when estimating a split point's cost, trading
/// search accuracy for speed on very large blocks.
const NUM_ESTIMATE_POINTS: usize = 9;

fn estimate_cost(lz77: &LZ77Store, lstart: usize, lend: usize) -> f64 {
    calculate_block_size_auto_type(lz77, lstart, lend)
}

/// Finds the position in `[start, end)` that splits an LZ77 store's symbol
/// range into two parts with the lowest combined cost, by evaluating a
/// bounded number of candidate points and bisecting around the best one.
fn find_minimum(lz77: &LZ77Store, start: usize, end: usize) -> (usize, f64) {
    if end - start <= NUM_ESTIMATE_POINTS {
        let mut best = start;
        let mut bestcost = f64::INFINITY;
        for p in start + 1..end {
            let cost = estimate_cost(lz77, start, p) + estimate_cost(lz77, p, end);
            if cost < bestcost {
                bestcost = cost;
                best = p;
            }
        }
        return (best, bestcost);
    }

    let mut lstart = start;
    let mut lend = end;
    let mut best = start;
    let mut bestcost = f64::INFINITY;

    loop {
        if lend - lstart <= NUM_ESTIMATE_POINTS {
            for p in lstart + 1..lend {
                let cost = estimate_cost(lz77, start, p) + estimate_cost(lz77, p, end);
                if cost < bestcost {
                    bestcost = cost;
                    best = p;
                }
            }
            break;
        }

        let mut pos = vec![0usize; NUM_ESTIMATE_POINTS];
        let mut costs = vec![0.0f64; NUM_ESTIMATE_POINTS];
        for (i, p) in pos.iter_mut().enumerate() {
            *p = lstart + (i + 1) * (lend - lstart) / (NUM_ESTIMATE_POINTS + 1);
        }
        for i in 0..NUM_ESTIMATE_POINTS {
            costs[i] = estimate_cost(lz77, start, pos[i]) + estimate_cost(lz77, pos[i], end);
        }

        let mut minidx = 0;
        for i in 1..NUM_ESTIMATE_POINTS {
            if costs[i] < costs[minidx] {
                minidx = i;
            }
        }
        if costs[minidx] < bestcost {
            bestcost = costs[minidx];
            best = pos[minidx];
        }

        let newstart = if minidx == 0 { lstart } else { pos[minidx - 1] };
        let newend = if minidx == NUM_ESTIMATE_POINTS - 1 { lend } else { pos[minidx + 1] };
        if newstart == lstart && newend == lend {
            break;
        }
        lstart = newstart;
        lend = newend;
    }

    (best, bestcost)
}

/// Recursively splits `[lstart, lend)` of an LZ77 store, appending chosen
/// split points to `splitpoints`, until `maxblocks` is reached or no split
/// improves the total cost enough to be worth the extra block header.
fn split_recursive(
    lz77: &LZ77Store,
    lstart: usize,
    lend: usize,
    maxblocks: usize,
    splitpoints: &mut Vec<usize>,
) {
    if maxblocks > 0 && splitpoints.len() + 1 >= maxblocks {
        return;
    }
    if lend - lstart < 10 {
        return;
    }

    let (split, splitcost) = find_minimum(lz77, lstart, lend);
    debug_assert!(split > lstart && split < lend);

    let origcost = estimate_cost(lz77, lstart, lend);
    if splitcost > origcost {
        // Splitting here doesn't actually help; don't add a block header for nothing.
        return;
    }

    splitpoints.push(split);
    split_recursive(lz77, lstart, split, maxblocks, splitpoints);
    split_recursive(lz77, split, lend, maxblocks, splitpoints);
}

/// Finds the best LZ77-symbol-index split points for an already-parsed
/// store. Returned points are sorted ascending and refer to indices into
/// `lz77`'s arrays, not byte offsets.
pub fn block_split_lz77(lz77: &LZ77Store, maxblocks: usize) -> Vec<usize> {
    if lz77.size() < 10 {
        return Vec::new();
    }
    let mut splitpoints = Vec::new();
    split_recursive(lz77, 0, lz77.size(), maxblocks, &mut splitpoints);
    splitpoints.sort_unstable();
    splitpoints
}

/// Finds the best byte-offset split points for raw input, by running a
/// greedy LZ77 parse first (cheap relative to the full squeeze) and
/// translating the resulting symbol-index split points back to byte
/// offsets.
pub fn block_split(options: &Options, input: &[u8], instart: usize, inend: usize, maxblocks: usize) -> Vec<usize> {
    if instart == inend {
        return Vec::new();
    }

    let mut state = BlockState::new(options, instart, inend, true);
    let mut store = LZ77Store::new(input);
    let mut h = Hash::new(WINDOW_SIZE);
    lz77_greedy(&mut state, input, instart, inend, &mut store, &mut h);

    let lz77_splitpoints = block_split_lz77(&store, maxblocks);

    let mut splitpoints = Vec::with_capacity(lz77_splitpoints.len());
    for p in lz77_splitpoints {
        splitpoints.push(store.pos[p]);
    }
    splitpoints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_split_empty() {
        let opts = Options::default();
        let data = b"";
        let points = block_split(&opts, data, 0, 0, 15);
        assert!(points.is_empty());
    }

    #[test]
    fn test_block_split_small_input_no_split() {
        let opts = Options::default();
        let data = b"hello world";
        let points = block_split(&opts, data, 0, data.len(), 15);
        assert!(points.is_empty());
    }

    #[test]
    fn test_block_split_lz77_respects_maxblocks() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let opts = Options::default();
        let mut state = BlockState::new(&opts, 0, data.len(), true);
        let mut store = LZ77Store::new(&data);
        let mut h = Hash::new(crate::types::WINDOW_SIZE);
        lz77_greedy(&mut state, &data, 0, data.len(), &mut store, &mut h);

        let points = block_split_lz77(&store, 4);
        assert!(points.len() + 1 <= 4);
        // Split points must be strictly increasing and within range.
        for w in points.windows(2) {
            assert!(w[0] < w[1]);
        }
        if let Some(&last) = points.last() {
            assert!(last < store.size());
        }
    }
}
