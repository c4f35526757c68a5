// Copyright Anysphere Inc.
// Safe Rust implementation of Zopfli compression library

pub mod error;
pub mod types;
pub mod symbols;
pub mod util;
pub mod huffman;
pub mod hash;
pub mod cache;
pub mod lz77;
pub mod block;
pub mod squeeze;
pub mod split;
pub mod deflate;

pub use error::ZopfliError;
pub use types::{Options, LZ77Store, BlockState};

use deflate::{deflate_part, BitWriter};
use types::MASTER_BLOCK_SIZE;
use util::ceil_div;

/// Default iteration count for a given input size, per the tradeoff
/// between compression ratio and CPU time described in spec §6.
pub fn iterations_for(size: usize) -> u16 {
    if size < 8 * 1024 {
        60
    } else if size < 200 * 1024 {
        40
    } else if size < 5 * 1024 * 1024 {
        20
    } else {
        10
    }
}

/// Re-compresses `input` into a DEFLATE (RFC 1951) bit stream.
///
/// `iterations`: `None` uses the size-based policy from [`iterations_for`];
/// `Some(0)` forces the one-shot fixed-Huffman path (no squeeze iterations);
/// `Some(n)` runs the full squeeze loop for `n` iterations per split block.
///
/// `final_block` controls whether the stream's last DEFLATE block sets
/// BFINAL; pass `false` when the caller will append more blocks afterward.
pub fn compress(input: &[u8], iterations: Option<u16>, final_block: bool) -> Vec<u8> {
    let numiterations = match iterations {
        Some(0) => 0,
        Some(n) => n as i32,
        None => iterations_for(input.len()) as i32,
    };
    let btype = if numiterations == 0 { 1 } else { 2 };

    let mut options = Options::default();
    options.numiterations = numiterations.max(1);

    let mut bw = BitWriter::new();
    let num_chunks = if input.is_empty() {
        1
    } else {
        ceil_div(input.len(), MASTER_BLOCK_SIZE)
    };

    let mut start = 0;
    for chunk in 0..num_chunks {
        let end = if input.is_empty() {
            0
        } else {
            (start + MASTER_BLOCK_SIZE).min(input.len())
        };
        let is_last_chunk = chunk + 1 == num_chunks;

        tracing::trace!(chunk, start, end, btype, "squeezing master block");
        deflate_part(&options, btype, final_block && is_last_chunk, input, start, end, &mut bw);

        start = end;
    }

    tracing::debug!(input_len = input.len(), output_len = bw.out.len(), "compression complete");
    bw.out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        let _ = Options::default();
    }

    #[test]
    fn test_iterations_for_policy() {
        assert_eq!(iterations_for(1024), 60);
        assert_eq!(iterations_for(100 * 1024), 40);
        assert_eq!(iterations_for(1024 * 1024), 20);
        assert_eq!(iterations_for(10 * 1024 * 1024), 10);
    }

    #[test]
    fn test_compress_empty_input() {
        let out = compress(&[], None, true);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_compress_nonempty_roundtrippable_shape() {
        let data = b"the quick brown fox jumps over the lazy dog, the quick brown fox jumps again";
        let out = compress(data, Some(3), true);
        assert!(!out.is_empty());
    }
}
