// Copyright Anysphere Inc.
// Roundtrip tests - compress with our code, decompress with flate2

use flate2::read::DeflateDecoder;
use std::io::Read;
use squeeze_deflate::compress;
use squeeze_deflate::deflate::deflate_greedy_fixed;

fn decompress_deflate(compressed: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

fn assert_roundtrip(original: &[u8], compressed: &[u8]) {
    match decompress_deflate(compressed) {
        Ok(decompressed) => assert_eq!(decompressed, original, "decompressed data doesn't match original"),
        Err(e) => panic!("failed to decompress: {}", e),
    }
}

#[test]
fn test_greedy_fixed_roundtrip_hello_world() {
    let original = b"hello world";
    let compressed = deflate_greedy_fixed(original);
    assert_roundtrip(original, &compressed);
}

#[test]
fn test_greedy_fixed_roundtrip_empty() {
    let original = b"";
    let compressed = deflate_greedy_fixed(original);
    assert_roundtrip(original, &compressed);
}

#[test]
fn test_compress_roundtrip_small_inputs() {
    let cases: &[&[u8]] = &[
        b"hello world",
        b"aaaaaaaaaa",
        b"hhhheeeeellllloooooo",
        b"hello worldaaaaaaaaa",
        b"",
        b"a",
        b"abcabcabcabcabcabcabc",
        b"The quick brown fox jumps over the lazy dog",
    ];
    for &case in cases {
        for iterations in [None, Some(0), Some(1), Some(5)] {
            let compressed = compress(case, iterations, true);
            assert_roundtrip(case, &compressed);
        }
    }
}

/// P7: with iterations=0 the core uses a single fixed-Huffman block; this
/// should produce a decodable stream identical in content to any other
/// iteration count.
#[test]
fn test_compress_fixed_tree_path_roundtrips() {
    let original = b"aaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbb";
    let compressed = compress(original, Some(0), true);
    assert_roundtrip(original, &compressed);
}

#[test]
fn test_compress_final_block_flag_is_decodable() {
    // final_block=false is meant for a caller appending further blocks of its
    // own afterward; a single compress() call with final_block=true is the
    // supported way to produce one complete, decodable stream.
    let data = b"hello world";
    let one_shot = compress(data, Some(2), true);
    assert_roundtrip(data, &one_shot);
}

#[test]
fn test_compress_determinism() {
    let data = b"the quick brown fox jumps over the lazy dog, the quick brown fox jumps again";
    let a = compress(data, Some(4), true);
    let b = compress(data, Some(4), true);
    assert_eq!(a, b, "compress must be deterministic for identical inputs and iteration counts");
}

#[test]
fn test_compress_larger_text_roundtrips() {
    let data = "the quick brown fox jumps over the lazy dog ".repeat(200);
    let compressed = compress(data.as_bytes(), None, true);
    assert_roundtrip(data.as_bytes(), &compressed);
}

#[test]
fn test_compress_binary_data_roundtrips() {
    let data: Vec<u8> = (0..4096u32).map(|i| ((i * 37) % 251) as u8).collect();
    let compressed = compress(&data, Some(3), true);
    assert_roundtrip(&data, &compressed);
}

use proptest::prelude::*;

proptest! {
    #[test]
    fn test_roundtrip_property(s in "\\PC*") {
        let original = s.as_bytes();
        if original.len() > 1000 {
            return Ok(()); // Skip very large inputs
        }

        let compressed = compress(original, Some(1), true);

        match decompress_deflate(&compressed) {
            Ok(decompressed) => {
                prop_assert_eq!(&decompressed[..], original,
                    "Roundtrip failed for input: {:?}",
                    std::str::from_utf8(original).unwrap_or("<binary>"));
            }
            Err(e) => {
                return Err(proptest::test_runner::TestCaseError::fail(
                    format!("Failed to decompress: {}", e)
                ));
            }
        }
    }

    #[test]
    fn test_roundtrip_property_bytes(data in prop::collection::vec(any::<u8>(), 0..200)) {
        let original = &data[..];
        let compressed = compress(original, Some(1), true);

        match decompress_deflate(&compressed) {
            Ok(decompressed) => {
                prop_assert_eq!(&decompressed[..], original,
                    "Roundtrip failed for binary data");
            }
            Err(e) => {
                return Err(proptest::test_runner::TestCaseError::fail(
                    format!("Failed to decompress: {}", e)
                ));
            }
        }
    }
}
