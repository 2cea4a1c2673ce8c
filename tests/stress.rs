//! Stress tests for SensorBridge
//!
//! Run with: cargo test --release stress -- --ignored

use rand::{Rng, SeedableRng};
use sensorbridge::*;
use std::time::Instant;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_decoding() {
    let frames: Vec<[u8; FRAME_LEN]> = (0..1000u32)
        .map(|i| Frame::new(i, 20.0 + (i as f64 * 0.01).sin(), 50.0, 3.3).to_bytes())
        .collect();

    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let frame = decode(&frames[i % frames.len()]).unwrap();
        assert!(frame.is_valid());
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Decoded {} frames in {:?}", iterations, elapsed);
    println!("Rate: {:.0} frames/second", rate);

    assert!(
        rate > 1_000_000.0,
        "Should decode at least 1M frames/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_noisy_stream() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut stream = Vec::new();
    let total = 100_000u32;

    for i in 0..total {
        // Noise never contains the first sync byte
        let noise = rng.gen_range(0..4);
        for _ in 0..noise {
            stream.push(rng.gen_range(0x00..0xAA));
        }
        stream.extend_from_slice(&Frame::new(i, 21.0, 40.0, 3.3).to_bytes());
    }

    let start = Instant::now();
    let mut decoder = StreamDecoder::new();
    let mut next = 0u32;
    let mut pos = 0;
    while pos < stream.len() {
        let len = rng.gen_range(1..=512).min(stream.len() - pos);
        for frame in decoder.feed(&stream[pos..pos + len]) {
            assert_eq!(frame.node_id, next, "Frame out of order");
            next += 1;
        }
        pos += len;
    }
    let elapsed = start.elapsed();

    println!("Reassembled {} frames in {:?}", next, elapsed);
    assert_eq!(next, total);
    assert_eq!(decoder.stats().checksum_failures, 0);
}

#[test]
fn test_every_single_byte_corruption_is_caught() {
    let bytes = Frame::new(77, 22.22, 33.33, 3.456).with_status(0x04).to_bytes();

    for index in 2..FRAME_LEN {
        for bit in 0..8 {
            let mut corrupted = bytes;
            corrupted[index] ^= 1 << bit;
            assert!(
                matches!(decode(&corrupted), Err(DecodeError::ChecksumMismatch { .. })),
                "Flip of bit {} in byte {} went undetected",
                bit,
                index
            );
        }
    }
}
