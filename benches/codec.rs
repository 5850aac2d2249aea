//! Codec benchmark suite.
//!
//! Benchmarks packet and payload encoding at different batch sizes:
//! - Batch sizes: 1, 16, 256
//! - Payloads: short text, 1 KiB binary
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::ops::ControlFlow;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use engineio_client::Packet;
use engineio_client::protocol::{decode_packet_binary, decode_payload, encode_packet, encode_payload};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 16, 256];
const BINARY_LEN: usize = 1024;

fn text_batch(count: usize) -> Vec<Packet> {
    (0..count)
        .map(|i| Packet::message(format!("message number {i}")))
        .collect()
}

fn binary_batch(count: usize) -> Vec<Packet> {
    (0..count)
        .map(|i| Packet::message(vec![(i % 251) as u8; BINARY_LEN]))
        .collect()
}

// ============================================================================
// Benchmark: Payload Encoding
// ============================================================================

fn bench_encode_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_payload");

    for &count in BATCH_SIZES {
        let text = text_batch(count);
        let binary = binary_batch(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("text", count), &text, |b, packets| {
            b.iter(|| encode_payload(black_box(packets)));
        });
        group.bench_with_input(BenchmarkId::new("base64", count), &binary, |b, packets| {
            b.iter(|| encode_payload(black_box(packets)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Payload Decoding
// ============================================================================

fn bench_decode_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_payload");

    for &count in BATCH_SIZES {
        let Ok(text) = encode_payload(&text_batch(count)) else {
            continue;
        };
        let Ok(binary) = encode_payload(&binary_batch(count)) else {
            continue;
        };
        group.throughput(Throughput::Elements(count as u64));

        for (name, body) in [("text", text), ("base64", binary)] {
            group.bench_with_input(BenchmarkId::new(name, count), &body, |b, body| {
                b.iter(|| {
                    let mut decoded = 0usize;
                    decode_payload(black_box(body), |packet, _, _| {
                        black_box(packet);
                        decoded += 1;
                        ControlFlow::Continue(())
                    });
                    decoded
                });
            });
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Binary Frames
// ============================================================================

fn bench_binary_frame(c: &mut Criterion) {
    let packet = Packet::message(vec![7u8; BINARY_LEN]);
    let frame = match encode_packet(&packet, true) {
        Ok(engineio_client::protocol::Encoded::Binary(bytes)) => bytes,
        _ => return,
    };

    let mut group = c.benchmark_group("binary_frame");
    group.throughput(Throughput::Bytes(BINARY_LEN as u64));
    group.bench_function("encode", |b| {
        b.iter(|| encode_packet(black_box(&packet), true));
    });
    group.bench_function("decode", |b| {
        b.iter(|| decode_packet_binary(black_box(&frame)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_payload,
    bench_decode_payload,
    bench_binary_frame
);
criterion_main!(benches);
