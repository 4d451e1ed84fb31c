//! Wire frame encode/decode throughput
//!
//! Run with `cargo bench --bench frame_codec`.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lan_audio_relay::codec::{encode, encode_into, FrameDecoder};
use lan_audio_relay::constants::{MAX_DATAGRAM_SIZE, RECV_BUFFER_SIZE};

/// Chunk sizes of common stream formats: mono i16, stereo i16, stereo f32 (1024 frames)
const CHUNK_SIZES: [usize; 3] = [2048, 4096, 8192];

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in CHUNK_SIZES {
        let payload = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("fresh", size), &payload, |b, payload| {
            b.iter(|| encode(black_box(payload)))
        });

        let mut out = BytesMut::with_capacity(size + 8);
        group.bench_with_input(BenchmarkId::new("reused_buffer", size), &payload, |b, payload| {
            b.iter(|| {
                out.clear();
                encode_into(black_box(payload), &mut out);
            })
        });
    }

    group.finish();
}

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    for size in CHUNK_SIZES {
        let wire = encode(&vec![0xa5u8; size]);
        let datagrams: Vec<&[u8]> = wire.chunks(MAX_DATAGRAM_SIZE).collect();
        group.throughput(Throughput::Bytes(wire.len() as u64));

        group.bench_with_input(BenchmarkId::new("datagrams", size), &datagrams, |b, datagrams| {
            let mut decoder = FrameDecoder::new();
            b.iter(|| {
                for datagram in datagrams {
                    decoder.extend(datagram);
                    while let Ok(Some(frame)) = decoder.decode() {
                        black_box(frame);
                    }
                }
            })
        });

        // several frames per read, as a slow receiver sees them
        let burst: Vec<u8> = (0..4).flat_map(|_| wire.iter().copied()).collect();
        group.bench_with_input(BenchmarkId::new("burst_reads", size), &burst, |b, burst| {
            let mut decoder = FrameDecoder::new();
            b.iter(|| {
                for read in burst.chunks(RECV_BUFFER_SIZE) {
                    decoder.extend(read);
                    while let Ok(Some(frame)) = decoder.decode() {
                        black_box(frame);
                    }
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_reassembly);
criterion_main!(benches);
