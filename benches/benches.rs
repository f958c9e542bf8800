use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use downlink::framing::{
    BitSynchronizer, DefaultDerandomizer, Derandomizer, FrameSpec, IntegrityAlgorithm, ReedSolomon,
    ASM,
};
use downlink::lrpt::{decode_block, huffman_decode, Coefficients};

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x1acf_fc1d);
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_rs_codeblock(c: &mut Criterion) {
    let block = random_bytes(1020);
    let rs = ReedSolomon::new(4);

    let mut group = c.benchmark_group("rs");
    group.throughput(Throughput::Bytes(1020));
    group.bench_function("perform", |b| {
        b.iter(|| {
            let _ = rs.perform(&block).unwrap();
        });
    });
    group.finish();
}

// Pn derandomize a random CADU.
fn bench_derandomize(c: &mut Criterion) {
    let buf = random_bytes(1024);

    let mut group = c.benchmark_group("pn");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("apply", |b| {
        b.iter(|| {
            let mut dat = buf.clone();
            DefaultDerandomizer.apply(&mut dat);
        });
    });
    group.finish();
}

// Locked synchronization over 100 random CADUs.
fn bench_synchronize(c: &mut Criterion) {
    let mut stream = Vec::new();
    for cadu in random_bytes(1020 * 100).chunks(1020) {
        stream.extend(ASM);
        stream.extend_from_slice(cadu);
    }

    let mut group = c.benchmark_group("sync");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("feed", |b| {
        b.iter(|| {
            let mut sync = BitSynchronizer::new(FrameSpec::ccsds(1024));
            sync.feed(&stream);
            assert_eq!(sync.drain().count(), 100);
        });
    });
    group.finish();
}

// Entropy decode and transform a packet worth of flat MCUs.
fn bench_mcus(c: &mut Criterion) {
    // DC 4 then 13 zero differences, each followed by EOB
    let mut bits = String::from("1001001010");
    for _ in 1..14 {
        bits.push_str("001010");
    }
    let data: Vec<u8> = bits
        .as_bytes()
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, b)| acc | ((b - b'0') << (7 - i)))
        })
        .collect();

    let mut group = c.benchmark_group("lrpt");
    group.throughput(Throughput::Elements(14));
    group.bench_function("decode_mcus", |b| {
        b.iter(|| {
            let mut blocks: [Coefficients; 14] = [[0; 64]; 14];
            huffman_decode(&data, &mut blocks).unwrap();
            for block in &blocks {
                let _ = decode_block(block, 80).unwrap();
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_derandomize,
    bench_rs_codeblock,
    bench_synchronize,
    bench_mcus
);
criterion_main!(benches);
