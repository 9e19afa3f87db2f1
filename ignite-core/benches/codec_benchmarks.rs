//! Binary codec and framing throughput benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ignite_core::protocol::FrameCodec;
use ignite_core::serialization::{decode, encode, BinaryObject, BinaryValue};
use tokio_util::codec::Decoder;

fn bench_primitive_values(c: &mut Criterion) {
    let mut group = c.benchmark_group("primitive_values");

    let values = [
        ("int", BinaryValue::Int(42)),
        ("long", BinaryValue::Long(123_456_789)),
        ("double", BinaryValue::Double(3.25)),
        ("string", BinaryValue::String("hello ignite".to_string())),
    ];

    for (name, value) in &values {
        group.bench_function(format!("{}_encode", name), |b| {
            b.iter(|| black_box(encode(black_box(value)).unwrap()))
        });

        let bytes = encode(value).unwrap();
        group.bench_function(format!("{}_decode", name), |b| {
            b.iter(|| black_box(decode(black_box(&bytes)).unwrap()))
        });
    }

    group.finish();
}

fn bench_collections(c: &mut Criterion) {
    let mut group = c.benchmark_group("collections");

    for size in [10usize, 100, 1000] {
        let value = BinaryValue::Collection((0..size as i32).map(BinaryValue::Int).collect());
        let bytes = encode(&value).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &value, |b, v| {
            b.iter(|| black_box(encode(v).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, data| {
            b.iter(|| black_box(decode(data).unwrap()))
        });
    }

    group.finish();
}

fn bench_objects(c: &mut Criterion) {
    let object = BinaryValue::Object(
        BinaryObject::new(1001)
            .with_field("id", 7i64)
            .with_field("name", "person")
            .with_field("active", true)
            .with_field("scores", BinaryValue::Collection(vec![1.5f64.into(), 2.5f64.into()])),
    );
    let bytes = encode(&object).unwrap();

    c.bench_function("object_encode", |b| b.iter(|| black_box(encode(&object).unwrap())));
    c.bench_function("object_decode", |b| b.iter(|| black_box(decode(&bytes).unwrap())));
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [64usize, 4096, 65536] {
        let framed = ignite_core::protocol::frame(&vec![0xABu8; size]);
        group.throughput(Throughput::Bytes(framed.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &framed, |b, data| {
            b.iter(|| {
                let mut codec = FrameCodec::new();
                let mut buf = BytesMut::from(&data[..]);
                black_box(codec.decode(&mut buf).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_primitive_values,
    bench_collections,
    bench_objects,
    bench_frame_decode
);
criterion_main!(benches);
