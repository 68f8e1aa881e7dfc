//! m4vpack 性能基准测试.
//!
//! 覆盖 packed 码流解包、打包以及打包再解包的往返路径.

use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use m4vpack::codec::bsf::drain_filter;
use m4vpack::codec::parsers::mpeg4::scan_packed;
use m4vpack::codec::{BitstreamFilter, Mpeg4Packer, Mpeg4Unpacker, Packet};
use m4vpack::core::Rational;

/// 25fps, 1/90000 时间基
const FRAME_DURATION: i64 = 3600;

/// VOL (time_increment_resolution = 25)
const VOL_25: [u8; 9] = [0x00, 0x00, 0x01, 0x20, 0x00, 0x84, 0x40, 0x06, 0x60];

/// 构造单个 VOP, kind: 0=I, 1=P, 2=B
fn make_vop(kind: u8, size: usize) -> Bytes {
    let mut data = vec![0x00, 0x00, 0x01, 0xB6, (kind << 6) | 0x10];
    data.extend((0..size).map(|i| 0x80 | (i % 0x7F) as u8));
    Bytes::from(data)
}

/// 创建解码顺序的 GOP 序列: I P B B P B B ...
fn make_gop(frames: usize, b_frames: usize) -> Vec<Packet> {
    let intra = make_vop(0, 4096);
    let inter = make_vop(1, 1024);
    let bidir = make_vop(2, 512);

    (0..frames)
        .map(|i| {
            let data = match i % (b_frames + 1) {
                _ if i == 0 => intra.clone(),
                0 => inter.clone(),
                _ => bidir.clone(),
            };
            Packet::from_data(data).with_timing(i as i64 * FRAME_DURATION, FRAME_DURATION)
        })
        .collect()
}

fn run(filter: &mut dyn BitstreamFilter, units: Vec<Packet>) -> Vec<Packet> {
    let mut out = Vec::with_capacity(units.len());
    for pkt in units {
        filter.send_packet(pkt).unwrap();
        out.extend(drain_filter(filter).unwrap());
    }
    filter.send_packet(Packet::empty()).unwrap();
    out.extend(drain_filter(filter).unwrap());
    out
}

fn new_unpacker() -> Mpeg4Unpacker {
    let mut unpacker = Mpeg4Unpacker::new();
    unpacker
        .set_frame_rate(Rational::new(25, 1), Rational::new(1, 90000))
        .unwrap();
    unpacker
}

fn new_packer() -> Mpeg4Packer {
    let mut packer = Mpeg4Packer::new();
    packer.set_extra_data(&VOL_25).unwrap();
    packer
}

fn bench_unpack(c: &mut Criterion) {
    c.bench_function("unpack_1000_frames_2b", |b| {
        let packed = run(&mut new_packer(), make_gop(1000, 2));
        b.iter(|| {
            let out = run(&mut new_unpacker(), black_box(packed.clone()));
            black_box(out);
        });
    });
}

fn bench_pack(c: &mut Criterion) {
    c.bench_function("pack_1000_frames_2b", |b| {
        let units = make_gop(1000, 2);
        b.iter(|| {
            let out = run(&mut new_packer(), black_box(units.clone()));
            black_box(out);
        });
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    c.bench_function("pack_unpack_1000_frames_3b", |b| {
        let units = make_gop(1000, 3);
        b.iter(|| {
            let packed = run(&mut new_packer(), black_box(units.clone()));
            let out = run(&mut new_unpacker(), packed);
            black_box(out);
        });
    });
}

fn bench_scan_packed(c: &mut Criterion) {
    c.bench_function("scan_packed_1000_units", |b| {
        let packed = run(&mut new_packer(), make_gop(1000, 2));
        b.iter(|| {
            let vops: usize = packed
                .iter()
                .map(|p| scan_packed(black_box(&p.data)).vop_count)
                .sum();
            black_box(vops);
        });
    });
}

criterion_group!(
    benches,
    bench_unpack,
    bench_pack,
    bench_roundtrip,
    bench_scan_packed,
);
criterion_main!(benches);
