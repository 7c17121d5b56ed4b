#[allow(unused_imports)]
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tttrtools::rec::{self, Mode, RecordKind};
use tttrtools::{ChannelResult, Resolution, TTREADMAX};

mod common;

fn decode(c: &mut Criterion) {
    let records = common::t2_records(TTREADMAX);

    c.bench_function("decode", |b| {
        b.iter(|| {
            let _ = rec::decode(&records, Mode::T2, black_box(2), RecordKind::Photon);
        })
    });
}

fn events(c: &mut Criterion) {
    let records = common::t2_records(TTREADMAX);

    c.bench_function("events", |b| {
        b.iter(|| black_box(rec::events(&records, Mode::T2).filter_map(Result::ok).count()))
    });
}

fn add_buffer(c: &mut Criterion) {
    let records = common::t2_records(TTREADMAX);
    let res = Resolution { global: 250.0, bin: 250.0 };

    c.bench_function("add_buffer", |b| {
        b.iter(|| {
            let mut r = ChannelResult::new(Mode::T2, 1, res, None, false).unwrap();
            r.add_buffer(black_box(&records)).unwrap();
        })
    });
}

criterion_group!(benches, decode, events, add_buffer);
criterion_main!(benches);
