//! Performance benchmarks for serial line framing and classification.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench parser_bench
//! ```

use bytes::BytesMut;
use cardbridge_protocol::{Notification, NotificationKind, SerialLineCodec, parse};
use cardbridge_core::CardId;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::Decoder;

const SESSION: &[u8] = b"SYSTEM READY\r\nUID:RF001234\r\nPIN:123456\r\nPIN_CLEARED\r\nnoise\r\n";

/// Benchmark classifying each kind of line.
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(5));

    let lines = ["SYSTEM READY", "UID:RF001234", "PIN:123456", "PIN_CLEARED", "noise"];

    group.bench_function("parse_all_kinds", |b| {
        b.iter(|| {
            for line in lines {
                black_box(parse(black_box(line)));
            }
        });
    });

    group.finish();
}

/// Benchmark framing a burst of lines from the serial buffer.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(SESSION.len() as u64));

    group.bench_function("decode_session_burst", |b| {
        b.iter(|| {
            let mut codec = SerialLineCodec::new();
            let mut buf = BytesMut::from(black_box(SESSION));
            while let Ok(Some(line)) = codec.decode(&mut buf) {
                black_box(line);
            }
        });
    });

    group.finish();
}

/// Benchmark serializing a notification for the wire.
fn bench_notification_json(c: &mut Criterion) {
    let notification = Notification::new(NotificationKind::CardScanned {
        card_id: CardId::new("RF001234"),
    });

    c.bench_function("notification_to_json", |b| {
        b.iter(|| black_box(notification.to_json().unwrap()));
    });
}

criterion_group!(benches, bench_parse, bench_decode, bench_notification_json);
criterion_main!(benches);
