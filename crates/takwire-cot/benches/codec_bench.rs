use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use takwire_cot::{decode, encode, Event, Marker, MarkerKind};

const SIMPLE_COT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="ANDROID-12345678" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="h-e">
    <point lat="37.7749" lon="-122.4194" hae="100.0" ce="10.0" le="5.0"/>
</event>"#;

const COT_WITH_DETAIL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="ANDROID-87654321" type="a-h-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-g">
    <point lat="38.8977" lon="-77.0365" hae="50.0" ce="5.0" le="2.5"/>
    <detail>
        <contact callsign="Bravo-2" endpoint="192.168.1.100:4242"/>
        <__group name="Red" role="Team Member"/>
        <remarks>Enemy unit spotted near checkpoint</remarks>
        <link uid="SENSOR-001" type="a-f-G" relation="p-p"/>
        <status battery="85"/>
        <track speed="15.5" course="270.0"/>
    </detail>
</event>"#;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    group.bench_function("simple_cot", |b| {
        b.iter(|| decode(black_box(SIMPLE_COT.as_bytes())))
    });

    group.bench_function("cot_with_detail", |b| {
        b.iter(|| decode(black_box(COT_WITH_DETAIL.as_bytes())))
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let event = decode(COT_WITH_DETAIL.as_bytes()).unwrap();
    group.bench_function("event", |b| b.iter(|| encode(black_box(&event))));

    let marker = Marker {
        id: "spot-1".to_string(),
        name: Some("Rally".to_string()),
        lat: 52.52,
        lng: 13.405,
        altitude: 0.0,
        kind: MarkerKind::SpotMap,
        color: Some("#ff0000".to_string()),
        team: None,
        role: None,
        description: None,
        cot_type: None,
        source: None,
        timestamp: None,
    };
    group.bench_function("marker", |b| {
        b.iter(|| {
            let event = Event::from_marker(black_box(&marker), Utc::now(), Duration::minutes(5))
                .unwrap();
            encode(&event)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
