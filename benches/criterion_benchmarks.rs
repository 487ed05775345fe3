use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dirvi::engine::{self, ReconcileOptions};
use dirvi::entry::Entry;
use dirvi::index::BaselineIndex;
use dirvi::io::{build_index, write_snapshot};
use dirvi::record::{LdifFormat, NativeFormat, RecordFormat};
use dirvi::sink::Statistics;
use std::fs;
use std::io::Cursor;
use std::path::Path;

fn gen_entries(count: usize, seed: u64) -> Vec<Entry> {
    let mut s = seed;
    let mut next = move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        s >> 33
    };
    let mut out = Vec::with_capacity(count + 1);
    out.push(Entry::new("dc=example").with("dc", "example"));
    for i in 0..count {
        let photo: Vec<u8> = (0..64).map(|_| next() as u8).collect();
        out.push(
            Entry::new(format!("uid=user{i},dc=example"))
                .with("objectClass", "inetOrgPerson")
                .with("uid", format!("user{i}"))
                .with("cn", format!("User {i}"))
                .with("sn", format!("Surname{}", next() % 1000))
                .with("mail", format!("user{i}@example.org"))
                .with("telephoneNumber", format!("+1 555 {:04}", next() % 10000))
                .with("jpegPhoto", photo),
        );
    }
    out
}

/// Change the `sn` of every `stride`-th entry.
fn edit(entries: &[Entry], stride: usize) -> Vec<Entry> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            if i > 0 && i % stride.max(1) == 0 {
                let mut e = e.clone();
                e.replace_attribute("sn", vec![b"Edited".to_vec()]);
                e
            } else {
                e.clone()
            }
        })
        .collect()
}

fn snapshot<F: RecordFormat>(format: &F, entries: &[Entry]) -> (Vec<u8>, BaselineIndex) {
    let mut out = Vec::new();
    let index = write_snapshot(format, &mut out, entries).unwrap();
    (out, index)
}

fn reconcile_once<F: RecordFormat>(
    format: &F,
    baseline: &[u8],
    index: &BaselineIndex,
    working: &[u8],
) -> Statistics {
    let mut stats = Statistics::default();
    let mut index = index.clone();
    let outcome = engine::reconcile(
        format,
        &mut stats,
        &mut index,
        &mut Cursor::new(baseline.to_vec()),
        &mut Cursor::new(working),
        &ReconcileOptions::default(),
    )
    .unwrap();
    assert!(outcome.is_success());
    stats
}

fn write_size_report() {
    let mut csv = String::from("entries,native_bytes,ldif_bytes\n");
    for count in [1_000usize, 10_000, 50_000] {
        let entries = gen_entries(count, 7);
        let (native, _) = snapshot(&NativeFormat, &entries);
        let (ldif, _) = snapshot(&LdifFormat, &entries);
        csv.push_str(&format!("{count},{},{}\n", native.len(), ldif.len()));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("snapshot_sizes.csv"), csv);
}

fn bench_unchanged(c: &mut Criterion) {
    let mut g = c.benchmark_group("reconcile_unchanged");
    for count in [1_000usize, 10_000, 50_000] {
        let entries = gen_entries(count, 1);
        let (baseline, index) = snapshot(&NativeFormat, &entries);
        g.throughput(Throughput::Bytes(baseline.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let stats = reconcile_once(&NativeFormat, &baseline, &index, black_box(&baseline));
                black_box(stats);
            });
        });
    }
    g.finish();
}

fn bench_edited(c: &mut Criterion) {
    let mut g = c.benchmark_group("reconcile_edited_vs_stride");
    let entries = gen_entries(10_000, 2);
    let (baseline, index) = snapshot(&NativeFormat, &entries);
    for stride in [1usize, 10, 100, 1000] {
        let (working, _) = snapshot(&NativeFormat, &edit(&entries, stride));
        g.throughput(Throughput::Bytes(working.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(stride), &stride, |b, _| {
            b.iter(|| {
                let stats = reconcile_once(&NativeFormat, &baseline, &index, black_box(&working));
                black_box(stats);
            });
        });
    }
    g.finish();
}

fn bench_indexing(c: &mut Criterion) {
    write_size_report();
    let mut g = c.benchmark_group("build_index");
    let entries = gen_entries(10_000, 3);
    let (native, _) = snapshot(&NativeFormat, &entries);
    let (ldif, _) = snapshot(&LdifFormat, &entries);

    g.throughput(Throughput::Bytes(native.len() as u64));
    g.bench_function("native", |b| {
        b.iter(|| {
            let index = build_index(&NativeFormat, &mut Cursor::new(black_box(&native))).unwrap();
            black_box(index);
        });
    });
    g.throughput(Throughput::Bytes(ldif.len() as u64));
    g.bench_function("ldif", |b| {
        b.iter(|| {
            let index = build_index(&LdifFormat, &mut Cursor::new(black_box(&ldif))).unwrap();
            black_box(index);
        });
    });
    g.finish();
}

fn bench_snapshot_writing(c: &mut Criterion) {
    let mut g = c.benchmark_group("write_snapshot");
    let entries = gen_entries(10_000, 4);
    g.bench_function("native", |b| {
        b.iter(|| black_box(snapshot(&NativeFormat, black_box(&entries))));
    });
    g.bench_function("ldif", |b| {
        b.iter(|| black_box(snapshot(&LdifFormat, black_box(&entries))));
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_unchanged,
    bench_edited,
    bench_indexing,
    bench_snapshot_writing
);
criterion_main!(benches);
