use std::io::Cursor;

use dirvi::engine::{self, ReconcileOptions};
use dirvi::entry::{Entry, ModOp, Modification};
use dirvi::index::BaselineIndex;
use dirvi::io::{build_index, read_entries, write_snapshot};
use dirvi::record::{LdifFormat, NativeFormat, Record, RecordFormat, Rename};
use dirvi::sink::{Renderer, Statistics};

fn entries() -> Vec<Entry> {
    vec![
        Entry::new("cn=a,dc=x").with("cn", "a").with("mail", "a@x"),
        Entry::new("cn=b,dc=x").with("cn", "b"),
        Entry::new("cn=J\u{fc}rgen,dc=x")
            .with("cn", "J\u{fc}rgen")
            .with("jpegPhoto", vec![0u8, 255, 10, 13, b' '])
            .with("description", " leading space and a long tail ".repeat(4)),
    ]
}

fn snapshot<F: RecordFormat>(format: &F, entries: &[Entry]) -> (Vec<u8>, BaselineIndex) {
    let mut out = Vec::new();
    let index = write_snapshot(format, &mut out, entries).unwrap();
    (out, index)
}

fn read_all<F: RecordFormat>(format: &F, bytes: &[u8]) -> Vec<Record> {
    let mut r = Cursor::new(bytes);
    let mut records = Vec::new();
    while let Some((_, record)) = format.read_record(&mut r, None).unwrap() {
        records.push(record);
    }
    records
}

#[test]
fn snapshots_read_back_byte_exact() {
    for bytes in [snapshot(&NativeFormat, &entries()).0, snapshot(&LdifFormat, &entries()).0] {
        let format_is_ldif = bytes.starts_with(b"version: 1\n");
        let back = if format_is_ldif {
            read_entries(&LdifFormat, &mut Cursor::new(&bytes)).unwrap()
        } else {
            read_entries(&NativeFormat, &mut Cursor::new(&bytes)).unwrap()
        };
        assert_eq!(back, entries());
    }
}

#[test]
fn snapshot_index_matches_a_fresh_parse() {
    let (native, index) = snapshot(&NativeFormat, &entries());
    assert_eq!(build_index(&NativeFormat, &mut Cursor::new(&native)).unwrap(), index);
    let (ldif, index) = snapshot(&LdifFormat, &entries());
    assert_eq!(build_index(&LdifFormat, &mut Cursor::new(&ldif)).unwrap(), index);
}

#[test]
fn ldif_baseline_reconciles_like_native() {
    for ldif in [false, true] {
        let (baseline, mut index) = if ldif {
            snapshot(&LdifFormat, &entries())
        } else {
            snapshot(&NativeFormat, &entries())
        };
        let working = String::from_utf8(baseline.clone())
            .unwrap()
            .replace("mail: a@x\n", "mail: a2@x\n");
        let mut stats = Statistics::default();
        let options = ReconcileOptions::default();
        let mut b = Cursor::new(baseline);
        let mut w = Cursor::new(working.into_bytes());
        let outcome = if ldif {
            engine::reconcile(&LdifFormat, &mut stats, &mut index, &mut b, &mut w, &options)
        } else {
            engine::reconcile(&NativeFormat, &mut stats, &mut index, &mut b, &mut w, &options)
        }
        .unwrap();
        assert!(outcome.is_success());
        assert_eq!(stats.modifies, 1, "ldif={ldif}");
        assert_eq!(stats.total(), 1, "ldif={ldif}");
    }
}

#[test]
fn native_edits_render_as_ldif_change_records() {
    let (baseline, mut index) = snapshot(&NativeFormat, &entries());
    let text = String::from_utf8(baseline.clone()).unwrap();
    let working = text
        .replace("mail: a@x\n", "mail: a2@x\n")
        .replace("\n1 cn=b,dc=x\ncn: b\n", "")
        + "\nadd cn=d,dc=x\ncn: d\n";

    let mut renderer = Renderer::new(LdifFormat, Vec::new());
    renderer.write_header().unwrap();
    let outcome = engine::reconcile(
        &NativeFormat,
        &mut renderer,
        &mut index,
        &mut Cursor::new(baseline),
        &mut Cursor::new(working.into_bytes()),
        &ReconcileOptions::default(),
    )
    .unwrap();
    assert!(outcome.is_success());

    let rendered = renderer.into_inner();
    assert_eq!(
        read_all(&LdifFormat, &rendered),
        vec![
            Record::Modify {
                dn: "cn=a,dc=x".to_string(),
                mods: vec![Modification::new("mail", ModOp::Replace, vec![b"a2@x".to_vec()])],
            },
            Record::Add(Entry::new("cn=d,dc=x").with("cn", "d")),
            Record::Delete("cn=b,dc=x".to_string()),
        ]
    );
}

#[test]
fn ldif_renames_render_as_native_change_records() {
    let (baseline, mut index) = snapshot(&LdifFormat, &entries()[..2]);
    let working = String::from_utf8(baseline.clone()).unwrap().replace(
        "dn: cn=b,dc=x\nldapvi-key: 1\ncn: b\n",
        "dn: cn=c,dc=x\nldapvi-key: 1\ncn: c\ncn: b\n",
    );

    let mut renderer = Renderer::new(NativeFormat, Vec::new());
    let outcome = engine::reconcile(
        &LdifFormat,
        &mut renderer,
        &mut index,
        &mut Cursor::new(baseline),
        &mut Cursor::new(working.into_bytes()),
        &ReconcileOptions::default(),
    )
    .unwrap();
    assert!(outcome.is_success());

    let rendered = renderer.into_inner();
    assert_eq!(
        read_all(&NativeFormat, &rendered),
        vec![Record::Rename(Rename {
            old_dn: "cn=b,dc=x".to_string(),
            new_dn: "cn=c,dc=x".to_string(),
            delete_old_rdn: false,
        })]
    );
}
