use chrono::{TimeZone, Utc};
use std::io::Cursor;
use tttrtools::cfg::Settings;
use tttrtools::meta::{self, RunInfo};
use tttrtools::ptu::{self, StopReason};
use tttrtools::{de, ser, Error, Mode, Tag, TagType, TagValue};

fn int_tag_bytes(id: &str, index: u32, value: i64) -> Vec<u8> {
    let mut v = id.as_bytes().to_vec();
    v.resize(32, 0);
    v.extend_from_slice(&index.to_le_bytes());
    v.extend_from_slice(&[0x08, 0x00, 0x00, 0x10]);
    v.extend_from_slice(&value.to_le_bytes());
    v
}

#[test]
fn int8_layout() {
    let t = Tag::new("Measurement_Mode", None, TagValue::Int(2)).unwrap();
    let bytes = ser::tag(&t).unwrap();
    assert_eq!(bytes.len(), 48);
    assert_eq!(bytes, int_tag_bytes("Measurement_Mode", 0xffff_ffff, 2));

    let t = Tag::new("HWInputChan_Offset", Some(1), TagValue::Int(-5)).unwrap();
    assert_eq!(ser::tag(&t).unwrap(), int_tag_bytes("HWInputChan_Offset", 1, -5));
}

#[test]
fn payloads_are_padded() {
    for s in ["", "a", "1234567", "12345678", "TimeHarp 260 P"] {
        let t = Tag::new("File_Comment", None, TagValue::Str(s.to_string())).unwrap();
        let bytes = ser::tag(&t).unwrap();
        let len = u64::from_le_bytes(bytes[40..48].try_into().unwrap()) as usize;
        assert_eq!(len % 8, 0);
        assert!(len > s.len());
        assert_eq!(bytes.len(), 48 + len);
        assert_eq!(&bytes[48..48 + s.len()], s.as_bytes());
        assert!(bytes[48 + s.len()..].iter().all(|&b| b == 0));
    }
}

#[test]
fn payload_types() {
    let with_payload = [
        TagType::Float8Array,
        TagType::AnsiString,
        TagType::WideString,
        TagType::BinaryBlob,
    ];
    for code in [
        0xFFFF0008u32, 0x00000008, 0x10000008, 0x11000008, 0x12000008, 0x20000008, 0x21000008,
        0x2001FFFF, 0x4001FFFF, 0x4002FFFF, 0xFFFFFFFF,
    ] {
        let typ = TagType::from_code(code).unwrap();
        assert_eq!(typ.code(), code);
        assert_eq!(typ.has_payload(), with_payload.contains(&typ));
    }
}

#[test]
fn wide_string_round_trip() {
    let t = Tag::typed("File_Comment", None, TagType::WideString, TagValue::Str("Ωmega".into()));
    let bytes = ser::tag(&t).unwrap();
    assert_eq!((bytes.len() - 48) % 8, 0);
    assert_eq!(de::tag(&mut Cursor::new(bytes)).unwrap(), t);
}

#[test]
fn mismatched_value_is_rejected() {
    let t = Tag::new("Measurement_Mode", None, TagValue::Float(2.0)).unwrap();
    assert!(matches!(ser::tag(&t), Err(Error::TagValueMismatch { .. })));
    let mut out = Vec::new();
    assert!(ser::ptu(&mut out, &[1, 2, 3], &[t]).is_err());
    assert!(out.is_empty());
}

#[test]
fn long_and_unknown_ids() {
    let long = "X".repeat(33);
    let t = Tag::typed(&long, None, TagType::Int8, TagValue::Int(0));
    assert!(matches!(ser::tag(&t), Err(Error::TagIdTooLong(_))));
    assert!(matches!(
        Tag::new("Not_A_Tag", None, TagValue::Int(0)),
        Err(Error::UnknownTag(_))
    ));
}

#[test]
fn unknown_type_code() {
    let mut bytes = int_tag_bytes("Measurement_Mode", 0xffff_ffff, 2);
    bytes[36..40].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    assert!(matches!(
        de::tag(&mut Cursor::new(bytes)),
        Err(Error::UnknownTagType(0x1234_5678))
    ));
}

#[test]
fn header_layout() {
    let tags = [
        Tag::new("Measurement_Mode", None, TagValue::Int(3)).unwrap(),
        Tag::header_end(),
    ];
    let bytes = ser::header(&tags).unwrap();
    assert_eq!(&bytes[..8], b"PQTTTR\0\0");
    assert_eq!(&bytes[8..16], b"1.1.00\0\0");
    // One tag and the sentinel, which is never duplicated
    assert_eq!(bytes.len(), 16 + 2 * 48);
    assert_eq!(&bytes[64..74], b"Header_End");
    assert_eq!(&bytes[100..104], &[0x08, 0x00, 0xff, 0xff]);
}

#[test]
fn bad_magic() {
    let mut bytes = ser::header(&[]).unwrap();
    bytes[0] = b'X';
    assert!(matches!(de::ptu(Cursor::new(bytes)), Err(Error::BadMagic)));
}

#[test]
fn truncated_file() {
    let mut bytes = Vec::new();
    ser::ptu(&mut bytes, &[1, 2], &[]).unwrap();
    bytes.pop();
    assert!(matches!(de::ptu(Cursor::new(&bytes)), Err(Error::Truncated(_))));
    assert!(matches!(de::ptu(Cursor::new(&bytes[..40])), Err(Error::Truncated(_))));
}

#[test]
fn every_value_type_round_trips() {
    let created = Utc.timestamp_millis_opt(1_600_000_000_123).unwrap();
    let tags = vec![
        Tag::typed("Empty", None, TagType::Empty8, TagValue::Empty),
        Tag::new("MeasDesc_Restart", None, TagValue::Bool(true)).unwrap(),
        Tag::new("HWSync_Offset", None, TagValue::Int(-1)).unwrap(),
        Tag::typed("Mask", Some(0), TagType::BitSet64, TagValue::Bytes8([1, 2, 3, 4, 5, 6, 7, 8])),
        Tag::typed("Color", None, TagType::Color8, TagValue::Bytes8([0xff; 8])),
        Tag::new("MeasDesc_Resolution", None, TagValue::Float(2.5e-11)).unwrap(),
        Tag::new("File_CreatingTime", None, TagValue::datetime(&created)).unwrap(),
        Tag::typed("Curve", None, TagType::Float8Array, TagValue::FloatArray(vec![1.0, -0.5])),
        Tag::new("File_Comment", None, TagValue::Str("hello".into())).unwrap(),
        Tag::typed("Blob", None, TagType::BinaryBlob, TagValue::Blob(vec![9; 16])),
    ];
    let records: Vec<u32> = (0..1000).map(|i| i * 0x0101).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("all.ptu");
    ser::write_ptu(&path, &records, &tags).unwrap();

    let file = de::read_ptu(&path).unwrap();
    assert_eq!(file.header.version, ptu::FILE_VERSION);
    assert_eq!(file.header.tags, tags);
    assert_eq!(file.records, records);
    let t = file.header.get("File_CreatingTime", None).unwrap();
    assert_eq!(t.value.as_datetime(), Some(created));
}

#[test]
fn run_header() {
    let created = chrono::Local.timestamp_opt(1_700_000_000, 0).unwrap();
    let info = RunInfo {
        mode: Mode::T3,
        base_resolution: 100_000.0,
        resolution: 25.0,
        sync_rate: 10_000_000,
        n_channels: 2,
        n_records: 3,
        stop_reason: StopReason::TimeOver,
        acquisition_time: 1000,
        comment: Some(String::from("decay")),
        created,
    };
    let settings = Settings::default();
    let tags = meta::tags(&settings, &info).unwrap();
    let mut bytes = Vec::new();
    ser::ptu(&mut bytes, &[1, 2, 3], &tags).unwrap();
    let file = de::ptu(Cursor::new(bytes)).unwrap();
    let h = &file.header;

    assert_eq!(h.mode(), Some(Mode::T3));
    assert_eq!(h.n_records(), Some(3));
    assert_eq!(h.int("TTResultFormat_TTTRRecType"), Some(0x00010306));
    assert_eq!(h.int("TTResultFormat_BitsPerRecord"), Some(32));
    assert_eq!(h.int("TTResult_StopReason"), Some(0));
    assert_eq!(h.int("HWSync_CFDLevel"), Some(-180));
    assert!((h.global_resolution_ps().unwrap() - 100_000.0).abs() < 1e-6);
    assert!((h.resolution_ps().unwrap() - 25.0).abs() < 1e-9);
    for i in 0..2 {
        assert!(h.get("HWInputChan_Offset", Some(i)).is_some());
        assert!(h.get("HWInputChan_CFDZeroCross", Some(i)).is_some());
    }
    assert!(h.get("HWSync_TrgLevel", None).is_none());
    assert_eq!(h.get("File_Comment", None).unwrap().value.as_str(), Some("decay"));
    let guid = h.get("File_GUID", None).unwrap().value.as_str().unwrap();
    assert_eq!(guid.len(), 36);
    assert_eq!(h.get("File_CreatingTime", None).unwrap().value.as_datetime(), Some(created.with_timezone(&Utc)));
}

#[test]
fn nano_model_uses_triggers() {
    let info = RunInfo {
        mode: Mode::T2,
        base_resolution: 250.0,
        resolution: 250.0,
        sync_rate: 0,
        n_channels: 1,
        n_records: 0,
        stop_reason: StopReason::Manual,
        acquisition_time: 0,
        comment: None,
        created: chrono::Local::now(),
    };
    let settings = Settings { model: String::from(meta::MODEL_NANO), ..Default::default() };
    let tags = meta::tags(&settings, &info).unwrap();
    assert!(tags.iter().any(|t| t.id == "HWInpChan_TrgLevel" && t.index == Some(0)));
    assert!(!tags.iter().any(|t| t.id.contains("CFD")));
    assert!(!tags.iter().any(|t| t.id == "File_Comment"));

    let settings = Settings { model: String::from("Unknown box"), ..Default::default() };
    assert!(matches!(
        meta::tags(&settings, &info),
        Err(Error::UnknownRecordFormat { .. })
    ));
}

#[test]
fn tsv_output() {
    use tttrtools::rec::Event;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(Vec::new());
    let tags = [Tag::new("HWInputChan_Offset", Some(1), TagValue::Int(7)).unwrap()];
    ser::tsv_tags(&mut wtr, &tags).unwrap();
    ser::tsv_event(&mut wtr, &Event::Photon { channel: 2, timetag: 5, dtime: 9 }, 1029).unwrap();
    ser::tsv_event(&mut wtr, &Event::Marker { bits: 0b0101, timetag: 1, dtime: 0 }, 1).unwrap();
    ser::tsv_event(&mut wtr, &Event::Overflow { count: 1 }, 0).unwrap();
    let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
    assert_eq!(out, "HWInputChan_Offset\t1\tInt8\t7\nphoton\t2\t1029\t9\nmarker\t1,3\t1\t0\n");
}
