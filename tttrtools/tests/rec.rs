use tttrtools::rec::{self, Event, Mode, RecordKind, T2_WRAPAROUND, T3_WRAPAROUND};
use tttrtools::Error;

fn t2(channel: u8, timetag: u32) -> u32 {
    (channel as u32 - 1) << 25 | timetag
}

fn t2_special(code: u32, timetag: u32) -> u32 {
    1 << 31 | code << 25 | timetag
}

fn t3(channel: u8, dtime: u16, nsync: u32) -> u32 {
    (channel as u32 - 1) << 25 | (dtime as u32) << 10 | nsync
}

#[test]
fn unwrap_across_overflow() {
    let buffer = [0x0000_0005, 0xFE00_0003, 0x0000_0010];
    let d = rec::decode(&buffer, Mode::T2, 1, RecordKind::Photon).unwrap();
    assert_eq!(d.total_overflow, 3);
    assert_eq!(d.overflows, vec![0, 3]);
    assert_eq!(d.absolute(Mode::T2, 0), vec![5, 3 * 0x200_0000 + 16]);
    assert!(d.dtimes.is_empty());
}

#[test]
fn earlier_overflows_carry_over() {
    let buffer = [t2(1, 7)];
    let d = rec::decode(&buffer, Mode::T2, 1, RecordKind::Photon).unwrap();
    assert_eq!(d.absolute(Mode::T2, 2), vec![2 * T2_WRAPAROUND + 7]);
}

#[test]
fn selects_by_channel() {
    let buffer = [t2(1, 1), t2(2, 2), t2(3, 3), t2(2, 4)];
    let d = rec::decode(&buffer, Mode::T2, 2, RecordKind::Photon).unwrap();
    assert_eq!(d.fields, vec![2, 4]);
    let d = rec::decode(&buffer, Mode::T2, 64, RecordKind::Photon).unwrap();
    assert!(d.is_empty());
    assert_eq!(d.total_overflow, 0);
}

#[test]
fn highest_channel() {
    let buffer = [t2(64, 9)];
    assert_eq!(buffer[0], 0x7E00_0009);
    let d = rec::decode(&buffer, Mode::T2, 64, RecordKind::Photon).unwrap();
    assert_eq!(d.fields, vec![9]);
}

#[test]
fn sync_and_markers() {
    let buffer = [t2_special(0, 10), t2_special(5, 11), t2(1, 12), t2_special(1, 13)];
    let d = rec::decode(&buffer, Mode::T2, 0, RecordKind::Sync).unwrap();
    assert_eq!(d.fields, vec![10]);
    let d = rec::decode(&buffer, Mode::T2, 5, RecordKind::Marker).unwrap();
    assert_eq!(d.fields, vec![11]);
    let d = rec::decode(&buffer, Mode::T2, 1, RecordKind::Marker).unwrap();
    assert_eq!(d.fields, vec![13]);
}

#[test]
fn t3_fields() {
    let buffer = [t3(2, 0x7fff, 0x3ff), 0xFE00_0002, t3(2, 17, 1)];
    let d = rec::decode(&buffer, Mode::T3, 2, RecordKind::Photon).unwrap();
    assert_eq!(d.fields, vec![0x3ff, 1]);
    assert_eq!(d.dtimes, vec![0x7fff, 17]);
    assert_eq!(d.absolute(Mode::T3, 0), vec![0x3ff, 2 * T3_WRAPAROUND + 1]);
}

#[test]
fn empty_buffer() {
    let d = rec::decode(&[], Mode::T3, 1, RecordKind::Photon).unwrap();
    assert!(d.is_empty());
    assert_eq!(d.total_overflow, 0);
}

#[test]
fn only_overflows() {
    let buffer = [0xFE00_0001, 0xFE00_0004];
    let d = rec::decode(&buffer, Mode::T2, 1, RecordKind::Photon).unwrap();
    assert!(d.is_empty());
    assert_eq!(d.total_overflow, 5);
}

#[test]
fn malformed_records() {
    // Reserved special code in T2
    let buffer = [t2(1, 1), t2_special(16, 0)];
    match rec::decode(&buffer, Mode::T2, 1, RecordKind::Photon) {
        Err(Error::MalformedRecord { index, record }) => {
            assert_eq!(index, 1);
            assert_eq!(record, buffer[1]);
        }
        r => panic!("expected a malformed record, got {:?}", r),
    }
    // No sync events in T3
    assert!(matches!(
        rec::decode(&[t2_special(0, 0)], Mode::T3, 1, RecordKind::Photon),
        Err(Error::MalformedRecord { index: 0, .. })
    ));
}

#[test]
fn invalid_selections() {
    for (mode, channel, kind) in [
        (Mode::T2, 0, RecordKind::Photon),
        (Mode::T2, 65, RecordKind::Photon),
        (Mode::T3, 0, RecordKind::Sync),
        (Mode::T2, 0, RecordKind::Marker),
        (Mode::T2, 16, RecordKind::Marker),
    ] {
        assert!(matches!(
            rec::decode(&[], mode, channel, kind),
            Err(Error::InvalidSelection(_))
        ));
    }
}

#[test]
fn event_iterator() {
    let buffer = [t2(3, 1), 0xFE00_0002, t2_special(0, 4), t2_special(20, 0), t2_special(2, 5)];
    let events: Vec<_> = rec::events(&buffer, Mode::T2).collect();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0].as_ref().unwrap(), &(0, Event::Photon { channel: 3, timetag: 1, dtime: 0 }));
    assert_eq!(events[1].as_ref().unwrap(), &(2, Event::Overflow { count: 2 }));
    assert_eq!(events[2].as_ref().unwrap(), &(2, Event::Sync { timetag: 4 }));
    assert!(events[3].is_err());
    assert_eq!(events[4].as_ref().unwrap(), &(2, Event::Marker { bits: 2, timetag: 5, dtime: 0 }));
}

#[test]
fn single_record_classifier() {
    assert_eq!(
        rec::decode_record(Mode::T3, t3(4, 3, 2)),
        Some(Event::Photon { channel: 4, timetag: 2, dtime: 3 })
    );
    assert_eq!(rec::decode_record(Mode::T2, t2_special(0, 8)), Some(Event::Sync { timetag: 8 }));
    assert_eq!(rec::decode_record(Mode::T3, t2_special(0, 8)), None);
    assert_eq!(rec::decode_record(Mode::T2, 0xFE00_0002), Some(Event::Overflow { count: 2 }));
    assert_eq!(rec::decode_record(Mode::T2, t2_special(0x3e, 0)), None);
}
