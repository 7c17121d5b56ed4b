#![allow(dead_code)]

/// Synthetic T2 stream: photons cycling over four channels, one every 37
/// timetags, with an overflow record whenever the timetag wraps.
pub fn t2_records(n: usize) -> Vec<u32> {
    let mut records = Vec::with_capacity(n);
    let mut t: u32 = 0;
    let mut i: u32 = 0;
    while records.len() < n {
        t += 37;
        if t >= 0x200_0000 {
            t -= 0x200_0000;
            records.push(0xFE00_0001);
            continue;
        }
        records.push((i % 4) << 25 | t);
        i += 1;
    }
    records
}

/// Synthetic absolute timestamps, increasing
pub fn timestamps(n: usize) -> Vec<u64> {
    (0..n as u64).map(|i| i * 37 + i % 11).collect()
}
