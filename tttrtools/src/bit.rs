//! Bitmask tools for marker records

use bit_iter::BitIter;

/// Returns all marker lines that fired in a marker bit pattern
pub fn marker_lines(bits: u8) -> Vec<u8> {
    let mut lines = Vec::new();
    for b in BitIter::from(bits) {
        // Lines are 1-indexed, bits are 0-indexed
        lines.push(1 + b as u8);
    }
    return lines;
}
