//! Incremental time-binned histograms over absolute timestamps

use crate::buf::ExtendableBuffer;
use crate::error::{Error, Result};
use num_traits::{PrimInt, Unsigned};

/// An [`ExtendableBuffer`] of timestamps that also keeps a running histogram.
///
/// Each call to [`BinnedBuffer::bin_count`] only looks at the timestamps
/// appended since the previous call, bins them by `value / bin_factor`, and
/// adds the tally onto the counts retained so far. In `only_bin` mode the
/// consumed timestamps are dropped from the buffer after they are tallied,
/// bounding memory at the cost of losing the raw data.
#[derive(Clone, Debug)]
pub struct BinnedBuffer<T> {
    buffer: ExtendableBuffer<T>,
    bin_factor: Option<T>,
    counts: Vec<u64>,
    read_position: usize,
    only_bin: bool,
}

impl<T> BinnedBuffer<T>
where
    T: PrimInt + Unsigned + Default,
{
    pub fn new(bin_factor: Option<T>, only_bin: bool) -> Result<Self> {
        if let Some(f) = bin_factor {
            check_factor(f)?;
        }
        Ok(BinnedBuffer {
            buffer: ExtendableBuffer::new(),
            bin_factor,
            counts: Vec::new(),
            read_position: 0,
            only_bin,
        })
    }

    pub fn add(&mut self, values: &[T]) {
        self.buffer.add(values);
    }

    /// Histogram including every timestamp added so far.
    ///
    /// Calling this again without adding data returns the same counts.
    pub fn bin_count(&mut self) -> Result<&[u64]> {
        let factor = self
            .bin_factor
            .ok_or(Error::InvalidBinConfiguration("need to set bin factor"))?;

        let end = self.buffer.len();
        if end == self.read_position {
            return Ok(&self.counts);
        }

        // Tally separately so a failure leaves the counts untouched
        let mut tally: Vec<u64> = Vec::new();
        for &v in &self.buffer.data()[self.read_position..end] {
            let i = (v / factor)
                .to_usize()
                .ok_or(Error::InvalidBinConfiguration("bin index exceeds usize"))?;
            if i >= tally.len() {
                tally.resize(i + 1, 0);
            }
            tally[i] += 1;
        }

        if tally.len() > self.counts.len() {
            self.counts.resize(tally.len(), 0);
        }
        for (c, t) in self.counts.iter_mut().zip(tally) {
            *c += t;
        }

        if self.only_bin {
            self.buffer.remove(end);
            self.read_position = 0;
        } else {
            self.read_position = end;
        }
        Ok(&self.counts)
    }

    /// Change the bin factor, discarding the accumulated counts.
    ///
    /// Not possible in `only_bin` mode, since the raw data is gone.
    pub fn set_bin_factor(&mut self, bin_factor: T) -> Result<()> {
        if self.only_bin {
            return Err(Error::InvalidBinConfiguration(
                "cannot rebin: raw data is not kept in only_bin mode",
            ));
        }
        check_factor(bin_factor)?;
        self.bin_factor = Some(bin_factor);
        self.read_position = 0;
        self.counts.clear();
        Ok(())
    }
}

impl<T> BinnedBuffer<T> {
    pub fn data(&self) -> &[T] {
        self.buffer.data()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn bin_factor(&self) -> Option<&T> {
        self.bin_factor.as_ref()
    }

    pub fn only_bin(&self) -> bool {
        self.only_bin
    }

    /// Counts as of the last [`BinnedBuffer::bin_count`], without consuming new data
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of buffered timestamps already included in the counts
    pub fn read_position(&self) -> usize {
        self.read_position
    }
}

fn check_factor<T: PrimInt>(f: T) -> Result<()> {
    if f.is_zero() {
        return Err(Error::InvalidBinConfiguration("bin factor must be positive"));
    }
    Ok(())
}
