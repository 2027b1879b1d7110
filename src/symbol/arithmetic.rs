//! Range-coded arithmetic decoder (MSAC) over adaptive CDF vectors.
//!
//! Per AV1 Specification Section 8.2.2 (Arithmetic Decoding Process). Follows
//! the daala/rav1d entropy-coder shape: a windowed accumulator (`value`),
//! a coding `range`, and a refill counter (`cnt`) tracking how many buffered
//! bits remain valid.

use crate::error::{Av1Error, Result};

/// CDF scale constant (32768 = 2^15).
pub const CDF_SCALE: u32 = 1 << 15;

const EC_WIN_SIZE: usize = std::mem::size_of::<usize>() * 8;
const INITIAL_RANGE: u32 = 0x8000;

const MIN_CNT: i32 = -31;
const MAX_CNT: i32 = EC_WIN_SIZE as i32;

/// A CDF together with its adaptation hit-count, stored as the final entry
/// per the AV1 convention `cdf[N+1]` where `cdf[N]` is the observation count
/// used to schedule the adaptation rate (fast early, slow later).
#[derive(Debug, Clone)]
pub struct Cdf {
    /// `n_symbols + 1` cumulative values in `[0, 32768]`, terminated by
    /// `32768`, followed by one hit-count entry.
    entries: Vec<u16>,
}

impl Cdf {
    /// Builds a CDF from cumulative probabilities (not including the
    /// trailing `32768` terminator or the hit-count slot).
    pub fn from_probs(cum_probs: &[u16]) -> Self {
        let mut entries = Vec::with_capacity(cum_probs.len() + 2);
        entries.extend_from_slice(cum_probs);
        entries.push(CDF_SCALE as u16);
        entries.push(0); // hit count
        Self { entries }
    }

    pub fn n_symbols(&self) -> usize {
        self.entries.len() - 2
    }

    /// The cumulative-probability part, excluding the trailing hit count.
    #[inline]
    pub fn probs(&self) -> &[u16] {
        &self.entries[..self.entries.len() - 1]
    }

    #[inline]
    fn probs_mut(&mut self) -> &mut [u16] {
        let last = self.entries.len() - 1;
        &mut self.entries[..last]
    }

    #[inline]
    fn count(&self) -> u16 {
        *self.entries.last().unwrap()
    }

    #[inline]
    fn count_mut(&mut self) -> &mut u16 {
        self.entries.last_mut().unwrap()
    }

    /// Adapts the CDF toward the observed `symbol`, per the AV1 spec's
    /// `update_cdf` procedure: rate is derived from the hit count
    /// (`count4 = min(count >> 4, 5)`), fast-adapting while the count is
    /// low and slowing as it accumulates (capped at 32 updates' worth of
    /// history, matching the spec's count saturation).
    fn adapt(&mut self, symbol: u8) {
        let n_symbols = self.n_symbols();
        let count = self.count();
        let count4 = (count >> 4).min(5) as u32;
        let rate = 3 + (n_symbols > 3) as u32 + count4;

        let probs = self.probs_mut();
        for (i, p) in probs.iter_mut().enumerate().take(n_symbols) {
            let bit = (i as u8) >= symbol;
            if bit {
                *p -= *p >> rate;
            } else {
                *p += (CDF_SCALE as u16 - *p) >> rate;
            }
        }
        let c = self.count_mut();
        *c = c.saturating_add(1).min(32);
    }
}

/// Arithmetic decoder state implementing the daala entropy coder used by
/// AV1.
pub struct ArithmeticDecoder<'a> {
    data: &'a [u8],
    offset: usize,
    pub range: u32,
    pub value: usize,
    pub cnt: i32,
    pub count: u64,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Initializes the decoder per AV1 spec Section 8.2.1.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Av1Error::invalid_bitstream(
                0,
                "arithmetic decoder needs at least 2 bytes",
            ));
        }

        let mut decoder = Self {
            data,
            offset: 0,
            range: INITIAL_RANGE,
            value: 0,
            cnt: -15,
            count: 0,
        };

        decoder.refill()?;

        tracing::trace!(
            value = decoder.value,
            range = decoder.range,
            cnt = decoder.cnt,
            "arithmetic decoder initialized"
        );

        Ok(decoder)
    }

    /// `decode_symbol(cdf)`: returns a symbol in `[0,N)`, adapting `cdf`
    /// toward the observed outcome.
    pub fn decode_symbol(&mut self, cdf: &mut Cdf) -> Result<u8> {
        let symbol = self.read_symbol_raw(cdf.probs())?;
        cdf.adapt(symbol);
        Ok(symbol)
    }

    /// `decode_bool_adapt(p)`: adaptive binary draw. `p` is the cumulative
    /// probability of symbol 0 (scaled to `[0, 32768]`).
    pub fn decode_bool_adapt(&mut self, cdf: &mut Cdf) -> Result<bool> {
        Ok(self.decode_symbol(cdf)? == 1)
    }

    /// `decode_bool(p)`: a non-adaptive binary draw with 15-bit probability.
    pub fn decode_bool(&mut self, prob: u16) -> Result<bool> {
        let probs = [prob, CDF_SCALE as u16];
        Ok(self.read_symbol_raw(&probs)? == 1)
    }

    /// `decode_uniform(n)`: equiprobable draw in `[0,n)` via MSAC (not raw
    /// bits): built as a flat non-adaptive CDF of `n` equal buckets.
    pub fn decode_uniform(&mut self, n: u8) -> Result<u8> {
        if n <= 1 {
            return Ok(0);
        }
        let mut probs = Vec::with_capacity(n as usize);
        for i in 1..n {
            probs.push(((i as u32 * CDF_SCALE) / n as u32) as u16);
        }
        probs.push(CDF_SCALE as u16);
        self.read_symbol_raw(&probs)
    }

    /// `decode_bools(n)`: `n` raw non-adaptive bits, each 50/50.
    pub fn decode_bools(&mut self, n: u8) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..n {
            result = (result << 1) | (self.decode_bool(CDF_SCALE as u16 / 2)? as u32);
        }
        Ok(result)
    }

    /// Core linear-search symbol lookup shared by every draw variant above.
    /// `probs` is the cumulative table terminated by `CDF_SCALE`, with no
    /// trailing hit-count slot.
    fn read_symbol_raw(&mut self, probs: &[u16]) -> Result<u8> {
        if probs.len() < 2 {
            return Err(Av1Error::invalid_bitstream(
                self.offset as u64,
                "CDF must have at least 2 entries",
            ));
        }
        let n_symbols = (probs.len() - 1) as u8;
        let last_value = *probs.last().unwrap();
        if last_value != CDF_SCALE as u16 {
            return Err(Av1Error::invalid_bitstream(
                self.offset as u64,
                format!("CDF last value must be {CDF_SCALE}: got {last_value}"),
            ));
        }

        let c = (self.value >> (EC_WIN_SIZE - 16)) as u32;
        let r = self.range;

        let mut symbol = 0u8;
        while (symbol as usize) < n_symbols as usize {
            let next_idx = (symbol + 1) as usize;
            let threshold = ((probs[next_idx] as u32) * r) >> 15;
            if c < threshold {
                break;
            }
            symbol += 1;
        }

        let fl = probs[symbol as usize] as u32;
        let next_idx = symbol as usize + 1;
        let fh = if next_idx < probs.len() {
            probs[next_idx] as u32
        } else {
            CDF_SCALE
        };
        let prob_range = fh - fl;

        let new_range = (r * prob_range) >> 15;
        let value_offset = (((r * fl) >> 15) as usize) << (EC_WIN_SIZE - 16);
        self.value = self.value.wrapping_sub(value_offset);
        self.range = new_range;

        self.renormalize()?;
        self.count += 1;
        Ok(symbol)
    }

    fn renormalize(&mut self) -> Result<()> {
        let d = (self.range.leading_zeros() as i32) - 16;

        if d > 0 {
            if self.cnt - d < MIN_CNT {
                return Err(Av1Error::invalid_bitstream(
                    self.offset as u64,
                    format!("arithmetic decoder cnt underflow: {} - {d}", self.cnt),
                ));
            }

            self.range <<= d;
            self.value <<= d;
            self.cnt -= d;

            if self.cnt < 0 {
                self.refill()?;
            }
        }

        debug_assert!(self.cnt <= MAX_CNT);
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        let mut c = (EC_WIN_SIZE as i32) - self.cnt - 24;
        if c < 0 {
            return Err(Av1Error::invalid_bitstream(
                self.offset as u64,
                format!("cnt underflow during refill: cnt={}", self.cnt),
            ));
        }

        let mut value = self.value;

        loop {
            if self.offset >= self.data.len() {
                if c >= 0 {
                    value |= !(!(0xFF_usize << c));
                }
                break;
            }

            let byte = self.data[self.offset];
            self.offset += 1;

            value |= (byte as usize) << c;
            c -= 8;

            if c < 0 {
                break;
            }
        }

        self.value = value;
        self.cnt = (EC_WIN_SIZE as i32) - c - 24;

        debug_assert!(self.cnt <= MAX_CNT);
        Ok(())
    }

    pub fn byte_offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_creation() {
        let data = vec![0x80, 0x00, 0x12, 0x34];
        let decoder = ArithmeticDecoder::new(&data).unwrap();
        assert_eq!(decoder.range, INITIAL_RANGE);
    }

    #[test]
    fn test_decoder_too_short() {
        let data = vec![0x80];
        assert!(ArithmeticDecoder::new(&data).is_err());
    }

    #[test]
    fn test_read_symbol_uniform() {
        let mut cdf = Cdf::from_probs(&[8192, 16384, 24576]);
        let data = vec![0x80, 0x00, 0x00, 0x00];
        let mut decoder = ArithmeticDecoder::new(&data).unwrap();

        let symbol = decoder.decode_symbol(&mut cdf).unwrap();
        assert_eq!(symbol, 2);
    }

    #[test]
    fn test_cdf_adaptation_bounded() {
        let mut cdf = Cdf::from_probs(&[8192, 16384, 24576]);
        let data = vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        let mut decoder = ArithmeticDecoder::new(&data).unwrap();

        for _ in 0..4 {
            let _ = decoder.decode_symbol(&mut cdf);
            let probs = cdf.probs();
            for w in probs.windows(2) {
                assert!(w[0] <= w[1]);
            }
            assert_eq!(*probs.last().unwrap(), CDF_SCALE as u16);
        }
    }

    #[test]
    fn test_decode_bool() {
        let data = vec![0x80, 0x00, 0x00, 0x00];
        let mut decoder = ArithmeticDecoder::new(&data).unwrap();
        assert!(decoder.decode_bool(16384).is_ok());
    }

    #[test]
    fn test_decode_uniform_n1_trivial() {
        let data = vec![0x80, 0x00, 0x00, 0x00];
        let mut decoder = ArithmeticDecoder::new(&data).unwrap();
        assert_eq!(decoder.decode_uniform(1).unwrap(), 0);
    }

    #[test]
    fn test_rejects_malformed_cdf_terminator() {
        let data = vec![0x80, 0x00, 0x00, 0x00];
        let mut decoder = ArithmeticDecoder::new(&data).unwrap();
        let bad = [8192u16, 16384, 24576, 30000];
        assert!(decoder.read_symbol_raw(&bad).is_err());
    }
}
