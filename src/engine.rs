//! Decode-engine interface and the crate's reference engine
//!
//! The decode session treats the engine as a black box: it hands over the received codeword
//! LLRs together with the combining buffer reserved for the session, and the engine accumulates
//! soft information into the buffer as a side effect of producing a decoded transport block.
//! [`ChaseDecoder`] is the reference implementation used by the simulator and the tests: it
//! chase-combines the incoming LLRs with the buffer contents, hard-slices the accumulated soft
//! values, and verifies a CRC-16 per codeblock.

use std::fmt;

use crate::pool::CombiningBuffer;
use crate::utils::{bpsk_slicer, crc16, pack_bits, unpack_bits};
use crate::{Bit, Error};

/// Length of the per-codeblock checksum used by the reference engine, in bits.
const CB_CRC_BITS: usize = 16;

/// Per-codeblock bit counts of a segmented transport block
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub struct CodeblockLayout {
    /// Payload bits per codeblock (the last codeblock is zero-padded up to this count)
    pub payload_bits: usize,
    /// Total bits per codeblock, payload plus checksum
    pub total_bits: usize,
}

/// Returns the per-codeblock layout of a transport block of `tbs_bits` payload bits split into
/// `nof_codeblocks` codeblocks.
///
/// # Panics
///
/// Panics if `tbs_bits` or `nof_codeblocks` is zero.
#[must_use]
pub fn codeblock_layout(tbs_bits: usize, nof_codeblocks: usize) -> CodeblockLayout {
    assert!(tbs_bits > 0 && nof_codeblocks > 0);
    let payload_bits = tbs_bits.div_ceil(nof_codeblocks);
    CodeblockLayout {
        payload_bits,
        total_bits: payload_bits + CB_CRC_BITS,
    }
}

/// Segments a transport block into codeblocks with a CRC-16 appended to each.
///
/// Transmit-side counterpart of [`ChaseDecoder`]: the payload is split into `nof_codeblocks`
/// equal codeblocks (the last one zero-padded), and each codeblock carries the checksum of its
/// own payload bits. The result has `nof_codeblocks * total_bits` bits per
/// [`codeblock_layout`].
///
/// # Panics
///
/// Panics if `payload` is empty or `nof_codeblocks` is zero.
#[must_use]
pub fn segment_transport_block(payload: &[Bit], nof_codeblocks: usize) -> Vec<Bit> {
    let layout = codeblock_layout(payload.len(), nof_codeblocks);
    let mut code_bits = Vec::with_capacity(nof_codeblocks * layout.total_bits);
    for index in 0 .. nof_codeblocks {
        let start = index * layout.payload_bits;
        let end = (start + layout.payload_bits).min(payload.len());
        let mut codeblock = payload[start .. end].to_vec();
        codeblock.resize(layout.payload_bits, Bit::Zero);
        let checksum = crc16(&codeblock);
        code_bits.extend_from_slice(&codeblock);
        code_bits.extend_from_slice(&unpack_bits(&checksum.to_be_bytes(), CB_CRC_BITS));
    }
    code_bits
}

/// Configuration forwarded to the decode engine for one codeword
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub struct DecodeConfig {
    /// Transport-block size in bits
    pub tbs_bits: usize,
    /// Iteration budget per codeblock
    pub max_iterations: u32,
}

/// Outcome of decoding one codeword
#[derive(Clone, PartialEq, Debug)]
pub struct DecodeOutput {
    /// Decoded transport block, packed MSB first
    pub transport_block: Vec<u8>,
    /// CRC outcome per codeblock
    pub codeblock_crc_ok: Vec<bool>,
    /// Iterations spent per codeblock
    pub iterations: Vec<u32>,
}

/// External decode engine invoked synchronously by the decode session.
///
/// Implementations accumulate soft information into the combining buffer as a side effect; no
/// engine state other than the buffer is visible to the session.
pub trait DecodeEngine: fmt::Debug {
    /// Decodes one codeword against the combining buffer reserved for its session.
    ///
    /// # Errors
    ///
    /// Returns an error if the LLR array does not match the buffer's codeblock layout.
    fn decode(
        &self,
        llrs: &[f64],
        buffer: &mut CombiningBuffer,
        config: &DecodeConfig,
    ) -> Result<DecodeOutput, Error>;
}

/// Reference decode engine with chase combining and per-codeblock CRC-16 verification
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default)]
pub struct ChaseDecoder;

impl DecodeEngine for ChaseDecoder {
    fn decode(
        &self,
        llrs: &[f64],
        buffer: &mut CombiningBuffer,
        config: &DecodeConfig,
    ) -> Result<DecodeOutput, Error> {
        let nof_codeblocks = buffer.nof_codeblocks();
        let layout = codeblock_layout(config.tbs_bits, nof_codeblocks);
        if llrs.len() != nof_codeblocks * layout.total_bits {
            return Err(Error::InvalidArgument(format!(
                "For {} codeblocks of {} bits, expected {} codeword LLR values (found {})",
                nof_codeblocks,
                layout.total_bits,
                nof_codeblocks * layout.total_bits,
                llrs.len()
            )));
        }
        if layout.total_bits > buffer.codeblock_soft_bits(0).len() {
            return Err(Error::InvalidArgument(format!(
                "Codeblock of {} bits exceeds the buffer codeblock capacity of {}",
                layout.total_bits,
                buffer.codeblock_soft_bits(0).len()
            )));
        }

        let mut payload_bits = Vec::with_capacity(nof_codeblocks * layout.payload_bits);
        let mut codeblock_crc_ok = Vec::with_capacity(nof_codeblocks);
        let mut iterations = Vec::with_capacity(nof_codeblocks);
        for (index, chunk) in llrs.chunks_exact(layout.total_bits).enumerate() {
            // Codeblocks that already passed their CRC in an earlier transmission are left
            // untouched; the retransmitted LLRs for them are discarded.
            let already_ok = buffer.codeblock_crc_ok(index);
            if !already_ok {
                let soft = &mut buffer.codeblock_soft_bits_mut(index)[.. layout.total_bits];
                for (accumulated, &llr) in soft.iter_mut().zip(chunk) {
                    *accumulated += llr;
                }
            }
            let bits = bpsk_slicer(&buffer.codeblock_soft_bits(index)[.. layout.total_bits]);
            let (payload, checksum) = bits.split_at(layout.payload_bits);
            let crc_ok = already_ok || crc16(payload) == bits_to_u16(checksum);
            buffer.set_codeblock_crc(index, crc_ok);
            codeblock_crc_ok.push(crc_ok);
            iterations.push(match (already_ok, crc_ok) {
                (true, _) => 0,
                (false, true) => 1,
                (false, false) => config.max_iterations,
            });
            payload_bits.extend_from_slice(payload);
        }
        payload_bits.truncate(config.tbs_bits);
        Ok(DecodeOutput {
            transport_block: pack_bits(&payload_bits),
            codeblock_crc_ok,
            iterations,
        })
    }
}

/// Assembles a big-endian bit sequence into a 16-bit value.
fn bits_to_u16(bits: &[Bit]) -> u16 {
    bits.iter()
        .fold(0u16, |value, &bit| value << 1 | u16::from(bit == Bit::One))
}
