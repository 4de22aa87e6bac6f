//! # Bit-stream and channel helpers
//!
//! The [`random_bits`] function returns a given number of random bits; the [`bpsk_awgn_llrs`]
//! function returns the LLR values observed at the output of a BPSK-AWGN channel for given
//! transmitted bits; the [`bpsk_slicer`] function slices accumulated soft values back to bits;
//! the [`pack_bits`]/[`unpack_bits`] pair converts between bit and byte representations of a
//! transport block; the [`error_count`] function counts errors in a sequence with respect to a
//! reference sequence; and [`crc16`] computes the CRC-16/CCITT-FALSE checksum that the
//! reference decode engine attaches to each codeblock.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::Bit;

/// Generator polynomial of CRC-16/CCITT-FALSE.
const CRC16_POLY: u16 = 0x1021;

/// Returns given number of random bits.
///
/// # Parameters
///
/// - `num_bits`: Number of random bits to be generated.
#[must_use]
pub fn random_bits(num_bits: usize) -> Vec<Bit> {
    let mut rng = rand::rng();
    (0 .. num_bits)
        .map(|_| {
            if rng.random_bool(0.5) {
                Bit::One
            } else {
                Bit::Zero
            }
        })
        .collect()
}

/// Returns LLR values at BPSK-AWGN channel output corresponding to given input bits.
///
/// # Parameters
///
/// - `bits`: Bits transmitted over the BPSK-AWGN channel.
///
/// - `es_over_n0_db`: Ratio (dB) of symbol energy to noise power spectral density at the
///   channel output.
///
/// # Returns
///
/// - `llrs`: Log-likelihood-ratio values for the transmitted bits, with positive values
///   indicating that `Zero` is more likely.
#[must_use]
pub fn bpsk_awgn_llrs(bits: &[Bit], es_over_n0_db: f64) -> Vec<f64> {
    let mut rng = rand::rng();
    let es_over_n0 = 10f64.powf(0.1 * es_over_n0_db);
    let noise_var = 0.5 / es_over_n0;
    bits.iter()
        .map(|b| match b {
            Bit::Zero => 1f64,
            Bit::One => -1f64,
        })
        .map(|x| 4.0 * es_over_n0 * (x + noise_var.sqrt() * rng.sample::<f64, _>(StandardNormal)))
        .collect()
}

/// Returns BPSK slicer output: nonnegative soft values map to `Zero`, negative ones to `One`.
#[must_use]
pub fn bpsk_slicer(soft_values: &[f64]) -> Vec<Bit> {
    soft_values
        .iter()
        .map(|&x| if x >= 0.0 { Bit::Zero } else { Bit::One })
        .collect()
}

/// Packs bits into bytes, MSB first.
///
/// The last byte is zero-padded if the number of bits is not a multiple of 8.
#[must_use]
pub fn pack_bits(bits: &[Bit]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (position, &bit)| match bit {
                    Bit::One => byte | 0x80 >> position,
                    Bit::Zero => byte,
                })
        })
        .collect()
}

/// Unpacks the first `num_bits` bits of the given bytes, MSB first.
///
/// # Panics
///
/// Panics if `num_bits` exceeds `8 * bytes.len()`.
#[must_use]
pub fn unpack_bits(bytes: &[u8], num_bits: usize) -> Vec<Bit> {
    assert!(num_bits <= 8 * bytes.len());
    (0 .. num_bits)
        .map(|index| {
            if bytes[index / 8] & (0x80 >> (index % 8)) == 0 {
                Bit::Zero
            } else {
                Bit::One
            }
        })
        .collect()
}

/// Returns number of errors in a sequence with respect to a reference sequence.
///
/// # Parameters
///
/// - `seq`: Sequence in which errors must be counted.
///
/// - `ref_seq`: Reference sequence to which the given sequence is compared.
///
/// # Returns
///
/// - `err_count`: Number of positions in which the two sequences differ. If they are of
///   different lengths, then the longer sequence is effectively truncated to the length of the
///   shorter one.
#[must_use]
pub fn error_count<T: PartialEq>(seq: &[T], ref_seq: &[T]) -> usize {
    ref_seq
        .iter()
        .zip(seq.iter())
        .filter(|&(x, y)| x != y)
        .count()
}

/// Returns the CRC-16/CCITT-FALSE checksum of a bit sequence.
///
/// Bitwise implementation over the message bits in transmission order (initial value `0xFFFF`,
/// polynomial `0x1021`, no reflection, no final XOR).
#[must_use]
pub fn crc16(bits: &[Bit]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &bit in bits {
        let feedback = (crc >> 15) ^ u16::from(bit == Bit::One);
        crc <<= 1;
        if feedback == 1 {
            crc ^= CRC16_POLY;
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use Bit::{One, Zero};

    #[test]
    fn test_random_bits() {
        let num_bits = 0;
        assert!(random_bits(num_bits).is_empty());
        let num_bits = 10000;
        let bits = random_bits(num_bits);
        let num_zeros = bits.iter().filter(|&b| *b == Zero).count();
        let num_ones = bits.iter().filter(|&b| *b == One).count();
        assert!(num_zeros > 9 * num_bits / 20 && num_ones > 9 * num_bits / 20);
    }

    #[test]
    fn test_bpsk_awgn_llrs() {
        assert!(bpsk_awgn_llrs(&[], 0.0).is_empty());
        // At high SNR every LLR must land on the correct side of the slicer threshold.
        let bits = random_bits(1000);
        let llrs = bpsk_awgn_llrs(&bits, 20.0);
        assert_eq!(bpsk_slicer(&llrs), bits);
    }

    #[test]
    fn test_bpsk_slicer() {
        assert!(bpsk_slicer(&[]).is_empty());
        assert_eq!(bpsk_slicer(&[0.0, 0.01, -0.01]), [Zero, Zero, One]);
    }

    #[test]
    fn test_pack_and_unpack_bits() {
        assert!(pack_bits(&[]).is_empty());
        assert_eq!(pack_bits(&[One, Zero, One, Zero, One, Zero, One, One]), [0xAB]);
        // Zero padding of a partial trailing byte.
        assert_eq!(pack_bits(&[One, One, One]), [0xE0]);
        assert_eq!(
            unpack_bits(&[0xAB], 8),
            [One, Zero, One, Zero, One, Zero, One, One]
        );
        let bits = random_bits(64);
        assert_eq!(unpack_bits(&pack_bits(&bits), 64), bits);
    }

    #[test]
    fn test_error_count() {
        assert_eq!(error_count::<Bit>(&[], &[One, Zero]), 0);
        assert_eq!(error_count(&[One, Zero], &[]), 0);
        let seq = [Zero, One, Zero, One];
        let ref_seq = [Zero, Zero, Zero, Zero];
        assert_eq!(error_count(&seq, &ref_seq), 2);
        // Length mismatch truncates to the shorter sequence.
        assert_eq!(error_count(&seq[.. 2], &ref_seq), 1);
    }

    #[test]
    fn test_crc16() {
        // CRC-16/CCITT-FALSE check value: "123456789" -> 0x29B1.
        let message = unpack_bits(b"123456789", 72);
        assert_eq!(crc16(&message), 0x29B1);
        assert_eq!(crc16(&[]), 0xFFFF);
    }
}
