//! Transport-block segmentation sizes for the LDPC base graphs of 5G NR
//!
//! Only the segmentation arithmetic lives here: the decode session cross-checks the
//! caller-declared codeblock count against the count implied by the transport-block size and
//! base-graph choice, computed independently of the buffer pool.

use serde::{Deserialize, Serialize};

/// Enumeration of the LDPC base graphs defined in TS 38.212
#[derive(Clone, Eq, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub enum BaseGraph {
    /// Base graph 1 (large transport blocks, high code rates)
    Bg1,
    /// Base graph 2 (small transport blocks, low code rates)
    Bg2,
}

impl BaseGraph {
    /// Returns the maximum codeblock size of the base graph, in bits.
    #[must_use]
    pub fn max_codeblock_size(self) -> usize {
        match self {
            BaseGraph::Bg1 => 8448,
            BaseGraph::Bg2 => 3840,
        }
    }
}

/// Length of the transport-block CRC attached before segmentation, in bits.
const TB_CRC_LEN: usize = 24;

/// Length of the per-codeblock CRC attached when a transport block is segmented, in bits.
const CB_CRC_LEN: usize = 24;

/// Returns the number of codeblocks a transport block is segmented into.
///
/// Follows Section 5.2.2 of TS 38.212: with `B` the transport-block size plus its 24-bit CRC
/// and `Kcb` the maximum codeblock size of the base graph, the block forms a single codeblock
/// when `B <= Kcb` and otherwise splits into `ceil(B / (Kcb - 24))` codeblocks, each carrying
/// its own 24-bit CRC.
///
/// # Parameters
///
/// - `tbs_bits`: Transport-block size in bits, without the transport-block CRC.
///
/// - `base_graph`: LDPC base graph selected for the transmission.
///
/// # Examples
///
/// ```
/// use harqpool::ldpc::{expected_codeblocks, BaseGraph};
///
/// assert_eq!(expected_codeblocks(8424, BaseGraph::Bg1), 1);
/// assert_eq!(expected_codeblocks(8432, BaseGraph::Bg1), 2);
/// ```
#[must_use]
pub fn expected_codeblocks(tbs_bits: usize, base_graph: BaseGraph) -> usize {
    let payload_and_crc = tbs_bits + TB_CRC_LEN;
    let max_codeblock_size = base_graph.max_codeblock_size();
    if payload_and_crc <= max_codeblock_size {
        return 1;
    }
    payload_and_crc.div_ceil(max_codeblock_size - CB_CRC_LEN)
}

#[cfg(test)]
mod tests_of_segmentation {
    use super::*;

    #[test]
    fn test_expected_codeblocks_base_graph_1() {
        // 8424 + 24 = 8448 fits exactly in one BG1 codeblock; one more byte does not.
        assert_eq!(expected_codeblocks(8424, BaseGraph::Bg1), 1);
        assert_eq!(expected_codeblocks(8432, BaseGraph::Bg1), 2);
        // 2 * (8448 - 24) - 24 = 16824 is the largest two-codeblock size.
        assert_eq!(expected_codeblocks(16824, BaseGraph::Bg1), 2);
        assert_eq!(expected_codeblocks(16832, BaseGraph::Bg1), 3);
    }

    #[test]
    fn test_expected_codeblocks_base_graph_2() {
        assert_eq!(expected_codeblocks(16, BaseGraph::Bg2), 1);
        assert_eq!(expected_codeblocks(3816, BaseGraph::Bg2), 1);
        assert_eq!(expected_codeblocks(3824, BaseGraph::Bg2), 2);
    }
}
