//! Simulator to evaluate HARQ chase-combining performance over a BPSK-AWGN channel
//!
//! Each simulation point drives a fresh [`DecoderContext`] through the full call surface:
//! `new` creates a buffer pool, every transmission of a transport block is a `step` call
//! (retransmitted with combining until the codeword CRC passes or the transmission budget is
//! exhausted), and `release` tears the pool down. Results are saved to a JSON file.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::{codeblock_layout, segment_transport_block, ChaseDecoder};
use crate::ldpc::{expected_codeblocks, BaseGraph};
use crate::pool::{PoolConfig, SessionId};
use crate::session::{BufferRequest, DecoderContext, Reply, Request, SegmentConfig};
use crate::utils::{bpsk_awgn_llrs, error_count, random_bits, unpack_bits};
use crate::Error;

/// Number of HARQ processes cycled through by the simulator.
const NOF_HARQ_PROCESSES: u8 = 16;

/// Parameters for a HARQ chase-combining simulation over a BPSK-AWGN channel
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SimParams {
    /// Transport-block size in bits
    pub tbs_bits: usize,
    /// LDPC base graph selected for all transmissions
    pub base_graph: BaseGraph,
    /// Ratio (dB) of symbol energy to noise power spectral density at the channel output
    pub es_over_n0_db: f64,
    /// Maximum number of transmissions per transport block (first transmission included)
    pub max_transmissions: u32,
    /// Number of transport blocks to be transmitted
    pub num_blocks: u32,
    /// Decoder iteration budget per codeblock
    pub max_iterations: u32,
    /// Buffer pool configuration
    pub pool: PoolConfig,
}

/// Results of a HARQ chase-combining simulation
#[derive(Clone, PartialEq, Debug, Copy, Serialize)]
pub struct SimResults {
    /// Simulation parameters
    pub params: SimParams,
    /// Number of transport blocks that failed all transmissions
    pub num_block_errors: u32,
    /// Block error rate after HARQ
    pub block_error_rate: f64,
    /// Bit error rate after HARQ, over the final decoded transport blocks
    pub bit_error_rate: f64,
    /// Average number of transmissions per transport block
    pub avg_transmissions: f64,
}

/// Runs a HARQ simulation for each set of parameters and saves all results to a JSON file.
///
/// The simulations for different parameter sets run in parallel, each against its own decoder
/// context.
///
/// # Errors
///
/// Returns an error if any parameter set is invalid, if any dispatched call fails, or if the
/// results cannot be written to `json_filename`.
pub fn run_harq_sims(all_params: &[SimParams], json_filename: &str) -> Result<(), Error> {
    let all_results = all_params
        .par_iter()
        .map(run_harq_sim)
        .collect::<Result<Vec<SimResults>, Error>>()?;
    for results in &all_results {
        eprintln!(
            "Es/N0 {:5.2} dB: BLER {:.3e}, BER {:.3e}, {:.3} transmissions per block",
            results.params.es_over_n0_db,
            results.block_error_rate,
            results.bit_error_rate,
            results.avg_transmissions
        );
    }
    let file = std::fs::File::create(json_filename)?;
    serde_json::to_writer_pretty(file, &all_results)?;
    Ok(())
}

/// Runs the HARQ simulation for one set of parameters.
///
/// # Errors
///
/// Returns an error if the parameters are invalid or if any dispatched call fails.
#[allow(clippy::cast_precision_loss)]
pub fn run_harq_sim(params: &SimParams) -> Result<SimResults, Error> {
    check_sim_params(params)?;
    let nof_codeblocks = expected_codeblocks(params.tbs_bits, params.base_graph);
    let segment = SegmentConfig {
        base_graph: params.base_graph,
        tbs_bits: params.tbs_bits,
        max_iterations: params.max_iterations,
    };

    let mut context = DecoderContext::new(Box::new(ChaseDecoder))?;
    let reply = context.call("new", Request::New { config: params.pool })?;
    let Reply::PoolHandle(handle) = reply else {
        return Err(Error::InvalidArgument(format!(
            "Unexpected reply to action 'new': {reply:?}"
        )));
    };

    let mut num_block_errors = 0u32;
    let mut num_bit_errors = 0usize;
    let mut num_transmissions = 0u64;
    for block in 0 .. params.num_blocks {
        let session = SessionId {
            rnti: 0x4601,
            harq_id: u8::try_from(block % u32::from(NOF_HARQ_PROCESSES)).expect("HARQ id fits u8"),
        };
        let payload = random_bits(params.tbs_bits);
        let code_bits = segment_transport_block(&payload, nof_codeblocks);
        let mut decoded = false;
        let mut decoded_bits = Vec::new();
        for transmission in 0 .. params.max_transmissions {
            let llrs = bpsk_awgn_llrs(&code_bits, params.es_over_n0_db);
            let reply = context.call(
                "step",
                Request::Step {
                    handle,
                    llrs,
                    is_new_data: transmission == 0,
                    segment,
                    request: BufferRequest {
                        session,
                        nof_codeblocks,
                    },
                },
            )?;
            num_transmissions += 1;
            let Reply::Decoded {
                transport_block,
                stats,
            } = reply
            else {
                return Err(Error::InvalidArgument(format!(
                    "Unexpected reply to action 'step': {reply:?}"
                )));
            };
            decoded_bits = unpack_bits(&transport_block, params.tbs_bits);
            if stats.tb_crc_ok {
                decoded = true;
                break;
            }
        }
        num_bit_errors += error_count(&decoded_bits, &payload);
        if !decoded {
            num_block_errors += 1;
        }
    }
    context.call("release", Request::Release { handle })?;

    Ok(SimResults {
        params: *params,
        num_block_errors,
        block_error_rate: f64::from(num_block_errors) / f64::from(params.num_blocks),
        bit_error_rate: num_bit_errors as f64
            / (f64::from(params.num_blocks) * params.tbs_bits as f64),
        avg_transmissions: num_transmissions as f64 / f64::from(params.num_blocks),
    })
}

/// Checks validity of simulation parameters.
fn check_sim_params(params: &SimParams) -> Result<(), Error> {
    if params.num_blocks == 0 {
        return Err(Error::InvalidArgument(
            "Number of blocks cannot be zero".to_string(),
        ));
    }
    if params.max_transmissions == 0 {
        return Err(Error::InvalidArgument(
            "Maximum number of transmissions cannot be zero".to_string(),
        ));
    }
    if params.tbs_bits == 0 || params.tbs_bits % 8 != 0 {
        return Err(Error::InvalidArgument(format!(
            "The transport-block size ({} bits) is not an exact number of bytes",
            params.tbs_bits
        )));
    }
    let nof_codeblocks = expected_codeblocks(params.tbs_bits, params.base_graph);
    if nof_codeblocks > params.pool.max_codeblocks {
        return Err(Error::InvalidArgument(format!(
            "Transport blocks of {nof_codeblocks} codeblocks do not fit the pool codeblock \
             budget of {}",
            params.pool.max_codeblocks
        )));
    }
    let layout = codeblock_layout(params.tbs_bits, nof_codeblocks);
    if layout.total_bits > params.pool.max_codeblock_size {
        return Err(Error::InvalidArgument(format!(
            "Codeblocks of {} bits do not fit the pool codeblock capacity of {}",
            layout.total_bits, params.pool.max_codeblock_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests_of_simulator {
    use super::*;

    fn sim_params() -> SimParams {
        SimParams {
            tbs_bits: 256,
            base_graph: BaseGraph::Bg2,
            es_over_n0_db: 12.0,
            max_transmissions: 4,
            num_blocks: 20,
            max_iterations: 6,
            pool: PoolConfig {
                max_codeblock_size: 1000,
                max_buffers: 16,
                max_codeblocks: 64,
                expire_timeout_slots: 100,
            },
        }
    }

    #[test]
    fn test_check_sim_params() {
        // Invalid input
        let params = SimParams {
            num_blocks: 0,
            ..sim_params()
        };
        assert!(check_sim_params(&params).is_err());
        let params = SimParams {
            max_transmissions: 0,
            ..sim_params()
        };
        assert!(check_sim_params(&params).is_err());
        let params = SimParams {
            tbs_bits: 100,
            ..sim_params()
        };
        assert!(check_sim_params(&params).is_err());
        let mut params = sim_params();
        params.pool.max_codeblock_size = 100;
        assert!(check_sim_params(&params).is_err());
        // An 8192-bit BG2 transport block segments into 3 codeblocks, over a budget of 2.
        let mut params = sim_params();
        params.tbs_bits = 8192;
        params.pool.max_codeblock_size = 4000;
        params.pool.max_codeblocks = 2;
        assert!(matches!(
            check_sim_params(&params),
            Err(Error::InvalidArgument(_))
        ));
        // Valid input
        assert!(check_sim_params(&sim_params()).is_ok());
    }

    #[test]
    fn test_run_harq_sim_at_high_snr() {
        // At 12 dB every block decodes on the first transmission.
        let results = run_harq_sim(&sim_params()).unwrap();
        assert_eq!(results.num_block_errors, 0);
        assert!((results.block_error_rate).abs() < 1e-12);
        assert!((results.bit_error_rate).abs() < 1e-12);
        assert!((results.avg_transmissions - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_run_harq_sim_rejects_invalid_params() {
        let params = SimParams {
            num_blocks: 0,
            ..sim_params()
        };
        assert!(run_harq_sim(&params).is_err());
    }
}
