//! This crate simulates the BLER-versus-SNR performance of HARQ chase combining over a
//! BPSK-AWGN channel, driving the decode-session manager through its full dispatched call
//! surface (`new`/`step`/`release`). Simulation parameters are specified on the command line,
//! and simulation results are saved to a JSON file.
//!
//! Build the executable with `cargo build --release` and then run `./target/release/harqpool -h`
//! for help on the command-line interface.

#![warn(
    clippy::complexity,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_allocation,
    unused_import_braces,
    unused_qualifications
)]

use anyhow::Result;
use clap::{crate_name, crate_version, value_parser, Arg, ArgMatches, Command};
use harqpool::ldpc::{expected_codeblocks, BaseGraph};
use harqpool::sim::{self, SimParams};
use harqpool::{codeblock_layout, PoolConfig};
use std::time::Instant;

/// Main function
fn main() -> Result<()> {
    let timer = Instant::now();
    let matches = command_line_parser().get_matches();
    let json_filename = &json_filename_from_matches(&matches);
    sim::run_harq_sims(&all_sim_params(&matches), json_filename)?;
    eprintln!("Elapsed time: {:.3?}", timer.elapsed());
    Ok(())
}

/// Returns command line parser.
fn command_line_parser() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about("Evaluates HARQ chase-combining performance over a BPSK-AWGN channel")
        .arg(tbs_bits())
        .arg(base_graph_name())
        .arg(first_snr_db())
        .arg(snr_step_db())
        .arg(num_snr())
        .arg(max_transmissions())
        .arg(num_blocks())
        .arg(max_iterations())
        .arg(max_buffers())
        .arg(max_codeblocks())
        .arg(expire_timeout_slots())
        .arg(json_filename())
}

/// Returns argument for transport-block size in bits.
fn tbs_bits() -> Arg {
    Arg::new("tbs_bits")
        .short('i')
        .value_parser(value_parser!(usize))
        .default_value("1024")
        .help("Transport-block size in bits (must be a multiple of 8)")
}

/// Returns argument for LDPC base graph name.
fn base_graph_name() -> Arg {
    Arg::new("base_graph_name")
        .short('g')
        .value_parser(["BG1", "BG2"])
        .default_value("BG2")
        .help("LDPC base graph name")
}

/// Returns argument for first Es/N0 (dB).
fn first_snr_db() -> Arg {
    Arg::new("first_snr_db")
        .short('r')
        .value_parser(value_parser!(f64))
        .allow_negative_numbers(true)
        .default_value("-8.0")
        .help("First Es/N0 (dB)")
}

/// Returns argument for Es/N0 step (dB).
fn snr_step_db() -> Arg {
    Arg::new("snr_step_db")
        .short('p')
        .value_parser(value_parser!(f64))
        .allow_negative_numbers(true)
        .default_value("1.0")
        .help("Es/N0 step (dB)")
}

/// Returns argument for number of Es/N0 values.
fn num_snr() -> Arg {
    Arg::new("num_snr")
        .short('s')
        .value_parser(value_parser!(u32))
        .default_value("4")
        .help("Number of Es/N0 values")
}

/// Returns argument for maximum number of transmissions per transport block.
fn max_transmissions() -> Arg {
    Arg::new("max_transmissions")
        .short('x')
        .value_parser(value_parser!(u32))
        .default_value("4")
        .help("Maximum number of transmissions per transport block")
}

/// Returns argument for number of transport blocks to be transmitted.
fn num_blocks() -> Arg {
    Arg::new("num_blocks")
        .short('b')
        .value_parser(value_parser!(u32))
        .default_value("1000")
        .help("Number of transport blocks to be transmitted")
}

/// Returns argument for decoder iteration budget per codeblock.
fn max_iterations() -> Arg {
    Arg::new("max_iterations")
        .short('t')
        .value_parser(value_parser!(u32))
        .default_value("6")
        .help("Decoder iteration budget per codeblock")
}

/// Returns argument for maximum number of live combining buffers in the pool.
fn max_buffers() -> Arg {
    Arg::new("max_buffers")
        .short('u')
        .value_parser(value_parser!(usize))
        .default_value("16")
        .help("Maximum number of live combining buffers in the pool")
}

/// Returns argument for maximum total number of codeblocks in the pool.
fn max_codeblocks() -> Arg {
    Arg::new("max_codeblocks")
        .short('c')
        .value_parser(value_parser!(usize))
        .default_value("128")
        .help("Maximum total number of codeblocks in the pool")
}

/// Returns argument for buffer expiration horizon in slots.
fn expire_timeout_slots() -> Arg {
    Arg::new("expire_timeout_slots")
        .short('e')
        .value_parser(value_parser!(u64))
        .default_value("100")
        .help("Buffer expiration horizon in slots")
}

/// Returns argument for name of JSON file to which results must be saved.
fn json_filename() -> Arg {
    Arg::new("json_filename")
        .short('f')
        .default_value("results.json")
        .help("Name of JSON file to which results must be saved")
}

/// Returns simulation parameters based on command-line arguments.
fn all_sim_params(matches: &ArgMatches) -> Vec<SimParams> {
    let tbs_bits = tbs_bits_from_matches(matches);
    let base_graph = base_graph_from_matches(matches);
    // Size the pool codeblocks for the configured transport block.
    let nof_codeblocks = expected_codeblocks(tbs_bits, base_graph);
    let pool = PoolConfig {
        max_codeblock_size: codeblock_layout(tbs_bits, nof_codeblocks).total_bits,
        max_buffers: max_buffers_from_matches(matches),
        max_codeblocks: max_codeblocks_from_matches(matches),
        expire_timeout_slots: expire_timeout_slots_from_matches(matches),
    };
    let mut all_params = Vec::new();
    for es_over_n0_db in all_es_over_n0_db_from_matches(matches) {
        all_params.push(SimParams {
            tbs_bits,
            base_graph,
            es_over_n0_db,
            max_transmissions: max_transmissions_from_matches(matches),
            num_blocks: num_blocks_from_matches(matches),
            max_iterations: max_iterations_from_matches(matches),
            pool,
        });
    }
    // OK to unwrap: All command-line arguments have default values, so an error cannot occur
    // in any of the associated functions called above.
    all_params
}

/// Returns transport-block size in bits.
fn tbs_bits_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("tbs_bits").unwrap()
}

/// Returns LDPC base graph.
fn base_graph_from_matches(matches: &ArgMatches) -> BaseGraph {
    match matches
        .get_one::<String>("base_graph_name")
        .unwrap()
        .as_str()
    {
        "BG1" => BaseGraph::Bg1,
        "BG2" => BaseGraph::Bg2,
        _ => panic!("Invalid base graph name"),
    }
}

/// Returns all Es/N0 (dB) values.
fn all_es_over_n0_db_from_matches(matches: &ArgMatches) -> Vec<f64> {
    let first_snr_db: f64 = *matches.get_one("first_snr_db").unwrap();
    let snr_step_db: f64 = *matches.get_one("snr_step_db").unwrap();
    let num_snr: u32 = *matches.get_one("num_snr").unwrap();
    (0 .. num_snr)
        .map(|n| first_snr_db + snr_step_db * f64::from(n))
        .collect()
}

/// Returns maximum number of transmissions per transport block.
fn max_transmissions_from_matches(matches: &ArgMatches) -> u32 {
    *matches.get_one("max_transmissions").unwrap()
}

/// Returns number of transport blocks to be transmitted.
fn num_blocks_from_matches(matches: &ArgMatches) -> u32 {
    *matches.get_one("num_blocks").unwrap()
}

/// Returns decoder iteration budget per codeblock.
fn max_iterations_from_matches(matches: &ArgMatches) -> u32 {
    *matches.get_one("max_iterations").unwrap()
}

/// Returns maximum number of live combining buffers in the pool.
fn max_buffers_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("max_buffers").unwrap()
}

/// Returns maximum total number of codeblocks in the pool.
fn max_codeblocks_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("max_codeblocks").unwrap()
}

/// Returns buffer expiration horizon in slots.
fn expire_timeout_slots_from_matches(matches: &ArgMatches) -> u64 {
    *matches.get_one("expire_timeout_slots").unwrap()
}

/// Returns name of JSON file to which simulation results must be saved.
fn json_filename_from_matches(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("json_filename")
        .unwrap()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_line_for_test() -> Vec<&'static str> {
        vec![
            crate_name!(),
            "-i",
            "2048",
            "-g",
            "BG2",
            "-r",
            "-6.0",
            "-p",
            "0.5",
            "-s",
            "5",
            "-x",
            "4",
            "-b",
            "200",
            "-t",
            "8",
            "-u",
            "8",
            "-c",
            "64",
            "-e",
            "50",
            "-f",
            "results.json",
        ]
    }

    #[test]
    fn test_command_line_parser() {
        assert!(command_line_parser()
            .try_get_matches_from(command_line_for_test())
            .is_ok());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_all_sim_params() {
        let matches = command_line_parser().get_matches_from(command_line_for_test());
        let all_params = all_sim_params(&matches);
        let all_es_over_n0_db = [-6.0, -5.5, -5.0, -4.5, -4.0];
        assert_eq!(all_params.len(), 5);
        for (idx, &params) in all_params.iter().enumerate() {
            assert_eq!(params.tbs_bits, 2048);
            assert_eq!(params.base_graph, BaseGraph::Bg2);
            assert_eq!(params.es_over_n0_db, all_es_over_n0_db[idx]);
            assert_eq!(params.max_transmissions, 4);
            assert_eq!(params.num_blocks, 200);
            assert_eq!(params.max_iterations, 8);
            assert_eq!(params.pool.max_buffers, 8);
            assert_eq!(params.pool.max_codeblocks, 64);
            assert_eq!(params.pool.expire_timeout_slots, 50);
            // 2048 payload bits in one BG2 codeblock plus its 16-bit checksum.
            assert_eq!(params.pool.max_codeblock_size, 2064);
        }
    }
}
