//! CLI argument definitions for the batcher binary

use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use sluice_cli::{BatcherArgs, ThrottleArgs, TxMgrArgs};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "sluice", about = "Post L2 blocks to L1 as compressed channel frames")]
pub(crate) struct Args {
    /// Verbosity: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// L1 execution client RPC URL
    #[arg(long = "l1-eth-rpc", env = "SLUICE_L1_ETH_RPC")]
    pub l1_rpc_url: String,

    /// L2 execution client RPC URL of the sequencer
    #[arg(long = "l2-eth-rpc", env = "SLUICE_L2_ETH_RPC")]
    pub l2_rpc_url: String,

    /// Rollup node RPC URL of the sequencer
    #[arg(long = "rollup-rpc", env = "SLUICE_ROLLUP_RPC")]
    pub rollup_rpc_url: String,

    /// Hex private key of the batcher account
    #[arg(long = "private-key", env = "SLUICE_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: PrivateKeySigner,

    /// Time given to in-flight transactions on shutdown before they are abandoned
    #[arg(
        long = "kill-timeout",
        env = "SLUICE_KILL_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub kill_timeout: Duration,

    #[command(flatten)]
    pub batcher: BatcherArgs,

    #[command(flatten)]
    pub txmgr: TxMgrArgs,

    #[command(flatten)]
    pub throttle: ThrottleArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 11] = [
        "sluice",
        "--l1-eth-rpc",
        "http://l1:8545",
        "--l2-eth-rpc",
        "http://l2:8545",
        "--rollup-rpc",
        "http://op-node:7545",
        "--private-key",
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        "--batch-inbox-address",
        "0xff00000000000000000000000000000000000010",
    ];

    #[test]
    fn parses_required_flags() {
        let args = Args::try_parse_from(REQUIRED).unwrap();
        assert_eq!(args.verbose, 0);
        assert_eq!(args.kill_timeout, Duration::from_secs(30));
        assert_eq!(
            args.private_key.address(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse().unwrap()
        );
        assert!(args.batcher.altda_server.is_none());
    }

    #[test]
    fn missing_private_key_is_rejected() {
        let args = [&REQUIRED[..7], &REQUIRED[9..]].concat();
        assert!(Args::try_parse_from(args).is_err());
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        let mut args = REQUIRED;
        args[8] = "0xnothex";
        assert!(Args::try_parse_from(args).is_err());
    }

    #[test]
    fn verbosity_and_kill_timeout() {
        let mut args = REQUIRED.to_vec();
        args.extend(["-vv", "--kill-timeout", "2m"]);
        let args = Args::try_parse_from(args).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.kill_timeout, Duration::from_secs(120));
    }
}
