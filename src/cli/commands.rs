use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pow-ledger")]
pub struct Opt {
    #[arg(
        long,
        global = true,
        help = "TOML configuration file (LEDGER_DB_PATH and LEDGER_DIFFICULTY_BITS override it)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new ledger")]
    Createblockchain {
        #[arg(help = "The address to send genesis block reward to")]
        address: String,
    },
    #[command(name = "getbalance", about = "Get the balance of the target address")]
    GetBalance {
        #[arg(help = "The address to query")]
        address: String,
    },
    #[command(name = "addblock", about = "Mine a block rewarding MINER")]
    AddBlock {
        #[arg(help = "The address receiving the block reward")]
        miner: String,
        #[arg(long, default_value = "", help = "Memo stored in the reward transaction")]
        data: String,
    },
    #[command(name = "send", about = "Send AMOUNT from FROM to TO and mine it immediately")]
    Send {
        #[arg(help = "Source address")]
        from: String,
        #[arg(help = "Destination address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
    },
    #[command(name = "printchain", about = "Print all blocks from tip to genesis")]
    Printchain,
}
