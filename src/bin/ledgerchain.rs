#![forbid(unsafe_code)]
use clap::{Parser, Subcommand};
use colored::*;
use ledgerchain::blockchain::{Block, Blockchain};
use ledgerchain::config::{load_config, Config};
use ledgerchain::crypto::{encode_address, KeyPair};
use ledgerchain::error::ChainError;
use ledgerchain::persistence::Database;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "ledgerchain.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates the genesis block paying the genesis reward to ADDRESS
    Genesis { address: String },
    /// Generates a new key pair and prints its address and secret
    NewKey,
    /// Prints the spendable balance of ADDRESS
    Balance { address: String },
    /// Transfers AMOUNT to TO and mines the transfer into a new block
    Send {
        /// Hex-encoded secret key of the sender
        #[arg(long)]
        from_secret: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        /// Reward address for the mined block (defaults to miner.beneficiary_address)
        #[arg(long)]
        miner: Option<String>,
    },
    /// Prints the height of the canonical chain
    Height,
    /// Prints every block from tip to genesis
    Print {
        #[arg(long)]
        json: bool,
    },
    /// Prints every unspent output of the committed chain
    Utxos,
}

fn open_chain(config: &Config) -> Result<Blockchain, ChainError> {
    let db = Database::open(&config.database.path)?;
    Blockchain::open(Box::new(db), config.chain.clone())
}

fn print_block(block: &Block) {
    println!("{} {}", "Block".bright_cyan(), block.hash_str().bright_yellow());
    println!("  height:    {}", block.header.height);
    println!("  previous:  {}", hex::encode(block.header.previous_hash));
    println!("  timestamp: {}", block.header.timestamp);
    println!("  nonce:     {}", block.header.nonce);
    for tx in &block.transactions {
        let kind = if tx.is_coinbase() { "coinbase" } else { "transfer" };
        println!("  tx {} ({})", tx.hash_str(), kind);
        for input in tx.inputs.iter().filter(|_| !tx.is_coinbase()) {
            println!(
                "    in  {}:{}",
                hex::encode(input.prev_tx_hash),
                input.output_index
            );
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            println!(
                "    out {} {} -> {}",
                index,
                output.value,
                encode_address(&output.pub_key_hash)
            );
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Genesis { address } => {
            let db = Database::open(&config.database.path)?;
            let chain = Blockchain::create_genesis(Box::new(db), config.chain.clone(), &address)?;
            println!(
                "{} {}",
                "Genesis block created:".bright_green(),
                hex::encode(chain.tip())
            );
        }
        Commands::NewKey => {
            let keypair = KeyPair::generate()?;
            println!("address: {}", keypair.address().bright_yellow());
            println!("secret:  {}", keypair.secret_hex());
        }
        Commands::Balance { address } => {
            let chain = open_chain(&config)?;
            println!("{}: {}", address, chain.balance(&address)?.to_string().bright_green());
        }
        Commands::Send {
            from_secret,
            to,
            amount,
            miner,
        } => {
            let beneficiary = miner
                .or_else(|| config.miner.beneficiary_address.clone())
                .ok_or_else(|| {
                    ChainError::ConfigError("no --miner given and miner.beneficiary_address unset".to_string())
                })?;
            let mut chain = open_chain(&config)?;
            let sender = KeyPair::from_secret_hex(&from_secret)?;

            let tx = chain.new_transfer(&sender, &to, amount, &[])?;
            let block = chain.mine_and_commit(&beneficiary, vec![tx])?;
            println!(
                "{} {} (height {})",
                "Mined block".bright_green(),
                block.hash_str(),
                block.header.height
            );
        }
        Commands::Height => {
            let chain = open_chain(&config)?;
            println!("{}", chain.height()?);
        }
        Commands::Print { json } => {
            let chain = open_chain(&config)?;
            for block in chain.iter() {
                let block = block?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&block)?);
                } else {
                    print_block(&block);
                }
            }
        }
        Commands::Utxos => {
            let chain = open_chain(&config)?;
            for (tx_hash, utxos) in chain.all_utxos()? {
                for utxo in utxos {
                    println!(
                        "{}:{} {} -> {}",
                        hex::encode(tx_hash),
                        utxo.index,
                        utxo.output.value,
                        encode_address(&utxo.output.pub_key_hash)
                    );
                }
            }
        }
    }

    Ok(())
}
