//! mcc - multichain-connect command line host
//!
//! Runs the connection client against local key-backed wallets. Session
//! state lives in a JSON file so consecutive invocations reconnect the
//! way a page reload would.

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use multichain_connect::chains;
use multichain_connect::client::{Client, ClientConfig, ClientState};
use multichain_connect::connectors::{
    FilecoinConnector, InjectedConnector, KeplrConnector, SolanaConnector,
};
use multichain_connect::injected::{globals, InjectedRegistry};
use multichain_connect::storage::{FileStorage, PersistedRecord, Storage, LAST_USED_CONNECTOR_KEY};
use multichain_connect::wallet::{CosmosWallet, EvmWallet, SolanaWallet};
use multichain_connect::{ChainId, ConnectionData, ConnectorError, SharedConnector, Status};

/// mcc: connect to EVM, Solana, Cosmos and Filecoin wallets
#[derive(Parser)]
#[command(name = "mcc")]
#[command(about = "Multi-chain wallet connection client", long_about = None)]
struct Cli {
    /// Session file
    #[arg(long, env = "MCC_STORAGE", default_value = ".mcc/session.json")]
    storage: PathBuf,

    /// Hex private key for the injected EVM wallets
    #[arg(long, env = "MCC_EVM_KEY", hide_env_values = true)]
    evm_key: Option<String>,

    /// Base58 keypair for the Solana wallets
    #[arg(long, env = "MCC_SOLANA_KEY", hide_env_values = true)]
    solana_key: Option<String>,

    /// Hex private key for Keplr
    #[arg(long, env = "MCC_COSMOS_KEY", hide_env_values = true)]
    cosmos_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connectors and whether their wallet is available
    Connectors,

    /// Connect a wallet
    Connect {
        /// Connector id (e.g. metaMask, phantom, keplr)
        #[arg(value_name = "CONNECTOR")]
        connector: String,

        /// Chain to connect on
        #[arg(short, long)]
        chain: Option<String>,
    },

    /// Show the restored session
    Status,

    /// Sign a message with the connected account
    Sign {
        #[arg(value_name = "MESSAGE")]
        message: String,
    },

    /// Switch the connected wallet to another chain
    SwitchChain {
        #[arg(value_name = "CHAIN")]
        chain: String,
    },

    /// Print the decentralized identifier of the connected account
    Did,

    /// Disconnect and forget the session
    Disconnect,

    /// Generate a key for a local wallet
    Keygen {
        #[arg(value_enum)]
        ecosystem: KeyKind,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyKind {
    Evm,
    Solana,
    Cosmos,
}

type CliError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Keygen { ecosystem } = cli.command {
        keygen(ecosystem);
        return Ok(());
    }

    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&cli.storage)?);
    let registry = Arc::new(InjectedRegistry::new());
    inject_wallets(&cli, &registry, storage.as_ref())?;

    let connectors = build_connectors(&registry);

    match cli.command {
        Commands::Connectors => {
            list_connectors(&connectors).await;
        }
        Commands::Connect { connector, chain } => {
            let client = restore(connectors, storage).await;
            match client
                .connect(&connector, chain.as_deref().map(ChainId::parse))
                .await
            {
                Ok(_) => info!("Connected to {}", connector),
                Err(ConnectorError::AlreadyConnected) => info!("{} already connected", connector),
                Err(e) => return Err(e.into()),
            }
            print_session(&client.state(), client.data().as_ref());
        }
        Commands::Status => {
            let client = restore(connectors, storage).await;
            print_session(&client.state(), client.data().as_ref());
        }
        Commands::Sign { message } => {
            let client = restore(connectors, storage).await;
            let signature = client.sign_message(&message).await?;
            println!("{}", signature);
        }
        Commands::SwitchChain { chain } => {
            let client = restore(connectors, storage).await;
            let chain = client.switch_chain(ChainId::parse(&chain)).await?;
            println!("Switched to {} ({})", chain.name, chain.id);
        }
        Commands::Did => {
            let client = restore(connectors, storage).await;
            match client.resolve_did().await? {
                Some(did) => println!("{}", did),
                None => println!("No DID method for this wallet"),
            }
        }
        Commands::Disconnect => {
            let client = restore(connectors, storage).await;
            client.disconnect().await?;
            println!("Disconnected");
        }
        Commands::Keygen { .. } => {}
    }
    Ok(())
}

/// Inject a local wallet for every configured key.
///
/// Wallets start out trusted when a previous invocation left a session
/// behind, standing in for the approval a browser extension remembers.
fn inject_wallets(
    cli: &Cli,
    registry: &InjectedRegistry,
    storage: &dyn Storage,
) -> Result<(), CliError> {
    let trusted = storage.get_item(LAST_USED_CONNECTOR_KEY).is_some();
    let last_chain = PersistedRecord::load(storage)
        .and_then(|r| r.state.data)
        .and_then(|d| d.chain)
        .map(|c| c.id);

    if let Some(key) = &cli.evm_key {
        let chain_id = last_chain.as_ref().and_then(ChainId::as_u64).unwrap_or(1);
        let wallet = Arc::new(EvmWallet::from_private_key(key, chain_id)?.trusted(trusted));
        registry.inject(globals::ETHEREUM, wallet.clone());
        registry.inject(globals::COINBASE, wallet);
    }

    if let Some(key) = &cli.solana_key {
        let wallet = Arc::new(SolanaWallet::from_base58(key)?.trusted(trusted));
        registry.inject(globals::PHANTOM, wallet.clone());
        registry.inject(globals::SOLFLARE, wallet);
    }

    if let Some(key) = &cli.cosmos_key {
        let mut wallet = CosmosWallet::from_private_key(key)?;
        if trusted {
            let chain = match &last_chain {
                Some(ChainId::Named(name)) => name.clone(),
                _ => "cosmoshub-4".to_string(),
            };
            wallet = wallet.trusted_on(&chain);
        }
        registry.inject(globals::KEPLR, Arc::new(wallet));
    }

    Ok(())
}

fn build_connectors(registry: &Arc<InjectedRegistry>) -> Vec<SharedConnector> {
    vec![
        Arc::new(InjectedConnector::metamask(registry.clone())) as SharedConnector,
        Arc::new(InjectedConnector::coinbase(registry.clone())) as SharedConnector,
        Arc::new(SolanaConnector::phantom(registry.clone())) as SharedConnector,
        Arc::new(SolanaConnector::solflare(registry.clone())) as SharedConnector,
        Arc::new(KeplrConnector::cosmoshub(registry.clone())) as SharedConnector,
        Arc::new(FilecoinConnector::mainnet(registry.clone())) as SharedConnector,
    ]
}

/// Build an auto-connecting client and wait until it settles
async fn restore(connectors: Vec<SharedConnector>, storage: Arc<dyn Storage>) -> Client<()> {
    let client = Client::new(
        ClientConfig::new(())
            .auto_connect(true)
            .connectors(connectors)
            .storage(storage)
            .chains(chains::all()),
    );

    let (tx, mut rx) = tokio::sync::watch::channel(());
    let id = client.subscribe(
        |state: &ClientState<()>| state.status,
        move |_, _| {
            let _ = tx.send(());
        },
    );

    loop {
        match client.status() {
            Status::Connecting | Status::Reconnecting => {}
            status => {
                info!("Session status: {}", status);
                break;
            }
        }
        if rx.changed().await.is_err() {
            warn!("Client stopped before the session settled");
            break;
        }
    }

    client.unsubscribe(id);
    client
}

async fn list_connectors(connectors: &[SharedConnector]) {
    let accounts = join_all(connectors.iter().map(|c| c.get_account())).await;

    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│  AVAILABLE CONNECTORS                                       │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  {:<16}│ {:<9}│ {:<13}│ {:<16}│", "Connector", "Chain", "Default", "Wallet");
    for (connector, accounts) in connectors.iter().zip(accounts) {
        let wallet = match (connector.ready(), accounts) {
            (false, _) => "not installed",
            (true, Ok(list)) if !list.is_empty() => "authorized",
            (true, _) => "installed",
        };
        println!(
            "│  {:<16}│ {:<9}│ {:<13}│ {:<16}│",
            connector.id(),
            connector.ecosystem().to_string(),
            connector.chain(),
            wallet
        );
    }
    println!("└─────────────────────────────────────────────────────────────┘");
}

fn print_session(state: &ClientState<()>, data: Option<&ConnectionData>) {
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│  SESSION                                                    │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  Status:    {}", state.status);
    if let Some(connector) = &state.connector {
        println!("│  Connector: {}", connector.name());
    }
    if let Some(data) = data {
        if let Some(account) = &data.account {
            println!("│  Account:   {}", account);
        }
        if let Some(chain) = &data.chain {
            let name = chains::find(&state.chains, &chain.id)
                .map(|c| c.name.as_str())
                .unwrap_or("unknown");
            let flag = if chain.unsupported { " (unsupported)" } else { "" };
            println!("│  Chain:     {} [{}]{}", name, chain.id, flag);
        }
    }
    if let Some(error) = &state.error {
        println!("│  Error:     {}", error);
    }
    println!("└─────────────────────────────────────────────────────────────┘");
}

fn keygen(kind: KeyKind) {
    match kind {
        KeyKind::Evm => {
            let wallet = EvmWallet::random(1);
            println!("Address:     {}", wallet.address_string());
            println!("Private key: {}", wallet.private_key_hex());
        }
        KeyKind::Solana => {
            let wallet = SolanaWallet::generate();
            println!("Public key:  {}", wallet.pubkey_string());
            println!("Keypair:     {}", wallet.keypair_base58());
        }
        KeyKind::Cosmos => {
            let wallet = CosmosWallet::random();
            match wallet.address("cosmos") {
                Ok(address) => println!("Address:     {}", address),
                Err(e) => warn!("Address derivation failed: {}", e),
            }
            println!("Private key: {}", wallet.private_key_hex());
        }
    }
}
