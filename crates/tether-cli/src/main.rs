//! Tether CLI
//!
//! Discover, pair with and message companion devices on the local network.

mod config;
mod progress;
mod serve;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_core::config::DEFAULT_UNICAST_PORT;
use tether_core::files::DirFileStore;
use tether_core::messaging::{Attachment, ChatContent, MemoryMessageStore};
use tether_core::pairing::{AutoAccept, AutoReject, ChannelPolicy, PairingPolicy, PairingTarget};
use tether_core::store::FilePeerStore;
use tether_core::{DeviceContext, DeviceIdentity, Event, Node, NodeServices, PeerStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use config::Config;
use progress::{TransferBars, format_bytes};

/// Tether - pair and talk to your devices over the LAN
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show this device's identity, creating it if needed
    Identity,

    /// Run a discoverable node until interrupted
    Daemon {
        /// Accept every pairing request without asking
        #[arg(long)]
        accept_all: bool,
    },

    /// List devices answering discovery
    Discover {
        /// How long to listen for replies
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },

    /// Pair with a device
    Pair {
        /// Device id
        id: String,

        /// Device IP address
        ip: IpAddr,

        /// Device unicast port
        #[arg(long, default_value_t = DEFAULT_UNICAST_PORT)]
        port: u16,
    },

    /// List known devices
    Peers,

    /// Forget a device
    Unpair {
        /// Device id
        id: String,
    },

    /// Send a chat message to a paired device
    Send {
        /// Device id
        peer: String,

        /// Message text
        text: String,

        /// Files to attach
        #[arg(short, long)]
        file: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(level).init();

    match cli.command {
        Commands::Identity => show_identity(&config)?,
        Commands::Daemon { accept_all } => run_daemon(&config, accept_all).await?,
        Commands::Discover { seconds } => discover(&config, seconds).await?,
        Commands::Pair { id, ip, port } => pair(&config, id, SocketAddr::new(ip, port)).await?,
        Commands::Peers => list_peers(&config)?,
        Commands::Unpair { id } => unpair(&config, &id)?,
        Commands::Send { peer, text, file } => send(&config, &peer, text, file).await?,
    }

    Ok(())
}

fn load_identity(config: &Config) -> anyhow::Result<DeviceIdentity> {
    let path = config.identity_path();
    DeviceIdentity::load_or_generate(&path)
        .with_context(|| format!("loading identity from {}", path.display()))
}

fn open_store(config: &Config) -> anyhow::Result<Arc<FilePeerStore>> {
    let path = config.peers_path();
    let store =
        FilePeerStore::open(&path).with_context(|| format!("opening peer store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Start a node with the on-disk identity and peer store.
async fn start_node(
    config: &Config,
    discoverable: bool,
    policy: Arc<dyn PairingPolicy>,
) -> anyhow::Result<(Node, mpsc::UnboundedReceiver<Event>)> {
    let identity = load_identity(config)?;
    let ctx = DeviceContext::new(identity, &config.device.name, config.device.http_port)
        .with_device_type(&config.device.device_type)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_platform(std::env::consts::OS)
        .with_discoverable(discoverable);

    let (events, rx) = mpsc::unbounded_channel();
    let services = NodeServices {
        store: open_store(config)?,
        files: Arc::new(DirFileStore::new(&config.device.download_dir)),
        messages: Arc::new(MemoryMessageStore::new()),
        events: Arc::new(events),
        policy,
    };
    let node = Node::start(Arc::new(ctx), config.to_node_config()?, services).await?;
    Ok((node, rx))
}

/// Show this device's identity
fn show_identity(config: &Config) -> anyhow::Result<()> {
    let identity = load_identity(config)?;
    println!("Device ID:  {}", identity.id());
    println!("Public key: {}", hex::encode(identity.verifying_key().to_bytes()));
    println!("Name:       {}", config.device.name);
    println!("Stored at:  {}", config.identity_path().display());
    Ok(())
}

/// Run daemon mode
async fn run_daemon(config: &Config, accept_all: bool) -> anyhow::Result<()> {
    let mut prompts = None;
    let policy: Arc<dyn PairingPolicy> = if accept_all {
        Arc::new(AutoAccept)
    } else {
        let (policy, rx) = ChannelPolicy::new(4, Duration::from_secs(60));
        prompts = Some(rx);
        Arc::new(policy)
    };

    let (node, mut events) = start_node(config, true, policy).await?;
    let http = serve::spawn(node.clone(), config)?;
    node.discovery().start_listener().await?;
    node.discovery().start_broadcast().await;
    node.discover_paired().await?;

    println!("{}", style("Tether daemon").bold());
    println!("Device: {} ({})", config.device.name, node.context().id());
    println!("Unicast: {}", node.local_addr()?);
    println!("Endpoint: {}://{}", config.network.scheme, http.local_addr());
    println!("Pairing: {}", if accept_all { "accept all" } else { "ask" });
    println!("Press Ctrl+C to stop");

    if let Some(mut prompts) = prompts {
        tokio::spawn(async move {
            let mut stdin = BufReader::new(tokio::io::stdin()).lines();
            while let Some(pending) = prompts.recv().await {
                println!(
                    "{} {} ({}) from {} wants to pair. Accept? [y/N]",
                    style("?").yellow(),
                    pending.prompt.peer_name,
                    pending.prompt.peer_id,
                    pending.prompt.address
                );
                let answer = stdin.next_line().await.ok().flatten().unwrap_or_default();
                if answer.trim().eq_ignore_ascii_case("y") {
                    pending.accept();
                } else {
                    pending.decline();
                }
            }
        });
    }

    let mut bars = TransferBars::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => render(&mut bars, event),
                None => break,
            },
        }
    }

    println!("\nShutting down...");
    http.shutdown().await;
    node.shutdown().await;
    Ok(())
}

fn render(bars: &mut TransferBars, event: Event) {
    match event {
        Event::DeviceFound(device) => {
            tracing::debug!(id = %device.id, ip = %device.ip, "device found");
        }
        Event::PairingRequested { peer_name, ip, .. } => {
            bars.println(format!("Pairing requested by {peer_name} ({ip})"));
        }
        Event::PairingSucceeded { peer_id, peer_name } => {
            bars.println(format!("{} Paired with {peer_name} ({peer_id})", style("✓").green()));
        }
        Event::PairingFailed { peer_id, reason } => {
            bars.println(format!("{} Pairing with {peer_id} failed: {reason}", style("✗").red()));
        }
        Event::PairingCanceled { peer_id } => {
            bars.println(format!("Pairing with {peer_id} canceled"));
        }
        Event::MessageReceived { peer_id, message_id } => {
            bars.println(format!("Message {message_id} from {peer_id}"));
        }
        Event::TransferProgress { id, bytes, total, .. } => bars.update(&id, bytes, total),
        Event::TransferCompleted { id, path } => bars.complete(&id, &path),
        Event::TransferFailed { id, error } => bars.fail(&id, &error),
    }
}

/// Broadcast and list replies
async fn discover(config: &Config, seconds: u64) -> anyhow::Result<()> {
    let (node, mut events) = start_node(config, false, Arc::new(AutoReject)).await?;
    node.discovery().broadcast_once().await?;
    node.discover_paired().await?;

    let mut found: BTreeMap<String, tether_discovery::DiscoveredDevice> = BTreeMap::new();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = ticker.tick() => node.discovery().broadcast_once().await?,
            event = events.recv() => match event {
                Some(Event::DeviceFound(device)) => {
                    found.insert(device.id.clone(), device);
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    node.shutdown().await;

    if found.is_empty() {
        println!("No devices found");
        return Ok(());
    }
    let store = open_store(config)?;
    println!("{:<38} {:<20} {:<22} {:<10} PAIRED", "ID", "NAME", "ADDRESS", "TYPE");
    for device in found.values() {
        let paired = store.get(&device.id).is_some_and(|r| r.is_paired());
        println!(
            "{:<38} {:<20} {:<22} {:<10} {}",
            device.id,
            device.name,
            device.address,
            device.device_type,
            if paired { "yes" } else { "no" }
        );
    }
    Ok(())
}

/// Pair with the device at `address`
async fn pair(config: &Config, id: String, address: SocketAddr) -> anyhow::Result<()> {
    let (node, mut events) = start_node(config, false, Arc::new(AutoReject)).await?;
    let target = PairingTarget {
        name: id.clone(),
        id: id.clone(),
        address,
    };
    node.pairing().initiate(target).await?;
    println!("Waiting for {id} at {address} to accept...");

    let outcome = tokio::time::timeout(Duration::from_secs(90), async {
        while let Some(event) = events.recv().await {
            match event {
                Event::PairingSucceeded { peer_id, peer_name } if peer_id == id => {
                    return Ok(peer_name);
                }
                Event::PairingFailed { peer_id, reason } if peer_id == id => {
                    return Err(reason);
                }
                _ => {}
            }
        }
        Err("node stopped".to_string())
    })
    .await;

    let result = match outcome {
        Ok(Ok(name)) => {
            println!("{} Paired with {name}", style("✓").green());
            Ok(())
        }
        Ok(Err(reason)) => Err(anyhow::anyhow!("pairing failed: {reason}")),
        Err(_) => {
            node.pairing().cancel(&id).await?;
            Err(anyhow::anyhow!("no answer from {id}"))
        }
    };
    node.shutdown().await;
    result
}

/// List known peers
fn list_peers(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let peers = store.all();
    if peers.is_empty() {
        println!("No known devices");
        return Ok(());
    }
    println!("{:<38} {:<20} {:<22} {:<10} STATUS", "ID", "NAME", "ADDRESS", "TYPE");
    for peer in peers {
        println!(
            "{:<38} {:<20} {:<22} {:<10} {}",
            peer.id,
            peer.name,
            SocketAddr::new(peer.ip, peer.port),
            peer.device_type,
            if peer.is_paired() { "paired" } else { "unpaired" }
        );
    }
    Ok(())
}

/// Forget a peer
fn unpair(config: &Config, id: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.delete(id)? {
        println!("Removed {id}");
    } else {
        anyhow::bail!("Unknown device: {id}");
    }
    Ok(())
}

/// Send a message, then serve attachments until interrupted
async fn send(config: &Config, peer: &str, text: String, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let (node, _events) = start_node(config, false, Arc::new(AutoReject)).await?;

    let message = node.chat().send(peer, ChatContent::Text { text }).await?;
    println!("{} Sent message {}", style("✓").green(), message.id);

    if files.is_empty() {
        node.shutdown().await;
        return Ok(());
    }

    let mut items = Vec::with_capacity(files.len());
    for path in files {
        let size = std::fs::metadata(&path)
            .with_context(|| format!("reading {}", path.display()))?
            .len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        println!("Attaching {name} ({})", format_bytes(size));
        items.push(Attachment {
            uri: path.to_string_lossy().into_owned(),
            name,
            size,
            mime: None,
        });
    }

    // the peer pulls the files from our endpoint, so it must be up first
    let http = serve::spawn(node.clone(), config)?;
    let message = node.chat().send(peer, ChatContent::Files { items }).await?;
    println!("{} Sent files in message {}", style("✓").green(), message.id);
    println!("Serving files; press Ctrl+C once the device has them");

    tokio::signal::ctrl_c().await?;
    http.shutdown().await;
    node.shutdown().await;
    Ok(())
}
