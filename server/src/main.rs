use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::UdpTransport;
use server::server::Server;
use std::path::PathBuf;

/// Command line arguments. Flags override values from the config file.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Server port to listen on
    #[clap(short, long)]
    port: Option<u16>,
    /// Tick rate (updates per second)
    #[clap(short, long)]
    tick_rate: Option<u32>,
    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Directory for chunk files; chunks stay in memory without it
    #[clap(long)]
    data_dir: Option<PathBuf>,
    /// Require the encryption handshake before spawning
    #[clap(long)]
    encryption: bool,
    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

/// Main-method of the application.
/// Loads the configuration, binds the UDP transport and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.server_ip = host;
    }
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if args.data_dir.is_some() {
        config.data_dir = args.data_dir;
    }
    config.use_encryption |= args.encryption;
    config.debug_mode |= args.debug;

    let default_level = if config.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let (transport, events) = UdpTransport::bind(&config.bind_address()).await?;
    info!(
        "Starting {} on {} at {} ticks per second",
        config.server_name,
        transport.local_addr()?,
        config.tick_rate
    );

    let mut server = Server::new(config, transport)?;
    server.start()?;
    server.run(events).await?;

    info!("Server stopped");
    Ok(())
}
