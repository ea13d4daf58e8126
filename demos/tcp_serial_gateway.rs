use clap::Parser;
use clap_derive::Parser;
use protocol_gateway::gateway::gateway::Gateway;
use protocol_gateway::gateway::gateway_config::GatewayConfig;
use protocol_gateway::transport::stream_transport::StreamTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, Level};

/// Runs a gateway for every TCP connection accepted on the listen address, treating the
///  connection as the serial line to a protocol client.
#[derive(Parser)]
struct Args {
    listen_address: String,

    /// upstream connect timeout in seconds
    #[clap(long, default_value_t = 10)]
    dial_timeout: u64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = GatewayConfig::new();
    config.dial_timeout = Duration::from_secs(args.dial_timeout);
    config.validate()?;

    let listen_addr: SocketAddr = args.listen_address.parse()?;
    let listener = TcpListener::bind(listen_addr).await?;
    info!("accepting protocol clients on {}", listen_addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            error!("could not set TCP_NODELAY for {}: {}", client_addr, e);
        }

        let gateway = Gateway::over_tcp(config.clone(), Arc::new(StreamTransport::from_stream(stream)))?;

        tokio::spawn(async move {
            info!("client {} connected", client_addr);
            match gateway.listen().await {
                Ok(()) => info!("client {} gone", client_addr),
                Err(e) => error!("gateway for client {} failed: {}", client_addr, e),
            }
        });
    }
}
