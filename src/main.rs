//! SusyDB server binary.
//!
//! Wires the pieces together: storage engine, background expirer, TCP
//! listener with semaphore-gated admission, and a ctrl-c shutdown path.

use std::sync::Arc;
use susydb::connection::handle_connection;
use susydb::storage::{start_expirer, Store};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Upper bound on concurrent clients; connections beyond it are refused.
const MAX_CLIENTS: usize = 5000;

/// Server configuration.
struct Config {
    /// Address to listen on.
    addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: susydb::DEFAULT_ADDR.to_string(),
        }
    }
}

impl Config {
    /// Parses configuration from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--addr" | "-a" => {
                    if i + 1 < args.len() {
                        config.addr = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --addr requires a value");
                        std::process::exit(1);
                    }
                }
                "--version" | "-v" => {
                    println!("SusyDB version {}", susydb::VERSION);
                    std::process::exit(0);
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// The address in a form `TcpListener::bind` accepts: a bare `:port`
    /// means all interfaces.
    fn bind_address(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}

fn print_help() {
    println!(
        r#"
SusyDB - An In-Memory Key-Value Database

USAGE:
    susydb [OPTIONS]

OPTIONS:
    -a, --addr <ADDR>    Address to listen on (default: :7379)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    susydb                       # Listen on 0.0.0.0:7379
    susydb --addr 127.0.0.1:7380 # Listen on localhost only
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    // Storage engine, shared by every connection and the expirer.
    let store = Arc::new(Store::new());
    info!("storage engine initialized with 32 shards");

    let _expirer = start_expirer(Arc::clone(&store));

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        addr = %config.bind_address(),
        max_clients = MAX_CLIENTS,
        "SusyDB started, ready to accept connections"
    );

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
        info!("shutdown signal received, stopping server");
    };

    tokio::select! {
        _ = accept_loop(listener, store) => {}
        _ = shutdown => {}
    }

    // Dropping the expirer handle stops its task; in-flight sessions are
    // dropped with the runtime.
    info!("server shutdown complete");
    Ok(())
}

/// Accepts connections forever, spawning one session task per client. A
/// semaphore caps the number of live sessions; when no permit is free the
/// socket is closed on the spot.
async fn accept_loop(listener: TcpListener, store: Arc<Store>) {
    let limiter = Arc::new(Semaphore::new(MAX_CLIENTS));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => match Arc::clone(&limiter).try_acquire_owned() {
                Ok(permit) => {
                    let store = Arc::clone(&store);
                    tokio::spawn(async move {
                        // The permit lives as long as the session task, and is
                        // released even if the session panics.
                        let _permit = permit;
                        handle_connection(stream, addr, store).await;
                    });
                }
                Err(_) => {
                    warn!(client = %addr, "max connections reached, rejecting client");
                    drop(stream);
                }
            },
            Err(err) => {
                error!(error = %err, "failed to accept connection");
            }
        }
    }
}
