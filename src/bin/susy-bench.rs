//! susy-bench: load generator for a running SusyDB server.
//!
//! Opens a pool of connections and hammers the server with one of several
//! inline-protocol workloads, reading exactly one reply line per request,
//! then reports throughput and latency percentiles.
//!
//! ```text
//! susy-bench -h 127.0.0.1:7379 -c 50 -n 100000 --test mixed
//! ```

use rand::Rng;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workload {
    Set,
    Get,
    Mixed,
    SetEx,
    Incr,
    Hash,
    Publish,
}

impl Workload {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "set" => Some(Self::Set),
            "get" => Some(Self::Get),
            "mixed" => Some(Self::Mixed),
            "setex" => Some(Self::SetEx),
            "incr" => Some(Self::Incr),
            "hash" => Some(Self::Hash),
            "publish" => Some(Self::Publish),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Mixed => "mixed",
            Self::SetEx => "setex",
            Self::Incr => "incr",
            Self::Hash => "hash",
            Self::Publish => "publish",
        }
    }

    /// Renders the inline command for request number `seq` against `key`.
    fn command(&self, key: &str, seq: usize) -> String {
        match self {
            Self::Set => format!("SET {key} x\r\n"),
            Self::SetEx => format!("SETEX {key} 60 x\r\n"),
            Self::Get => format!("GET {key}\r\n"),
            Self::Incr => format!("INCR {key}\r\n"),
            Self::Hash => {
                if seq % 2 == 0 {
                    format!("HSET {key} field1 x\r\n")
                } else {
                    format!("HGET {key} field1\r\n")
                }
            }
            Self::Mixed => {
                if seq % 2 == 0 {
                    format!("SET {key} x\r\n")
                } else {
                    format!("GET {key}\r\n")
                }
            }
            Self::Publish => "PUBLISH bench_chan x\r\n".to_string(),
        }
    }
}

struct Config {
    host: String,
    clients: usize,
    requests: usize,
    workload: Workload,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:7379".to_string(),
            clients: 50,
            requests: 100_000,
            workload: Workload::Mixed,
        }
    }
}

impl Config {
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-h" | "--host" => {
                    config.host = expect_value(&args, i);
                    i += 2;
                }
                "-c" | "--clients" => {
                    config.clients = expect_value(&args, i).parse().unwrap_or_else(|_| {
                        eprintln!("Error: -c expects a number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "-n" | "--requests" => {
                    config.requests = expect_value(&args, i).parse().unwrap_or_else(|_| {
                        eprintln!("Error: -n expects a number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--test" => {
                    let name = expect_value(&args, i);
                    config.workload = Workload::parse(&name).unwrap_or_else(|| {
                        eprintln!(
                            "Error: unknown workload '{name}' \
                             (expected set|get|mixed|setex|incr|hash|publish)"
                        );
                        std::process::exit(1);
                    });
                    i += 2;
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
}

fn expect_value(args: &[String], i: usize) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
susy-bench - SusyDB load generator

USAGE:
    susy-bench [OPTIONS]

OPTIONS:
    -h, --host <ADDR>      Server address (default: 127.0.0.1:7379)
    -c, --clients <N>      Concurrent connections (default: 50)
    -n, --requests <N>     Total requests (default: 100000)
        --test <WORKLOAD>  set|get|mixed|setex|incr|hash|publish (default: mixed)
        --help             Print this help message
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    println!(
        "Benchmarking {} | Test: {} | Clients: {} | Reqs: {}",
        config.host,
        config.workload.name(),
        config.clients,
        config.requests
    );

    if config.workload == Workload::Get {
        println!("Pre-populating keys for GET test...");
        populate_keys(&config.host, config.requests / 10).await?;
    }

    let started = Instant::now();
    let requests_per_worker = config.requests / config.clients;

    let mut workers = Vec::with_capacity(config.clients);
    for worker_id in 0..config.clients {
        let host = config.host.clone();
        let workload = config.workload;
        workers.push(tokio::spawn(async move {
            run_worker(worker_id, host, workload, requests_per_worker).await
        }));
    }

    let mut latencies = Vec::with_capacity(config.requests);
    for worker in workers {
        latencies.extend(worker.await?);
    }
    let total = started.elapsed();

    print_report(config.workload.name(), total, latencies);
    Ok(())
}

/// One connection issuing `requests` commands back to back. Returns the
/// latency of every request that completed.
async fn run_worker(
    worker_id: usize,
    host: String,
    workload: Workload,
    requests: usize,
) -> Vec<Duration> {
    let mut latencies = Vec::with_capacity(requests);

    let stream = match TcpStream::connect(&host).await {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("Worker {worker_id} connect error: {err}");
            return latencies;
        }
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    for seq in 0..requests {
        let key = format!("key:{}", rand::thread_rng().gen_range(0..10_000));
        let command = workload.command(&key, seq);

        let t0 = Instant::now();
        if write_half.write_all(command.as_bytes()).await.is_err() {
            break;
        }
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => latencies.push(t0.elapsed()),
        }
    }

    latencies
}

/// Seeds the keyspace so GET workloads hit existing keys.
async fn populate_keys(host: &str, count: usize) -> anyhow::Result<()> {
    let stream = TcpStream::connect(host).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    for i in 0..count {
        write_half
            .write_all(format!("SET key:{i} value_payload\r\n").as_bytes())
            .await?;
        line.clear();
        reader.read_line(&mut line).await?;
    }
    Ok(())
}

fn print_report(workload: &str, total: Duration, mut latencies: Vec<Duration>) {
    latencies.sort();

    let total_ops = latencies.len();
    if total_ops == 0 {
        println!("No successful operations.");
        std::process::exit(1);
    }

    let rps = total_ops as f64 / total.as_secs_f64();
    let p50 = latencies[total_ops * 50 / 100];
    let p99 = latencies[(total_ops * 99 / 100).min(total_ops - 1)];

    println!("\n------------------------------------------------");
    println!("Summary ({workload}):");
    println!("  Total Ops:   {total_ops}");
    println!("  Duration:    {total:?}");
    println!("  Throughput:  {rps:.2} requests/sec");
    println!("  P50 Latency: {p50:?}");
    println!("  P99 Latency: {p99:?}");
    println!("------------------------------------------------");
}
