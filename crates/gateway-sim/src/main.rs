use ledger_gateway_sim::{DEFAULT_ADDR, GatewayServer, LedgerSim};
use log::info;
use std::time::Duration;

fn print_help() {
    eprintln!(
        r#"Gateway Simulator - in-memory ledger behind the gateway wire protocol

USAGE:
    gateway-sim [OPTIONS]

OPTIONS:
    --addr <ADDR>               Listen address (default: {DEFAULT_ADDR})
    --commit-delay-ms <MS>      Pause between commit events (default: 0)
    --help                      Print this help message

ENVIRONMENT VARIABLES:
    GATEWAY_SIM_ADDR            Listen address, overridden by --addr
    RUST_LOG                    Log level filter (default: info)
"#
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut addr: Option<String> = None;
    let mut commit_delay = Duration::ZERO;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--addr" | "-a" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: --addr requires an address argument");
                    std::process::exit(1);
                };
                addr = Some(value.clone());
            }
            "--commit-delay-ms" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: --commit-delay-ms requires a number");
                    std::process::exit(1);
                };
                commit_delay = Duration::from_millis(value.parse()?);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let addr = addr
        .or_else(|| std::env::var("GATEWAY_SIM_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let ledger = LedgerSim::new().with_commit_delay(commit_delay);
    let server = GatewayServer::bind(addr.as_str(), ledger).await?;
    info!("Commit delay: {:?}", commit_delay);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
