use std::env;
use std::fs;
use std::net::SocketAddr;

use engine_api::{serve, EngineApi};
use engine_core::LayerRegistry;
use serde_json::Value;

fn print_usage() {
    println!("engine-cli <command>");
    println!("commands:");
    println!("  validate <definition.json>");
    println!("  run <definition.json> [ticks]");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
}

fn read_definition(path: Option<&String>) -> Result<Value, String> {
    let path = path.ok_or_else(|| "missing definition path".to_string())?;
    let raw = fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))?;
    serde_json::from_str(&raw).map_err(|err| format!("invalid json in {path}: {err}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn initialize(raw: Value) -> Result<EngineApi, String> {
    let registry = LayerRegistry::with_builtin_layers();
    EngineApi::initialize(raw, &registry).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("validate") => match read_definition(args.get(2)).and_then(initialize) {
            Ok(api) => {
                println!("ok: {}", api.game_id());
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        },
        Some("run") => match read_definition(args.get(2)).and_then(initialize) {
            Ok(mut api) => {
                let ticks = args.get(3).and_then(|v| v.parse::<u64>().ok()).unwrap_or(1);
                match api.tick(ticks) {
                    Ok(summary) => {
                        println!("ticked={ticks} game={}", api.game_id());
                        if let Some(summary) = summary {
                            println!(
                                "unlocked={} dispatched={} deferred={}",
                                summary.unlocks.unlocked_refs.len(),
                                summary.dispatched_handlers,
                                summary.dispatch.deferred_events
                            );
                        }
                    }
                    Err(err) => {
                        eprintln!("tick error: {err}");
                        std::process::exit(1);
                    }
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        },
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        _ => {
            print_usage();
        }
    }
}
