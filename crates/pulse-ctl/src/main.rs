//! pulse-ctl: command-line interface for the pulse registry daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 9151;

fn print_usage() {
    println!("Usage: pulse-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status          Show registry totals and listener state");
    println!("  fleet           Show every registered service, grouped by key");
    println!("  fleet <key>     Show the services under one grouping key");
    println!("  connections     List open agent connections");
    println!("  sweep           Run a liveness sweep now");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd::status::cmd_status(port).await,
        ["fleet"]                      => cmd::fleet::cmd_fleet(port).await,
        ["fleet", key]                 => cmd::fleet::cmd_fleet_group(port, key).await,
        ["connections"]                => cmd::status::cmd_connections(port).await,
        ["sweep"]                      => cmd::status::cmd_sweep(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
