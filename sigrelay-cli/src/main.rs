//! SigRelay CLI — forwarder driver and operational commands.
//!
//! Commands:
//! - `run` — one forwarder pass, or a fixed-interval loop
//! - `health-check` — inject a probe record and verify end-to-end delivery
//! - `inject` — append a probe record without running the forwarder
//! - `status` — dump feed/cursor diagnostics
//! - `verify-bot` — `getMe` roundtrip and optional test message

use anyhow::Result;
use clap::{Parser, Subcommand};
use sigrelay_core::{
    append_probe, run_health_check, run_once, CursorState, RelayConfig, SignalRecord,
    TelegramTransport,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigrelay", about = "SigRelay — JSON-lines signal feed forwarder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the forwarder once, or continuously with --loop.
    Run {
        /// Path to the JSON config file.
        #[arg(long, default_value = "config/config.json")]
        config: PathBuf,

        /// Keep running on a fixed interval instead of a single pass.
        #[arg(long = "loop", default_value_t = false)]
        continuous: bool,

        /// Seconds between passes in --loop mode.
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
    /// Inject a probe record, run once, and verify it was forwarded.
    /// Exits 0 on success, 1 otherwise.
    HealthCheck {
        #[arg(long, default_value = "config/config.json")]
        config: PathBuf,
    },
    /// Append a probe record to the feed without running the forwarder.
    Inject {
        #[arg(long, default_value = "config/config.json")]
        config: PathBuf,

        /// Symbol override. Defaults to the first configured symbol.
        #[arg(long)]
        pair: Option<String>,

        /// Timeframe override. Defaults to the configured timeframe.
        #[arg(long)]
        tf: Option<String>,
    },
    /// Report feed size, last records, and cursor state.
    Status {
        #[arg(long, default_value = "config/config.json")]
        config: PathBuf,
    },
    /// Check the bot token with getMe; optionally send a test message.
    VerifyBot {
        #[arg(long, default_value = "config/config.json")]
        config: PathBuf,

        /// Also send a test message to the configured chat.
        #[arg(long, default_value_t = false)]
        send_test: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            continuous,
            interval_secs,
        } => cmd_run(&config, continuous, interval_secs),
        Commands::HealthCheck { config } => cmd_health_check(&config),
        Commands::Inject { config, pair, tf } => cmd_inject(&config, pair, tf),
        Commands::Status { config } => cmd_status(&config),
        Commands::VerifyBot { config, send_test } => cmd_verify_bot(&config, send_test),
    }
}

fn load_config(path: &PathBuf) -> Result<RelayConfig> {
    Ok(RelayConfig::load(path)?)
}

fn transport_for(cfg: &RelayConfig) -> TelegramTransport {
    TelegramTransport::new(cfg.telegram.bot_token.clone(), cfg.telegram.chat_id.clone())
}

fn cmd_run(config: &PathBuf, continuous: bool, interval_secs: u64) -> Result<()> {
    let cfg = load_config(config)?;
    let transport = transport_for(&cfg);

    if continuous {
        loop {
            if let Err(e) = run_once(&cfg, &transport) {
                error!(error = %e, "forwarder pass failed");
            }
            std::thread::sleep(Duration::from_secs(interval_secs));
        }
    }

    run_once(&cfg, &transport)?;
    Ok(())
}

fn cmd_health_check(config: &PathBuf) -> Result<()> {
    let cfg = load_config(config)?;
    let transport = transport_for(&cfg);

    println!("[1/3] Appending probe record to the feed...");
    println!("[2/3] Running the forwarder once...");
    let report = run_health_check(&cfg, &transport)?;

    println!("[3/3] Verifying forwarder state...");
    if report.delivered {
        println!("HEALTH CHECK OK");
        println!("   probe_id: {}", report.probe_id);
        println!("   verified path: feed file -> forwarder -> Telegram send");
        Ok(())
    } else {
        println!("HEALTH CHECK FAILED");
        println!("   probe_id {} not found in sent_ids", report.probe_id);
        std::process::exit(1);
    }
}

fn cmd_inject(config: &PathBuf, pair: Option<String>, tf: Option<String>) -> Result<()> {
    let cfg = load_config(config)?;

    let pair = match pair.or_else(|| cfg.filters.primary_symbol()) {
        Some(p) => p,
        None => anyhow::bail!("no symbol configured and none given with --pair"),
    };
    let tf = tf.unwrap_or_else(|| cfg.filters.allowed_tf.clone());

    let probe_id = append_probe(&cfg.signal_file, &pair, &tf)?;
    println!(
        "Injected probe {probe_id} ({pair} {tf}) into {}",
        cfg.signal_file.display()
    );
    Ok(())
}

fn cmd_status(config: &PathBuf) -> Result<()> {
    let cfg = load_config(config)?;

    println!("=== Signal feed ===");
    match std::fs::read_to_string(&cfg.signal_file) {
        Ok(content) => {
            let size = content.len() as u64;
            let lines: Vec<&str> = content.lines().collect();
            println!(
                "{}: {} lines, {} bytes",
                cfg.signal_file.display(),
                lines.len(),
                size
            );
            println!("Last records:");
            for line in lines.iter().rev().take(5).rev() {
                match serde_json::from_str::<SignalRecord>(line) {
                    Ok(r) => println!(
                        "- {} | {} {} {} @ {}",
                        r.display_id(),
                        r.pair.as_deref().unwrap_or("-"),
                        r.tf.as_deref().unwrap_or("-"),
                        r.side.as_deref().unwrap_or("-"),
                        r.display_time()
                    ),
                    Err(_) => println!("- [parse error] {}", line.get(..80).unwrap_or(line)),
                }
            }

            println!();
            println!("=== Cursor state ===");
            let state = CursorState::load(&cfg.state_file)?;
            println!("Offset: {}", state.offset);
            println!("Seen ids: {}", state.sent_ids.len());
            println!("Last run: {}", state.last_run_at.as_deref().unwrap_or("-"));
            if let Some(stats) = &state.last_run_stats {
                println!(
                    "Stats: scanned={}, sent={}, offset {} -> {}, file_size={}",
                    stats.scanned_lines,
                    stats.sent_count,
                    stats.offset_before,
                    stats.offset_after,
                    stats.file_size
                );
            }
            if state.offset > size {
                println!(
                    "WARNING: offset {} exceeds feed size {} — file was rotated/truncated, \
                     next run resets to 0",
                    state.offset, size
                );
            } else {
                println!("Remaining bytes after offset: {}", size - state.offset);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("Signal file not found: {}", cfg.signal_file.display());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_verify_bot(config: &PathBuf, send_test: bool) -> Result<()> {
    let cfg = load_config(config)?;
    cfg.validate()?;
    let transport = transport_for(&cfg);

    let identity = transport.verify()?;
    println!(
        "Bot ok: id={} username={} name={}",
        identity.id,
        identity.username.as_deref().unwrap_or("-"),
        identity.first_name
    );

    if send_test {
        use sigrelay_core::Transport;
        transport.send("sigrelay bot test - please ignore")?;
        println!("Test message sent to {}", cfg.telegram.chat_id);
    }
    Ok(())
}
