use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::ledger::{default_log_path, AttendanceLedger};
use rollcall_hw::Camera;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Attendance log to operate on (defaults to the daemon's log).
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print all recorded attendance sessions
    List,
    /// Export sessions whose entry falls on a date (YYYY-MM-DD)
    Export {
        date: String,
        /// Output file (default: attendance_<date>.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show daemon status
    Status,
    /// List available camera devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let log_path = cli.file.unwrap_or_else(default_log_path);

    match cli.command {
        Commands::List => {
            let ledger = AttendanceLedger::open(&log_path)
                .with_context(|| format!("opening {}", log_path.display()))?;
            let records = ledger.load_all()?;
            if records.is_empty() {
                println!("No attendance records in {}", log_path.display());
                return Ok(());
            }
            println!("{:<24} {:<20} {:<20}", "Name", "Entry Time", "Exit Time");
            for record in records {
                println!(
                    "{:<24} {:<20} {:<20}",
                    record.name, record.entry_time, record.exit_time
                );
            }
        }
        Commands::Export { date, out } => {
            let ledger = AttendanceLedger::open(&log_path)
                .with_context(|| format!("opening {}", log_path.display()))?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("attendance_{date}.csv")));
            let count = ledger.export_by_date(&date, &out)?;
            println!("Exported {count} record(s) to {}", out.display());
        }
        Commands::Status => match daemon_status().await {
            Ok(status) => println!("{status}"),
            Err(err) => println!("rollcalld: not reachable ({err})"),
        },
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for device in devices {
                println!("{}  {} ({})", device.path, device.name, device.driver);
            }
        }
    }

    Ok(())
}

async fn daemon_status() -> Result<String> {
    let connection = zbus::Connection::session().await?;
    let proxy = zbus::Proxy::new(
        &connection,
        "org.rollcall.Rollcall1",
        "/org/rollcall/Rollcall1",
        "org.rollcall.Rollcall1",
    )
    .await?;
    let raw: String = proxy.call("Status", &()).await?;

    // Re-indent for humans; fall back to the raw payload on parse failure.
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => Ok(serde_json::to_string_pretty(&value)?),
        Err(_) => Ok(raw),
    }
}
