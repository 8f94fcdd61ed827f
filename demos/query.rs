//! Look up addresses and print one JSON object per address.
//!
//! Usage:
//!   cargo run --example query -- -d GeoLite2-City.mmdb 81.2.69.142 8.8.8.8
//!   cargo run --example query -- --list-fields
//!
//! Set RUST_LOG=geoip_capture=debug to see open/close events on stderr.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use geoip_capture::{record, DatabaseConfig, Error, OpenFlags};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Database file to open
    #[clap(short, long, value_name = "FILE", env = "GEOIP_DATABASE")]
    database: Option<Utf8PathBuf>,

    /// Open flags, e.g. "mmap" or "memory|check"
    #[clap(short, long, value_name = "FLAGS")]
    flags: Option<OpenFlags>,

    /// List the fields a lookup can return
    #[clap(short = 'L', long)]
    list_fields: bool,

    /// Addresses to look up
    #[clap(value_name = "ADDR")]
    addrs: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if args.list_fields {
        for field in record::fields() {
            println!("{}\t{}\t{}", field.name, field.kind, field.description);
        }
        return Ok(());
    }

    let mut config = DatabaseConfig::with_path_or_env(args.database)?;
    if let Some(flags) = args.flags {
        config.flags = flags;
    }

    let mut db = config
        .open()
        .with_context(|| format!("failed to open {}", config.path))?;

    let mut out = io::stdout();
    for addr in &args.addrs {
        // Printing happens between lookups, never while one is running.
        match db.query(addr) {
            Ok(Some(fields)) => {
                serde_json::to_writer(&mut out, &fields)?;
                writeln!(out)?;
            }
            Ok(None) => writeln!(out, "null")?,
            Err(Error::Query { message, .. }) => {
                writeln!(io::stderr(), "{}: {}", addr, message)?;
            }
            Err(err) => return Err(err.into()),
        }
        out.flush()?;
    }

    db.close()?;
    Ok(())
}
