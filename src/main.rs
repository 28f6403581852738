//! biggrant - share a multi-page buffer through a single grant reference
//!
//! Runs a full round trip between two domains of the simulated hypervisor.

use anyhow::{Context, Result, bail};
use biggrant::logging::{LOG_ENV, Logger};
use biggrant::platform::SimHypervisor;
use biggrant::{DomainId, Instance};
use clap::Parser as ClapParser;
use rand::Rng;
use std::sync::Arc;

/// Share a buffer from one simulated domain to another and map it back
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Size of the buffer in bytes
    #[arg(short, long, default_value = "16384")]
    size: usize,

    /// Domain that shares the buffer
    #[arg(short, long, default_value = "1")]
    granter: u16,

    /// Domain that maps the buffer
    #[arg(short = 'r', long, default_value = "2")]
    grantee: u16,

    /// Share the buffer read-only
    #[arg(long)]
    read_only: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let env = || env_logger::Env::new().filter_or(LOG_ENV, log_level);
    env_logger::Builder::from_env(env()).init();
    let logger: Logger = Arc::new(env_logger::Builder::from_env(env()).build());
    log::debug!("Running with {:?}", args);

    let granter = DomainId(args.granter);
    let grantee = DomainId(args.grantee);
    let hv = SimHypervisor::new();

    let mut local = Instance::create(&hv.domain(granter), Some(logger.clone()))
        .context("Failed to open the granting side")?;
    let mut remote = Instance::create(&hv.domain(grantee), Some(logger))
        .context("Failed to open the receiving side")?;

    let mut buffer = local
        .allocate_shared_buffer(args.size, grantee, !args.read_only)
        .context("Failed to allocate shared buffer")?;
    rand::thread_rng().fill(buffer.as_mut_slice());
    println!(
        "Granted {} page(s) from {} to {}; root reference is {}",
        buffer.num_pages(),
        granter,
        grantee,
        buffer.root()
    );

    let mapped = remote
        .map_shared_buffer(granter, buffer.root(), !args.read_only)
        .context("Failed to map shared buffer")?;
    println!(
        "Mapped {} page(s) into {}: {:?}",
        mapped.num_pages(),
        grantee,
        mapped.refs()
    );

    let mut seen = vec![0u8; buffer.len()];
    mapped.read_at(0, &mut seen)?;
    if seen != buffer.as_slice() {
        bail!("Mapped contents differ from the shared buffer");
    }
    println!("✅ Contents match");

    remote
        .unmap_shared_buffer(mapped)
        .context("Failed to unmap shared buffer")?;
    local
        .release_shared_buffer(buffer)
        .context("Failed to release shared buffer")?;

    remote.destroy();
    local.destroy();

    let stats = hv.stats();
    if stats.outstanding_grants != 0 || stats.active_mappings != 0 {
        bail!(
            "Leaked {} grant(s) and {} mapping(s)",
            stats.outstanding_grants,
            stats.active_mappings
        );
    }
    println!("✅ All pages unmapped and unshared");

    Ok(())
}
