use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use typekey_cli::config::load_resolver;
use typekey_cli::measure::{parse_addr, parse_samples};
use typekey_cli::report::{render_tables, ProfileReport};
use typekey_core::probe::{audit, collision_report, measure_irrelevant_bits, ProbeError};
use typekey_core::{derive_key, CapabilityProfile, Resolver, TargetDescription, TypeIdentityPtr};

#[derive(Parser, Debug)]
#[command(name = "typekey")]
#[command(about = "typekey: capability profiles and dispatch keys for type switches")]
#[command(version)]
struct Cli {
    /// Log filter (e.g. "warn", "typekey_core=debug")
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the capability profile of a target
    Resolve {
        /// Target, e.g. msvc-1900/64/release or host
        target: String,

        /// Resolver configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },

    /// Derive the dispatch key of a type-identity address
    Derive {
        target: String,

        /// Address, hex (0x...) or decimal
        address: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print alignment rows and feature rules in effect
    Table {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Measure irrelevant bits from sampled type-identity addresses
    Measure {
        /// File with one address per line
        file: PathBuf,

        /// Check the samples against this target's profile
        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            target,
            config,
            format,
        } => cmd_resolve(&target, config, format),
        Commands::Derive {
            target,
            address,
            config,
        } => cmd_derive(&target, &address, config),
        Commands::Table { config } => cmd_table(config),
        Commands::Measure {
            file,
            target,
            config,
        } => cmd_measure(&file, target.as_deref(), config),
    }
}

fn resolve_target(target: &str, config: Option<PathBuf>) -> Result<(TargetDescription, CapabilityProfile)> {
    let resolver: Resolver = load_resolver(config.as_deref())?;
    let target: TargetDescription = target.parse()?;
    let profile = resolver
        .resolve(&target)
        .with_context(|| format!("target {}", target))?;
    Ok((target, profile))
}

fn cmd_resolve(target: &str, config: Option<PathBuf>, format: Format) -> Result<()> {
    let (target, profile) = resolve_target(target, config)?;
    let report = ProfileReport::new(&target, profile)?;
    match format {
        Format::Pretty => print!("{}", report.render_pretty()),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn cmd_derive(target: &str, address: &str, config: Option<PathBuf>) -> Result<()> {
    let (_, profile) = resolve_target(target, config)?;
    let addr = parse_addr(address).ok_or_else(|| anyhow!("'{}' is not an address", address))?;
    let key = derive_key(TypeIdentityPtr::from_addr(addr), &profile)?;
    println!("{}", key);
    Ok(())
}

fn cmd_table(config: Option<PathBuf>) -> Result<()> {
    let resolver = load_resolver(config.as_deref())?;
    print!("{}", render_tables(&resolver));
    Ok(())
}

fn cmd_measure(file: &Path, target: Option<&str>, config: Option<PathBuf>) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read samples '{}'", file.display()))?;
    let samples = parse_samples(&text)?;
    let measured = measure_irrelevant_bits(samples.iter().copied()).ok_or(ProbeError::NoSamples)?;
    let null = samples.iter().filter(|p| p.is_null()).count();
    println!("samples: {} measured, {} null skipped", samples.len() - null, null);
    println!("measured irrelevant bits: {} ({}-byte alignment)", measured, 1u64 << measured);

    let Some(target) = target else {
        return Ok(());
    };
    let (target, profile) = resolve_target(target, config)?;
    println!("profile {}: irrelevant bits {}", target, profile.irrelevant_bits());
    println!("{}", collision_report(samples.iter().copied(), &profile));
    audit(samples, &profile)?;
    println!("profile is safe for these samples");
    Ok(())
}
