use clap::{Args, Parser, Subcommand, ValueEnum};
use dupeguard_index::{HashKind, InboundDescriptor};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dupeguard", version)]
#[command(about = "Inspect and maintain the duplicate-detection index", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to config.toml in the platform config directory).
    #[arg(long, global = true, env = "DUPEGUARD_CONFIG")]
    pub config: Option<PathBuf>,
    /// Index database, overriding the configured path.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show index-wide duplicate statistics
    Stats,
    /// List duplicate groups, most wasted space first
    Groups {
        /// Number of groups to show (clamped to the configured maximum)
        #[arg(long, short)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, value_enum, default_value_t = KindArg::Primary)]
        kind: KindArg,
    },
    /// Show the files in one duplicate group
    Details {
        hash: String,
        #[arg(long, value_enum, default_value_t = KindArg::Primary)]
        kind: KindArg,
    },
    /// Show download links for the files in one duplicate group
    Links {
        hash: String,
        #[arg(long, value_enum, default_value_t = KindArg::Primary)]
        kind: KindArg,
    },
    /// Remove one file record from the index
    Remove { remote_id: String },
    /// Recompute every duplicate group from the file records
    Rebuild,
    /// Compare stored duplicate groups with the file records
    Verify,
    /// Check whether a remote file is already indexed
    Resolve(#[command(flatten)] DescriptorArgs),
    /// Register a transferred file in the index
    Ingest {
        #[command(flatten)]
        descriptor: DescriptorArgs,
        /// Where the file was stored locally, if it was transferred
        #[arg(long)]
        local_path: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    #[value(alias = "md5")]
    Primary,
    #[value(alias = "sha1")]
    Secondary,
}
impl From<KindArg> for HashKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Primary => HashKind::Primary,
            KindArg::Secondary => HashKind::Secondary,
        }
    }
}

#[derive(Debug, Args)]
pub struct DescriptorArgs {
    #[arg(long)]
    pub remote_id: String,
    #[arg(long, default_value = "")]
    pub name: String,
    #[arg(long, default_value_t = 0)]
    pub size: u64,
    #[arg(long)]
    pub primary_hash: Option<String>,
    #[arg(long)]
    pub secondary_hash: Option<String>,
    #[arg(long, default_value = "local")]
    pub source_id: String,
    #[arg(long, default_value = "application/octet-stream")]
    pub content_type: String,
}
impl From<DescriptorArgs> for InboundDescriptor {
    fn from(args: DescriptorArgs) -> Self {
        let mut descriptor = InboundDescriptor::new(args.remote_id, args.name, args.size, args.source_id, args.content_type);
        if let Some(hash) = args.primary_hash {
            descriptor = descriptor.with_primary_hash(hash);
        }
        if let Some(hash) = args.secondary_hash {
            descriptor = descriptor.with_secondary_hash(hash);
        }
        descriptor
    }
}
