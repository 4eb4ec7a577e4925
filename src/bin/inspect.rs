//! Strata Inspector Binary
//!
//! Dumps the contents of block files and object files for diagnostics.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use strata::block::{BlockFileMeta, CachingBlockSource, DirectFileBlockSource, ReadOnlyBlockSource};
use strata::object::open_object_file;
use strata::strings::{PrefixTable, StringFile};
use strata::{BlockSource, FileMode, ObjectFile, Result, StoreConfig, StrataError};
use tracing_subscriber::{fmt, EnvFilter};

/// Strata Inspector
#[derive(Parser, Debug)]
#[command(name = "strata-inspect")]
#[command(about = "Inspect Strata block files and object files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the entries of an object file
    Objects {
        /// Object file path
        path: PathBuf,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List the entries of a string file
    Strings {
        /// String file path
        path: PathBuf,

        /// The file was written without prefix abbreviation
        #[arg(long)]
        no_abbrev: bool,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List the blocks of a block file
    Blocks {
        /// Block file path
        path: PathBuf,

        /// Block size in bytes (defaults to the metadata sidecar, then 8192)
        #[arg(short, long)]
        block_size: Option<usize>,

        /// Stop after this many blocks
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("strata-inspect v{}", strata::VERSION);

    let outcome = match args.command {
        Commands::Objects { path, limit } => dump_objects(&path, limit),
        Commands::Strings {
            path,
            no_abbrev,
            limit,
        } => dump_strings(&path, !no_abbrev, limit),
        Commands::Blocks {
            path,
            block_size,
            limit,
        } => dump_blocks(&path, block_size, limit),
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(StrataError::Config(format!("no such file: {}", path.display())));
    }
    Ok(())
}

fn dump_objects(path: &Path, limit: Option<usize>) -> Result<()> {
    require_file(path)?;
    let mut file = open_object_file(path, &StoreConfig::default())?;

    println!("{:>12}  {:>10}  {:>8}", "id", "length", "crc32");
    let mut count = 0;
    for entry in file.all().take(limit.unwrap_or(usize::MAX)) {
        let (id, bytes) = entry?;
        println!("{:>12}  {:>10}  {:08x}", id, bytes.len(), crc32fast::hash(&bytes));
        count += 1;
    }
    println!("{} entries, {} bytes", count, file.length());
    Ok(())
}

fn dump_strings(path: &Path, abbreviate: bool, limit: Option<usize>) -> Result<()> {
    require_file(path)?;
    let file = open_object_file(path, &StoreConfig::default())?;
    let prefixes = abbreviate.then(PrefixTable::rdf);
    let mut strings = StringFile::new(file, prefixes);

    let mut count = 0;
    for entry in strings.all().take(limit.unwrap_or(usize::MAX)) {
        let (id, s) = entry?;
        println!("{:>12}  {}", id, s);
        count += 1;
    }
    println!("{} strings", count);
    Ok(())
}

fn dump_blocks(
    path: &Path,
    block_size: Option<usize>,
    limit: Option<usize>,
) -> Result<()> {
    require_file(path)?;

    // Geometry: explicit flag, then the sidecar, then the default
    let meta = BlockFileMeta::load(path)?;
    let mut builder = StoreConfig::builder().file_mode(FileMode::Direct);
    if let Some(meta) = &meta {
        builder = builder
            .block_size(meta.block_size as usize)
            .byte_order(meta.byte_order);
    }
    if let Some(size) = block_size {
        builder = builder.block_size(size);
    }
    let mut config = builder.build();
    // Segments must stay a whole number of blocks for odd block sizes
    config.segment_size = config.block_size * config.blocks_per_segment().max(1);
    config.validate()?;

    // Mapped and direct files share one layout. The direct backing reads
    // without touching the file, where mapping would pad it to a segment.
    let direct = DirectFileBlockSource::open_read_only(path, &config)?;
    let mut source = ReadOnlyBlockSource::new(CachingBlockSource::new(direct, &config));

    println!(
        "{}: {} blocks of {} bytes ({:?})",
        source.label(),
        source.block_count(),
        source.block_size(),
        source.byte_order()
    );
    println!("{:>10}  {:>8}  {}", "id", "crc32", "state");

    let shown = source.block_count().min(limit.unwrap_or(usize::MAX) as u64);
    for id in 0..shown {
        let block = source.get_silent(id)?;
        let state = if block.as_slice().iter().all(|&b| b == 0) {
            "zero"
        } else {
            "data"
        };
        println!("{:>10}  {:08x}  {}", id, crc32fast::hash(block.as_slice()), state);
    }

    source.close()
}
