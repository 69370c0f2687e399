//! Gallery CLI - inspect and convert record galleries.

use std::env;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use gallery::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "info" | "i" => match filtered_args.get(1) {
            Some(g) => cmd_info(g),
            None => usage("gallery-cli info <gallery>"),
        },
        "cat" | "c" => match (filtered_args.get(1), filtered_args.get(2)) {
            (Some(src), Some(dst)) => cmd_cat(src, dst),
            _ => usage("gallery-cli cat <source> <destination>"),
        },
        "count" | "n" => match filtered_args.get(1) {
            Some(g) => cmd_count(g),
            None => usage("gallery-cli count <gallery>"),
        },
        "formats" => {
            for format in Registry::global().formats() {
                println!("{}", if format.is_empty() { "<directory>" } else { format.as_str() });
            }
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn usage(line: &str) -> Result<()> {
    bail!("missing arguments\nUsage: {}", line)
}

fn print_help() {
    println!("gallery-cli - record gallery toolkit");
    println!();
    println!("USAGE:");
    println!("    gallery-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <gallery>             Show backend, total size and record count");
    println!("    c, cat    <source> <dest>       Stream every record of source into dest");
    println!("    n, count  <gallery>             Count records");
    println!("    formats                         List registered formats");
    println!("    h, help                         Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose                   Debug logging");
    println!("    -vv, --trace                    Trace logging");
    println!("    -q, --quiet                     Errors only");
    println!();
    println!("Galleries are written as path[key=value,...], e.g. faces.gal[blockSize=50].");
    println!("RUST_LOG overrides the verbosity flags.");
}

fn open(text: &str) -> Result<Box<dyn Gallery>> {
    let descriptor = GalleryDescriptor::parse(text)
        .with_context(|| format!("parsing descriptor {}", text))?;
    Registry::global()
        .open(&descriptor)
        .with_context(|| format!("opening {}", descriptor.name))
}

fn count_records(gallery: &mut dyn Gallery) -> Result<(usize, usize)> {
    let mut records = 0;
    let mut blocks = 0;
    loop {
        let block = gallery.next_block()?;
        blocks += 1;
        records += block.len();
        debug!("block {}: {} records, position {}", blocks, block.len(), gallery.position());
        if block.done {
            return Ok((records, blocks));
        }
    }
}

fn cmd_info(text: &str) -> Result<()> {
    let mut gallery = open(text)?;
    let descriptor = gallery.descriptor().clone();
    let format = Registry::global().resolve(&descriptor)?;
    let total = gallery.total_size()?;
    let (records, blocks) = count_records(gallery.as_mut())?;

    println!("Gallery:     {}", descriptor.name);
    println!(
        "Backend:     {}",
        if format.is_empty() { "directory" } else { format.as_str() }
    );
    println!("Total size:  {}", total);
    println!("Records:     {}", records);
    println!("Blocks:      {} (block size {})", blocks, gallery.block_size());
    Ok(())
}

fn cmd_count(text: &str) -> Result<()> {
    let mut gallery = open(text)?;
    let (records, _) = count_records(gallery.as_mut())?;
    println!("{}", records);
    Ok(())
}

fn cmd_cat(src: &str, dst: &str) -> Result<()> {
    let start = Instant::now();
    let mut source = open(src)?;
    let mut dest = open(dst)?;

    let mut written = 0usize;
    loop {
        let block = source.next_block()?;
        dest.write_block(&block.records)
            .with_context(|| format!("writing {}", dest.descriptor().name))?;
        written += block.len();
        if block.done {
            break;
        }
    }
    dest.close()?;
    info!(
        "{} records from {} to {} in {:.2?}",
        written,
        source.descriptor().name,
        dest.descriptor().name,
        start.elapsed()
    );
    Ok(())
}
