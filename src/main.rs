use std::cmp;
use std::io::{Read, Write};
use std::path::Path;
use std::process;

use clap::Parser;
use log::{debug, info};

use rbkup::file::BackupFile;
use rbkup::inventory::Inventory;
use rbkup::rewrite::Rewrite;
use rbkup::stream::hook::RetryShortWrites;
use rbkup::stream::{BackupReader, BackupWriter, Passthrough, MAX_HEADER_SIZE};

mod cli;
use crate::cli::{Cli, CliError, Commands, Config};

fn main() {
    env_logger::init();

    // Parse the cli
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("rbkup: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    debug!("config: {:?}", config);

    match &cli.command {
        Commands::List { file } => list(&config, file),
        Commands::Rewrite { input, output } => rewrite(&config, input, output),
        Commands::Copy { input, output, chunk } => copy(&config, input, output, *chunk),
    }
}

// Readers only hand every header to the transform when it fits the buffer
fn read_buffer(config: &Config) -> Vec<u8> {
    vec![0; cmp::max(config.buffer_size, MAX_HEADER_SIZE + 1)]
}

fn list(config: &Config, path: &Path) -> Result<(), CliError> {
    let mut reader = BackupReader::with_transform(BackupFile::open(path)?, Inventory::new());
    let mut buf = read_buffer(config);
    while reader.read(&mut buf)? != 0 {}
    reader.close()?;

    let (_, inventory) = reader.into_parts();
    println!("{:<20} {:>6} {:>12} {:>12} {:>8}", "TYPE", "ATTRS", "SIZE", "NAME", "XXH32");
    for rec in inventory.records() {
        println!("{}", rec);
    }

    let streams = inventory.streams().snapshot();
    println!("{} records, {} alternate data streams", inventory.records().len(), streams.len());
    Ok(())
}

fn rewrite(config: &Config, input: &Path, output: &Path) -> Result<(), CliError> {
    let mut reader = BackupReader::with_transform(BackupFile::open(input)?, Rewrite::new(&config.rewrite));
    let mut out = BackupFile::create(output)?;

    let mut buf = read_buffer(config);
    loop {
        match reader.read(&mut buf)? {
            0 => break,
            n => out.write_all(&buf[..n])?,
        }
    }
    out.close()?;
    reader.close()?;

    let rw = reader.transform();
    info!(
        "{} -> {}: {} dropped, {} redacted",
        input.display(),
        output.display(),
        rw.dropped(),
        rw.redacted()
    );
    Ok(())
}

fn copy(config: &Config, input: &Path, output: &Path, chunk: Option<usize>) -> Result<(), CliError> {
    let chunk = chunk.unwrap_or(config.buffer_size);
    if chunk == 0 {
        return Err(CliError::ZeroChunk);
    }

    let mut source = BackupFile::open(input)?;
    let sink = BackupFile::create(output)?;
    let mut writer = BackupWriter::with_hooks(sink, Passthrough, RetryShortWrites)
        .max_write_attempts(config.max_write_attempts);

    let mut buf = vec![0; chunk];
    loop {
        match source.read(&mut buf)? {
            0 => break,
            n => writer.write_all(&buf[..n])?,
        }
    }
    writer.close()?;
    source.close()?;

    info!("{} -> {}: {} byte writes", input.display(), output.display(), chunk);
    Ok(())
}
