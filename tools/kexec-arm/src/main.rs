//! # kexec-arm
//!
//! Runs the ARM zImage loader against the memory map and firmware of this
//! machine and prints the segments a `kexec_load` call would receive.

mod cli;
mod error;
mod firmware;
mod logger;

use crate::cli::{Cli, read};
use crate::error::{Error, report};
use crate::firmware::ProcFirmware;
use crate::logger::StderrLogger;
use clap::Parser;
use kexec_boards::board_names;
use kexec_layout::{MemoryMap, Segment};
use kexec_zimage::load;
use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = StderrLogger::from_verbosity(cli.verbose).init() {
        eprintln!("failed to install the logger: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", report(&e));
            ExitCode::from(&e)
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    if cli.list_boards {
        for name in board_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let Some(kernel_path) = cli.kernel.as_deref() else {
        return Ok(());
    };
    let kernel = read(kernel_path)?;
    let config = cli.boot_config()?;

    let iomem = read(&cli.iomem)?;
    let mut table =
        MemoryMap::from_iomem(&String::from_utf8_lossy(&iomem)).map_err(Error::MemoryMap)?;
    let firmware = ProcFirmware::new(&cli.root);

    if config.crash {
        warn!("crash dump segments are not prepared, the panic kernel gets no elfcorehdr");
    }
    let outcome = load(&kernel, &config, &mut table, &firmware, None)?;
    info!("plan: {:?}", outcome.plan);

    print_segments(table.segments());
    println!("entry {}", outcome.entry);

    if let Some(dir) = &cli.dump {
        dump_segments(dir, table.segments())?;
    }
    Ok(())
}

fn print_segments(segments: &[Segment]) {
    println!("{:>3}  {:<23}  {:>10}  {:>10}", "#", "range", "bytes", "memsz");
    for (index, segment) in segments.iter().enumerate() {
        println!(
            "{index:>3}  {:<23}  {:>#10x}  {:>#10x}",
            segment.range().to_string(),
            segment.bytes.len(),
            segment.memsz
        );
    }
}

fn dump_segments(dir: &Path, segments: &[Segment]) -> Result<(), Error> {
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Error::Write { path, source }
    };

    fs::create_dir_all(dir).map_err(write_error(dir))?;
    for (index, segment) in segments.iter().enumerate() {
        let path = dir.join(format!(
            "segment-{index}-{:08x}.bin",
            segment.base.as_u64()
        ));
        fs::write(&path, &segment.bytes).map_err(write_error(&path))?;
        info!("wrote {}", path.display());
    }
    Ok(())
}
