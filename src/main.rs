mod cli;

use crate::cli::{Cli, Commands};
use bltfs::backend::FileBackend;
use bltfs::options::{FileOptions, StoreOptions};
use bltfs::store::Store;
use bltfs::Result;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse_args();

    bltfs::logger::init(args.verbose)?;
    debug!("bltfs CLI starting");

    match run(args).await {
        Ok(_) => {
            info!("operation completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("operation failed: {e}");
            std::process::exit(1);
        }
    }
}

fn open_store(tape_root: &Path, index_dir: &Path) -> bltfs::Result<Store> {
    let backend = FileBackend::open(tape_root)?;
    Store::open(Box::new(backend), index_dir, StoreOptions::default())
}

async fn run(args: Cli) -> Result<()> {
    match args.command {
        Commands::Open {
            tape_root,
            index_dir,
        } => {
            let store = open_store(&tape_root, &index_dir)?;
            store.close()?;
            Ok(())
        }

        Commands::CopyIn {
            tape_root,
            index_dir,
            source,
            destination,
        } => {
            let store = open_store(&tape_root, &index_dir)?;
            copy_in(&store, &source, &destination)?;
            store.close()?;
            Ok(())
        }

        Commands::Stat {
            tape_root,
            index_dir,
            path,
        } => {
            let store = open_store(&tape_root, &index_dir)?;
            let entry = store.stat(&path)?;
            println!("{entry:#?}");
            store.close()?;
            Ok(())
        }

        Commands::Cat {
            tape_root,
            index_dir,
            path,
        } => {
            let store = open_store(&tape_root, &index_dir)?;
            let mut file = store.open(&path, FileOptions::default())?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            std::io::stdout().write_all(&buf)?;
            store.close()?;
            Ok(())
        }
    }
}

/// Recursively walks `source`, creating directories and copying files into
/// the volume under `destination` (spec §6 "walk a source directory
/// copying files"). `std::fs::read_dir` recursion stands in for the
/// teacher's `walkdir` usage elsewhere, since the teacher's own dependency
/// set doesn't carry that crate for this module.
fn copy_in(store: &Store, source: &Path, destination: &str) -> bltfs::Result<()> {
    store.mkdir_all(destination)?;

    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().to_string();
        let dest_path = format!("{}/{}", destination.trim_end_matches('/'), name);

        if file_type.is_dir() {
            copy_in(store, &entry.path(), &dest_path)?;
        } else if file_type.is_file() {
            let mut src = std::fs::File::open(entry.path())?;
            let mut dst = store.create(&dest_path, FileOptions::default())?;
            store.copy(&mut dst, &mut src)?;
        }
    }

    Ok(())
}
