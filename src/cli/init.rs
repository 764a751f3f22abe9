//! Init command implementation

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use crate::store::{InitOutcome, Store};

pub fn run(path: &Path, busy_timeout: Duration) -> Result<()> {
    let (_store, outcome) = Store::create(path, busy_timeout)?;

    match outcome {
        InitOutcome::Created => println!("Initialized archive at {}", path.display()),
        InitOutcome::AlreadyInitialized => {
            println!("Archive at {} is already initialized.", path.display())
        }
    }

    Ok(())
}
