#[macro_use]
extern crate log;

mod cli;

use daemon_harness::{Result, logger};

fn main() -> Result<()> {
    logger::init();
    cli::run()
}
