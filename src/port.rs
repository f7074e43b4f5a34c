//! Free TCP ports for daemons under test.
//!
//! The allocator is owned by the caller and seeded explicitly, so a test run
//! hands out the same sequence of candidates every time. A candidate is only
//! returned if it was not handed out before and can be bound on 127.0.0.1.

use crate::Result;
use crate::error::PortError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

pub const DEFAULT_RANGE: RangeInclusive<u16> = 20000..=40000;
const MAX_ATTEMPTS: u32 = 1000;

#[derive(Debug)]
pub struct PortAllocator {
    rng: StdRng,
    allocated: BTreeSet<u16>,
    range: RangeInclusive<u16>,
}

impl PortAllocator {
    pub fn new(seed: u64) -> Self {
        Self::with_range(seed, DEFAULT_RANGE)
    }

    pub fn with_range(seed: u64, range: RangeInclusive<u16>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            allocated: BTreeSet::new(),
            range,
        }
    }

    pub fn allocated(&self) -> &BTreeSet<u16> {
        &self.allocated
    }

    pub fn allocate(&mut self) -> Result<u16> {
        for _ in 0..MAX_ATTEMPTS {
            let port = self.rng.random_range(self.range.clone());
            if self.allocated.contains(&port) || !is_bindable(port) {
                trace!("port {port} is taken, retrying");
                continue;
            }
            self.allocated.insert(port);
            debug!("allocated port {port}");
            return Ok(port);
        }
        Err(PortError::Exhausted {
            start: *self.range.start(),
            end: *self.range.end(),
            attempts: MAX_ATTEMPTS,
        }
        .into())
    }

    /// Make `port` available again. Returns false if it was not allocated.
    pub fn release(&mut self, port: u16) -> bool {
        self.allocated.remove(&port)
    }
}

fn is_bindable(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
