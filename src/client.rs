//! A CRAQ chain client.
//!
//! The client keeps one connection to every replica. Writes always go to the
//! chain head. Reads go to the replica with the lowest recent response time,
//! tracked as an exponentially weighted moving average per replica, so read
//! load drifts toward the replicas answering fastest.

use crate::error::{Error, Result};
use crate::server::{Request, Response, Status};
use crate::store::Version;
use crate::transport::Connection;
use crate::{errdata, errinput};

use itertools::Itertools as _;
use std::net::ToSocketAddrs;

/// The weight of a new sample in the response time moving average.
const EWMA_WEIGHT: f64 = 0.3;

/// A CRAQ client.
pub struct Client {
    /// Connections to all replicas, in chain order with the head first.
    conns: Vec<Connection>,
    /// Moving average response time per replica, in seconds. Starts at zero,
    /// so every replica is tried before the averages settle; ties go to the
    /// replica closest to the head.
    response_times: Vec<f64>,
}

impl Client {
    /// Connects to a chain, given replica addresses ordered head to tail.
    pub fn new<A: ToSocketAddrs>(addrs: &[A]) -> Result<Self> {
        if addrs.is_empty() {
            return errinput!("no replica addresses");
        }
        let conns =
            addrs.iter().map(|addr| Connection::connect(addr)).collect::<Result<Vec<_>>>()?;
        let response_times = vec![0.0; conns.len()];
        Ok(Self { conns, response_times })
    }

    /// Writes a key/value pair, via the chain head.
    pub fn set(&mut self, key: &str, val: &str) -> Result<()> {
        let request = Request::Set { key: key.to_string(), val: val.to_string(), ver: None };
        match self.conns[0].call(&request)? {
            Response::Status { status: Status::Ok, .. } => Ok(()),
            Response::Status { status, .. } => {
                Err(Error::InvalidData(format!("write failed: {status}")))
            }
            response => errdata!("unexpected response {response:?} to write"),
        }
    }

    /// Reads a key from the replica with the lowest average response time.
    /// Returns None if the key has never been written.
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        let index = self.pick();
        let start = std::time::Instant::now();
        let response = self.conns[index].call(&Request::Get { key: key.to_string() })?;
        let sample = start.elapsed().as_secs_f64();
        let average = &mut self.response_times[index];
        *average = EWMA_WEIGHT * sample + (1.0 - EWMA_WEIGHT) * *average;
        match response {
            Response::Status { status: Status::Ok, val: Some(val) } => Ok(Some(val)),
            Response::Status { status: Status::KeyNotFound, .. } => Ok(None),
            response => errdata!("unexpected response {response:?} to read"),
        }
    }

    /// Fetches the version of a key committed at the tail, via the head.
    pub fn query(&mut self, key: &str) -> Result<Version> {
        match self.conns[0].call(&Request::Query { key: key.to_string() })? {
            Response::Version { ver } => Ok(ver),
            response => errdata!("unexpected response {response:?} to version query"),
        }
    }

    /// Picks the replica to read from.
    fn pick(&self) -> usize {
        least_loaded(&self.response_times).unwrap_or(0)
    }
}

/// Returns the index of the smallest response time, preferring earlier
/// entries on ties.
fn least_loaded(times: &[f64]) -> Option<usize> {
    times.iter().position_min_by(|a, b| a.total_cmp(b))
}
