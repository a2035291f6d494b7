//! Synchronous TCP connections between chain replicas.
//!
//! A chain hop is a blocking request/response exchange: the caller keeps the
//! connection until the response arrives. Connections to each peer are
//! pooled and created on demand, so concurrent in-flight requests to the
//! same peer each get their own connection.

use crate::encoding::Message as _;
use crate::errinput;
use crate::error::Result;
use crate::server::{ReplicaId, Request, Response};

use log::debug;
use std::collections::HashMap;
use std::io::Write as _;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;

/// A length-framed JSON request/response connection to a replica.
pub struct Connection {
    reader: std::io::BufReader<TcpStream>,
    writer: std::io::BufWriter<TcpStream>,
}

impl Connection {
    /// Connects to the replica at the given address.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = TcpStream::connect(addr)?;
        socket.set_nodelay(true)?;
        let reader = std::io::BufReader::new(socket.try_clone()?);
        let writer = std::io::BufWriter::new(socket);
        Ok(Self { reader, writer })
    }

    /// Sends a request and blocks until the response arrives.
    pub fn call(&mut self, request: &Request) -> Result<Response> {
        request.encode_into(&mut self.writer)?;
        self.writer.flush()?;
        Response::decode_from(&mut self.reader)
    }
}

/// Pooled connections to the other replicas of a chain. A request checks out
/// an idle connection to the peer or dials a new one, and returns it to the
/// pool once the response has arrived. Failed connections are dropped.
pub struct Pool {
    peers: HashMap<ReplicaId, Peer>,
}

/// A peer address and its idle connections.
struct Peer {
    addr: String,
    idle: Mutex<Vec<Connection>>,
}

impl Pool {
    /// Creates a pool for the given peer addresses. Connections are only
    /// established on first use.
    pub fn new(addrs: HashMap<ReplicaId, String>) -> Self {
        let peers = addrs
            .into_iter()
            .map(|(id, addr)| (id, Peer { addr, idle: Mutex::new(Vec::new()) }))
            .collect();
        Self { peers }
    }

    /// Sends a request to the given peer and blocks until the response
    /// arrives.
    pub fn send(&self, to: &ReplicaId, request: &Request) -> Result<Response> {
        let Some(peer) = self.peers.get(to) else {
            return errinput!("unknown peer {to}");
        };
        let idle = peer.idle.lock()?.pop();
        let mut conn = match idle {
            Some(conn) => conn,
            None => {
                debug!("Connecting to peer {to} at {}", peer.addr);
                Connection::connect(&peer.addr)?
            }
        };
        let response = conn.call(request)?;
        peer.idle.lock()?.push(conn);
        Ok(response)
    }
}
