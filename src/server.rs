//! The CRAQ chain replica server.
//!
//! Each replica serves clients and chain peers on a single TCP listener,
//! with one session thread per connection. Writes enter at the head, which
//! assigns versions, and propagate down the chain to the tail, which commits
//! them. Reads are served by any replica: a key with no writes in flight is
//! answered from local committed state, otherwise the replica asks the tail
//! which version is committed and serves that one (the apportioned read).

use crate::encoding::Message as _;
use crate::error::{Error, Result};
use crate::store::{Store, Version};
use crate::transport::Pool;
use crate::{errdata, errinput};

use log::{debug, error, info};
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write as _;
use std::net::{TcpListener, TcpStream};

/// A replica ID, by convention a single lowercase letter.
pub type ReplicaId = String;

/// A client or chain request. Client writes carry no version; the head
/// assigns one before forwarding, and chain hops carry it verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Writes a key/value pair. Clients submit this to the head; replicas
    /// forward it down the chain with an assigned version.
    #[serde(rename = "SET")]
    Set {
        key: String,
        val: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ver: Option<Version>,
    },
    /// Reads the value of a key. Served by any replica.
    #[serde(rename = "GET")]
    Get { key: String },
    /// Fetches the version of a key committed at the tail. Relayed down the
    /// chain until it reaches the tail.
    #[serde(rename = "QUERY")]
    Query { key: String },
}

/// A response status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Status {
    /// The request succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// A read of a key that has never been written.
    #[serde(rename = "Key not found")]
    KeyNotFound,
    /// The request type was not recognized.
    #[serde(rename = "Unexpected type")]
    UnexpectedType,
    /// The request failed with the given error message.
    #[serde(untagged)]
    Error(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::KeyNotFound => write!(f, "Key not found"),
            Status::UnexpectedType => write!(f, "Unexpected type"),
            Status::Error(message) => write!(f, "{message}"),
        }
    }
}

/// A response to a request: a status (with the value for reads), or the
/// committed version for QUERY requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status {
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        val: Option<String>,
    },
    Version { ver: Version },
}

impl Response {
    /// An OK status response.
    pub fn ok() -> Self {
        Self::Status { status: Status::Ok, val: None }
    }

    /// An OK response carrying a value.
    pub fn value(val: impl Into<String>) -> Self {
        Self::Status { status: Status::Ok, val: Some(val.into()) }
    }

    /// A plain status response.
    pub fn status(status: Status) -> Self {
        Self::Status { status, val: None }
    }

    /// An error status response.
    pub fn error(error: &Error) -> Self {
        Self::Status { status: Status::Error(error.to_string()), val: None }
    }

    /// A committed version response.
    pub fn version(ver: Version) -> Self {
        Self::Version { ver }
    }
}

impl crate::encoding::Message for Request {}
impl crate::encoding::Message for Response {}

/// A CRAQ chain replica.
pub struct Server {
    /// The replica ID.
    id: ReplicaId,
    /// The upstream predecessor, or None if this replica is the head.
    prev: Option<ReplicaId>,
    /// The downstream successor, or None if this replica is the tail.
    next: Option<ReplicaId>,
    /// The chain tail, which commits writes and arbitrates read versions.
    tail: ReplicaId,
    /// The local version store.
    store: Store,
    /// Pooled connections to the chain peers.
    peers: Pool,
}

impl Server {
    /// Creates a replica from the chain order (head first) and the peer
    /// address map. The chain links are derived from the replica's position
    /// in the chain and are fixed for the lifetime of the server.
    pub fn new(
        id: ReplicaId,
        chain: Vec<ReplicaId>,
        peers: HashMap<ReplicaId, String>,
    ) -> Result<Self> {
        let position = match chain.iter().position(|replica| replica == &id) {
            Some(position) => position,
            None => return errinput!("replica {id} is not in the chain {chain:?}"),
        };
        for replica in &chain {
            if replica != &id && !peers.contains_key(replica) {
                return errinput!("no peer address for replica {replica}");
            }
        }
        let prev = position.checked_sub(1).map(|i| chain[i].clone());
        let next = chain.get(position + 1).cloned();
        let tail = chain[chain.len() - 1].clone();
        Ok(Self { id, prev, next, tail, store: Store::new(), peers: Pool::new(peers) })
    }

    /// Returns true if this replica is the chain head.
    fn is_head(&self) -> bool {
        self.prev.is_none()
    }

    /// Serves inbound connections on the given listener, spawning a session
    /// thread for each. Blocks indefinitely.
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            "Replica {} listening on {} (prev={:?} next={:?} tail={})",
            self.id,
            listener.local_addr()?,
            self.prev,
            self.next,
            self.tail
        );
        std::thread::scope(|s| -> Result<()> {
            loop {
                let (socket, peer) = match listener.accept() {
                    Ok(connection) => connection,
                    Err(err) => {
                        error!("Replica {}: accept failed: {err}", self.id);
                        continue;
                    }
                };
                let server = &self;
                s.spawn(move || {
                    debug!("Replica {}: connection from {peer}", server.id);
                    match server.session(socket) {
                        Ok(()) => debug!("Replica {}: {peer} disconnected", server.id),
                        Err(err) => error!("Replica {}: {peer} error: {err}", server.id),
                    }
                });
            }
        })
    }

    /// Processes a single connection until it closes, decoding requests and
    /// writing back responses. Serves both client connections and chain hops
    /// from the predecessor.
    fn session(&self, socket: TcpStream) -> Result<()> {
        socket.set_nodelay(true)?;
        let mut reader = std::io::BufReader::new(socket.try_clone()?);
        let mut writer = std::io::BufWriter::new(socket);
        while let Some(message) = serde_json::Value::maybe_decode_from(&mut reader)? {
            let response = self.process(message);
            response.encode_into(&mut writer)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Dispatches a decoded message to the matching handler. Handlers do
    /// their own per-key locking; no locks are held here. Errors are reduced
    /// to status responses, so the session stays up.
    fn process(&self, message: serde_json::Value) -> Response {
        match serde_json::from_value(message.clone()) {
            Ok(Request::Set { key, val, ver }) => self.set(key, val, ver),
            Ok(Request::Get { key }) => self.get(&key),
            Ok(Request::Query { key }) => self.query(&key),
            Err(err) => match message.get("type").and_then(serde_json::Value::as_str) {
                Some("SET" | "GET" | "QUERY") => {
                    error!("Replica {}: malformed request {message}: {err}", self.id);
                    Error::InvalidInput(format!("malformed request: {err}")).into()
                }
                _ => {
                    error!("Replica {}: unexpected request type in {message}", self.id);
                    return Response::status(Status::UnexpectedType);
                }
            },
        }
        .unwrap_or_else(|err| Response::error(&err))
    }

    /// Writes a key/value pair. The head assigns the version, everyone else
    /// requires one. Non-tail replicas stage the write as dirty and forward
    /// it down the chain under the key lock, promoting it to clean once the
    /// downstream hop acknowledges; the tail commits directly.
    fn set(&self, key: String, val: String, ver: Option<Version>) -> Result<Response> {
        debug!("Replica {}: SET {key}={val} ver={ver:?}", self.id);
        let entry = self.store.entry(&key)?;
        let mut state = entry.lock()?;

        let ver = match ver {
            None if self.is_head() => state.next_version(),
            None => return errinput!("unversioned write to non-head replica {}", self.id),
            Some(_) if self.is_head() => {
                return errinput!("versioned write to head replica {}", self.id)
            }
            Some(ver) => ver,
        };

        // The tail commits immediately, there is nothing to forward.
        let Some(next) = &self.next else {
            state.commit(ver, val);
            return Ok(Response::ok());
        };

        state.dirty.insert(ver, val.clone());
        let forward = Request::Set { key: key.clone(), val: val.clone(), ver: Some(ver) };
        // The key lock remains held while waiting for the downstream hop, so
        // writes to this key arrive downstream in version order.
        match self.peers.send(next, &forward)? {
            Response::Status { status: Status::Ok, .. } => {
                state.commit(ver, val);
                Ok(Response::ok())
            }
            // The write failed downstream. Leave the dirty entry in place; a
            // later write at a higher version will supersede it.
            response @ Response::Status { .. } => Ok(response),
            Response::Version { ver } => errdata!("unexpected version response {ver} to write"),
        }
    }

    /// Reads a key. If the key has no writes in flight here, the clean entry
    /// answers directly. Otherwise the tail's committed version arbitrates:
    /// a dirty entry at that version is the committed value, and failing
    /// that the clean entry is at or above it (the dirty entry may have been
    /// promoted while the query was in flight).
    fn get(&self, key: &str) -> Result<Response> {
        debug!("Replica {}: GET {key}", self.id);
        let entry = self.store.entry(key)?;
        let state = entry.lock()?;
        if !state.dirty.is_empty() {
            let Some(next) = &self.next else {
                return errdata!("dirty entries on the tail for key {key}");
            };
            let committed = match self.peers.send(next, &Request::Query { key: key.to_string() })? {
                Response::Version { ver } => Some(ver),
                // The tail has no committed entry for this key.
                Response::Status { .. } => None,
            };
            if let Some(val) = committed.and_then(|ver| state.dirty.get(&ver)) {
                return Ok(Response::value(val.clone()));
            }
            if let Some((_, val)) = &state.clean {
                return Ok(Response::value(val.clone()));
            }
        } else if let Some((_, val)) = &state.clean {
            return Ok(Response::value(val.clone()));
        }
        Ok(Response::status(Status::KeyNotFound))
    }

    /// Looks up the version of a key committed at the tail. The tail answers
    /// from its clean entry; other replicas relay the query downstream. The
    /// key lock is held across the hop.
    fn query(&self, key: &str) -> Result<Response> {
        debug!("Replica {}: QUERY {key}", self.id);
        let entry = self.store.entry(key)?;
        let state = entry.lock()?;
        let Some(next) = &self.next else {
            let Some((ver, _)) = &state.clean else {
                return errdata!("no committed version for key {key}");
            };
            return Ok(Response::version(*ver));
        };
        self.peers.send(next, &Request::Query { key: key.to_string() })
    }
}
