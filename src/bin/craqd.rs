/*
 * craqd is a CRAQ chain replica server. It takes configuration via a
 * configuration file, command-line parameters, and environment variables,
 * then starts up a replica that serves clients and chain peers on a TCP
 * port (9900-9903 by convention for the four-replica chain a-d).
 */

#![warn(clippy::all)]

use craqdb::error::Result;
use craqdb::server::ReplicaId;
use craqdb::Server;

use serde_derive::Deserialize;
use std::collections::HashMap;

fn main() -> Result<()> {
    let args = clap::command!()
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file path")
                .default_value("config/craqd.yaml"),
        )
        .get_matches();
    let cfg = Config::new(args.get_one::<String>("config").unwrap().as_ref())?;

    let loglevel = cfg.log_level.parse::<simplelog::LevelFilter>()?;
    let mut logconfig = simplelog::ConfigBuilder::new();
    if loglevel != simplelog::LevelFilter::Debug {
        logconfig.add_filter_allow_str("craqdb");
    }
    simplelog::SimpleLogger::init(loglevel, logconfig.build())?;

    let listener = std::net::TcpListener::bind(&cfg.listen)?;
    Server::new(cfg.id, cfg.chain, cfg.peers)?.serve(listener)
}

#[derive(Debug, Deserialize)]
struct Config {
    id: ReplicaId,
    chain: Vec<ReplicaId>,
    peers: HashMap<ReplicaId, String>,
    listen: String,
    log_level: String,
}

impl Config {
    fn new(file: &str) -> Result<Self> {
        Ok(config::Config::builder()
            .set_default("id", "a")?
            .set_default("listen", "0.0.0.0:9900")?
            .set_default("log_level", "info")?
            .add_source(config::File::with_name(file))
            .add_source(config::Environment::with_prefix("CRAQD"))
            .build()?
            .try_deserialize()?)
    }
}
