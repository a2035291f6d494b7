use super::testcluster::TestCluster;

use craqdb::encoding::Message as _;
use craqdb::error::Result;
use craqdb::server::{Request, Response, Status};

use pretty_assertions::assert_eq;
use std::io::Write as _;

#[test]
fn set_is_visible_at_tail() -> Result<()> {
    let tc = TestCluster::run()?;
    let mut client = tc.connect()?;
    client.set("k", "0")?;

    let mut tail = tc.connect_to("d")?;
    assert_eq!(tail.call(&Request::Get { key: "k".to_string() })?, Response::value("0"));
    Ok(())
}

#[test]
fn interior_read_returns_latest() -> Result<()> {
    let tc = TestCluster::run()?;
    let mut client = tc.connect()?;
    client.set("k", "0")?;
    client.set("k", "1")?;

    let mut interior = tc.connect_to("b")?;
    assert_eq!(interior.call(&Request::Get { key: "k".to_string() })?, Response::value("1"));
    Ok(())
}

#[test]
fn round_trip_from_all_replicas() -> Result<()> {
    let tc = TestCluster::run()?;
    let mut client = tc.connect()?;
    client.set("k", "v")?;

    for name in tc.replicas() {
        let mut conn = tc.connect_to(name)?;
        assert_eq!(
            conn.call(&Request::Get { key: "k".to_string() })?,
            Response::value("v"),
            "wrong value from replica {name}"
        );
    }
    Ok(())
}

#[test]
fn absent_key_not_found_everywhere() -> Result<()> {
    let tc = TestCluster::run()?;
    for name in tc.replicas() {
        let mut conn = tc.connect_to(name)?;
        assert_eq!(
            conn.call(&Request::Get { key: "absent".to_string() })?,
            Response::status(Status::KeyNotFound),
            "wrong response from replica {name}"
        );
    }
    Ok(())
}

#[test]
fn head_versions_count_up() -> Result<()> {
    let tc = TestCluster::run()?;
    let mut client = tc.connect()?;

    client.set("k", "X")?;
    assert_eq!(client.query("k")?, 1);

    for ver in 2..=5u64 {
        client.set("k", &ver.to_string())?;
        assert_eq!(client.query("k")?, ver);
    }

    // Versions are per key, not global.
    client.set("l", "Y")?;
    assert_eq!(client.query("l")?, 1);
    Ok(())
}

#[test]
fn unexpected_type() -> Result<()> {
    let tc = TestCluster::run()?;
    let socket = std::net::TcpStream::connect(tc.addr("a"))?;
    let mut reader = std::io::BufReader::new(socket.try_clone()?);
    let mut writer = std::io::BufWriter::new(socket);

    serde_json::json!({"type": "DELETE", "key": "k"}).encode_into(&mut writer)?;
    writer.flush()?;
    assert_eq!(
        Response::decode_from(&mut reader)?,
        Response::status(Status::UnexpectedType)
    );
    Ok(())
}

#[test]
fn malformed_request() -> Result<()> {
    let tc = TestCluster::run()?;
    let socket = std::net::TcpStream::connect(tc.addr("a"))?;
    let mut reader = std::io::BufReader::new(socket.try_clone()?);
    let mut writer = std::io::BufWriter::new(socket);

    serde_json::json!({"type": "SET", "key": "k"}).encode_into(&mut writer)?;
    writer.flush()?;
    let response = Response::decode_from(&mut reader)?;
    assert!(
        matches!(response, Response::Status { status: Status::Error(_), .. }),
        "unexpected response {response:?}"
    );

    serde_json::json!({"type": "GET", "key": "k"}).encode_into(&mut writer)?;
    writer.flush()?;
    assert_eq!(
        Response::decode_from(&mut reader)?,
        Response::status(Status::KeyNotFound)
    );
    Ok(())
}

// Versions are assigned by the head; a versioned write reaching it is a
// protocol violation.
#[test]
fn head_rejects_versioned_write() -> Result<()> {
    let tc = TestCluster::run()?;
    let mut head = tc.connect_to("a")?;
    let request = Request::Set { key: "k".to_string(), val: "x".to_string(), ver: Some(9) };
    let response = head.call(&request)?;
    assert!(
        matches!(response, Response::Status { status: Status::Error(_), .. }),
        "unexpected response {response:?}"
    );
    Ok(())
}
