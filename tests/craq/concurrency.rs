use super::testcluster::TestCluster;

use craqdb::error::Result;

use pretty_assertions::assert_eq;

// A reader running concurrently with a writer must observe the written
// values in order, regardless of which replicas serve the reads.
#[test]
fn reads_are_monotonic_during_writes() -> Result<()> {
    const WRITES: u64 = 10;

    let tc = TestCluster::run()?;
    let mut writer = tc.connect()?;
    let mut reader = tc.connect()?;
    writer.set("k", "0")?;

    std::thread::scope(|s| -> Result<()> {
        let writes = s.spawn(move || -> Result<()> {
            for i in 0..WRITES {
                writer.set("k", &i.to_string())?;
            }
            Ok(())
        });
        let reads = s.spawn(move || -> Result<Vec<u64>> {
            let mut values = Vec::new();
            for _ in 0..WRITES {
                let value = reader.get("k")?.expect("key should exist");
                values.push(value.parse().expect("value should be an integer"));
            }
            Ok(values)
        });

        writes.join().expect("writer panicked")?;
        let values = reads.join().expect("reader panicked")?;

        for pair in values.windows(2) {
            assert!(pair[0] <= pair[1], "reads went backwards: {values:?}");
        }
        for value in &values {
            assert!(*value < WRITES, "read {value} out of range: {values:?}");
        }
        Ok(())
    })
}

#[test]
fn concurrent_readers_agree() -> Result<()> {
    const READERS: usize = 8;
    const READS: usize = 50;

    let tc = TestCluster::run()?;
    let mut client = tc.connect()?;
    client.set("k", "0")?;

    std::thread::scope(|s| -> Result<()> {
        let mut handles = Vec::new();
        for _ in 0..READERS {
            let mut reader = tc.connect()?;
            handles.push(s.spawn(move || -> Result<()> {
                for _ in 0..READS {
                    assert_eq!(reader.get("k")?, Some("0".to_string()));
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().expect("reader panicked")?;
        }
        Ok(())
    })
}

#[test]
fn writes_are_durable_at_tail() -> Result<()> {
    let tc = TestCluster::run()?;
    let mut client = tc.connect()?;
    for i in 0..20 {
        client.set("k", &i.to_string())?;
    }

    // Every write was acknowledged by the whole chain, so the committed
    // version matches the write count and every replica serves the value.
    assert_eq!(client.query("k")?, 20);
    for _ in tc.replicas() {
        assert_eq!(client.get("k")?, Some("19".to_string()));
    }
    Ok(())
}
