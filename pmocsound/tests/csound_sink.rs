use std::fs;

use pmocsound::{CsoundError, CsoundSink, ElementConfig, ReferenceEngine, RingBufferSpec, SinkSpec};
use tempfile::TempDir;

const SPEC: SinkSpec = SinkSpec {
    rate: 48_000,
    buffer_time_us: 200_000,
};

fn prepared(source: &str) -> (TempDir, CsoundSink<ReferenceEngine>, RingBufferSpec) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sink.yaml");
    fs::write(&path, source).expect("write program");
    let sink = CsoundSink::new("csoundsink0");
    let ring = sink
        .prepare(&ElementConfig::new(path), &ReferenceEngine::factory(), SPEC)
        .expect("sink prepares");
    (dir, sink, ring)
}

fn blocks(sink: &CsoundSink<ReferenceEngine>) -> u64 {
    sink.with_engine(|engine| engine.blocks_performed())
        .expect("sink is prepared")
}

#[test]
fn sink_ring_buffer_follows_the_engine_block() {
    let (_dir, sink, ring) = prepared("ksmps: 480\nsr: 48000\nnchnls: 2\nnchnls_i: 2\n");
    assert_eq!(
        ring,
        RingBufferSpec {
            segsize: 480 * 2 * 8,
            latency_time_us: 10_000,
            segtotal: 20,
        }
    );
    assert_eq!(sink.ring_buffer_spec().unwrap(), ring);
    assert_eq!(sink.delay(), 0);
}

#[test]
fn sink_runs_one_block_per_segment() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, sink, ring) = prepared("ksmps: 4\nsr: 48000\nnchnls: 2\nnchnls_i: 2\n");
    assert_eq!(ring.segsize, 64);

    assert_eq!(sink.write(&[0u8; 100])?, 100);
    assert_eq!(blocks(&sink), 1);
    assert_eq!(sink.write(&[0u8; 28])?, 28);
    assert_eq!(blocks(&sink), 2);
    assert_eq!(sink.write(&[0u8; 3 * 64])?, 3 * 64);
    assert_eq!(blocks(&sink), 5);

    sink.reset()?;
    assert_eq!(blocks(&sink), 0);
    // A partial segment does not survive a reset.
    sink.write(&[0u8; 32])?;
    sink.reset()?;
    sink.write(&[0u8; 32])?;
    assert_eq!(blocks(&sink), 0);

    sink.close()?;
    assert!(matches!(sink.write(&[0u8; 64]), Err(CsoundError::NotStarted)));
    Ok(())
}

#[test]
fn sink_write_fails_when_the_score_ends() {
    let (_dir, sink, _) = prepared("ksmps: 4\nsr: 48000\nnchnls: 2\nnchnls_i: 2\nscore_blocks: 2\n");
    assert!(matches!(
        sink.write(&[0u8; 3 * 64]),
        Err(CsoundError::ScoreFinished)
    ));
}

#[test]
fn sink_rejects_bad_setups() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sink.yaml");
    fs::write(&path, "ksmps: 4\nsr: 48000\nnchnls: 2\nnchnls_i: 0\n").unwrap();
    let config = ElementConfig::new(path);

    let sink = CsoundSink::<ReferenceEngine>::new("csoundsink1");
    assert!(matches!(
        sink.prepare(&config, &ReferenceEngine::factory(), SPEC),
        Err(CsoundError::InvalidGeometry(_))
    ));
    let zero_rate = SinkSpec {
        rate: 0,
        buffer_time_us: 200_000,
    };
    assert!(matches!(
        sink.prepare(&config, &ReferenceEngine::factory(), zero_rate),
        Err(CsoundError::InvalidConfig(_))
    ));
    assert!(!sink.is_prepared());
}
