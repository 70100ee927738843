use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use speechpump_core::{
    AudioFormat, AudioPump, AudioSink, AudioSource, ChannelSink, Chunk, PumpState, ReaderConfig,
    RingBuffer, RingBufferReader, RingBufferSink, SinkMessage,
};

fn fast() -> ReaderConfig {
    ReaderConfig {
        poll_interval_ms: 1,
    }
}

fn wait_for_state(pump: &AudioPump, state: PumpState, timeout: Duration) {
    let start = Instant::now();
    while pump.state() != state {
        if start.elapsed() >= timeout {
            panic!("timed out waiting for {state:?}, pump is {:?}", pump.state());
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn uneven_chunks_drain_in_order_with_short_tail() {
    let ring = RingBuffer::new();
    let chunks = [pattern(7, 1), pattern(3, 2), pattern(5000, 3)];
    let expected: Vec<u8> = chunks.concat();
    for chunk in &chunks {
        ring.append(Chunk::new(chunk.clone()));
    }
    assert_eq!(ring.current_size(), 5010);

    let mut drained = Vec::new();
    let mut sizes = Vec::new();
    let mut buf = [0u8; 13];
    loop {
        let n = ring.drain(&mut buf);
        if n == 0 {
            break;
        }
        sizes.push(n);
        drained.extend_from_slice(&buf[..n]);
    }

    assert_eq!(drained, expected);
    assert_eq!(sizes.len(), 386);
    assert!(sizes[..385].iter().all(|&n| n == 13));
    assert_eq!(sizes[385], 5010 - 385 * 13);
    assert_eq!(ring.current_size(), 0);
    assert_eq!(ring.chunk_count(), 0);
}

#[test]
fn concurrent_producer_and_consumer_preserve_bytes() {
    let ring = Arc::new(RingBuffer::new());
    let sizes = [1usize, 17, 320, 3, 4096, 64, 999];
    let mut expected = Vec::new();
    for round in 0..50u8 {
        for (i, &size) in sizes.iter().enumerate() {
            expected.extend(pattern(size, round.wrapping_add(i as u8)));
        }
    }

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for round in 0..50u8 {
                for (i, &size) in sizes.iter().enumerate() {
                    ring.append(Chunk::new(pattern(size, round.wrapping_add(i as u8))));
                }
                if round % 10 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            ring.finish();
        })
    };

    let mut reader = RingBufferReader::with_config(Arc::clone(&ring), AudioFormat::default(), fast());
    let mut received = Vec::new();
    let mut buf = vec![0u8; 777];
    loop {
        let n = reader.read(&mut buf).expect("read");
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    producer.join().expect("producer thread panicked");

    assert_eq!(received.len(), expected.len());
    assert!(received == expected, "byte order was not preserved");
}

#[test]
fn one_pump_fans_out_to_downstream_pumps() {
    let format = AudioFormat::speech_default();
    let input = Arc::new(RingBuffer::new());
    let audio = pattern(16_000, 5);
    for piece in audio.chunks(500) {
        input.append(Chunk::new(piece.to_vec()));
    }
    input.finish();

    let fanout = RingBufferSink::new();
    let left_reader = fanout.add_reader(format, fast());
    let right_reader = fanout.add_reader(format, fast());

    let left = AudioPump::default();
    let right = AudioPump::default();
    let (left_sink, left_rx) = ChannelSink::unbounded();
    let (right_sink, right_rx) = ChannelSink::unbounded();
    left.attach_reader(left_reader).expect("attach left");
    right.attach_reader(right_reader).expect("attach right");
    left.start_pump(left_sink).expect("start left");
    right.start_pump(right_sink).expect("start right");

    let upstream = AudioPump::default();
    upstream
        .attach_reader(RingBufferReader::with_config(input, format, fast()))
        .expect("attach upstream");
    upstream.start_pump(fanout.clone()).expect("start upstream");

    let timeout = Duration::from_secs(5);
    for pump in [&upstream, &left, &right] {
        wait_for_state(pump, PumpState::NoInput, timeout);
        pump.stop_pump().expect("stop");
    }
    assert_eq!(fanout.current_format(), None);

    for rx in [left_rx, right_rx] {
        let mut bytes = Vec::new();
        let mut saw_format = false;
        let mut saw_end = false;
        for message in rx.try_iter() {
            match message {
                SinkMessage::Format(f) => {
                    assert_eq!(f, format);
                    saw_format = true;
                }
                SinkMessage::Audio(frame) => bytes.extend_from_slice(frame.bytes()),
                SinkMessage::EndOfStream => saw_end = true,
            }
        }
        assert!(saw_format && saw_end);
        assert_eq!(bytes, audio);
    }
}

#[test]
fn downstream_pump_survives_upstream_restart() {
    let format = AudioFormat::speech_default();
    let input = Arc::new(RingBuffer::new());
    let fanout = RingBufferSink::new();

    let downstream = AudioPump::default();
    let (sink, rx) = ChannelSink::unbounded();
    downstream
        .attach_reader(fanout.add_reader(format, fast()))
        .expect("attach downstream");
    downstream.start_pump(sink).expect("start downstream");

    let upstream = AudioPump::default();
    upstream
        .attach_reader(RingBufferReader::with_config(Arc::clone(&input), format, fast()))
        .expect("attach upstream");

    // First session is stopped while the input is still open.
    let first = pattern(6_400, 1);
    input.append(Chunk::new(first.clone()));
    upstream.start_pump(fanout.clone()).expect("start upstream");
    let timeout = Duration::from_secs(5);
    let start = Instant::now();
    while input.current_size() > 0 {
        assert!(start.elapsed() < timeout, "upstream never drained its input");
        thread::sleep(Duration::from_millis(2));
    }
    let upstream_cancel = {
        let input = Arc::clone(&input);
        thread::spawn(move || {
            // Unblocks the upstream read that is waiting on the empty input.
            thread::sleep(Duration::from_millis(50));
            input.append(Chunk::new(pattern(3_200, 2)));
        })
    };
    upstream.stop_pump().expect("stop upstream");
    upstream_cancel.join().expect("feeder panicked");
    assert_eq!(upstream.state(), PumpState::Idle);

    thread::sleep(Duration::from_millis(30));
    assert_eq!(downstream.state(), PumpState::Processing);

    // Second session runs to end of stream.
    let last = pattern(3_200, 3);
    input.append(Chunk::new(last.clone()));
    input.finish();
    upstream.start_pump(fanout.clone()).expect("restart upstream");

    wait_for_state(&upstream, PumpState::NoInput, timeout);
    wait_for_state(&downstream, PumpState::NoInput, timeout);
    downstream.stop_pump().expect("stop downstream");
    upstream.stop_pump().expect("stop upstream");

    let mut bytes = Vec::new();
    let mut ends = 0;
    for message in rx.try_iter() {
        match message {
            SinkMessage::Audio(frame) => bytes.extend_from_slice(frame.bytes()),
            SinkMessage::EndOfStream => ends += 1,
            SinkMessage::Format(_) => {}
        }
    }
    let expected = [first, pattern(3_200, 2), last].concat();
    assert_eq!(ends, 1, "one downstream session across both upstream sessions");
    assert_eq!(bytes, expected);
}

#[test]
fn ring_sink_reports_format_during_session() {
    let mut sink = RingBufferSink::new();
    let format = AudioFormat::pcm(48_000, 16, 2);
    sink.set_format(Some(&format));
    assert_eq!(sink.current_format(), Some(format));
    sink.set_format(None);
    assert_eq!(sink.current_format(), None);
}
