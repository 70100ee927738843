fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use parking_lot::Mutex;
    use serde::Serialize;
    use speechpump_core::{
        AudioFormat, AudioFrame, AudioPump, AudioSink, Chunk, DiagnosticsSnapshot, PumpConfig,
        PumpState, ReaderConfig, RingBuffer, RingBufferReader,
    };
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct Args {
        seconds: u32,
        iterations: usize,
        frames_per_second: u32,
        chunk_bytes: usize,
        retain: bool,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct IterationResult {
        iteration: usize,
        wall_ms: f64,
        frames: u64,
        bytes: u64,
        megabytes_per_second: f64,
        p50_frame_gap_us: f64,
        p95_frame_gap_us: f64,
        diagnostics: DiagnosticsSnapshot,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        audio_seconds: u32,
        frames_per_second: u32,
        chunk_bytes: usize,
        retain_frames: bool,
        iterations: usize,
        avg_wall_ms: f64,
        avg_megabytes_per_second: f64,
        p95_frame_gap_us: f64,
        runs: Vec<IterationResult>,
    }

    /// Records the gap between consecutive frames; optionally keeps every
    /// frame alive so the pump has to allocate each time.
    #[derive(Default)]
    struct Recorder {
        last: Option<Instant>,
        gaps_us: Vec<f64>,
        retained: Vec<AudioFrame>,
        retain: bool,
    }

    struct TimingSink(Arc<Mutex<Recorder>>);

    impl AudioSink for TimingSink {
        fn set_format(&mut self, _format: Option<&AudioFormat>) {}

        fn process_audio(&mut self, frame: AudioFrame) {
            let now = Instant::now();
            let mut rec = self.0.lock();
            if let Some(last) = rec.last.replace(now) {
                rec.gaps_us.push(now.duration_since(last).as_secs_f64() * 1_000_000.0);
            }
            if rec.retain && !frame.is_empty() {
                rec.retained.push(frame);
            }
        }
    }

    fn parse_args() -> Result<Args, String> {
        let mut args = Args {
            seconds: 60,
            iterations: 3,
            frames_per_second: PumpConfig::default().frames_per_second,
            chunk_bytes: 320,
            retain: false,
            output: None,
        };

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--seconds" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --seconds".into());
                    };
                    args.seconds = v
                        .parse::<u32>()
                        .map_err(|_| "invalid value for --seconds".to_string())?
                        .clamp(1, 3600);
                }
                "--iterations" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --iterations".into());
                    };
                    args.iterations = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --iterations".to_string())?
                        .clamp(1, 20);
                }
                "--fps" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --fps".into());
                    };
                    args.frames_per_second = v
                        .parse::<u32>()
                        .map_err(|_| "invalid value for --fps".to_string())?
                        .clamp(1, 100);
                }
                "--chunk-bytes" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --chunk-bytes".into());
                    };
                    args.chunk_bytes = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --chunk-bytes".to_string())?
                        .max(1);
                }
                "--retain" => args.retain = true,
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    args.output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p speechpump-core --release --bin pump-bench -- \\
  [--seconds <n>] [--iterations <n>] [--fps <n>] [--chunk-bytes <n>] [--retain] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }
        Ok(args)
    }

    /// 440 Hz tone, 16-bit mono, split into producer-sized chunks.
    fn fill_ring(ring: &RingBuffer, format: &AudioFormat, seconds: u32, chunk_bytes: usize) {
        let samples = format.samples_per_second as usize * seconds as usize;
        let mut bytes = Vec::with_capacity(samples * 2);
        for n in 0..samples {
            let t = n as f32 / format.samples_per_second as f32;
            let s = (t * 440.0 * std::f32::consts::TAU).sin() * 0.25;
            bytes.extend_from_slice(&((s * f32::from(i16::MAX)) as i16).to_le_bytes());
        }
        for piece in bytes.chunks(chunk_bytes) {
            ring.append(Chunk::new(piece.to_vec()));
        }
        ring.finish();
    }

    fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    let args = parse_args()?;
    let format = AudioFormat::speech_default();
    println!(
        "Running pump benchmark: {}s of audio, fps={}, chunk={}B, iterations={}{}",
        args.seconds,
        args.frames_per_second,
        args.chunk_bytes,
        args.iterations,
        if args.retain { ", retaining frames" } else { "" }
    );

    let mut runs = Vec::new();
    for iteration in 1..=args.iterations {
        let ring = Arc::new(RingBuffer::new());
        fill_ring(&ring, &format, args.seconds, args.chunk_bytes);

        let pump = AudioPump::new(PumpConfig {
            frames_per_second: args.frames_per_second,
            ..PumpConfig::default()
        });
        let reader = RingBufferReader::with_config(
            ring,
            format,
            ReaderConfig {
                poll_interval_ms: 1,
            },
        );
        pump.attach_reader(reader).map_err(|e| e.to_string())?;

        let recorder = Arc::new(Mutex::new(Recorder {
            retain: args.retain,
            ..Recorder::default()
        }));
        let started = Instant::now();
        pump.start_pump(TimingSink(Arc::clone(&recorder)))
            .map_err(|e| e.to_string())?;
        while pump.state() == PumpState::Processing {
            std::thread::sleep(Duration::from_millis(1));
        }
        // Joins the finished worker.
        pump.stop_pump().map_err(|e| e.to_string())?;
        let wall = started.elapsed();

        let diagnostics = pump.diagnostics_snapshot();
        let rec = recorder.lock();
        let wall_ms = wall.as_secs_f64() * 1000.0;
        let result = IterationResult {
            iteration,
            wall_ms,
            frames: diagnostics.frames_delivered,
            bytes: diagnostics.bytes_delivered,
            megabytes_per_second: diagnostics.bytes_delivered as f64
                / 1_000_000.0
                / wall.as_secs_f64().max(f64::EPSILON),
            p50_frame_gap_us: percentile(&rec.gaps_us, 0.50),
            p95_frame_gap_us: percentile(&rec.gaps_us, 0.95),
            diagnostics,
        };
        println!(
            "[{iteration}/{iters}] {wall_ms:.1} ms, {frames} frames, {allocs} buffers",
            iters = args.iterations,
            frames = result.frames,
            allocs = result.diagnostics.buffers_allocated
        );
        runs.push(result);
    }

    let n = runs.len().max(1) as f64;
    let all_gaps_p95 = runs.iter().map(|r| r.p95_frame_gap_us).collect::<Vec<_>>();
    let summary = Summary {
        audio_seconds: args.seconds,
        frames_per_second: args.frames_per_second,
        chunk_bytes: args.chunk_bytes,
        retain_frames: args.retain,
        iterations: args.iterations,
        avg_wall_ms: runs.iter().map(|r| r.wall_ms).sum::<f64>() / n,
        avg_megabytes_per_second: runs.iter().map(|r| r.megabytes_per_second).sum::<f64>() / n,
        p95_frame_gap_us: percentile(&all_gaps_p95, 0.95),
        runs,
    };

    println!(
        "Done. avg={:.1}ms throughput={:.1}MB/s p95 gap={:.1}us",
        summary.avg_wall_ms, summary.avg_megabytes_per_second, summary.p95_frame_gap_us
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
