//! Demo driver: streams a synthesized tone through a wave presenter.
//!
//! By default the tone goes to simulated hardware and the bytes that pass its
//! play cursor are written to a WAV file. With the `streaming` feature and
//! `--play` it goes to the system audio device instead.

use std::env;
use std::f32::consts::TAU;

use anyhow::{bail, Context};
use tickle_audio::{
    Action, LoopCount, ManagerConfig, PresenterId, QueueFeeder, QueueSource, SimulatedHardware,
    SoundManager, WaveFormat, WavePresenter, WaveStats,
};

const TONE_HZ: f32 = 440.0;
const TICK_MS: u64 = 10;
const CHUNK_MS: u32 = 100;

struct Options {
    config: Option<String>,
    wav: String,
    seconds: u32,
    loops: u32,
    volume: u8,
    play: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            config: None,
            wav: "tickle-demo.wav".into(),
            seconds: 1,
            loops: 1,
            volume: 100,
            play: false,
        }
    }
}

fn usage() {
    eprintln!(
        "Usage:\n  tickle-demo [--config <file.json>] [--wav <out.wav>] [--seconds <n>] [--loops <n>] [--volume <0-100>]{}\n\nFlags:\n  --config <file>   Manager configuration (JSON)\n  --wav <file>      Capture output path (default tickle-demo.wav)\n  --seconds <n>     Tone length in seconds (default 1)\n  --loops <n>       Total plays (default 1, 0 = forever)\n  --volume <n>      Global volume percentage\n  -h, --help        Show this help\n",
        if cfg!(feature = "streaming") {
            " [--play]\n  --play            Play through the system audio device"
        } else {
            ""
        }
    );
}

fn parse_args() -> anyhow::Result<Option<Options>> {
    let mut options = Options::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} requires an argument"))
        };
        match arg.as_str() {
            "--help" | "-h" => {
                usage();
                return Ok(None);
            }
            "--config" => options.config = Some(value("--config")?),
            "--wav" => options.wav = value("--wav")?,
            "--seconds" => options.seconds = value("--seconds")?.parse()?,
            "--loops" => options.loops = value("--loops")?.parse()?,
            "--volume" => options.volume = value("--volume")?.parse()?,
            "--play" if cfg!(feature = "streaming") => options.play = true,
            _ => {
                usage();
                bail!("Unknown argument: {arg}");
            }
        }
    }
    Ok(Some(options))
}

/// Sine tone as 16-bit little-endian PCM.
fn synthesize(format: WaveFormat, seconds: u32) -> Vec<u8> {
    let frames = format.sample_rate * seconds;
    let step = TAU * TONE_HZ / format.sample_rate as f32;
    (0..frames)
        .flat_map(|i| {
            let sample = ((i as f32 * step).sin() * 0.5 * f32::from(i16::MAX)) as i16;
            let bytes = sample.to_le_bytes();
            (0..format.channels).flat_map(move |_| bytes)
        })
        .collect()
}

/// Feeds the tone one chunk per `CHUNK_MS`, like a stream controller would.
struct Feeder {
    feeder: QueueFeeder,
    data: Vec<u8>,
    chunk_bytes: usize,
    sent: usize,
}

impl Feeder {
    fn pump(&mut self, now_ms: u64) {
        while self.sent < self.data.len() {
            let timestamp = (self.sent / self.chunk_bytes) as u64 * u64::from(CHUNK_MS);
            // Stay one chunk ahead of the clock.
            if timestamp > now_ms + u64::from(CHUNK_MS) {
                return;
            }
            let end = (self.sent + self.chunk_bytes).min(self.data.len());
            self.feeder
                .push_bytes(timestamp, self.data[self.sent..end].to_vec());
            self.sent = end;
        }
        if !self.feeder.is_finished() {
            self.feeder.finish();
        }
    }
}

fn run_session(
    manager: &mut SoundManager,
    feeder: &mut Feeder,
    id: PresenterId,
    mut step: impl FnMut(&mut SoundManager) -> u64,
) -> anyhow::Result<WaveStats> {
    let mut stats = WaveStats::default();
    loop {
        let now = step(manager);
        feeder.pump(now);
        if let Some(wave) = manager.presenter(id).and_then(|p| p.as_wave()) {
            stats = wave.stats();
        }
        if let Ok(end) = manager.completions().try_recv() {
            log::info!("{} ended: {:?}", end.action_id, end.outcome);
            return Ok(stats);
        }
        if now > 10 * 60 * 1000 {
            bail!("presentation did not finish");
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(options) = parse_args()? else {
        return Ok(());
    };
    let config = match &options.config {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("Failed to load config '{path}'"))?,
        None => ManagerConfig::default(),
    };

    let format = WaveFormat::pcm(config.primary.sample_rate, 16, config.primary.channels);
    let data = synthesize(format, options.seconds.max(1));
    let loops = match options.loops {
        0 => LoopCount::Infinite,
        n => LoopCount::finite(n),
    };
    let (source, queue) = QueueSource::new();
    let mut feeder = Feeder {
        feeder: queue,
        chunk_bytes: format.bytes_for_ms(CHUNK_MS),
        data,
        sent: 0,
    };
    let action = Action::once(1, "tone").looped(loops);

    if options.play {
        return play(config, format, action, source, &mut feeder, options.volume);
    }

    let hardware = SimulatedHardware::new().with_capture();
    let mut manager = SoundManager::create(Box::new(hardware.clone()), config)?;
    manager.set_volume(options.volume);
    let presenter = WavePresenter::new(&manager.context(), action, format, source);
    let id = manager.register(presenter.into());

    let tick_bytes = format.bytes_for_ms(TICK_MS as u32);
    let mut now = 0;
    let stats = run_session(&mut manager, &mut feeder, id, |manager| {
        manager.tick(now);
        hardware.advance(tick_bytes);
        now += TICK_MS;
        now
    })?;
    println!("{stats:#?}");

    #[cfg(feature = "export-wav")]
    {
        let captured = hardware
            .probe(0)
            .map(|probe| probe.captured())
            .unwrap_or_default();
        tickle_audio::export::write_capture_wav(&options.wav, format, &captured)?;
        println!("Wrote {}", options.wav);
    }
    Ok(())
}

#[cfg(feature = "streaming")]
fn play(
    config: ManagerConfig,
    format: WaveFormat,
    action: Action,
    source: QueueSource,
    feeder: &mut Feeder,
    volume: u8,
) -> anyhow::Result<()> {
    let mut manager = SoundManager::create(Box::new(tickle_audio::RodioHardware::new()), config)?;
    manager.set_volume(volume);
    let presenter = WavePresenter::new(&manager.context(), action, format, source);
    let id = manager.register(presenter.into());
    let stats = run_session(&mut manager, feeder, id, |manager| {
        std::thread::sleep(std::time::Duration::from_millis(TICK_MS));
        manager.tick_now();
        manager.now_ms()
    })?;
    println!("{stats:#?}");
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play(
    _config: ManagerConfig,
    _format: WaveFormat,
    _action: Action,
    _source: QueueSource,
    _feeder: &mut Feeder,
    _volume: u8,
) -> anyhow::Result<()> {
    bail!("playback requires the \"streaming\" feature")
}
