use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frame_pacer::core::{FrameAction, PlayerCommand, PlayerConfig};
use frame_pacer::player::{run_for, AudioSink, FrameSlot, MediaPipeline, NullAudioSink, Synchronizer, TestPattern};
use log::{info, warn};
use std::path::PathBuf;

/// 音视频字幕同步调度器（无窗口宿主，按墙钟驱动）
#[derive(Parser)]
#[command(name = "frame_pacer", about = "按显示刷新率调度音视频字幕")]
struct Args {
    /// 配置文件（JSON）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 显示刷新率 Hz（覆盖配置文件）
    #[arg(long = "display-hz", global = true)]
    display_hz: Option<f64>,

    /// 在独立线程中解码
    #[arg(long, global = true)]
    threaded: bool,

    /// 不按墙钟等待，尽快跑完
    #[arg(long, global = true)]
    fast: bool,

    /// 运行时长（秒），默认播放到结尾
    #[arg(long, global = true)]
    seconds: Option<f64>,

    /// 在第几秒（墙钟）发出 seek
    #[arg(long = "seek-at", global = true, requires = "seek_to")]
    seek_at: Option<f64>,

    /// seek 目标（秒）
    #[arg(long = "seek-to", global = true)]
    seek_to: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 播放合成测试图样（不需要编解码库）
    Demo {
        /// 源帧率
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// 图样时长（秒）
        #[arg(long, default_value_t = 8.0)]
        length: f64,

        /// 附带正弦音轨
        #[arg(long)]
        audio: bool,
    },

    /// 用 FFmpeg 播放媒体文件
    #[cfg(feature = "ffmpeg")]
    Play {
        /// 输入文件路径
        path: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path).with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if let Some(hz) = args.display_hz {
        config.display_frequency = hz;
    }
    if args.threaded {
        config.threaded_decode = true;
    }
    config.validate()?;

    // 先打开音频设备，解码器按设备实际布局输出
    let audio_out = audio_sink(&config);
    let config = config.with_audio_layout(audio_out.output_layout());

    let (pipeline, length) = match &args.command {
        Command::Demo { fps, length, audio } => {
            info!("🎬 测试图样: {} fps, {:.1}s", fps, length);
            let mut pattern = TestPattern::new(*fps, *length)
                .with_size(64, 36)
                .with_keyframe_interval(*fps)
                .with_cue(1.0, 2.0, "{\\an8}第一条字幕")
                .with_cue(2.5, 1.5, "<i>第二条</i>\\N字幕");
            if *audio {
                pattern = pattern.with_audio(config.audio_sample_rate, config.audio_channels);
            }
            let pipeline = MediaPipeline::with_raw_decoders(Box::new(pattern.build()?), &config)?;
            (pipeline, *length)
        }
        #[cfg(feature = "ffmpeg")]
        Command::Play { path } => {
            ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
            info!("✅ FFmpeg 初始化成功");
            let pipeline = MediaPipeline::open_file(path, &config)?;
            let duration = pipeline.demuxer().media_info().duration;
            (pipeline, duration)
        }
    };

    let slot = FrameSlot::new();
    let mut sync = Synchronizer::from_pipeline(pipeline, Box::new(slot.clone()), audio_out, &config)?;
    let commands = sync.commands();

    let run_seconds = args.seconds.unwrap_or(length + 0.5);
    let mut pending_seek = args.seek_at.zip(args.seek_to);
    let mut last_text = String::new();
    let mut last_report = 0u64;

    let stats = run_for(&mut sync, run_seconds, !args.fast, |sync, outcome| {
        let wall = sync.clock().wall_seconds();

        if let Some((at, to)) = pending_seek {
            if wall >= at {
                info!("⏩ 请求 seek 到 {:.3}s", to);
                if commands.send(PlayerCommand::Seek(to)).is_err() {
                    warn!("命令通道已关闭");
                }
                pending_seek = None;
            }
        }

        let text = sync.subtitle_text();
        if text != last_text {
            if text.is_empty() {
                info!("💬 （字幕消失）");
            } else {
                info!("💬 {}", text.replace('\n', " / "));
            }
            last_text = text;
        }

        let second = wall as u64;
        if second > last_report || outcome.action == FrameAction::Seek {
            last_report = second;
            info!(
                "⏱ {:.2}/{:.2}s | {:?} | 新帧序号 {} | 呈现 {} 次",
                sync.clock().current_second(),
                sync.clock().duration_second(),
                outcome.action,
                slot.serial(),
                slot.presentations()
            );
        }
    })?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// 音频输出：启用 cpal 时尝试打开设备，失败则静音
#[cfg_attr(not(feature = "cpal-output"), allow(unused_variables))]
fn audio_sink(config: &PlayerConfig) -> Box<dyn AudioSink> {
    #[cfg(feature = "cpal-output")]
    {
        use frame_pacer::player::AudioOutput;

        let output = AudioOutput::new(config.audio_sample_rate, config.audio_channels).and_then(|mut output| {
            output.start()?;
            Ok(output)
        });
        match output {
            Ok(output) => return Box::new(output),
            Err(e) => warn!("音频输出不可用，改为静音: {}", e),
        }
    }
    Box::new(NullAudioSink::default())
}
