// 播放器核心模块

pub mod demuxer_source;  // Demuxer 抽象接口
pub mod memory_demuxer;
pub mod decoder;
pub mod pipeline;
pub mod decode_thread;   // 解码线程（有界队列）
pub mod subtitle;
pub mod sink;
pub mod synchronizer;
pub mod runner;
pub mod test_pattern;

#[cfg(feature = "ffmpeg")]
pub mod demuxer;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_decoder;
#[cfg(feature = "cpal-output")]
pub mod audio_output;

pub use demuxer_source::{DemuxerSource, TrackSelection};
pub use memory_demuxer::MemoryDemuxer;
pub use decoder::{raw_decoder_for, PcmAudioDecoder, RawVideoDecoder, TextSubtitleDecoder, TrackDecoder};
pub use pipeline::{MediaPipeline, UnitSource};
pub use decode_thread::DecodeThread;
pub use subtitle::{SubtitleCue, SubtitleTimeline};
pub use sink::{AudioSink, FrameSlot, NullAudioSink, VideoSink};
pub use synchronizer::Synchronizer;
pub use runner::{run_for, Pacer};
pub use test_pattern::TestPattern;

#[cfg(feature = "ffmpeg")]
pub use demuxer::Demuxer;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_decoder::{FfmpegAudioDecoder, FfmpegSubtitleDecoder, FfmpegVideoDecoder};
#[cfg(feature = "cpal-output")]
pub use audio_output::AudioOutput;
