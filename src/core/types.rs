use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 有理数（时间基、帧率）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 转换为浮点数，分母为 0 时返回 None
    pub fn to_f64(self) -> Option<f64> {
        if self.den == 0 {
            None
        } else {
            Some(f64::from(self.num) / f64::from(self.den))
        }
    }

    /// 是否为正的有效值（用于帧率判断）
    pub fn is_positive(self) -> bool {
        self.to_f64().map_or(false, |v| v > 0.0 && v.is_finite())
    }

    /// 时间基刻度 → 秒
    pub fn ticks_to_seconds(self, ticks: i64) -> f64 {
        self.to_f64().map_or(0.0, |tb| ticks as f64 * tb)
    }

    /// 秒 → 时间基刻度（向下取整）
    pub fn seconds_to_ticks(self, seconds: f64) -> i64 {
        match self.to_f64() {
            Some(tb) if tb > 0.0 => (seconds / tb).floor() as i64,
            _ => 0,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Subtitle => "subtitle",
        }
    }
}

/// 轨道编解码参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackParams {
    Video {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
    },
    Subtitle,
}

/// 轨道描述（由 MediaSource 独占）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: usize,
    pub time_base: Rational,
    pub params: TrackParams,
    /// 容器报告的平均帧率
    pub avg_frame_rate: Option<Rational>,
    /// 编解码器报告的标称帧率
    pub nominal_frame_rate: Option<Rational>,
    pub codec_name: String,
}

impl TrackInfo {
    pub fn kind(&self) -> MediaKind {
        match self.params {
            TrackParams::Video { .. } => MediaKind::Video,
            TrackParams::Audio { .. } => MediaKind::Audio,
            TrackParams::Subtitle => MediaKind::Subtitle,
        }
    }

    pub fn video(id: usize, width: u32, height: u32, time_base: Rational, frame_rate: Rational) -> Self {
        Self {
            id,
            time_base,
            params: TrackParams::Video {
                width,
                height,
                format: PixelFormat::RGBA,
            },
            avg_frame_rate: Some(frame_rate),
            nominal_frame_rate: None,
            codec_name: "rawvideo".to_string(),
        }
    }

    pub fn audio(id: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            id,
            time_base: Rational::new(1, sample_rate as i32),
            params: TrackParams::Audio {
                sample_rate,
                channels,
            },
            avg_frame_rate: None,
            nominal_frame_rate: None,
            codec_name: "pcm_f32le".to_string(),
        }
    }

    pub fn subtitle(id: usize, time_base: Rational) -> Self {
        Self {
            id,
            time_base,
            params: TrackParams::Subtitle,
            avg_frame_rate: None,
            nominal_frame_rate: None,
            codec_name: "text".to_string(),
        }
    }
}

/// 压缩数据单元（解封装输出，解码器消费一次后丢弃）
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedUnit {
    pub track_id: usize,
    pub payload: Vec<u8>,
    /// 显示时间戳（轨道时间基）
    pub pts: Option<i64>,
    /// 持续时间（轨道时间基）
    pub duration: i64,
    /// 是否为可独立解码点（seek 落点）
    pub keyframe: bool,
}

impl CompressedUnit {
    pub fn new(track_id: usize, payload: Vec<u8>, pts: i64, duration: i64) -> Self {
        Self {
            track_id,
            payload,
            pts: Some(pts),
            duration,
            keyframe: true,
        }
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    RGB,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGBA => 4,
            PixelFormat::RGB => 3,
        }
    }
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
}

/// 视频帧数据
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub pts: Option<f64>,   // 显示时间戳（秒）
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,      // 紧密排列的像素数据
}

/// 音频帧数据
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub pts: Option<f64>,   // 显示时间戳（秒）
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub data: Vec<f32>,     // 统一使用交错 f32
}

/// 字幕帧数据
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleFrame {
    pub pts: Option<f64>,   // 开始显示时间戳（秒）
    pub duration: f64,      // 显示持续时间（秒）
    pub text: String,
}

/// 解码输出
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedUnit {
    Video(VideoFrame),
    Audio(AudioFrame),
    Subtitle(SubtitleFrame),
    /// 解码器需要更多输入
    Empty,
    /// 流结束
    EndOfStream,
}

impl DecodedUnit {
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            DecodedUnit::Video(_) => Some(MediaKind::Video),
            DecodedUnit::Audio(_) => Some(MediaKind::Audio),
            DecodedUnit::Subtitle(_) => Some(MediaKind::Subtitle),
            DecodedUnit::Empty | DecodedUnit::EndOfStream => None,
        }
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    Playing,
    Paused,
    Seeking,
}

/// 调度计数器与播放位置（只在 tick 内修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub display_tick_count: u64,
    pub video_frame_count: u64,
    pub current_second: f64,
    pub duration_second: f64,
    pub play_status: PlayStatus,
    pub pending_seek_target: Option<f64>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            display_tick_count: 0,
            video_frame_count: 0,
            current_second: 0.0,
            duration_second: 0.0,
            play_status: PlayStatus::Playing,
            pending_seek_target: None,
        }
    }
}

/// 媒体信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64,          // 总时长（秒），未知为 0
    pub width: u32,
    pub height: u32,
    pub avg_frame_rate: Option<Rational>,
    pub nominal_frame_rate: Option<Rational>,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl MediaInfo {
    /// 从选中的轨道汇总媒体信息
    pub fn from_tracks<'a>(tracks: impl IntoIterator<Item = &'a TrackInfo>, duration: f64) -> Self {
        let mut info = MediaInfo {
            duration,
            audio_codec: "none".to_string(),
            ..Default::default()
        };
        for track in tracks {
            match track.params {
                TrackParams::Video { width, height, .. } => {
                    info.width = width;
                    info.height = height;
                    info.avg_frame_rate = track.avg_frame_rate;
                    info.nominal_frame_rate = track.nominal_frame_rate;
                    info.video_codec = track.codec_name.clone();
                }
                TrackParams::Audio {
                    sample_rate,
                    channels,
                } => {
                    info.sample_rate = sample_rate;
                    info.channels = channels;
                    info.audio_codec = track.codec_name.clone();
                }
                TrackParams::Subtitle => {}
            }
        }
        info
    }
}

/// 播放器控制命令（宿主线程 → 调度器）
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    TogglePause,
    Seek(f64),         // 绝对时间（秒）
    SeekRelative(f64), // 相对时间（秒）
    SetVolume(f32),
}

/// 本次 tick 对视频的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// 呈现了新解码的帧
    Advance,
    /// 重复呈现上一帧
    Hold,
    /// 没有可呈现的帧
    Idle,
    Paused,
    /// 本次 tick 执行了 seek
    Seek,
}

/// 单次 tick 报告
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub action: FrameAction,
    pub frames_dropped: u32,
    pub audio_units: u32,
    pub cues_added: u32,
    pub end_of_stream: bool,
}

impl TickOutcome {
    pub fn new(action: FrameAction) -> Self {
        Self {
            action,
            frames_dropped: 0,
            audio_units: 0,
            cues_added: 0,
            end_of_stream: false,
        }
    }
}

/// 累计统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub frames_presented: u64,
    pub frames_held: u64,
    pub frames_dropped: u64,
    pub audio_units: u64,
    pub cues_added: u64,
    pub seeks: u64,
}

/// 共享的视频帧（调度器与视频 sink 只读共享）
pub type SharedFrame = Arc<VideoFrame>;
