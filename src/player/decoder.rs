use crate::core::{
    AudioFrame, CompressedUnit, DecodedUnit, MediaKind, PixelFormat, PlayerConfig, PlayerError,
    Rational, Result, SampleFormat, SubtitleFrame, TrackInfo, TrackParams, VideoFrame,
};
use log::{debug, warn};

/// 轨道解码器 - 每个选中轨道一个实例
///
/// 一次 `feed` 最多产出一个解码单元；编解码器还需要输入时返回 `DecodedUnit::Empty`。
/// 单个单元解码失败也返回 `Empty`，不会中断整个流。
pub trait TrackDecoder: Send {
    /// 解码器对应的媒体类型
    fn kind(&self) -> MediaKind;

    /// 送入一个压缩单元
    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit;

    /// 取出之前 feed 残留的输出（一个输入产生多个输出的编解码器）
    fn take_pending(&mut self) -> Option<DecodedUnit> {
        None
    }

    /// 流结束时调用一次，把编解码器内部缓冲的输出转入待取队列
    fn finish(&mut self) {}

    /// 丢弃内部状态（seek 时使用）
    fn flush(&mut self);

    /// 获取解码器描述
    fn describe(&self) -> String;
}

/// 为轨道创建内置的原始数据解码器
pub fn raw_decoder_for(track: &TrackInfo, config: &PlayerConfig) -> Result<Box<dyn TrackDecoder>> {
    let decoder: Box<dyn TrackDecoder> = match track.params {
        TrackParams::Video { .. } => Box::new(RawVideoDecoder::new(track)?),
        TrackParams::Audio { .. } => Box::new(PcmAudioDecoder::new(track)?),
        TrackParams::Subtitle => Box::new(TextSubtitleDecoder::new(
            track.time_base,
            config.default_subtitle_seconds,
        )),
    };
    debug!("轨道 #{} 使用解码器: {}", track.id, decoder.describe());
    Ok(decoder)
}

/// 原始视频解码器：负载为紧密排列的像素
pub struct RawVideoDecoder {
    width: u32,
    height: u32,
    format: PixelFormat,
    time_base: Rational,
}

impl RawVideoDecoder {
    pub fn new(track: &TrackInfo) -> Result<Self> {
        match track.params {
            TrackParams::Video {
                width,
                height,
                format,
            } => Ok(Self {
                width,
                height,
                format,
                time_base: track.time_base,
            }),
            _ => Err(PlayerError::DecodeError(format!("轨道 #{} 不是视频轨道", track.id))),
        }
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

impl TrackDecoder for RawVideoDecoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit {
        if unit.payload.len() != self.frame_size() {
            warn!(
                "视频单元大小不符（已跳过）: {} 字节，期望 {}",
                unit.payload.len(),
                self.frame_size()
            );
            return DecodedUnit::Empty;
        }
        DecodedUnit::Video(VideoFrame {
            pts: unit.pts.map(|pts| self.time_base.ticks_to_seconds(pts)),
            width: self.width,
            height: self.height,
            format: self.format,
            data: unit.payload,
        })
    }

    fn flush(&mut self) {}

    fn describe(&self) -> String {
        format!("rawvideo {}x{} {:?}", self.width, self.height, self.format)
    }
}

/// PCM 音频解码器：负载为交错的 f32 小端采样
pub struct PcmAudioDecoder {
    sample_rate: u32,
    channels: u16,
    time_base: Rational,
}

impl PcmAudioDecoder {
    pub fn new(track: &TrackInfo) -> Result<Self> {
        match track.params {
            TrackParams::Audio {
                sample_rate,
                channels,
            } if channels > 0 => Ok(Self {
                sample_rate,
                channels,
                time_base: track.time_base,
            }),
            _ => Err(PlayerError::DecodeError(format!("轨道 #{} 不是有效的音频轨道", track.id))),
        }
    }
}

impl TrackDecoder for PcmAudioDecoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit {
        let frame_bytes = 4 * self.channels as usize;
        if unit.payload.is_empty() || unit.payload.len() % frame_bytes != 0 {
            warn!("音频单元长度无效（已跳过）: {} 字节", unit.payload.len());
            return DecodedUnit::Empty;
        }
        let data = unit
            .payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        DecodedUnit::Audio(AudioFrame {
            pts: unit.pts.map(|pts| self.time_base.ticks_to_seconds(pts)),
            sample_rate: self.sample_rate,
            channels: self.channels,
            format: SampleFormat::F32,
            data,
        })
    }

    fn flush(&mut self) {}

    fn describe(&self) -> String {
        format!("pcm_f32le {} Hz {} 声道", self.sample_rate, self.channels)
    }
}

/// 文本字幕解码器：负载为 UTF-8 文本，一个单元产出一条字幕
pub struct TextSubtitleDecoder {
    time_base: Rational,
    default_seconds: f64,
}

impl TextSubtitleDecoder {
    pub fn new(time_base: Rational, default_seconds: f64) -> Self {
        Self {
            time_base,
            default_seconds,
        }
    }
}

impl TrackDecoder for TextSubtitleDecoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Subtitle
    }

    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit {
        let text = match std::str::from_utf8(&unit.payload) {
            Ok(text) => clean_subtitle_text(text),
            Err(e) => {
                warn!("字幕文本不是有效的 UTF-8（已跳过）: {}", e);
                return DecodedUnit::Empty;
            }
        };
        if text.is_empty() {
            return DecodedUnit::Empty;
        }
        DecodedUnit::Subtitle(SubtitleFrame {
            pts: unit.pts.map(|pts| self.time_base.ticks_to_seconds(pts)),
            duration: subtitle_duration(self.time_base, unit.duration, self.default_seconds),
            text,
        })
    }

    fn flush(&mut self) {}

    fn describe(&self) -> String {
        "text subtitle".to_string()
    }
}

/// 字幕显示时长 = 单元时长 × 时间基；没有时长时使用默认值
pub(crate) fn subtitle_duration(time_base: Rational, duration: i64, default_seconds: f64) -> f64 {
    let seconds = time_base.ticks_to_seconds(duration);
    if seconds > 0.0 {
        seconds
    } else {
        default_seconds
    }
}

/// 清理字幕文本：移除 ASS 覆盖标签和简单 HTML 标签，处理 `\N` 换行，
/// 去掉每行首尾空白和空行
pub fn clean_subtitle_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_override = false;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => in_override = true,
            '}' if in_override => in_override = false,
            _ if in_override => {}
            '<' => {
                // <i>, </b>, <font color=...> 之类的标签
                let lookahead: String = chars.clone().take(64).collect();
                match lookahead.find('>') {
                    Some(end) if is_markup_tag(&lookahead[..end]) => {
                        let skip = lookahead[..=end].chars().count();
                        for _ in 0..skip {
                            chars.next();
                        }
                    }
                    _ => result.push(ch),
                }
            }
            '\\' => match chars.peek() {
                Some('N') | Some('n') => {
                    chars.next();
                    result.push('\n');
                }
                Some('h') => {
                    chars.next();
                    result.push(' ');
                }
                _ => result.push(ch),
            },
            '\r' => {}
            _ => result.push(ch),
        }
    }

    result
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 取出 ASS 事件行中的对白文本
///
/// FFmpeg 输出 `ReadOrder,Layer,Style,Name,MarginL,MarginR,MarginV,Effect,Text`，
/// 旧版本带 `Dialogue:` 前缀，多一个字段。
#[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
pub(crate) fn ass_dialogue_text(line: &str) -> &str {
    let (fields, body) = match line.strip_prefix("Dialogue:") {
        Some(rest) => (10, rest),
        None => (9, line),
    };
    body.splitn(fields, ',').nth(fields - 1).unwrap_or(line)
}

fn is_markup_tag(inner: &str) -> bool {
    let name = inner.strip_prefix('/').unwrap_or(inner);
    name.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
}
