use crate::core::{
    AudioFrame, CompressedUnit, DecodedUnit, MediaKind, PixelFormat, PlayerConfig, PlayerError,
    Result, SampleFormat, SubtitleFrame, VideoFrame,
};
use crate::player::decoder::{ass_dialogue_text, clean_subtitle_text, TrackDecoder};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::DemuxerSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::subtitle::Rect;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, info, warn};
use std::collections::VecDeque;

/// 为选中的轨道创建 FFmpeg 解码器
///
/// 视频解码器创建失败是致命错误；音频/字幕失败时跳过该轨道继续播放。
pub fn decoders_for(
    demuxer: &Demuxer,
    config: &PlayerConfig,
) -> Result<Vec<(usize, Box<dyn TrackDecoder>)>> {
    let selection = demuxer.selection();
    let mut decoders: Vec<(usize, Box<dyn TrackDecoder>)> = Vec::new();

    let video_index = selection.video.ok_or(PlayerError::NoVideoStream)?;
    let stream = demuxer.stream(video_index).ok_or(PlayerError::NoVideoStream)?;
    decoders.push((video_index, Box::new(FfmpegVideoDecoder::from_stream(stream)?)));

    if let Some(index) = selection.audio {
        let decoder = demuxer.stream(index).map(|stream| {
            FfmpegAudioDecoder::from_stream(stream, config.audio_sample_rate, config.audio_channels)
        });
        match decoder {
            Some(Ok(decoder)) => decoders.push((index, Box::new(decoder))),
            Some(Err(e)) => warn!("创建音频解码器失败: {}，继续播放（无声音）", e),
            None => warn!("音频流 #{} 不存在", index),
        }
    }

    if let Some(index) = selection.subtitle {
        let decoder = demuxer
            .stream(index)
            .map(|stream| FfmpegSubtitleDecoder::from_stream(stream, config.default_subtitle_seconds));
        match decoder {
            Some(Ok(decoder)) => {
                info!("字幕解码器创建成功");
                decoders.push((index, Box::new(decoder)));
            }
            Some(Err(e)) => warn!("创建字幕解码器失败: {}，继续播放（无字幕）", e),
            None => warn!("字幕流 #{} 不存在", index),
        }
    }

    Ok(decoders)
}

fn stream_time_base(stream: &format::stream::Stream) -> f64 {
    let tb = stream.time_base();
    if tb.denominator() == 0 {
        0.0
    } else {
        f64::from(tb.numerator()) / f64::from(tb.denominator())
    }
}

/// 重新组装成 FFmpeg 数据包
fn to_packet(unit: &CompressedUnit) -> ffmpeg::Packet {
    let mut packet = ffmpeg::Packet::copy(&unit.payload);
    packet.set_pts(unit.pts);
    packet.set_duration(unit.duration);
    if unit.keyframe {
        packet.set_flags(ffmpeg::packet::Flags::KEY);
    }
    packet
}

fn is_eagain(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Other { errno: 11 }) // EAGAIN
}

/// 软件视频解码器（输出 RGBA）
pub struct FfmpegVideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<(software::scaling::Context, util::format::Pixel, u32, u32)>,
    time_base: f64,
    pending: VecDeque<DecodedUnit>,
}

// SwsContext 本身不是 Send，但每个解码器实例同一时间只在一个线程中使用
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        debug!(
            "软件解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            scaler: None,
            time_base: stream_time_base(&stream),
            pending: VecDeque::new(),
        })
    }

    /// 取出解码器中所有可用的帧
    fn receive_all(&mut self) {
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => match self.convert_frame(&decoded) {
                    Ok(frame) => self.pending.push_back(DecodedUnit::Video(frame)),
                    Err(e) => warn!("视频帧转换失败（已跳过）: {}", e),
                },
                Err(ffmpeg::Error::Eof) => break,
                Err(e) if is_eagain(&e) => break,
                Err(e) => {
                    warn!("解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
    }

    /// 转换帧格式为 RGBA（分辨率或格式变化时重建 scaler）
    fn convert_frame(&mut self, frame: &util::frame::Video) -> Result<VideoFrame> {
        let width = frame.width();
        let height = frame.height();
        let format = frame.format();

        let stale = !matches!(&self.scaler, Some((_, f, w, h)) if *f == format && *w == width && *h == height);
        if stale {
            let context = software::scaling::Context::get(
                format,
                width,
                height,
                util::format::Pixel::RGBA,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((context, format, width, height));
        }

        let mut rgba_frame = util::frame::Video::empty();
        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler.run(frame, &mut rgba_frame)?;
        }

        // 复制数据到连续内存
        let row_size = width as usize * 4;
        let stride = rgba_frame.stride(0);
        let plane = rgba_frame.data(0);
        let mut data = Vec::with_capacity(row_size * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let row = plane
                .get(start..start + row_size)
                .ok_or_else(|| PlayerError::DecodeError("RGBA 平面数据不完整".to_string()))?;
            data.extend_from_slice(row);
        }

        Ok(VideoFrame {
            pts: frame.timestamp().map(|ts| ts as f64 * self.time_base),
            width,
            height,
            format: PixelFormat::RGBA,
            data,
        })
    }
}

impl TrackDecoder for FfmpegVideoDecoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit {
        if !unit.payload.is_empty() {
            let packet = to_packet(&unit);
            match self.decoder.send_packet(&packet) {
                Ok(()) => {}
                Err(e) if is_eagain(&e) => {
                    // 输出缓冲已满：先取出已解码的帧再重新送入
                    self.receive_all();
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("视频包解码失败（已跳过）: {}", e);
                    }
                }
                Err(e) => warn!("视频包解码失败（已跳过）: {}", e),
            }
            self.receive_all();
        }
        self.pending.pop_front().unwrap_or(DecodedUnit::Empty)
    }

    fn take_pending(&mut self) -> Option<DecodedUnit> {
        self.pending.pop_front()
    }

    fn finish(&mut self) {
        if self.decoder.send_eof().is_ok() {
            self.receive_all();
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.pending.clear();
    }

    fn describe(&self) -> String {
        format!("软件解码 {}x{}", self.decoder.width(), self.decoder.height())
    }
}

/// 音频解码器（重采样为交错 f32）
pub struct FfmpegAudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    time_base: f64,
    target_channels: u16,      // 目标声道数（用于声道转换）
    target_sample_rate: u32,   // 目标采样率
    pending: VecDeque<DecodedUnit>,
}

// SwrContext 同样只在持有解码器的线程中使用
unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    pub fn from_stream(
        stream: format::stream::Stream,
        target_sample_rate: u32,
        target_channels: u16,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        // 只支持单声道/立体声/5.1 输出，其余按立体声处理
        let target_channels = match target_channels {
            1 | 2 | 6 => target_channels,
            _ => 2,
        };

        debug!(
            "音频解码器: {} Hz, {} 声道 → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            target_sample_rate,
            target_channels
        );

        Ok(Self {
            decoder,
            resampler: None,
            time_base: stream_time_base(&stream),
            target_channels,
            target_sample_rate,
            pending: VecDeque::new(),
        })
    }

    fn receive_all(&mut self) {
        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => match self.convert_frame(&decoded) {
                    Ok(frame) => self.pending.push_back(DecodedUnit::Audio(frame)),
                    Err(e) => warn!("音频帧转换失败（已跳过）: {}", e),
                },
                Err(ffmpeg::Error::Eof) => break,
                Err(e) if is_eagain(&e) => break,
                Err(e) => {
                    warn!("音频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
    }

    /// 转换音频帧为 f32 格式（支持声道转换和重采样）
    fn convert_frame(&mut self, frame: &util::frame::Audio) -> Result<AudioFrame> {
        if self.resampler.is_none() {
            let target_layout = match self.target_channels {
                1 => util::channel_layout::ChannelLayout::MONO,
                6 => util::channel_layout::ChannelLayout::_5POINT1,
                _ => util::channel_layout::ChannelLayout::STEREO,
            };

            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                frame.rate(),
                frame.channels(),
                self.target_sample_rate,
                self.target_channels
            );

            self.resampler = Some(software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                frame.rate(),
                util::format::Sample::F32(util::format::sample::Type::Packed),
                target_layout,
                self.target_sample_rate,
            )?);
        }

        let mut resampled = util::frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.run(frame, &mut resampled)?;
        }

        let sample_count = resampled.samples() * self.target_channels as usize;
        let bytes = resampled
            .data(0)
            .get(..sample_count * 4)
            .ok_or_else(|| PlayerError::DecodeError("重采样输出长度不足".to_string()))?;
        let data = match bytemuck::try_cast_slice::<u8, f32>(bytes) {
            Ok(samples) => samples.to_vec(),
            Err(_) => bytes
                .chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        };

        Ok(AudioFrame {
            pts: frame.timestamp().map(|ts| ts as f64 * self.time_base),
            sample_rate: self.target_sample_rate,
            channels: self.target_channels,
            format: SampleFormat::F32,
            data,
        })
    }
}

impl TrackDecoder for FfmpegAudioDecoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit {
        if !unit.payload.is_empty() {
            let packet = to_packet(&unit);
            match self.decoder.send_packet(&packet) {
                Ok(()) => {}
                Err(e) if is_eagain(&e) => {
                    self.receive_all();
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("音频包解码失败（已跳过）: {}", e);
                    }
                }
                Err(e) => warn!("音频包解码失败（已跳过）: {}", e),
            }
            self.receive_all();
        }
        self.pending.pop_front().unwrap_or(DecodedUnit::Empty)
    }

    fn take_pending(&mut self) -> Option<DecodedUnit> {
        self.pending.pop_front()
    }

    fn finish(&mut self) {
        if self.decoder.send_eof().is_ok() {
            self.receive_all();
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.pending.clear();
    }

    fn describe(&self) -> String {
        format!("{} Hz {} 声道", self.target_sample_rate, self.target_channels)
    }
}

/// 字幕解码器（一次性：一个数据包最多一条字幕）
pub struct FfmpegSubtitleDecoder {
    decoder: codec::decoder::Subtitle,
    time_base: f64,
    default_seconds: f64,
}

impl FfmpegSubtitleDecoder {
    pub fn from_stream(stream: format::stream::Stream, default_seconds: f64) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().subtitle()?;
        let time_base = stream_time_base(&stream);

        debug!("字幕解码器初始化: time_base = {}", time_base);

        Ok(Self {
            decoder,
            time_base,
            default_seconds,
        })
    }
}

impl TrackDecoder for FfmpegSubtitleDecoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Subtitle
    }

    fn feed(&mut self, unit: CompressedUnit) -> DecodedUnit {
        if unit.payload.is_empty() {
            return DecodedUnit::Empty;
        }
        let packet = to_packet(&unit);
        let mut subtitle = ffmpeg::Subtitle::new();

        match self.decoder.decode(&packet, &mut subtitle) {
            Ok(true) => {}
            Ok(false) => return DecodedUnit::Empty,
            Err(e) => {
                warn!("字幕解码失败（已跳过）: {}", e);
                return DecodedUnit::Empty;
            }
        }

        let mut parts = Vec::new();
        for rect in subtitle.rects() {
            match rect {
                Rect::Text(text) => parts.push(clean_subtitle_text(text.get())),
                Rect::Ass(ass) => parts.push(clean_subtitle_text(ass_dialogue_text(ass.get()))),
                _ => debug!("跳过位图字幕（当前仅支持文本字幕）"),
            }
        }
        let end_display_ms = subtitle.end();

        // 必须释放 FFmpeg subtitle，否则泄漏
        unsafe {
            ffmpeg::ffi::avsubtitle_free(subtitle.as_mut_ptr());
        }

        let text = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return DecodedUnit::Empty;
        }

        // 时长优先取数据包时长，其次 end_display_time，最后默认值
        let duration = if unit.duration > 0 && self.time_base > 0.0 {
            unit.duration as f64 * self.time_base
        } else if end_display_ms > 0 {
            f64::from(end_display_ms) / 1000.0
        } else {
            self.default_seconds
        };

        DecodedUnit::Subtitle(SubtitleFrame {
            pts: unit.pts.map(|pts| pts as f64 * self.time_base),
            duration,
            text,
        })
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn describe(&self) -> String {
        "FFmpeg 字幕解码".to_string()
    }
}
