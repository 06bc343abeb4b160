use crate::core::{
    CompressedUnit, MediaInfo, PixelFormat, PlayerError, Rational, Result, TrackInfo, TrackParams,
};
use crate::player::demuxer_source::{DemuxerSource, TrackSelection};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info, warn};

/// FFmpeg 内部时间基（微秒）
const AV_TIME_BASE: f64 = 1_000_000.0;

/// 解封装器 - 负责读取媒体文件并按轨道打标签
pub struct Demuxer {
    input_ctx: format::context::Input,
    tracks: Vec<TrackInfo>,
    selection: TrackSelection,
    media_info: MediaInfo,  // 缓存媒体信息
    source_path: String,    // 媒体源路径（用于描述）
}

impl Demuxer {
    /// 打开媒体文件
    ///
    /// 打开失败、读取流信息失败或没有视频流都是致命错误。
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开文件: {}", path);

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path, e)))?;

        // 视频/音频取最佳流，字幕取第一个字幕流
        let selection = TrackSelection {
            video: input_ctx.streams().best(media::Type::Video).map(|s| s.index()),
            audio: input_ctx.streams().best(media::Type::Audio).map(|s| s.index()),
            subtitle: input_ctx
                .streams()
                .find(|s| s.parameters().medium() == media::Type::Subtitle)
                .map(|s| s.index()),
        };

        if selection.video.is_none() {
            return Err(PlayerError::NoVideoStream);
        }

        debug!("视频流索引: {:?}", selection.video);
        debug!("音频流索引: {:?}", selection.audio);
        debug!("字幕流索引: {:?}", selection.subtitle);

        let mut tracks = Vec::new();
        for stream in input_ctx.streams() {
            match describe_stream(&stream) {
                Ok(Some(track)) => tracks.push(track),
                Ok(None) => {}
                // 未选中的流读取失败不影响播放
                Err(e) if !selection.contains(stream.index()) => {
                    warn!("跳过无法识别的流 #{}: {}", stream.index(), e);
                }
                Err(e) => return Err(e),
            }
        }

        let duration = if input_ctx.duration() > 0 {
            input_ctx.duration() as f64 / AV_TIME_BASE
        } else {
            0.0
        };
        let media_info = MediaInfo::from_tracks(
            tracks.iter().filter(|t| selection.contains(t.id)),
            duration,
        );

        info!("媒体信息: {:?}", media_info);

        Ok(Self {
            input_ctx,
            tracks,
            selection,
            media_info,
            source_path: path.to_string(),
        })
    }

    /// 获取流（用于创建解码器）
    pub fn stream(&self, index: usize) -> Option<format::stream::Stream> {
        self.input_ctx.stream(index)
    }
}

fn to_rational(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

fn positive_rate(r: ffmpeg::Rational) -> Option<Rational> {
    let rate = to_rational(r);
    rate.is_positive().then_some(rate)
}

/// 提取单个流的轨道信息（非音视频/字幕流返回 None）
fn describe_stream(stream: &format::stream::Stream) -> Result<Option<TrackInfo>> {
    let parameters = stream.parameters();
    let codec_name = parameters.id().name().to_string();

    let params = match parameters.medium() {
        media::Type::Video => {
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = context.decoder().video()?;
            TrackParams::Video {
                width: decoder.width(),
                height: decoder.height(),
                format: PixelFormat::RGBA,
            }
        }
        media::Type::Audio => {
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = context.decoder().audio()?;
            TrackParams::Audio {
                sample_rate: decoder.rate(),
                channels: decoder.channels(),
            }
        }
        media::Type::Subtitle => TrackParams::Subtitle,
        _ => return Ok(None),
    };

    Ok(Some(TrackInfo {
        id: stream.index(),
        time_base: to_rational(stream.time_base()),
        params,
        avg_frame_rate: positive_rate(stream.avg_frame_rate()),
        nominal_frame_rate: positive_rate(stream.rate()),
        codec_name,
    }))
}

impl DemuxerSource for Demuxer {
    fn read_unit(&mut self) -> Result<Option<CompressedUnit>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {
                    let track_id = packet.stream();
                    if !self.selection.contains(track_id) {
                        // 跳过未选中的流
                        continue;
                    }
                    return Ok(Some(CompressedUnit {
                        track_id,
                        payload: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                        pts: packet.pts().or_else(|| packet.dts()),
                        duration: packet.duration(),
                        keyframe: packet.is_key(),
                    }));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seek(&mut self, target_second: f64) -> Result<()> {
        // 流索引为 -1 的 seek 使用 AV_TIME_BASE 时间基，落在目标之前的关键帧
        let timestamp = (target_second * AV_TIME_BASE) as i64;
        self.input_ctx
            .seek(timestamp, ..timestamp)
            .map_err(|e| PlayerError::SeekError(format!("{:.3}s: {}", target_second, e)))
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    fn selection(&self) -> TrackSelection {
        self.selection
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
