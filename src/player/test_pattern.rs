use crate::core::{CompressedUnit, PlayerError, Rational, Result, TrackInfo};
use crate::player::memory_demuxer::MemoryDemuxer;
use log::debug;

const VIDEO_TRACK: usize = 0;
const AUDIO_TRACK: usize = 1;
const SUBTITLE_TRACK: usize = 2;

/// 测试图样 - 生成一段合成媒体（移动色条 + 正弦音 + 定时字幕）
///
/// 视频帧 k 的时间戳为 k（时间基 1/fps）。每帧之前依次放置
/// 在该帧区间内开始的字幕和覆盖该区间的音频，与常见容器的交错方式一致。
#[derive(Debug, Clone)]
pub struct TestPattern {
    frame_rate: Rational,
    seconds: f64,
    width: u32,
    height: u32,
    keyframe_interval: u32,
    advertise_frame_rate: bool,
    audio: Option<(u32, u16)>,
    cues: Vec<(f64, f64, String)>,
}

impl TestPattern {
    pub fn new(fps: u32, seconds: f64) -> Self {
        Self::with_frame_rate(Rational::new(fps as i32, 1), seconds)
    }

    pub fn with_frame_rate(frame_rate: Rational, seconds: f64) -> Self {
        Self {
            frame_rate,
            seconds,
            width: 8,
            height: 4,
            keyframe_interval: 1,
            advertise_frame_rate: true,
            audio: None,
            cues: Vec::new(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// 每隔多少帧一个关键帧（seek 落点）
    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = frames.max(1);
        self
    }

    /// 每个视频帧配一段覆盖同一区间的 PCM 音频
    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.audio = Some((sample_rate, channels));
        self
    }

    pub fn with_cue(mut self, start: f64, duration: f64, text: impl Into<String>) -> Self {
        self.cues.push((start, duration, text.into()));
        self
    }

    /// 不在轨道信息中声明帧率（模拟帧率未知的流）
    pub fn without_frame_rate(mut self) -> Self {
        self.advertise_frame_rate = false;
        self
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_rate
            .to_f64()
            .map_or(0, |fps| (self.seconds * fps).round().max(0.0) as u64)
    }

    pub fn build(&self) -> Result<MemoryDemuxer> {
        let fps = self
            .frame_rate
            .to_f64()
            .filter(|fps| *fps > 0.0)
            .ok_or_else(|| PlayerError::ConfigError(format!("无效的帧率: {}", self.frame_rate)))?;
        let frame_seconds = 1.0 / fps;
        let time_base = Rational::new(self.frame_rate.den, self.frame_rate.num);

        let mut video = TrackInfo::video(VIDEO_TRACK, self.width, self.height, time_base, self.frame_rate);
        if !self.advertise_frame_rate {
            video.avg_frame_rate = None;
            video.nominal_frame_rate = None;
        }

        let mut tracks = vec![video];
        if let Some((sample_rate, channels)) = self.audio {
            tracks.push(TrackInfo::audio(AUDIO_TRACK, sample_rate, channels));
        }
        if !self.cues.is_empty() {
            tracks.push(TrackInfo::subtitle(SUBTITLE_TRACK, Rational::new(1, 1000)));
        }

        let mut demuxer = MemoryDemuxer::new(tracks, self.seconds)?.with_label("test-pattern");
        let mut cues: Vec<&(f64, f64, String)> = self.cues.iter().collect();
        cues.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut next_cue = 0;

        let frames = self.frame_count();
        for k in 0..frames {
            let start = k as f64 * frame_seconds;
            let end = (k + 1) as f64 * frame_seconds;

            while let Some((cue_start, duration, text)) = cues.get(next_cue).copied() {
                let cue_frame = (cue_start * fps + 1e-9).floor().max(0.0) as u64;
                if cue_frame > k && k + 1 < frames {
                    break;
                }
                demuxer.push_unit(CompressedUnit::new(
                    SUBTITLE_TRACK,
                    text.as_bytes().to_vec(),
                    (cue_start * 1000.0).round() as i64,
                    (duration * 1000.0).round() as i64,
                ));
                next_cue += 1;
            }

            if let Some((sample_rate, channels)) = self.audio {
                let first = (start * f64::from(sample_rate)).round() as i64;
                let last = (end * f64::from(sample_rate)).round() as i64;
                demuxer.push_unit(CompressedUnit::new(
                    AUDIO_TRACK,
                    tone(first, last, sample_rate, channels),
                    first,
                    last - first,
                ));
            }

            let keyframe = k % u64::from(self.keyframe_interval) == 0;
            demuxer.push_unit(
                CompressedUnit::new(VIDEO_TRACK, self.frame(k), k as i64, 1).with_keyframe(keyframe),
            );
        }

        debug!("测试图样: {} 帧 @ {} fps, {} 个单元", frames, fps, demuxer.len());
        Ok(demuxer)
    }

    /// 第 k 帧：色条每帧右移一列
    fn frame(&self, k: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        let bar = if self.width == 0 { 0 } else { (k % u64::from(self.width)) as u32 };
        for _ in 0..self.height {
            for x in 0..self.width {
                let pixel = if x == bar {
                    [255, 255, 255, 255]
                } else {
                    [(k % 256) as u8, 32, 64, 255]
                };
                data.extend_from_slice(&pixel);
            }
        }
        data
    }
}

/// 440Hz 正弦音，采样区间 [first, last)
fn tone(first: i64, last: i64, sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity((last - first).max(0) as usize * channels as usize * 4);
    for n in first..last {
        let t = n as f64 / f64::from(sample_rate);
        let sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 0.2) as f32;
        for _ in 0..channels {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
    }
    payload
}
