use crate::core::{DecodedUnit, MediaInfo, PlayerConfig, PlayerError, Result};
use crate::player::decoder::{raw_decoder_for, TrackDecoder};
use crate::player::demuxer_source::DemuxerSource;
use log::{debug, error, info, warn};

/// 解码单元数据源 - 调度器每次拉取一个解码单元
pub trait UnitSource: Send {
    /// 拉取下一个解码单元
    ///
    /// 同步实现从不返回 `Empty`；线程化实现在队列暂时为空时返回 `Empty`。
    /// `EndOfStream` 之后继续调用仍返回 `EndOfStream`，直到下一次 seek。
    fn pull(&mut self) -> DecodedUnit;

    /// 重新定位并丢弃所有已缓冲但未交付的单元
    fn seek(&mut self, target_second: f64) -> Result<()>;

    fn media_info(&self) -> &MediaInfo;

    fn description(&self) -> String;
}

/// 解封装 + 按轨道 id 分派的解码器
pub struct MediaPipeline {
    demuxer: Box<dyn DemuxerSource>,
    decoders: Vec<(usize, Box<dyn TrackDecoder>)>,
    drained: bool,              // 解封装器已到末尾，只剩解码器缓冲
    consecutive_errors: u32,
    max_consecutive_errors: u32,
    units_read: u64,
}

impl MediaPipeline {
    pub fn new(demuxer: Box<dyn DemuxerSource>, config: &PlayerConfig) -> Self {
        info!("创建解码管线: {}", demuxer.description());
        Self {
            demuxer,
            decoders: Vec::new(),
            drained: false,
            consecutive_errors: 0,
            max_consecutive_errors: config.max_consecutive_read_errors,
            units_read: 0,
        }
    }

    /// 为轨道注册解码器（同一轨道重复注册时替换）
    pub fn with_decoder(mut self, track_id: usize, decoder: Box<dyn TrackDecoder>) -> Self {
        debug!("轨道 #{} 注册解码器: {}", track_id, decoder.describe());
        self.decoders.retain(|(id, _)| *id != track_id);
        self.decoders.push((track_id, decoder));
        self
    }

    /// 为所有选中轨道创建内置原始数据解码器
    pub fn with_raw_decoders(demuxer: Box<dyn DemuxerSource>, config: &PlayerConfig) -> Result<Self> {
        let selection = demuxer.selection();
        let decoders = demuxer
            .tracks()
            .iter()
            .filter(|track| selection.contains(track.id))
            .map(|track| Ok((track.id, raw_decoder_for(track, config)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut pipeline = Self::new(demuxer, config);
        for (id, decoder) in decoders {
            pipeline = pipeline.with_decoder(id, decoder);
        }
        pipeline.require_video_decoder()?;
        Ok(pipeline)
    }

    /// 用 FFmpeg 打开文件并为选中轨道创建解码器
    #[cfg(feature = "ffmpeg")]
    pub fn open_file(path: &str, config: &PlayerConfig) -> Result<Self> {
        use crate::player::demuxer::Demuxer;
        use crate::player::ffmpeg_decoder::decoders_for;

        let demuxer = Demuxer::open(path)?;
        let decoders = decoders_for(&demuxer, config)?;

        let mut pipeline = Self::new(Box::new(demuxer), config);
        for (id, decoder) in decoders {
            pipeline = pipeline.with_decoder(id, decoder);
        }
        pipeline.require_video_decoder()?;
        Ok(pipeline)
    }

    fn require_video_decoder(&self) -> Result<()> {
        let video = self.demuxer.selection().video.ok_or(PlayerError::NoVideoStream)?;
        if self.decoders.iter().any(|(id, _)| *id == video) {
            Ok(())
        } else {
            Err(PlayerError::NoVideoStream)
        }
    }

    pub fn demuxer(&self) -> &dyn DemuxerSource {
        self.demuxer.as_ref()
    }

    pub fn units_read(&self) -> u64 {
        self.units_read
    }

    fn take_pending(&mut self) -> Option<DecodedUnit> {
        self.decoders
            .iter_mut()
            .find_map(|(_, decoder)| decoder.take_pending())
    }

    fn finish_decoders(&mut self) {
        for (_, decoder) in &mut self.decoders {
            decoder.finish();
        }
        self.drained = true;
    }
}

impl UnitSource for MediaPipeline {
    fn pull(&mut self) -> DecodedUnit {
        loop {
            if let Some(unit) = self.take_pending() {
                return unit;
            }
            if self.drained {
                return DecodedUnit::EndOfStream;
            }

            match self.demuxer.read_unit() {
                Ok(Some(unit)) => {
                    self.consecutive_errors = 0;
                    self.units_read += 1;
                    let track_id = unit.track_id;
                    let Some((_, decoder)) = self.decoders.iter_mut().find(|(id, _)| *id == track_id) else {
                        continue;
                    };
                    match decoder.feed(unit) {
                        DecodedUnit::Empty | DecodedUnit::EndOfStream => continue,
                        decoded => return decoded,
                    }
                }
                Ok(None) => {
                    info!("📄 解封装到达末尾（共 {} 个单元），排空解码器", self.units_read);
                    self.finish_decoders();
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors > self.max_consecutive_errors {
                        error!(
                            "❌ 连续 {} 次读取失败，按流结束处理: {}",
                            self.consecutive_errors, e
                        );
                        self.finish_decoders();
                    } else {
                        warn!("读取单元失败（已跳过）: {}", e);
                    }
                }
            }
        }
    }

    fn seek(&mut self, target_second: f64) -> Result<()> {
        let result = self.demuxer.seek(target_second);
        for (_, decoder) in &mut self.decoders {
            decoder.flush();
        }
        self.drained = false;
        self.consecutive_errors = 0;
        result
    }

    fn media_info(&self) -> &MediaInfo {
        self.demuxer.media_info()
    }

    fn description(&self) -> String {
        self.demuxer.description()
    }
}
