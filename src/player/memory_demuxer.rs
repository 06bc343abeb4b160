use crate::core::{CompressedUnit, MediaInfo, PlayerError, Result, TrackInfo};
use crate::player::demuxer_source::{DemuxerSource, TrackSelection};
use log::{debug, info};

enum Entry {
    Unit(CompressedUnit),
    Corrupt(String),
}

/// 内存解封装器 - 按文件顺序保存已打好标签的压缩单元
///
/// 用于测试图样、预先解封装好的数据以及集成测试。
/// seek 落在目标时间之前最近的视频关键帧上。
pub struct MemoryDemuxer {
    tracks: Vec<TrackInfo>,
    selection: TrackSelection,
    media_info: MediaInfo,
    entries: Vec<Entry>,
    cursor: usize,
    label: String,
}

impl MemoryDemuxer {
    /// 创建内存解封装器，没有视频轨道时返回错误
    pub fn new(tracks: Vec<TrackInfo>, duration: f64) -> Result<Self> {
        let selection = TrackSelection::first_of_each(&tracks);
        if selection.video.is_none() {
            return Err(PlayerError::NoVideoStream);
        }
        let selected = tracks.iter().filter(|t| selection.contains(t.id));
        let media_info = MediaInfo::from_tracks(selected, duration);

        debug!("内存解封装器轨道选择: {:?}", selection);

        Ok(Self {
            tracks,
            selection,
            media_info,
            entries: Vec::new(),
            cursor: 0,
            label: "memory".to_string(),
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// 追加一个压缩单元（按文件顺序）
    pub fn push_unit(&mut self, unit: CompressedUnit) {
        self.entries.push(Entry::Unit(unit));
    }

    /// 追加一个读取时会失败的损坏单元
    pub fn push_corrupt(&mut self, reason: impl Into<String>) {
        self.entries.push(Entry::Corrupt(reason.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unit_seconds(&self, unit: &CompressedUnit) -> Option<f64> {
        let track = self.tracks.iter().find(|t| t.id == unit.track_id)?;
        unit.pts.map(|pts| track.time_base.ticks_to_seconds(pts))
    }
}

impl DemuxerSource for MemoryDemuxer {
    fn read_unit(&mut self) -> Result<Option<CompressedUnit>> {
        while let Some(entry) = self.entries.get(self.cursor) {
            self.cursor += 1;
            match entry {
                Entry::Unit(unit) if self.selection.contains(unit.track_id) => {
                    return Ok(Some(unit.clone()));
                }
                Entry::Unit(_) => {}
                Entry::Corrupt(reason) => {
                    return Err(PlayerError::Other(format!("损坏的数据单元: {}", reason)));
                }
            }
        }
        Ok(None)
    }

    fn seek(&mut self, target_second: f64) -> Result<()> {
        let mut landing = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            let Entry::Unit(unit) = entry else { continue };
            if Some(unit.track_id) != self.selection.video || !unit.keyframe {
                continue;
            }
            match self.unit_seconds(unit) {
                Some(t) if t <= target_second + 1e-9 => landing = index,
                _ => {}
            }
        }
        info!("{} seek 到 {:.3}s，落点单元 #{}", self.label, target_second, landing);
        self.cursor = landing;
        Ok(())
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
        format!("Memory Demuxer: {} ({} 个单元)", self.label, self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rational;

    fn demuxer() -> MemoryDemuxer {
        let tracks = vec![
            TrackInfo::video(0, 2, 2, Rational::new(1, 10), Rational::new(10, 1)),
            TrackInfo::subtitle(1, Rational::new(1, 10)),
            TrackInfo::subtitle(2, Rational::new(1, 10)),
        ];
        let mut demuxer = MemoryDemuxer::new(tracks, 1.0).unwrap();
        for i in 0..10 {
            demuxer.push_unit(CompressedUnit::new(0, vec![0; 16], i, 1).with_keyframe(i % 4 == 0));
            demuxer.push_unit(CompressedUnit::new(2, b"ignored".to_vec(), i, 1));
        }
        demuxer
    }

    #[test]
    fn test_requires_video_track() {
        let tracks = vec![TrackInfo::audio(0, 48000, 2)];
        assert!(matches!(
            MemoryDemuxer::new(tracks, 1.0),
            Err(PlayerError::NoVideoStream)
        ));
    }

    #[test]
    fn test_skips_unselected_tracks() {
        let mut demuxer = demuxer();
        let mut count = 0;
        while let Some(unit) = demuxer.read_unit().unwrap() {
            assert_eq!(unit.track_id, 0);
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[test]
    fn test_seek_lands_on_previous_keyframe() {
        let mut demuxer = demuxer();
        demuxer.seek(0.6).unwrap();
        let unit = demuxer.read_unit().unwrap().unwrap();
        assert_eq!(unit.pts, Some(4));

        demuxer.seek(0.0).unwrap();
        assert_eq!(demuxer.read_unit().unwrap().unwrap().pts, Some(0));
    }

    #[test]
    fn test_corrupt_entry_is_recoverable() {
        let tracks = vec![TrackInfo::video(0, 1, 1, Rational::new(1, 10), Rational::new(10, 1))];
        let mut demuxer = MemoryDemuxer::new(tracks, 0.2).unwrap();
        demuxer.push_corrupt("bad crc");
        demuxer.push_unit(CompressedUnit::new(0, vec![0; 4], 0, 1));

        assert!(demuxer.read_unit().is_err());
        assert!(demuxer.read_unit().unwrap().is_some());
        assert!(demuxer.read_unit().unwrap().is_none());
    }
}
