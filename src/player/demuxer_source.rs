use crate::core::{CompressedUnit, MediaInfo, MediaKind, Result, TrackInfo};

/// 选中的轨道（每种媒体类型至多一个）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSelection {
    pub video: Option<usize>,
    pub audio: Option<usize>,
    pub subtitle: Option<usize>,
}

impl TrackSelection {
    /// 按出现顺序为每种类型选第一个轨道（多个字幕轨时只取第一个）
    pub fn first_of_each<'a>(tracks: impl IntoIterator<Item = &'a TrackInfo>) -> Self {
        let mut selection = Self::default();
        for track in tracks {
            let slot = selection.slot_mut(track.kind());
            if slot.is_none() {
                *slot = Some(track.id);
            }
        }
        selection
    }

    fn slot_mut(&mut self, kind: MediaKind) -> &mut Option<usize> {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
            MediaKind::Subtitle => &mut self.subtitle,
        }
    }

    /// 轨道 id 对应的媒体类型，未选中返回 None
    pub fn kind_of(&self, track_id: usize) -> Option<MediaKind> {
        if self.video == Some(track_id) {
            Some(MediaKind::Video)
        } else if self.audio == Some(track_id) {
            Some(MediaKind::Audio)
        } else if self.subtitle == Some(track_id) {
            Some(MediaKind::Subtitle)
        } else {
            None
        }
    }

    pub fn contains(&self, track_id: usize) -> bool {
        self.kind_of(track_id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> {
        [self.video, self.audio, self.subtitle].into_iter().flatten()
    }
}

/// Demuxer 数据源抽象接口
///
/// 不同的媒体源（FFmpeg 容器、内存中的单元序列等）实现这个接口
pub trait DemuxerSource: Send {
    /// 读取下一个压缩单元（只返回选中轨道的单元）
    ///
    /// 返回：
    /// - Ok(Some(unit)): 成功读取一个单元
    /// - Ok(None): 到达流末尾
    /// - Err(e): 本次读取失败，可以继续读取下一个
    fn read_unit(&mut self) -> Result<Option<CompressedUnit>>;

    /// Seek 到目标时间（秒）之前最近的可解码点
    fn seek(&mut self, target_second: f64) -> Result<()>;

    /// 获取媒体信息
    fn media_info(&self) -> &MediaInfo;

    /// 所有轨道（包括未选中的）
    fn tracks(&self) -> &[TrackInfo];

    /// 选中的轨道
    fn selection(&self) -> TrackSelection;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;

    /// 按 id 查找选中的轨道
    fn selected_track(&self, kind: MediaKind) -> Option<&TrackInfo> {
        let selection = self.selection();
        let id = match kind {
            MediaKind::Video => selection.video,
            MediaKind::Audio => selection.audio,
            MediaKind::Subtitle => selection.subtitle,
        }?;
        self.tracks().iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rational;

    #[test]
    fn test_first_subtitle_track_wins() {
        let tracks = vec![
            TrackInfo::subtitle(0, Rational::new(1, 1000)),
            TrackInfo::video(1, 16, 16, Rational::new(1, 30), Rational::new(30, 1)),
            TrackInfo::subtitle(2, Rational::new(1, 1000)),
            TrackInfo::audio(3, 48000, 2),
            TrackInfo::audio(4, 44100, 1),
        ];
        let selection = TrackSelection::first_of_each(&tracks);
        assert_eq!(selection.video, Some(1));
        assert_eq!(selection.audio, Some(3));
        assert_eq!(selection.subtitle, Some(0));
        assert!(!selection.contains(2));
        assert_eq!(selection.kind_of(3), Some(MediaKind::Audio));
        assert_eq!(selection.ids().collect::<Vec<_>>(), vec![1, 3, 0]);
    }
}
