use crate::core::{MediaInfo, PlayStatus, PlaybackState};
use log::{debug, warn};

/// 时长未知时 seek 目标的上限（秒），保证计数器换算不溢出
const MAX_SEEK_SECONDS: f64 = 1.0e9;

/// 播放时钟 - 保存调度计数器和播放/暂停/seek 请求
///
/// 时钟本身不会推进任何计数，只由调度器在 tick 内读写；
/// 宿主通过 `request_seek` / `set_play_status` 表达意图。
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: PlaybackState,
    avg_frame_rate: Option<f64>,
    nominal_frame_rate: Option<f64>,
    resume_status: PlayStatus, // seek 完成后恢复的状态
    volume: f32,
    wall_seconds: f64,         // 累计墙钟时间（仅统计）
}

impl PlaybackClock {
    /// 初始状态为 Playing：第一个 tick 总会解码，在拿到第一帧之前不呈现任何内容
    pub fn new(info: &MediaInfo) -> Self {
        let state = PlaybackState {
            duration_second: info.duration.max(0.0),
            ..Default::default()
        };
        Self {
            state,
            avg_frame_rate: info.avg_frame_rate.and_then(|r| r.to_f64()),
            nominal_frame_rate: info.nominal_frame_rate.and_then(|r| r.to_f64()),
            resume_status: PlayStatus::Playing,
            volume: 1.0,
            wall_seconds: 0.0,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlayStatus {
        self.state.play_status
    }

    pub fn current_second(&self) -> f64 {
        self.state.current_second
    }

    pub fn duration_second(&self) -> f64 {
        self.state.duration_second
    }

    /// 源帧率：优先容器平均帧率，其次编解码器标称帧率，都未知时返回 None
    pub fn source_frame_rate(&self) -> Option<f64> {
        [self.avg_frame_rate, self.nominal_frame_rate]
            .into_iter()
            .flatten()
            .find(|fps| fps.is_finite() && *fps > 0.0)
    }

    /// 请求 seek（下一次 tick 执行）
    pub fn request_seek(&mut self, second: f64) {
        if self.state.play_status != PlayStatus::Seeking {
            self.resume_status = self.state.play_status;
        }
        self.state.play_status = PlayStatus::Seeking;
        self.state.pending_seek_target = Some(second);
        debug!("Seek 请求: {:.3}s（恢复状态 {:?}）", second, self.resume_status);
    }

    /// 设置播放/暂停
    ///
    /// seek 进行中时只记录意图，seek 完成后生效。
    pub fn set_play_status(&mut self, status: PlayStatus) {
        match status {
            PlayStatus::Seeking => warn!("忽略直接设置 Seeking 状态，请使用 request_seek"),
            _ if self.state.play_status == PlayStatus::Seeking => self.resume_status = status,
            _ => self.state.play_status = status,
        }
    }

    pub fn toggle_pause(&mut self) {
        let current = if self.state.play_status == PlayStatus::Seeking {
            self.resume_status
        } else {
            self.state.play_status
        };
        let next = if current == PlayStatus::Paused {
            PlayStatus::Playing
        } else {
            PlayStatus::Paused
        };
        self.set_play_status(next);
    }

    /// 是否处于暂停意图（包括 seek 完成后将恢复为暂停）
    pub fn is_paused(&self) -> bool {
        match self.state.play_status {
            PlayStatus::Paused => true,
            PlayStatus::Seeking => self.resume_status == PlayStatus::Paused,
            PlayStatus::Playing => false,
        }
    }

    /// 记录一次显示周期经过的墙钟时间
    pub fn tick(&mut self, elapsed_seconds: f64) {
        if elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
            self.wall_seconds += elapsed_seconds;
        }
    }

    pub fn wall_seconds(&self) -> f64 {
        self.wall_seconds
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// 把 seek 目标限制在 [0, duration]，时长未知时上限为 `MAX_SEEK_SECONDS`
    pub fn clamp_seek_target(&self, second: f64) -> f64 {
        if second.is_nan() {
            return 0.0;
        }
        let upper = if self.state.duration_second > 0.0 {
            self.state.duration_second.min(MAX_SEEK_SECONDS)
        } else {
            MAX_SEEK_SECONDS
        };
        second.clamp(0.0, upper)
    }

    pub(crate) fn take_pending_seek(&mut self) -> Option<f64> {
        self.state.pending_seek_target.take()
    }

    /// seek 完成：按目标位置重新推导计数器，让比例立即与新位置一致
    pub(crate) fn finish_seek(&mut self, target: f64, display_frequency: f64) {
        self.state.video_frame_count = self
            .source_frame_rate()
            .map_or(0, |fps| (target * fps).floor() as u64);
        self.state.display_tick_count = (target * display_frequency).floor() as u64;
        self.state.current_second = target;
        self.state.play_status = self.resume_status;
    }

    /// 接受了一个视频解码单元
    pub(crate) fn record_video_frame(&mut self, pts: Option<f64>) {
        self.state.video_frame_count = self.state.video_frame_count.saturating_add(1);
        match self.source_frame_rate() {
            Some(fps) => self.state.current_second = self.state.video_frame_count as f64 / fps,
            None => {
                if let Some(pts) = pts {
                    self.state.current_second = pts;
                }
            }
        }
    }

    /// 呈现了一帧（包括重复帧）
    pub(crate) fn record_presentation(&mut self) {
        self.state.display_tick_count = self.state.display_tick_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rational;

    fn info(duration: f64, avg: Option<Rational>, nominal: Option<Rational>) -> MediaInfo {
        MediaInfo {
            duration,
            avg_frame_rate: avg,
            nominal_frame_rate: nominal,
            ..Default::default()
        }
    }

    #[test]
    fn test_frame_rate_prefers_container_average() {
        let clock = PlaybackClock::new(&info(10.0, Some(Rational::new(25, 1)), Some(Rational::new(50, 1))));
        assert_eq!(clock.source_frame_rate(), Some(25.0));
    }

    #[test]
    fn test_frame_rate_falls_back_to_nominal() {
        let clock = PlaybackClock::new(&info(10.0, Some(Rational::new(0, 1)), Some(Rational::new(24, 1))));
        assert_eq!(clock.source_frame_rate(), Some(24.0));

        let clock = PlaybackClock::new(&info(10.0, Some(Rational::new(1, 0)), None));
        assert_eq!(clock.source_frame_rate(), None);
    }

    #[test]
    fn test_seek_preserves_pause_intent() {
        let mut clock = PlaybackClock::new(&info(10.0, Some(Rational::new(30, 1)), None));
        clock.set_play_status(PlayStatus::Paused);
        clock.request_seek(4.0);
        assert_eq!(clock.status(), PlayStatus::Seeking);
        assert!(clock.is_paused());

        let target = clock.take_pending_seek().unwrap();
        clock.finish_seek(target, 60.0);
        assert_eq!(clock.status(), PlayStatus::Paused);
        assert_eq!(clock.state().video_frame_count, 120);
        assert_eq!(clock.state().display_tick_count, 240);
        assert_eq!(clock.current_second(), 4.0);
    }

    #[test]
    fn test_play_command_during_seek_applies_after_seek() {
        let mut clock = PlaybackClock::new(&info(10.0, Some(Rational::new(30, 1)), None));
        clock.request_seek(1.0);
        clock.set_play_status(PlayStatus::Paused);
        assert_eq!(clock.status(), PlayStatus::Seeking);
        clock.take_pending_seek();
        clock.finish_seek(1.0, 60.0);
        assert_eq!(clock.status(), PlayStatus::Paused);
    }

    #[test]
    fn test_clamp_seek_target() {
        let clock = PlaybackClock::new(&info(10.0, None, None));
        assert_eq!(clock.clamp_seek_target(-3.0), 0.0);
        assert_eq!(clock.clamp_seek_target(25.0), 10.0);
        assert_eq!(clock.clamp_seek_target(f64::NAN), 0.0);

        assert_eq!(clock.clamp_seek_target(f64::INFINITY), 10.0);
        assert_eq!(clock.clamp_seek_target(f64::NEG_INFINITY), 0.0);

        let unknown = PlaybackClock::new(&info(0.0, None, None));
        assert_eq!(unknown.clamp_seek_target(25.0), 25.0);
        assert_eq!(unknown.clamp_seek_target(f64::INFINITY), MAX_SEEK_SECONDS);
        assert_eq!(unknown.clamp_seek_target(1e300), MAX_SEEK_SECONDS);
    }

    #[test]
    fn test_huge_seek_keeps_counters_representable() {
        let mut clock = PlaybackClock::new(&info(0.0, Some(Rational::new(30, 1)), None));
        let target = clock.clamp_seek_target(f64::INFINITY);
        clock.finish_seek(target, 240.0);
        assert!(clock.state().display_tick_count < u64::MAX / 2);
        assert!(clock.state().video_frame_count < u64::MAX / 2);

        clock.record_presentation();
        clock.record_video_frame(None);
        assert_eq!(clock.state().video_frame_count, 30_000_000_001);
    }

    #[test]
    fn test_counters_saturate() {
        let mut clock = PlaybackClock::new(&info(0.0, None, None));
        clock.state.display_tick_count = u64::MAX;
        clock.state.video_frame_count = u64::MAX;
        clock.record_presentation();
        clock.record_video_frame(None);
        assert_eq!(clock.state().display_tick_count, u64::MAX);
        assert_eq!(clock.state().video_frame_count, u64::MAX);
    }

    #[test]
    fn test_record_video_frame_without_rate_uses_pts() {
        let mut clock = PlaybackClock::new(&info(0.0, None, None));
        clock.record_video_frame(Some(1.25));
        assert_eq!(clock.state().video_frame_count, 1);
        assert_eq!(clock.current_second(), 1.25);
    }

    #[test]
    fn test_tick_accumulates_wall_time_only() {
        let mut clock = PlaybackClock::new(&info(10.0, Some(Rational::new(30, 1)), None));
        clock.tick(0.5);
        clock.tick(-1.0);
        assert_eq!(clock.wall_seconds(), 0.5);
        assert_eq!(clock.state().display_tick_count, 0);
    }

    #[test]
    fn test_toggle_pause() {
        let mut clock = PlaybackClock::new(&info(10.0, None, None));
        clock.toggle_pause();
        assert_eq!(clock.status(), PlayStatus::Paused);
        clock.toggle_pause();
        assert_eq!(clock.status(), PlayStatus::Playing);
    }
}
