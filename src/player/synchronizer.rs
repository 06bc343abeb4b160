use crate::core::{
    DecodedUnit, FrameAction, PlayStatus, PlaybackClock, PlaybackStats, PlayerCommand,
    PlayerConfig, Result, SharedFrame, TickOutcome, VideoFrame,
};
use crate::player::decode_thread::DecodeThread;
use crate::player::pipeline::{MediaPipeline, UnitSource};
use crate::player::sink::{AudioSink, VideoSink};
use crate::player::subtitle::{SubtitleCue, SubtitleTimeline};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, trace};
use std::sync::Arc;

/// seek 之后跳过落点关键帧到目标之间的单元
#[derive(Debug, Clone, Copy)]
struct SeekSkip {
    video_before: f64, // 早于这个时间的视频帧不计数
    target: f64,
}

/// 同步调度器 - 每个显示周期调用一次 `tick`
///
/// 计数器约定：`ticks = display_tick_count + 1` 为本次要产出的显示周期，
/// `video_frame_count * display_frequency < ticks * fps` 时视频落后，需要继续拉取。
/// 拉到的帧在拉取后不再落后时呈现，否则丢弃；不落后时重复上一帧。
pub struct Synchronizer {
    source: Box<dyn UnitSource>,
    video_sink: Box<dyn VideoSink>,
    audio_sink: Box<dyn AudioSink>,
    clock: PlaybackClock,
    subtitles: SubtitleTimeline,
    current_frame: Option<SharedFrame>,
    display_frequency: f64,
    end_of_stream: bool,
    seek_skip: Option<SeekSkip>,
    skipped_frame: Option<VideoFrame>, // seek 后最近跳过的帧，落点之后没有帧时呈现它
    stats: PlaybackStats,
    command_tx: Sender<PlayerCommand>,
    command_rx: Receiver<PlayerCommand>,
    synced_paused: Option<bool>,
    synced_volume: Option<f32>,
}

impl Synchronizer {
    pub fn new(
        source: Box<dyn UnitSource>,
        video_sink: Box<dyn VideoSink>,
        audio_sink: Box<dyn AudioSink>,
        config: &PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let info = source.media_info().clone();
        let mut clock = PlaybackClock::new(&info);
        clock.set_volume(config.volume);

        match clock.source_frame_rate() {
            Some(fps) => info!(
                "🎞 同步调度器: {} | {:.3} fps → {:.3} Hz, 时长 {:.3}s",
                source.description(),
                fps,
                config.display_frequency,
                info.duration
            ),
            None => info!(
                "🎞 同步调度器: {} | 帧率未知，每个周期取一帧 → {:.3} Hz",
                source.description(),
                config.display_frequency
            ),
        }

        let (command_tx, command_rx) = unbounded();
        Ok(Self {
            source,
            video_sink,
            audio_sink,
            clock,
            subtitles: SubtitleTimeline::new(),
            current_frame: None,
            display_frequency: config.display_frequency,
            end_of_stream: false,
            seek_skip: None,
            skipped_frame: None,
            stats: PlaybackStats::default(),
            command_tx,
            command_rx,
            synced_paused: None,
            synced_volume: None,
        })
    }

    /// 从解码管线创建，按配置决定是否在独立线程中解码
    pub fn from_pipeline(
        pipeline: MediaPipeline,
        video_sink: Box<dyn VideoSink>,
        audio_sink: Box<dyn AudioSink>,
        config: &PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let source: Box<dyn UnitSource> = if config.threaded_decode {
            Box::new(DecodeThread::start(Box::new(pipeline), config.queue_capacity))
        } else {
            Box::new(pipeline)
        };
        Self::new(source, video_sink, audio_sink, config)
    }

    /// 一个显示周期
    pub fn tick(&mut self) -> TickOutcome {
        self.apply_pending_commands();
        self.sync_audio_sink();

        if let Some(target) = self.clock.take_pending_seek() {
            self.apply_seek(target);
            self.sync_audio_sink();
            return TickOutcome::new(FrameAction::Seek);
        }

        if self.clock.status() != PlayStatus::Playing {
            return TickOutcome::new(FrameAction::Paused);
        }

        let fps = self.clock.source_frame_rate();
        let mut outcome = TickOutcome::new(FrameAction::Idle);
        let mut fresh: Option<SharedFrame> = None;
        let mut new_cues = Vec::new();

        if !self.end_of_stream {
            loop {
                let behind = match fps {
                    Some(fps) => self.is_behind(fps),
                    None => fresh.is_none(),
                };
                if !behind {
                    break;
                }

                match self.source.pull() {
                    DecodedUnit::Video(frame) => {
                        if self.skip_video(frame.pts) {
                            self.skipped_frame = Some(frame);
                            continue;
                        }
                        self.clock.record_video_frame(frame.pts);
                        let due = fps.map_or(true, |fps| !self.is_behind(fps));
                        if due {
                            fresh = Some(Arc::new(frame));
                        } else {
                            trace!("丢弃帧 #{}", self.clock.state().video_frame_count);
                            outcome.frames_dropped += 1;
                        }
                    }
                    DecodedUnit::Audio(frame) => {
                        if self.skip_audio(frame.pts, frame.data.len(), frame.sample_rate, frame.channels) {
                            continue;
                        }
                        self.audio_sink.write(frame);
                        outcome.audio_units += 1;
                    }
                    DecodedUnit::Subtitle(frame) => {
                        let pts = frame.pts;
                        let mut cue = SubtitleCue::from(frame);
                        if let (Some(skip), Some(pts)) = (self.seek_skip, pts) {
                            // 目标之前开始的字幕只显示剩余部分
                            cue.remaining -= (skip.target - pts).max(0.0);
                        }
                        new_cues.push(cue);
                    }
                    DecodedUnit::Empty => {
                        trace!("解码队列暂时为空，保持当前帧");
                        break;
                    }
                    DecodedUnit::EndOfStream => {
                        info!(
                            "📄 播放到达流末尾（{} 帧），保持最后一帧",
                            self.clock.state().video_frame_count
                        );
                        self.end_of_stream = true;
                        if let Some(frame) = self.adopt_skipped_frame(fresh.is_some()) {
                            fresh = Some(Arc::new(frame));
                        }
                        break;
                    }
                }
            }
        }

        if let Some(frame) = fresh {
            // 字幕倒计时由新呈现的视频帧驱动
            let step = fps.map_or(1.0 / self.display_frequency, |fps| 1.0 / fps);
            self.subtitles.advance(step);
            self.current_frame = Some(frame);
            outcome.action = FrameAction::Advance;
        }

        for cue in new_cues {
            debug!("💬 字幕: {:?} ({:.3}s)", cue.text, cue.remaining);
            self.subtitles.push(cue);
            outcome.cues_added += 1;
        }

        match &self.current_frame {
            Some(frame) => {
                self.video_sink.present(frame);
                self.clock.record_presentation();
                if outcome.action == FrameAction::Advance {
                    self.stats.frames_presented += 1;
                } else {
                    outcome.action = FrameAction::Hold;
                    self.stats.frames_held += 1;
                }
            }
            None => outcome.action = FrameAction::Idle,
        }

        outcome.end_of_stream = self.end_of_stream;
        self.stats.frames_dropped += u64::from(outcome.frames_dropped);
        self.stats.audio_units += u64::from(outcome.audio_units);
        self.stats.cues_added += u64::from(outcome.cues_added);
        outcome
    }

    /// 视频是否落后于显示（按即将产出的周期计算）
    fn is_behind(&self, fps: f64) -> bool {
        let state = self.clock.state();
        let ticks = state.display_tick_count.saturating_add(1) as f64;
        (state.video_frame_count as f64) * self.display_frequency < ticks * fps
    }

    fn skip_video(&mut self, pts: Option<f64>) -> bool {
        let Some(skip) = self.seek_skip else {
            return false;
        };
        match pts {
            Some(pts) if pts < skip.video_before => {
                trace!("跳过 seek 目标之前的帧 {:.3}s", pts);
                true
            }
            _ => {
                self.seek_skip = None;
                self.skipped_frame = None;
                false
            }
        }
    }

    /// seek 目标之后已经没有帧（例如 seek 到结尾）：改为呈现最后跳过的帧
    fn adopt_skipped_frame(&mut self, has_fresh: bool) -> Option<VideoFrame> {
        self.seek_skip.take()?;
        let frame = self.skipped_frame.take()?;
        if has_fresh || self.current_frame.is_some() {
            return None;
        }
        info!("📄 seek 目标之后没有视频帧，显示最后一帧 {:?}", frame.pts);
        Some(frame)
    }

    fn skip_audio(&self, pts: Option<f64>, samples: usize, sample_rate: u32, channels: u16) -> bool {
        match (self.seek_skip, pts) {
            (Some(skip), Some(pts)) if sample_rate > 0 && channels > 0 => {
                let seconds = samples as f64 / (f64::from(sample_rate) * f64::from(channels));
                pts + seconds <= skip.target + 1e-6
            }
            _ => false,
        }
    }

    fn apply_seek(&mut self, requested: f64) {
        let target = self.clock.clamp_seek_target(requested);
        info!("⏩ Seek: {:.3}s → {:.3}s", requested, target);

        if let Err(e) = self.source.seek(target) {
            error!("❌ Seek 失败: {}", e);
        }
        self.audio_sink.clear();
        self.subtitles.clear();
        self.current_frame = None;
        self.skipped_frame = None;
        self.end_of_stream = false;
        self.clock.finish_seek(target, self.display_frequency);

        let video_before = match self.clock.source_frame_rate() {
            Some(fps) => (self.clock.state().video_frame_count as f64 - 0.5) / fps,
            None => target - 1e-6,
        };
        self.seek_skip = Some(SeekSkip {
            video_before,
            target,
        });
        self.stats.seeks += 1;
    }

    fn apply_pending_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            self.apply_command(command);
        }
    }

    /// 立即应用一条宿主命令（状态变化在下一次 tick 生效）
    pub fn apply_command(&mut self, command: PlayerCommand) {
        debug!("收到命令: {:?}", command);
        match command {
            PlayerCommand::Play => self.clock.set_play_status(PlayStatus::Playing),
            PlayerCommand::Pause => self.clock.set_play_status(PlayStatus::Paused),
            PlayerCommand::TogglePause => self.clock.toggle_pause(),
            PlayerCommand::Seek(second) => self.clock.request_seek(second),
            PlayerCommand::SeekRelative(delta) => {
                let base = self
                    .clock
                    .state()
                    .pending_seek_target
                    .unwrap_or_else(|| self.clock.current_second());
                self.clock.request_seek(base + delta);
            }
            PlayerCommand::SetVolume(volume) => self.clock.set_volume(volume),
        }
    }

    /// 把暂停/音量同步到音频输出
    fn sync_audio_sink(&mut self) {
        let paused = self.clock.status() != PlayStatus::Playing;
        if self.synced_paused != Some(paused) {
            self.audio_sink.set_paused(paused);
            self.synced_paused = Some(paused);
        }
        let volume = self.clock.volume();
        if self.synced_volume != Some(volume) {
            self.audio_sink.set_volume(volume);
            self.synced_volume = Some(volume);
        }
    }

    /// 命令发送端，可以交给其他线程
    pub fn commands(&self) -> Sender<PlayerCommand> {
        self.command_tx.clone()
    }

    pub fn request_seek(&mut self, second: f64) {
        self.clock.request_seek(second);
    }

    pub fn set_play_status(&mut self, status: PlayStatus) {
        self.clock.set_play_status(status);
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    pub fn active_cues(&self) -> impl Iterator<Item = &SubtitleCue> + '_ {
        self.subtitles.active_cues()
    }

    pub fn subtitle_text(&self) -> String {
        self.subtitles.text()
    }

    pub fn current_frame(&self) -> Option<&SharedFrame> {
        self.current_frame.as_ref()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn display_frequency(&self) -> f64 {
        self.display_frequency
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn description(&self) -> String {
        self.source.description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AudioFrame, Rational, VideoFrame};
    use crate::player::test_pattern::TestPattern;
    use parking_lot::Mutex;

    /// 记录呈现的帧时间戳
    #[derive(Clone, Default)]
    struct RecordingVideo(Arc<Mutex<Vec<f64>>>);

    impl VideoSink for RecordingVideo {
        fn present(&mut self, frame: &SharedFrame) {
            self.0.lock().push(frame.pts.unwrap_or(-1.0));
        }
    }

    #[derive(Clone, Default)]
    struct RecordingAudio {
        units: Arc<Mutex<Vec<AudioFrame>>>,
        paused: Arc<Mutex<Vec<bool>>>,
        clears: Arc<Mutex<u32>>,
    }

    impl AudioSink for RecordingAudio {
        fn write(&mut self, frame: AudioFrame) {
            self.units.lock().push(frame);
        }

        fn set_paused(&mut self, paused: bool) {
            self.paused.lock().push(paused);
        }

        fn clear(&mut self) {
            *self.clears.lock() += 1;
        }
    }

    struct Harness {
        sync: Synchronizer,
        video: RecordingVideo,
        audio: RecordingAudio,
        fps: f64,
    }

    impl Harness {
        fn new(pattern: TestPattern, display_hz: f64) -> Self {
            let config = PlayerConfig::default().with_display_frequency(display_hz);
            let demuxer = pattern.build().unwrap();
            let pipeline = MediaPipeline::with_raw_decoders(Box::new(demuxer), &config).unwrap();
            let video = RecordingVideo::default();
            let audio = RecordingAudio::default();
            let sync = Synchronizer::from_pipeline(
                pipeline,
                Box::new(video.clone()),
                Box::new(audio.clone()),
                &config,
            )
            .unwrap();
            let fps = sync.clock().source_frame_rate().unwrap_or(0.0);
            Self { sync, video, audio, fps }
        }

        /// 呈现过的帧序号
        fn presented(&self) -> Vec<i64> {
            self.video
                .0
                .lock()
                .iter()
                .map(|pts| (pts * self.fps).round() as i64)
                .collect()
        }

        fn run(&mut self, ticks: usize) -> Vec<TickOutcome> {
            (0..ticks).map(|_| self.sync.tick()).collect()
        }
    }

    #[test]
    fn test_30fps_on_60hz_repeats_every_frame_once() {
        let mut h = Harness::new(TestPattern::new(30, 2.0), 60.0);
        let outcomes = h.run(20);

        assert_eq!(h.presented(), vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9]);
        assert!(outcomes.iter().all(|o| o.frames_dropped == 0));
        assert_eq!(outcomes[0].action, FrameAction::Advance);
        assert_eq!(outcomes[1].action, FrameAction::Hold);
        assert_eq!(h.sync.stats().frames_presented, 10);
        assert_eq!(h.sync.stats().frames_held, 10);
    }

    #[test]
    fn test_60fps_on_30hz_drops_odd_frames() {
        let mut h = Harness::new(TestPattern::new(60, 2.0), 30.0);
        let outcomes = h.run(5);

        // 帧号从 1 开始计：2, 4, 6 …（0 起为 1, 3, 5 …）
        assert_eq!(h.presented(), vec![1, 3, 5, 7, 9]);
        assert!(outcomes.iter().all(|o| o.frames_dropped == 1));
        assert_eq!(h.sync.stats().frames_dropped, 5);
    }

    #[test]
    fn test_drift_stays_within_one_frame() {
        for (fps, hz) in [(24, 60.0), (25, 60.0), (30, 144.0), (50, 60.0), (60, 59.94), (120, 60.0)] {
            let mut h = Harness::new(TestPattern::new(fps, 4.0), hz);
            for _ in 0..(hz * 2.0) as usize {
                h.sync.tick();
                let state = h.sync.clock().state();
                let video_time = state.video_frame_count as f64 / fps as f64;
                let display_time = state.display_tick_count as f64 / hz;
                let drift = video_time - display_time;
                assert!(
                    drift >= -1e-9 && drift < 1.0 / fps as f64 + 1e-9,
                    "{} fps @ {} Hz 漂移 {}",
                    fps,
                    hz,
                    drift
                );
            }
        }
    }

    #[test]
    fn test_audio_is_never_dropped() {
        let mut h = Harness::new(TestPattern::new(60, 1.0).with_audio(48000, 2), 24.0);
        while !h.sync.is_end_of_stream() {
            h.sync.tick();
        }
        assert_eq!(h.audio.units.lock().len(), 60);
        assert_eq!(h.sync.stats().audio_units, 60);
        assert!(h.sync.stats().frames_dropped > 0);
    }

    #[test]
    fn test_subtitle_visible_for_ceil_duration_frames() {
        // 0.1s @ 30fps = 3 帧；0.11s = ceil(3.3) = 4 帧
        for (duration, expected) in [(0.1, 3), (0.11, 4)] {
            let mut h = Harness::new(TestPattern::new(30, 1.0).with_cue(0.2, duration, "cue"), 60.0);
            let mut frames_with_cue = 0;
            for _ in 0..120 {
                let outcome = h.sync.tick();
                if outcome.action == FrameAction::Advance && h.sync.active_cues().count() > 0 {
                    frames_with_cue += 1;
                }
            }
            assert_eq!(frames_with_cue, expected, "时长 {}", duration);
        }
    }

    #[test]
    fn test_subtitle_appears_with_its_frame() {
        let mut h = Harness::new(TestPattern::new(10, 1.0).with_cue(0.3, 0.5, "hello"), 10.0);
        h.run(3);
        assert_eq!(h.sync.active_cues().count(), 0);
        let outcome = h.sync.tick();
        assert_eq!(outcome.cues_added, 1);
        assert_eq!(h.sync.subtitle_text(), "hello");
        assert_eq!(h.presented().last(), Some(&3));
    }

    #[test]
    fn test_seek_clamps_and_sets_current_second() {
        let mut h = Harness::new(TestPattern::new(30, 2.0), 60.0);
        h.run(5);

        h.sync.request_seek(-4.0);
        assert_eq!(h.sync.tick().action, FrameAction::Seek);
        assert_eq!(h.sync.clock().current_second(), 0.0);
        assert_eq!(h.sync.clock().status(), PlayStatus::Playing);

        h.sync.request_seek(99.0);
        h.sync.tick();
        assert_eq!(h.sync.clock().current_second(), 2.0);

        h.sync.request_seek(1.25);
        h.sync.tick();
        let current = h.sync.clock().current_second();
        assert!((current - 1.25).abs() < 1.0 / 30.0);
    }

    #[test]
    fn test_seek_resumes_from_target_frame() {
        let pattern = TestPattern::new(30, 4.0).with_keyframe_interval(30).with_audio(48000, 2);
        let mut h = Harness::new(pattern, 60.0);
        h.run(10);
        let audio_before = h.audio.units.lock().len();

        h.sync.request_seek(1.5);
        h.sync.tick();
        assert!(h.sync.current_frame().is_none());
        assert_eq!(*h.audio.clears.lock(), 1);

        h.video.0.lock().clear();
        let outcomes = h.run(4);
        // 落点关键帧在 1.0s，1.0–1.5s 之间的帧被跳过
        assert_eq!(h.presented(), vec![45, 45, 46, 46]);
        assert_eq!(outcomes[0].action, FrameAction::Advance);
        assert!(outcomes.iter().all(|o| o.frames_dropped == 0));
        assert_eq!(h.sync.clock().state().video_frame_count, 47);

        // 跳过目标之前的音频
        let audio = h.audio.units.lock();
        let first_after = &audio[audio_before];
        assert!(first_after.pts.unwrap() >= 1.5 - 1e-9);
    }

    #[test]
    fn test_seek_preserves_pause() {
        let mut h = Harness::new(TestPattern::new(30, 2.0), 60.0);
        h.run(4);
        h.sync.set_play_status(PlayStatus::Paused);
        h.sync.request_seek(1.0);
        h.sync.tick();
        assert_eq!(h.sync.clock().status(), PlayStatus::Paused);
        assert_eq!(h.sync.tick().action, FrameAction::Paused);
    }

    #[test]
    fn test_pause_freezes_counters_and_cues() {
        let mut h = Harness::new(TestPattern::new(30, 2.0).with_cue(0.0, 1.0, "x"), 60.0);
        h.run(6);
        let before = h.sync.clock().state().clone();
        let remaining: Vec<f64> = h.sync.active_cues().map(|c| c.remaining).collect();

        h.sync.apply_command(PlayerCommand::Pause);
        for _ in 0..30 {
            assert_eq!(h.sync.tick().action, FrameAction::Paused);
        }
        let paused = h.sync.clock().state();
        assert_eq!(paused.display_tick_count, before.display_tick_count);
        assert_eq!(paused.video_frame_count, before.video_frame_count);
        assert_eq!(h.sync.active_cues().map(|c| c.remaining).collect::<Vec<_>>(), remaining);
        assert_eq!(h.audio.paused.lock().last(), Some(&true));

        // 恢复后没有补偿性跳帧
        h.sync.apply_command(PlayerCommand::Play);
        let presented_before = h.presented().len();
        let outcomes = h.run(4);
        assert!(outcomes.iter().all(|o| o.frames_dropped == 0));
        assert_eq!(&h.presented()[presented_before..], &[3, 3, 4, 4]);
        assert_eq!(h.audio.paused.lock().last(), Some(&false));
    }

    #[test]
    fn test_end_of_stream_holds_last_frame() {
        let mut h = Harness::new(TestPattern::new(30, 0.2), 60.0);
        let outcomes = h.run(20);
        assert!(outcomes.last().unwrap().end_of_stream);
        assert_eq!(outcomes.last().unwrap().action, FrameAction::Hold);
        assert_eq!(h.presented().last(), Some(&5));
        assert_eq!(h.presented().len(), 20);

        // 流结束后仍可以 seek
        h.sync.request_seek(0.0);
        h.sync.tick();
        assert!(!h.sync.is_end_of_stream());
        assert_eq!(h.sync.tick().action, FrameAction::Advance);
    }

    #[test]
    fn test_seek_past_end_shows_last_frame() {
        let mut h = Harness::new(TestPattern::new(30, 1.0).with_keyframe_interval(15), 60.0);
        h.run(10);

        h.sync.request_seek(99.0);
        assert_eq!(h.sync.tick().action, FrameAction::Seek);
        assert_eq!(h.sync.clock().current_second(), 1.0);

        let outcomes = h.run(5);
        assert_eq!(outcomes[0].action, FrameAction::Advance);
        assert!(outcomes[1..].iter().all(|o| o.action == FrameAction::Hold && o.end_of_stream));
        let pts = h.sync.current_frame().unwrap().pts.unwrap();
        assert!((pts - 29.0 / 30.0).abs() < 1e-9);
        assert_eq!(h.presented().last(), Some(&29));

        // 之后仍可以 seek 回去继续播放
        h.sync.request_seek(0.5);
        h.sync.tick();
        assert_eq!(h.sync.tick().action, FrameAction::Advance);
        assert_eq!(h.presented().last(), Some(&15));
    }

    /// 时长未知的流上 seek 到无穷远不会让计数器溢出
    #[test]
    fn test_unbounded_seek_without_duration() {
        use crate::core::{CompressedUnit, TrackInfo};
        use crate::player::memory_demuxer::MemoryDemuxer;

        let track = TrackInfo::video(0, 1, 1, Rational::new(1, 30), Rational::new(30, 1));
        let mut demuxer = MemoryDemuxer::new(vec![track], 0.0).unwrap();
        for k in 0..30 {
            demuxer.push_unit(CompressedUnit::new(0, vec![0; 4], k, 1));
        }

        let config = PlayerConfig::default();
        let pipeline = MediaPipeline::with_raw_decoders(Box::new(demuxer), &config).unwrap();
        let video = RecordingVideo::default();
        let mut sync = Synchronizer::from_pipeline(
            pipeline,
            Box::new(video.clone()),
            Box::new(RecordingAudio::default()),
            &config,
        )
        .unwrap();

        assert_eq!(sync.tick().action, FrameAction::Advance);
        sync.request_seek(f64::INFINITY);
        assert_eq!(sync.tick().action, FrameAction::Seek);
        assert!(sync.clock().current_second().is_finite());

        let actions: Vec<FrameAction> = (0..5).map(|_| sync.tick().action).collect();
        assert_eq!(actions[0], FrameAction::Advance);
        assert!(actions[1..].iter().all(|a| *a == FrameAction::Hold));
        let last = *video.0.lock().last().unwrap();
        assert!((last - 29.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_frame_rate_takes_one_frame_per_tick() {
        let mut h = Harness::new(TestPattern::new(30, 1.0).without_frame_rate(), 60.0);
        h.fps = 30.0;
        h.run(3);
        assert_eq!(h.presented(), vec![0, 1, 2]);
        assert!((h.sync.clock().current_second() - 2.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_commands_from_another_thread() {
        let mut h = Harness::new(TestPattern::new(30, 2.0), 60.0);
        let commands = h.sync.commands();
        std::thread::spawn(move || {
            commands.send(PlayerCommand::SetVolume(0.25)).unwrap();
            commands.send(PlayerCommand::Seek(1.0)).unwrap();
            commands.send(PlayerCommand::SeekRelative(0.5)).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(h.sync.tick().action, FrameAction::Seek);
        assert_eq!(h.sync.clock().volume(), 0.25);
        assert_eq!(h.sync.clock().current_second(), 1.5);
    }

    /// 解码失败的单元被跳过，不中断播放
    #[test]
    fn test_decode_failure_is_skipped() {
        use crate::core::{CompressedUnit, TrackInfo};
        use crate::player::memory_demuxer::MemoryDemuxer;

        let track = TrackInfo::video(0, 1, 1, Rational::new(1, 10), Rational::new(10, 1));
        let mut demuxer = MemoryDemuxer::new(vec![track], 0.3).unwrap();
        demuxer.push_unit(CompressedUnit::new(0, vec![0; 4], 0, 1));
        demuxer.push_unit(CompressedUnit::new(0, vec![0; 7], 1, 1));
        demuxer.push_corrupt("crc");
        demuxer.push_unit(CompressedUnit::new(0, vec![0; 4], 2, 1));

        let config = PlayerConfig::default().with_display_frequency(10.0);
        let pipeline = MediaPipeline::with_raw_decoders(Box::new(demuxer), &config).unwrap();
        let video = RecordingVideo::default();
        let mut sync = Synchronizer::from_pipeline(
            pipeline,
            Box::new(video.clone()),
            Box::new(RecordingAudio::default()),
            &config,
        )
        .unwrap();

        for _ in 0..4 {
            sync.tick();
        }
        let presented: Vec<i64> = video.0.lock().iter().map(|pts| (pts * 10.0).round() as i64).collect();
        assert_eq!(presented, vec![0, 2, 2, 2]);
        assert!(sync.is_end_of_stream());
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let demuxer = TestPattern::new(30, 1.0).build().unwrap();
        let config = PlayerConfig::default();
        let pipeline = MediaPipeline::with_raw_decoders(Box::new(demuxer), &config).unwrap();
        let bad = PlayerConfig::default().with_display_frequency(0.0);
        let result = Synchronizer::from_pipeline(
            pipeline,
            Box::new(RecordingVideo::default()),
            Box::new(RecordingAudio::default()),
            &bad,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_frame_is_reused_while_holding() {
        let mut h = Harness::new(TestPattern::new(30, 1.0), 60.0);
        h.sync.tick();
        let first: *const VideoFrame = Arc::as_ptr(h.sync.current_frame().unwrap());
        h.sync.tick();
        assert_eq!(Arc::as_ptr(h.sync.current_frame().unwrap()), first);
    }
}
