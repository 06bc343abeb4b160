use crate::core::{PlaybackStats, PlayerError, Result, TickOutcome};
use crate::player::synchronizer::Synchronizer;
use log::{debug, info};
use std::thread;
use std::time::{Duration, Instant};

/// 墙钟节拍器 - 没有显示刷新回调时按 display_frequency 周期唤醒
pub struct Pacer {
    interval: Duration,
    next_deadline: Instant,
    last_wake: Instant,
}

impl Pacer {
    pub fn new(display_frequency: f64) -> Result<Self> {
        if !(display_frequency.is_finite() && display_frequency > 0.0) {
            return Err(PlayerError::ConfigError(format!(
                "display_frequency 必须为正数: {}",
                display_frequency
            )));
        }
        let interval = Duration::from_secs_f64(1.0 / display_frequency);
        let now = Instant::now();
        Ok(Self {
            interval,
            next_deadline: now,
            last_wake: now,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 睡到下一个周期，返回距上次唤醒经过的秒数
    ///
    /// 落后超过一个周期时从当前时间重新对齐，不连发补偿周期。
    pub fn wait(&mut self) -> f64 {
        let now = Instant::now();
        if self.next_deadline > now {
            thread::sleep(self.next_deadline - now);
        }

        let now = Instant::now();
        self.next_deadline += self.interval;
        if self.next_deadline < now {
            debug!("节拍落后，重新对齐");
            self.next_deadline = now + self.interval;
        }

        let elapsed = now.duration_since(self.last_wake);
        self.last_wake = now;
        elapsed.as_secs_f64()
    }
}

/// 驱动调度器运行一段时间
///
/// `realtime` 为 false 时不睡眠，每个周期按名义间隔计时（用于离线跑测和测试）。
/// 每次 tick 之后调用 `on_tick`，宿主可以在其中发出命令。
pub fn run_for<F>(sync: &mut Synchronizer, seconds: f64, realtime: bool, mut on_tick: F) -> Result<PlaybackStats>
where
    F: FnMut(&mut Synchronizer, &TickOutcome),
{
    let hz = sync.display_frequency();
    let ticks = (seconds.max(0.0) * hz).ceil() as u64;
    let mut pacer = if realtime { Some(Pacer::new(hz)?) } else { None };
    let nominal = 1.0 / hz;

    info!("▶ 运行 {:.3}s（{} 个周期 @ {:.3} Hz{}）", seconds, ticks, hz, if realtime { "" } else { "，离线" });

    for _ in 0..ticks {
        let elapsed = match pacer.as_mut() {
            Some(pacer) => pacer.wait(),
            None => nominal,
        };
        sync.clock_mut().tick(elapsed);
        let outcome = sync.tick();
        on_tick(sync, &outcome);
    }

    let stats = sync.stats().clone();
    info!(
        "⏹ 运行结束: 新帧 {}，重复 {}，丢弃 {}，音频 {}，字幕 {}，seek {}",
        stats.frames_presented,
        stats.frames_held,
        stats.frames_dropped,
        stats.audio_units,
        stats.cues_added,
        stats.seeks
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameAction, PlayerConfig};
    use crate::player::pipeline::MediaPipeline;
    use crate::player::sink::{FrameSlot, NullAudioSink};
    use crate::player::test_pattern::TestPattern;

    fn synchronizer(config: &PlayerConfig) -> Synchronizer {
        let demuxer = TestPattern::new(30, 2.0).with_audio(8000, 1).build().unwrap();
        let pipeline = MediaPipeline::with_raw_decoders(Box::new(demuxer), config).unwrap();
        Synchronizer::from_pipeline(
            pipeline,
            Box::new(FrameSlot::new()),
            Box::new(NullAudioSink::default()),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_pacer_rejects_bad_frequency() {
        assert!(Pacer::new(0.0).is_err());
        assert!(Pacer::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_pacer_waits_roughly_one_interval() {
        let mut pacer = Pacer::new(200.0).unwrap();
        pacer.wait();
        let start = Instant::now();
        for _ in 0..4 {
            pacer.wait();
        }
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_run_for_offline() {
        let config = PlayerConfig::default();
        let mut sync = synchronizer(&config);
        let mut seeked = false;
        let stats = run_for(&mut sync, 1.0, false, |sync, outcome| {
            if !seeked && sync.clock().current_second() >= 0.5 {
                sync.request_seek(1.5);
                seeked = true;
            }
            assert_ne!(outcome.action, FrameAction::Idle);
        })
        .unwrap();

        assert_eq!(stats.seeks, 1);
        assert_eq!(stats.frames_dropped, 0);
        assert!((sync.clock().wall_seconds() - 1.0).abs() < 1e-6);
        assert!(sync.clock().current_second() > 1.5);
    }
}
