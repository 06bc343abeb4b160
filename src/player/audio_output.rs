use crate::core::{AudioFrame, PlayerError, Result};
use crate::player::sink::AudioSink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 音频输出 - 使用 cpal 播放音频
///
/// 暂停时输出静音但保留缓冲；seek 时 `clear` 丢弃缓冲。
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    buffer: Arc<SegQueue<f32>>,
    volume: Arc<Mutex<f32>>,
    paused: Arc<AtomicBool>,
    layout_warned: bool,
}

// cpal::Stream 不是 Send，AudioOutput 只在创建它的调度线程中使用
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 创建音频输出（设备不支持请求的配置时自动回退）
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let mut candidates = vec![(sample_rate, channels)];
        for fallback in [(48000, 2), (44100, 2), (48000, 1), (44100, 1)] {
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }

        let mut chosen = None;
        for (rate, ch) in candidates {
            let config = StreamConfig {
                channels: ch,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let mut supported = device
                .supported_output_configs()
                .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
            if supported.any(|range| Self::is_config_compatible(&config, &range)) {
                chosen = Some(config);
                break;
            }
        }

        let config = chosen.ok_or_else(|| {
            PlayerError::AudioError(format!(
                "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                sample_rate, channels
            ))
        })?;

        if config.sample_rate.0 != sample_rate || config.channels != channels {
            warn!(
                "⚠️  音频设备不支持 {} Hz, {} 声道，使用回退配置 {} Hz, {} 声道",
                sample_rate, channels, config.sample_rate.0, config.channels
            );
        }

        Ok(Self {
            device,
            config,
            stream: None,
            buffer: Arc::new(SegQueue::new()),
            volume: Arc::new(Mutex::new(1.0)),
            paused: Arc::new(AtomicBool::new(false)),
            layout_warned: false,
        })
    }

    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;
        rate_in_range && config.channels == supported.channels()
    }

    /// 开始播放
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let volume = self.volume.clone();
        let paused = self.paused.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if paused.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let vol = *volume.lock();
                    for sample in data.iter_mut() {
                        *sample = buffer.pop().map_or(0.0, |value| value * vol);
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");
        Ok(())
    }

    /// 停止播放
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("音频输出已停止");
        }
    }

    /// 缓冲中的采样数
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// 实际使用的 (采样率, 声道数)
    pub fn config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }
}

impl AudioSink for AudioOutput {
    fn write(&mut self, frame: AudioFrame) {
        let mismatch = frame.channels != self.config.channels || frame.sample_rate != self.config.sample_rate.0;
        if mismatch && !self.layout_warned {
            self.layout_warned = true;
            warn!(
                "音频布局 {} Hz/{} 声道 与输出 {} Hz/{} 声道 不一致",
                frame.sample_rate, frame.channels, self.config.sample_rate.0, self.config.channels
            );
        }
        for sample in frame.data {
            self.buffer.push(sample);
        }
    }

    fn output_layout(&self) -> Option<(u32, u16)> {
        Some(self.config())
    }

    fn set_volume(&mut self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn clear(&mut self) {
        while self.buffer.pop().is_some() {}
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
