use crate::core::{PlayerError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 播放器配置（JSON 文件，所有字段均有默认值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 显示刷新率（Hz）
    pub display_frequency: f64,
    /// 是否在独立线程中解码
    pub threaded_decode: bool,
    /// 每个轨道的解码队列容量
    pub queue_capacity: usize,
    /// 连续读取失败多少次后视为流结束
    pub max_consecutive_read_errors: u32,
    /// 字幕单元没有时长时使用的默认显示时间（秒）
    pub default_subtitle_seconds: f64,
    /// 音频解码输出采样率
    pub audio_sample_rate: u32,
    /// 音频解码输出声道数
    pub audio_channels: u16,
    /// 初始音量 0.0 - 1.0
    pub volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            display_frequency: 60.0,
            threaded_decode: false,
            queue_capacity: 4,
            max_consecutive_read_errors: 32,
            default_subtitle_seconds: 3.0,
            audio_sample_rate: 48000,
            audio_channels: 2,
            volume: 1.0,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: PlayerConfig = serde_json::from_str(&text)
            .map_err(|e| PlayerError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("已加载配置: {}", path.display());
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if !(self.display_frequency.is_finite() && self.display_frequency > 0.0) {
            return Err(PlayerError::ConfigError(format!(
                "display_frequency 必须为正数: {}",
                self.display_frequency
            )));
        }
        if self.queue_capacity == 0 {
            return Err(PlayerError::ConfigError("queue_capacity 不能为 0".to_string()));
        }
        if !(self.default_subtitle_seconds.is_finite() && self.default_subtitle_seconds > 0.0) {
            return Err(PlayerError::ConfigError(format!(
                "default_subtitle_seconds 必须为正数: {}",
                self.default_subtitle_seconds
            )));
        }
        if self.audio_sample_rate == 0 || self.audio_channels == 0 {
            return Err(PlayerError::ConfigError("音频输出配置无效".to_string()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(PlayerError::ConfigError(format!("volume 超出范围: {}", self.volume)));
        }
        Ok(())
    }

    pub fn with_display_frequency(mut self, hz: f64) -> Self {
        self.display_frequency = hz;
        self
    }

    /// 采用音频设备实际的输出布局，解码器按它重采样
    pub fn with_audio_layout(mut self, layout: Option<(u32, u16)>) -> Self {
        if let Some((sample_rate, channels)) = layout {
            if (sample_rate, channels) != (self.audio_sample_rate, self.audio_channels) {
                info!(
                    "音频解码输出改为设备布局: {} Hz, {} 声道（配置为 {} Hz, {} 声道）",
                    sample_rate, channels, self.audio_sample_rate, self.audio_channels
                );
            }
            self.audio_sample_rate = sample_rate;
            self.audio_channels = channels;
        }
        self
    }
}
