//! 音视频字幕同步调度引擎
//!
//! 按显示刷新率驱动：每个显示周期决定是否推进视频、
//! 立即转发音频、推进字幕倒计时，并处理 seek/暂停。

pub mod core;
pub mod player;
