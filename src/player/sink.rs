use crate::core::{AudioFrame, SharedFrame};
use parking_lot::Mutex;
use std::sync::Arc;

/// 视频输出端
///
/// 每个呈现周期调用一次 `present`（包括重复帧）。帧以 `Arc` 共享，
/// 调度器在下一帧被接受之前不会修改它。
pub trait VideoSink: Send {
    fn present(&mut self, frame: &SharedFrame);
}

/// 音频输出端
pub trait AudioSink: Send {
    /// 写入一段音频（大小可变，背压由实现自己处理）
    fn write(&mut self, frame: AudioFrame);

    /// 设备实际使用的 (采样率, 声道数)，解码器按它重采样；None 表示接受任意布局
    fn output_layout(&self) -> Option<(u32, u16)> {
        None
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn set_paused(&mut self, _paused: bool) {}

    /// 丢弃已缓冲但未播放的采样（seek 时调用）
    fn clear(&mut self) {}
}

/// 共享帧槽 - 调度线程提交，渲染线程读取（swap-on-commit）
///
/// `serial` 只在提交了新的帧时递增，重复帧不会改变它，
/// 渲染端可以据此跳过重复上传纹理。
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<SharedFrame>,
    serial: u64,
    presentations: u64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最新提交的帧及其序号
    pub fn latest(&self) -> Option<(SharedFrame, u64)> {
        let state = self.inner.lock();
        state.frame.clone().map(|frame| (frame, state.serial))
    }

    /// 新帧的数量
    pub fn serial(&self) -> u64 {
        self.inner.lock().serial
    }

    /// 呈现次数（包括重复帧）
    pub fn presentations(&self) -> u64 {
        self.inner.lock().presentations
    }
}

impl VideoSink for FrameSlot {
    fn present(&mut self, frame: &SharedFrame) {
        let mut state = self.inner.lock();
        state.presentations += 1;
        let same = state
            .frame
            .as_ref()
            .map_or(false, |current| Arc::ptr_eq(current, frame));
        if !same {
            state.frame = Some(Arc::clone(frame));
            state.serial += 1;
        }
    }
}

/// 丢弃音频的输出端，只统计写入量
#[derive(Debug, Default)]
pub struct NullAudioSink {
    pub units: u64,
    pub samples: u64,
}

impl AudioSink for NullAudioSink {
    fn write(&mut self, frame: AudioFrame) {
        self.units += 1;
        self.samples += frame.data.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PixelFormat, VideoFrame};

    fn frame(pts: f64) -> SharedFrame {
        Arc::new(VideoFrame {
            pts: Some(pts),
            width: 1,
            height: 1,
            format: PixelFormat::RGBA,
            data: vec![0; 4],
        })
    }

    #[test]
    fn test_frame_slot_serial_ignores_repeats() {
        let slot = FrameSlot::new();
        let mut sink = slot.clone();
        let first = frame(0.0);

        sink.present(&first);
        sink.present(&first);
        assert_eq!(slot.serial(), 1);
        assert_eq!(slot.presentations(), 2);

        let second = frame(0.0);
        sink.present(&second);
        let (latest, serial) = slot.latest().unwrap();
        assert!(Arc::ptr_eq(&latest, &second));
        assert_eq!(serial, 2);
    }

    #[test]
    fn test_empty_slot() {
        assert!(FrameSlot::new().latest().is_none());
    }
}
