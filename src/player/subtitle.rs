use crate::core::SubtitleFrame;
use log::trace;

/// 倒计时低于这个值就视为到期（吸收浮点累减误差）
const EXPIRY_EPSILON: f64 = 1e-9;

/// 正在显示的字幕
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub text: String,
    pub remaining: f64, // 剩余显示时间（秒）
}

impl From<SubtitleFrame> for SubtitleCue {
    fn from(frame: SubtitleFrame) -> Self {
        Self {
            text: frame.text,
            remaining: frame.duration,
        }
    }
}

/// 字幕时间线 - 按插入顺序保存活动字幕
///
/// 倒计时由呈现的视频帧驱动，不看墙钟。
#[derive(Debug, Default)]
pub struct SubtitleTimeline {
    cues: Vec<SubtitleCue>,
}

impl SubtitleTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一条字幕；时长不为正的字幕直接丢弃
    pub fn push(&mut self, cue: SubtitleCue) {
        if cue.remaining > EXPIRY_EPSILON {
            trace!("字幕入队: {:?} ({:.3}s)", cue.text, cue.remaining);
            self.cues.push(cue);
        }
    }

    /// 所有字幕倒计时减少 `elapsed_seconds`，移除到期的字幕
    pub fn advance(&mut self, elapsed_seconds: f64) {
        for cue in &mut self.cues {
            cue.remaining -= elapsed_seconds;
        }
        self.cues.retain(|cue| cue.remaining > EXPIRY_EPSILON);
    }

    /// 当前活动字幕（插入顺序）
    pub fn active_cues(&self) -> impl Iterator<Item = &SubtitleCue> + '_ {
        self.cues.iter()
    }

    /// 当前显示的文本，多条字幕用换行连接
    pub fn text(&self) -> String {
        self.cues
            .iter()
            .map(|cue| cue.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.cues.clear();
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(text: &str, remaining: f64) -> SubtitleCue {
        SubtitleCue {
            text: text.to_string(),
            remaining,
        }
    }

    #[test]
    fn test_cues_keep_insertion_order() {
        let mut timeline = SubtitleTimeline::new();
        timeline.push(cue("b", 2.0));
        timeline.push(cue("a", 1.0));
        let texts: Vec<_> = timeline.active_cues().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);
        assert_eq!(timeline.text(), "b\na");
    }

    #[test]
    fn test_advance_expires_cues() {
        let mut timeline = SubtitleTimeline::new();
        timeline.push(cue("short", 0.1));
        timeline.push(cue("long", 1.0));

        // 0.1 秒在 30fps 下正好 3 帧，浮点累减不应多留一帧
        for _ in 0..3 {
            timeline.advance(1.0 / 30.0);
        }
        let texts: Vec<_> = timeline.active_cues().map(|c| c.text.clone()).collect();
        assert_eq!(texts, vec!["long".to_string()]);
    }

    #[test]
    fn test_non_positive_duration_is_ignored() {
        let mut timeline = SubtitleTimeline::new();
        timeline.push(cue("zero", 0.0));
        timeline.push(cue("negative", -1.0));
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut timeline = SubtitleTimeline::new();
        timeline.push(cue("a", 1.0));
        timeline.clear();
        assert_eq!(timeline.len(), 0);
        assert_eq!(timeline.active_cues().count(), 0);
    }
}
