use crate::core::{DecodedUnit, MediaInfo, PlayerError, Result};
use crate::player::pipeline::UnitSource;
use crossbeam_channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};
use std::process;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 发送阻塞时重新检查命令的间隔
const SEND_RETRY: Duration = Duration::from_millis(20);

/// 解码线程命令
enum DecodeCommand {
    Seek { second: f64, generation: u64 },
    Stop,
}

/// 带 seek 代号的解码单元，代号过期的单元在消费端丢弃
struct Tagged {
    generation: u64,
    unit: DecodedUnit,
}

/// 解码线程 - 工作线程持有解码管线，向每个轨道的有界队列填充解码单元
///
/// 调度器侧只做 `try_recv`，队列为空时 `pull` 返回 `Empty`。
/// `EndOfStream` 走视频队列，在它之前发出的音频/字幕已经入队。
pub struct DecodeThread {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: Sender<DecodeCommand>,
    video_rx: Receiver<Tagged>,
    audio_rx: Receiver<Tagged>,
    subtitle_rx: Receiver<Tagged>,
    generation: u64,
    end_of_stream: bool,
    media_info: MediaInfo,
    description: String,
}

impl DecodeThread {
    /// 启动解码线程
    pub fn start(mut source: Box<dyn UnitSource>, queue_capacity: usize) -> Self {
        let capacity = queue_capacity.max(1);
        let media_info = source.media_info().clone();
        let description = format!("Threaded({})", source.description());

        let (command_tx, command_rx) = unbounded::<DecodeCommand>();
        let (video_tx, video_rx) = bounded::<Tagged>(capacity);
        let (audio_tx, audio_rx) = bounded::<Tagged>(capacity);
        let (subtitle_tx, subtitle_rx) = bounded::<Tagged>(capacity);

        let thread_handle = thread::spawn(move || {
            Self::decode_loop(source.as_mut(), command_rx, video_tx, audio_tx, subtitle_tx);
        });

        info!("{} 🎬 解码线程已启动（队列容量 {}）", log_ctx(), capacity);

        Self {
            thread_handle: Some(thread_handle),
            command_tx,
            video_rx,
            audio_rx,
            subtitle_rx,
            generation: 0,
            end_of_stream: false,
            media_info,
            description,
        }
    }

    /// 解码循环（在独立线程中运行）
    ///
    /// - 到达流末尾后阻塞等待命令，不忙等
    /// - 队列满时以 `SEND_RETRY` 为间隔重试，期间有命令到达则丢弃当前单元
    fn decode_loop(
        source: &mut dyn UnitSource,
        command_rx: Receiver<DecodeCommand>,
        video_tx: Sender<Tagged>,
        audio_tx: Sender<Tagged>,
        subtitle_tx: Sender<Tagged>,
    ) {
        info!("{} 🎬 解码线程运行: {}", log_ctx(), source.description());

        let mut generation = 0u64;
        let mut at_eof = false;
        let mut units: u64 = 0;

        loop {
            let command = if at_eof {
                match command_rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            } else {
                match command_rx.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            };

            match command {
                Some(DecodeCommand::Stop) => {
                    info!("{} ⏹ 解码线程收到停止命令", log_ctx());
                    break;
                }
                Some(DecodeCommand::Seek { second, generation: next }) => {
                    info!("{} ⏩ 解码线程收到 Seek 命令: {:.3}s（代号 {}）", log_ctx(), second, next);
                    generation = next;
                    at_eof = false;
                    if let Err(e) = source.seek(second) {
                        error!("{} ❌ Seek 失败: {}", log_ctx(), e);
                    }
                    continue;
                }
                None => {}
            }

            let unit = source.pull();
            let queue = match &unit {
                DecodedUnit::Video(_) => &video_tx,
                DecodedUnit::Audio(_) => &audio_tx,
                DecodedUnit::Subtitle(_) => &subtitle_tx,
                DecodedUnit::EndOfStream => {
                    info!("{} 📄 解码线程到达流末尾（共 {} 个单元），等待命令", log_ctx(), units);
                    at_eof = true;
                    &video_tx
                }
                DecodedUnit::Empty => {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
            };
            units += 1;

            let mut tagged = Tagged { generation, unit };
            loop {
                match queue.send_timeout(tagged, SEND_RETRY) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(pending)) => {
                        if !command_rx.is_empty() {
                            // Seek/Stop 都会让这个单元失效
                            debug!("{} 队列阻塞期间收到命令，丢弃当前单元", log_ctx());
                            break;
                        }
                        tagged = pending;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        warn!("{} 接收端已关闭，解码线程退出", log_ctx());
                        return;
                    }
                }
            }
        }

        info!("{} 🛑 解码线程退出（共解码 {} 个单元）", log_ctx(), units);
    }

    fn drain_queues(&self) -> usize {
        self.video_rx.try_iter().count()
            + self.audio_rx.try_iter().count()
            + self.subtitle_rx.try_iter().count()
    }

    /// 停止线程并等待退出
    pub fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.command_tx.send(DecodeCommand::Stop);
            // 让阻塞在发送上的工作线程尽快看到命令
            self.drain_queues();
            if handle.join().is_err() {
                error!("{} ❌ 解码线程异常退出", log_ctx());
            }
        }
    }
}

impl UnitSource for DecodeThread {
    fn pull(&mut self) -> DecodedUnit {
        if self.end_of_stream {
            return DecodedUnit::EndOfStream;
        }

        for queue in [&self.audio_rx, &self.subtitle_rx] {
            for tagged in queue.try_iter() {
                if tagged.generation == self.generation {
                    return tagged.unit;
                }
            }
        }

        for tagged in self.video_rx.try_iter() {
            if tagged.generation != self.generation {
                continue;
            }
            if tagged.unit == DecodedUnit::EndOfStream {
                self.end_of_stream = true;
            }
            return tagged.unit;
        }

        DecodedUnit::Empty
    }

    fn seek(&mut self, target_second: f64) -> Result<()> {
        self.generation += 1;
        self.command_tx
            .send(DecodeCommand::Seek {
                second: target_second,
                generation: self.generation,
            })
            .map_err(|e| PlayerError::Other(format!("发送 Seek 命令失败: {}", e)))?;
        let dropped = self.drain_queues();
        debug!("{} Seek 丢弃 {} 个已排队单元", log_ctx(), dropped);
        self.end_of_stream = false;
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

impl Drop for DecodeThread {
    fn drop(&mut self) {
        self.stop();
    }
}
