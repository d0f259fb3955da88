/// 协作式停止信号
/// 主循环每帧读取前检查一次; 退出键监听线程和帧数上限负责置位
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{info, warn};

#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 在后台线程监听标准输入, 输入退出键并回车后置位
    pub fn watch_stdin(&self, exit_key: char) {
        let signal = self.clone();
        let spawned = thread::Builder::new()
            .name("exit-key".into())
            .spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if is_exit_line(&line, exit_key) {
                        info!("⌨️ 收到退出键 '{}'", exit_key);
                        signal.stop();
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("⚠️ 无法启动退出键监听线程: {}", e);
        }
    }
}

fn is_exit_line(line: &str, exit_key: char) -> bool {
    let mut chars = line.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.eq_ignore_ascii_case(&exit_key),
        _ => false,
    }
}
