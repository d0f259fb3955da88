/// 轨迹日志: 每帧一行 JSON (JSON Lines)
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use super::FrameOutcome;

pub struct TrackLog<W: Write = BufWriter<File>> {
    out: W,
    lines: u64,
}

impl TrackLog {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("创建目录失败: {}", dir.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("创建轨迹日志失败: {}", path.display()))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> TrackLog<W> {
    pub fn from_writer(out: W) -> Self {
        Self { out, lines: 0 }
    }

    pub fn write(&mut self, outcome: &FrameOutcome) -> Result<()> {
        serde_json::to_writer(&mut self.out, outcome).context("序列化帧结果失败")?;
        self.out.write_all(b"\n").context("写入轨迹日志失败")?;
        self.lines += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("刷新轨迹日志失败")
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::pipeline::OutcomeTag;

    #[test]
    fn test_jsonl_lines() {
        let mut log = TrackLog::from_writer(Vec::new());
        let bbox = BBox::new(20, 20, 40, 80).unwrap();
        log.write(&FrameOutcome::located(7, OutcomeTag::Reacquired, bbox))
            .unwrap();
        log.write(&FrameOutcome::lost(8)).unwrap();
        assert_eq!(log.lines(), 2);

        let text = String::from_utf8(log.into_inner()).unwrap();
        let rows: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows[0]["frame_index"], 7);
        assert_eq!(rows[0]["tag"], "reacquired");
        assert_eq!(rows[0]["state"], "tracking");
        assert_eq!(rows[0]["bbox"]["w"], 40);
        assert_eq!(rows[1]["tag"], "lost");
        assert!(rows[1]["bbox"].is_null());
    }
}
