//! Run archive: JSONL append-only persistence of finished backtest runs.
//!
//! One `RunRecord` per line. Lines are independent, so a partial write only
//! loses the last record, and the file is easy to stream or grep.
//!
//! The archive also supports meta-analysis across runs: per-strategy
//! summaries of hit rate, ROI and streaks.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::feed::{RunRecord, RunStatus};

/// JSONL archive file.
#[derive(Debug, Clone)]
pub struct JsonlArchive {
    path: PathBuf,
}

impl JsonlArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record, creating the file and its directory if needed.
    pub fn append(&self, record: &RunRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Whole line in one write.
        file.write_all(format!("{json}\n").as_bytes())?;
        file.flush()
    }

    /// Read every record, skipping malformed lines.
    pub fn read_all(&self) -> io::Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut records = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = i + 1, error = %e, "skipping malformed archive line"),
            }
        }

        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Completed-run statistics for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub runs: usize,
    pub failed: usize,
    pub periods: usize,
    pub mean_avg_hit: f64,
    pub mean_hit_rate: f64,
    pub mean_roi: f64,
    pub best_streak: usize,
}

/// Group records by the strategy that ran and summarize completed runs.
///
/// Failed runs are counted but contribute nothing to the means.
pub fn summary_by_strategy(records: &[RunRecord]) -> BTreeMap<String, StrategySummary> {
    let mut groups: BTreeMap<String, Vec<&RunRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(r.strategy().to_string()).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|(code, runs)| {
            let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
            let stats: Vec<_> = runs.iter().filter_map(|r| r.stats.as_ref()).collect();
            let n = stats.len().max(1) as f64;
            let summary = StrategySummary {
                runs: runs.len(),
                failed,
                periods: stats.iter().map(|s| s.periods).sum(),
                mean_avg_hit: stats.iter().map(|s| s.avg_hit).sum::<f64>() / n,
                mean_hit_rate: stats.iter().map(|s| s.hit_rate).sum::<f64>() / n,
                mean_roi: stats.iter().map(|s| s.roi).sum::<f64>() / n,
                best_streak: stats.iter().map(|s| s.max_streak).max().unwrap_or(0),
            };
            (code, summary)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{BacktestRequest, BacktestStats};
    use chrono::NaiveDate;

    fn record(id: &str, strategy: &str, stats: Option<BacktestStats>) -> RunRecord {
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        RunRecord {
            run_id: id.into(),
            request: BacktestRequest::new("v1", "2024001", "2024100", 2.0),
            strategy: None,
            status: if stats.is_some() {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            },
            attempts: 1,
            stats,
            error: None,
            created_at: at,
            finished_at: Some(at),
        }
        .with_strategy(strategy)
    }

    fn stats(hit_rate: f64, roi: f64, streak: usize) -> BacktestStats {
        BacktestStats {
            periods: 50,
            hit_rate,
            roi,
            max_streak: streak,
            ..BacktestStats::default()
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path().join("nested").join("runs.jsonl"));
        assert!(archive.read_all().unwrap().is_empty());
        archive.append(&record("a", "hot_cold", Some(stats(10.0, -50.0, 2)))).unwrap();
        archive.append(&record("b", "hot_cold", None)).unwrap();
        let back = archive.read_all().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].run_id, "a");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let archive = JsonlArchive::new(&path);
        archive.append(&record("a", "random", None)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        archive.append(&record("b", "random", None)).unwrap();
        assert_eq!(archive.read_all().unwrap().len(), 2);
    }

    #[test]
    fn summaries_group_by_strategy() {
        let records = vec![
            record("a", "hot_cold", Some(stats(10.0, -50.0, 2))),
            record("b", "hot_cold", Some(stats(20.0, -30.0, 4))),
            record("c", "hot_cold", None),
            record("d", "nsga2", Some(stats(5.0, -80.0, 1))),
        ];
        let summary = summary_by_strategy(&records);
        let hc = &summary["hot_cold"];
        assert_eq!(hc.runs, 3);
        assert_eq!(hc.failed, 1);
        assert_eq!(hc.periods, 100);
        assert!((hc.mean_hit_rate - 15.0).abs() < 1e-12);
        assert!((hc.mean_roi + 40.0).abs() < 1e-12);
        assert_eq!(hc.best_streak, 4);
        assert_eq!(summary["nsga2"].runs, 1);
    }
}
