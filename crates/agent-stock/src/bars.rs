//! Daily price bars and their bar-by-bar description
//!
//! The synthesis prompt carries a plain-text description of the recent bars:
//! the first bar is the baseline, every later bar gets its percent change,
//! direction, volume regime and a rough candle shape.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use agent_workflow::ReferenceSource;

use crate::error::Result;

/// Volume change above which a bar counts as expanding volume
const VOLUME_EXPANDING_PCT: f64 = 150.0;
/// Volume change below which a bar counts as contracting volume
const VOLUME_CONTRACTING_PCT: f64 = -60.0;
const LONG_BODY_RATIO: f64 = 0.7;
const DOJI_BODY_RATIO: f64 = 0.2;

/// One daily bar; volume and amount are in units of 10 000
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
}

/// Read-only source of recent daily bars
#[async_trait]
pub trait PriceBarSource: Send + Sync {
    /// Up to `count` most recent bars of `subject`, in any order
    async fn recent_bars(&self, subject: &str, count: usize) -> Result<Vec<PriceBar>>;
}

/// Price direction of a bar against the previous close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    fn from_change(pct: f64) -> Self {
        if pct > 0.0 {
            Self::Up
        } else if pct < 0.0 {
            Self::Down
        } else {
            Self::Flat
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "上涨",
            Self::Down => "下跌",
            Self::Flat => "持平",
        }
    }
}

/// Volume regime of a bar against the previous volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeRegime {
    Expanding,
    Contracting,
    Steady,
}

impl VolumeRegime {
    fn from_change(pct: f64) -> Self {
        if pct > VOLUME_EXPANDING_PCT {
            Self::Expanding
        } else if pct < VOLUME_CONTRACTING_PCT {
            Self::Contracting
        } else {
            Self::Steady
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Expanding => "放量",
            Self::Contracting => "缩量",
            Self::Steady => "量能平稳",
        }
    }
}

/// Rough candle shape from the body/range ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleShape {
    Doji,
    LongBody,
    MediumBody,
}

impl CandleShape {
    pub fn of(bar: &PriceBar) -> Self {
        let range = bar.high - bar.low;
        if range == 0.0 {
            return Self::Doji;
        }
        let ratio = (bar.close - bar.open).abs() / range;
        if ratio > LONG_BODY_RATIO {
            Self::LongBody
        } else if ratio < DOJI_BODY_RATIO {
            Self::Doji
        } else {
            Self::MediumBody
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Doji => "十字星",
            Self::LongBody => "长实体K线",
            Self::MediumBody => "中等实体K线",
        }
    }
}

/// Percent change, `None` without a usable base
fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

/// Describe bars bar by bar, oldest first, one numbered line each
pub fn describe_bars(bars: &[PriceBar]) -> String {
    let mut bars = bars.to_vec();
    bars.sort_by_key(|bar| bar.trade_date);

    let mut lines = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let mut line = format!(
            "{i}. {}：开盘 {:.2}，最高 {:.2}，最低 {:.2}，收盘 {:.2}，",
            bar.trade_date.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
        );

        let Some(previous) = i.checked_sub(1).map(|p| &bars[p]) else {
            let _ = write!(
                line,
                "成交量 {:.2}万，成交额 {:.0}万。（首个交易日数据，用于基准）",
                bar.volume, bar.amount
            );
            lines.push(line);
            continue;
        };

        let pct = pct_change(previous.close, bar.close).unwrap_or(0.0);
        let volume = pct_change(previous.volume, bar.volume)
            .map(|change| VolumeRegime::from_change(change).label())
            .unwrap_or_default();
        let _ = write!(
            line,
            "{} {pct:+.2}%，{volume}（成交量 {:.2}万，成交额 {:.0}万），形成{}。",
            Direction::from_change(pct).label(),
            bar.volume,
            bar.amount,
            CandleShape::of(bar).label(),
        );
        lines.push(line);
    }
    lines.join("\n")
}

/// Reference summary over a [`PriceBarSource`]
pub struct PriceBarReference {
    source: Arc<dyn PriceBarSource>,
    count: usize,
}

impl PriceBarReference {
    pub fn new(source: Arc<dyn PriceBarSource>, count: usize) -> Self {
        Self { source, count }
    }
}

#[async_trait]
impl ReferenceSource for PriceBarReference {
    async fn summary(&self, subject: &str) -> agent_core::Result<String> {
        let bars = self.source.recent_bars(subject, self.count).await?;
        if bars.is_empty() {
            warn!(subject = %subject, "no price bars, summary is empty");
        } else {
            info!(subject = %subject, bars = bars.len(), "price bars loaded");
        }
        Ok(describe_bars(&bars))
    }
}
