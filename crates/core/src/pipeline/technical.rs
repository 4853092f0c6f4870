//! Text summaries derived from daily bars for the model briefing.
//!
//! Everything here is pure; short series produce "insufficient data" wording instead of errors.

use crate::market::PriceBar;

const RSI_PERIOD: usize = 14;
const TRADING_DAYS_PER_WEEK: usize = 5;

pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Cutler's RSI (simple averages) over the last `period` changes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let window = &closes[closes.len() - period - 1..];
    let (gain, loss) = window.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let d = w[1] - w[0];
        if d >= 0.0 {
            (g + d, l)
        } else {
            (g, l - d)
        }
    });
    if gain + loss == 0.0 {
        return Some(50.0);
    }
    Some(100.0 * gain / (gain + loss))
}

/// Percent change between the latest close and the close one trading week earlier.
pub fn week_over_week_change(bars: &[PriceBar]) -> Option<f64> {
    if bars.len() <= TRADING_DAYS_PER_WEEK {
        return None;
    }
    let last = bars[bars.len() - 1].close;
    let prev = bars[bars.len() - 1 - TRADING_DAYS_PER_WEEK].close;
    if prev <= 0.0 {
        return None;
    }
    Some((last - prev) / prev * 100.0)
}

pub fn technical_summary(bars: &[PriceBar]) -> String {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let (Some(short), Some(long)) = (sma(&closes, 5), sma(&closes, 20)) else {
        return "Technicals: insufficient data".to_string();
    };

    let trend = if short > long * 1.01 {
        "uptrend"
    } else if short < long * 0.99 {
        "downtrend"
    } else {
        "sideways"
    };

    let rsi_part = match rsi(&closes, RSI_PERIOD) {
        Some(v) if v >= 70.0 => format!("RSI14 {v:.0} (overbought)"),
        Some(v) if v <= 30.0 => format!("RSI14 {v:.0} (oversold)"),
        Some(v) => format!("RSI14 {v:.0}"),
        None => "RSI14 n/a".to_string(),
    };

    format!("Technicals: SMA5 {short:.2} vs SMA20 {long:.2} ({trend}), {rsi_part}")
}

pub fn candlestick_patterns(bars: &[PriceBar]) -> Vec<&'static str> {
    let mut out = Vec::new();
    let Some(last) = bars.last() else {
        return out;
    };

    let range = last.high - last.low;
    if range > 0.0 {
        let body = (last.close - last.open).abs();
        let upper = last.high - last.close.max(last.open);
        let lower = last.close.min(last.open) - last.low;
        if body <= range * 0.1 {
            out.push("doji (indecision)");
        } else if lower >= body * 2.0 && upper <= body * 0.5 {
            out.push("hammer (possible bottom)");
        } else if upper >= body * 2.0 && lower <= body * 0.5 {
            out.push("shooting star (possible top)");
        }
    }

    if bars.len() >= 2 {
        let prev = &bars[bars.len() - 2];
        let prev_bear = prev.close < prev.open;
        let prev_bull = prev.close > prev.open;
        if prev_bear && last.close > last.open && last.open <= prev.close && last.close >= prev.open {
            out.push("bullish engulfing");
        }
        if prev_bull && last.close < last.open && last.open >= prev.close && last.close <= prev.open {
            out.push("bearish engulfing");
        }
    }

    out
}

pub fn chart_patterns(bars: &[PriceBar]) -> Vec<&'static str> {
    let mut out = Vec::new();
    if bars.len() < 10 {
        return out;
    }

    let Some((last, history)) = bars.split_last() else {
        return out;
    };
    let lookback = &history[history.len().saturating_sub(19)..];
    let prior_high = lookback.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let prior_low = lookback.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    if last.close > prior_high {
        out.push("breakout above recent high");
    } else if last.close < prior_low {
        out.push("breakdown below recent low");
    }

    // Compare the last three weekly swing points.
    let weeks: Vec<(f64, f64)> = bars
        .rchunks(TRADING_DAYS_PER_WEEK)
        .take(3)
        .map(|w| {
            let hi = w.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let lo = w.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            (hi, lo)
        })
        .collect();
    if weeks.len() == 3 {
        // rchunks yields newest first.
        let rising = weeks[0].0 > weeks[1].0 && weeks[1].0 > weeks[2].0
            && weeks[0].1 > weeks[1].1
            && weeks[1].1 > weeks[2].1;
        let falling = weeks[0].0 < weeks[1].0 && weeks[1].0 < weeks[2].0
            && weeks[0].1 < weeks[1].1
            && weeks[1].1 < weeks[2].1;
        if rising {
            out.push("higher highs and higher lows");
        } else if falling {
            out.push("lower highs and lower lows");
        }
    }

    out
}

pub fn week_change_narrative(bars: &[PriceBar]) -> String {
    match week_over_week_change(bars) {
        Some(c) if c >= 5.0 => format!("Week: strong gain {c:+.1}%"),
        Some(c) if c <= -5.0 => format!("Week: sharp drop {c:+.1}%"),
        Some(c) => format!("Week: {c:+.1}%"),
        None => "Week: insufficient data".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    let start = chrono::NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar {
            date: start + chrono::Duration::days(i as i64),
            open: c,
            high: c * 1.01,
            low: c * 0.99,
            close: c,
            volume: None,
        })
        .collect()
}
