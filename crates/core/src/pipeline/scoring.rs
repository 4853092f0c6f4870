use crate::domain::stock::{EarningsTrend, StockCandidate};
use crate::domain::user::{InvestmentHorizon, RiskTolerance};

/// Value a sub-factor takes when its inputs are missing.
const NEUTRAL: f64 = 0.5;

/// Relative weight of each sub-factor. Every table sums to 1.0 so composite scores fall in
/// `0.0..=100.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub momentum: f64,
    pub volume: f64,
    pub valuation: f64,
    pub quality: f64,
    pub growth: f64,
    pub volatility_fit: f64,
    pub dividend: f64,
}

impl FactorWeights {
    const fn new(
        momentum: f64,
        volume: f64,
        valuation: f64,
        quality: f64,
        growth: f64,
        volatility_fit: f64,
        dividend: f64,
    ) -> Self {
        Self {
            momentum,
            volume,
            valuation,
            quality,
            growth,
            volatility_fit,
            dividend,
        }
    }

    pub fn for_profile(horizon: InvestmentHorizon, risk: RiskTolerance) -> Self {
        use InvestmentHorizon as H;
        use RiskTolerance as R;
        match (horizon, risk) {
            (H::Short, R::High) => Self::new(0.30, 0.20, 0.05, 0.05, 0.10, 0.25, 0.05),
            (H::Short, R::Medium) => Self::new(0.28, 0.17, 0.08, 0.10, 0.12, 0.20, 0.05),
            (H::Short, R::Low) => Self::new(0.22, 0.12, 0.12, 0.18, 0.10, 0.20, 0.06),
            (H::Medium, R::High) => Self::new(0.22, 0.12, 0.12, 0.10, 0.20, 0.20, 0.04),
            (H::Medium, R::Medium) => Self::new(0.18, 0.10, 0.17, 0.17, 0.18, 0.14, 0.06),
            (H::Medium, R::Low) => Self::new(0.12, 0.08, 0.20, 0.22, 0.14, 0.14, 0.10),
            (H::Long, R::High) => Self::new(0.12, 0.05, 0.18, 0.18, 0.27, 0.15, 0.05),
            (H::Long, R::Medium) => Self::new(0.08, 0.04, 0.24, 0.24, 0.20, 0.10, 0.10),
            (H::Long, R::Low) => Self::new(0.05, 0.03, 0.26, 0.28, 0.12, 0.10, 0.16),
        }
    }

    fn sum(&self) -> f64 {
        self.momentum
            + self.volume
            + self.valuation
            + self.quality
            + self.growth
            + self.volatility_fit
            + self.dividend
    }
}

/// Normalised sub-factors, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorScores {
    pub momentum: f64,
    pub volume: f64,
    pub valuation: f64,
    pub quality: f64,
    pub growth: f64,
    pub volatility_fit: f64,
    pub dividend: f64,
}

impl FactorScores {
    pub fn compute(c: &StockCandidate, risk: RiskTolerance) -> Self {
        Self {
            momentum: momentum(c),
            volume: volume(c),
            valuation: valuation(c),
            quality: quality(c),
            growth: growth(c),
            volatility_fit: volatility_fit(c, risk),
            dividend: c.dividend_yield.map_or(NEUTRAL, |y| unit(y / 5.0)),
        }
    }

    fn weighted(&self, w: &FactorWeights) -> f64 {
        self.momentum * w.momentum
            + self.volume * w.volume
            + self.valuation * w.valuation
            + self.quality * w.quality
            + self.growth * w.growth
            + self.volatility_fit * w.volatility_fit
            + self.dividend * w.dividend
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a StockCandidate,
    pub score: f64,
}

impl ScoredCandidate<'_> {
    pub fn sector(&self) -> Option<&str> {
        self.candidate.sector.as_deref()
    }
}

/// Composite score in `0.0..=100.0`. Pure in its inputs.
pub fn score_candidate(
    candidate: &StockCandidate,
    horizon: InvestmentHorizon,
    risk: RiskTolerance,
) -> f64 {
    let weights = FactorWeights::for_profile(horizon, risk);
    let raw = FactorScores::compute(candidate, risk).weighted(&weights) / weights.sum();
    if raw.is_finite() {
        (raw * 100.0).clamp(0.0, 100.0)
    } else {
        NEUTRAL * 100.0
    }
}

/// Scores and sorts descending. Equal scores keep input order.
pub fn rank_candidates<'a>(
    candidates: &[&'a StockCandidate],
    horizon: InvestmentHorizon,
    risk: RiskTolerance,
) -> Vec<ScoredCandidate<'a>> {
    let mut scored: Vec<_> = candidates
        .iter()
        .map(|&candidate| ScoredCandidate {
            candidate,
            score: score_candidate(candidate, horizon, risk),
        })
        .collect();
    // `sort_by` is stable.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        NEUTRAL
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        NEUTRAL
    } else {
        sum / n as f64
    }
}

fn momentum(c: &StockCandidate) -> f64 {
    let weekly = c.change_rate_1w.map(|r| unit((r + 10.0) / 20.0));
    // Modest strength above the average is good; far above it is stretched.
    let ma = c.ma_deviation.map(|d| {
        if d > 15.0 {
            unit(1.0 - (d - 15.0) / 20.0) * 0.6
        } else {
            unit((d + 10.0) / 25.0)
        }
    });
    match (weekly, ma) {
        (Some(w), Some(m)) => 0.7 * w + 0.3 * m,
        (Some(w), None) => w,
        (None, Some(m)) => m,
        (None, None) => NEUTRAL,
    }
}

fn volume(c: &StockCandidate) -> f64 {
    c.volume_ratio.map_or(NEUTRAL, |v| unit((v - 0.5) / 2.5))
}

fn valuation(c: &StockCandidate) -> f64 {
    let per = c.per.map(|p| {
        if p <= 0.0 {
            0.2
        } else {
            unit(1.0 - (p - 5.0) / 45.0)
        }
    });
    let pbr = c.pbr.map(|p| {
        if p <= 0.0 {
            0.2
        } else {
            unit(1.0 - (p - 0.5) / 3.5)
        }
    });
    mean(per.into_iter().chain(pbr))
}

fn quality(c: &StockCandidate) -> f64 {
    let profitable = c.is_profitable.map(|p| if p { 1.0 } else { 0.2 });
    let eps = c.eps.map(|e| if e > 0.0 { 1.0 } else { 0.2 });
    let size = c
        .market_cap_f64()
        .filter(|cap| *cap > 0.0)
        .map(|cap| unit((cap.log10() - 9.0) / 4.0));
    mean(profitable.into_iter().chain(eps).chain(size))
}

fn growth(c: &StockCandidate) -> f64 {
    let trend = c.earnings_trend.map(|t| match t {
        EarningsTrend::Improving => 1.0,
        EarningsTrend::Stable => 0.6,
        EarningsTrend::Declining => 0.2,
    });
    let revenue = c.revenue_growth.map(|g| unit((g + 10.0) / 40.0));
    mean(trend.into_iter().chain(revenue))
}

fn volatility_fit(c: &StockCandidate, risk: RiskTolerance) -> f64 {
    let target = match risk {
        RiskTolerance::Low => 15.0,
        RiskTolerance::Medium => 25.0,
        RiskTolerance::High => 40.0,
    };
    c.volatility
        .map_or(NEUTRAL, |v| unit(1.0 - (v - target).abs() / target))
}
