use crate::pipeline::scoring::ScoredCandidate;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiversifyOptions {
    /// Shortlist size handed to the model.
    pub max_candidates: usize,
    /// Admissions per named sector before the candidate is deferred.
    pub sector_cap: usize,
    /// Registered stocks are only excluded when more than this many candidates remain.
    pub exclusion_floor: usize,
}

impl Default for DiversifyOptions {
    fn default() -> Self {
        Self {
            max_candidates: 15,
            sector_cap: 3,
            exclusion_floor: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SectorKey<'a> {
    Named(&'a str),
    // Unknown sectors never share a bucket.
    Singleton(i64),
}

fn sector_key<'a>(c: &ScoredCandidate<'a>) -> SectorKey<'a> {
    match c.candidate.sector.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => SectorKey::Named(s),
        _ => SectorKey::Singleton(c.candidate.id),
    }
}

/// Greedy sector-capped pick over a ranked list, then a backfill pass from the deferred
/// candidates so capping alone never shrinks the shortlist. Output keeps rank order.
pub fn diversify<'a>(
    ranked: &[ScoredCandidate<'a>],
    opts: &DiversifyOptions,
) -> Vec<ScoredCandidate<'a>> {
    let target = opts.max_candidates.min(ranked.len());
    let mut per_sector: HashMap<SectorKey<'a>, usize> = HashMap::new();
    let mut picked: Vec<usize> = Vec::with_capacity(target);
    let mut deferred: Vec<usize> = Vec::new();

    for (idx, c) in ranked.iter().enumerate() {
        if picked.len() == target {
            break;
        }
        let count = per_sector.entry(sector_key(c)).or_insert(0);
        if *count < opts.sector_cap {
            *count += 1;
            picked.push(idx);
        } else {
            deferred.push(idx);
        }
    }

    let backfill = target - picked.len();
    if backfill > 0 {
        tracing::debug!(backfill, deferred = deferred.len(), "sector cap backfill");
        picked.extend(deferred.into_iter().take(backfill));
        picked.sort_unstable();
    }

    picked.into_iter().map(|idx| ranked[idx].clone()).collect()
}

/// Drops stocks the user already holds or watches, unless that would leave
/// `exclusion_floor` or fewer candidates, in which case the input is returned unchanged.
pub fn exclude_registered<'a>(
    shortlist: Vec<ScoredCandidate<'a>>,
    registered: &HashSet<i64>,
    exclusion_floor: usize,
) -> Vec<ScoredCandidate<'a>> {
    let remaining = shortlist
        .iter()
        .filter(|c| !registered.contains(&c.candidate.id))
        .count();

    if remaining == shortlist.len() {
        return shortlist;
    }
    if remaining <= exclusion_floor {
        tracing::debug!(
            remaining,
            exclusion_floor,
            "keeping registered stocks to avoid starving the shortlist"
        );
        return shortlist;
    }

    shortlist
        .into_iter()
        .filter(|c| !registered.contains(&c.candidate.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::{test_candidate, StockCandidate};

    fn ranked(all: &[StockCandidate]) -> Vec<ScoredCandidate<'_>> {
        all.iter()
            .enumerate()
            .map(|(i, candidate)| ScoredCandidate {
                candidate,
                score: 100.0 - i as f64,
            })
            .collect()
    }

    fn ids(list: &[ScoredCandidate<'_>]) -> Vec<i64> {
        list.iter().map(|c| c.candidate.id).collect()
    }

    fn opts(max_candidates: usize, sector_cap: usize) -> DiversifyOptions {
        DiversifyOptions {
            max_candidates,
            sector_cap,
            exclusion_floor: 5,
        }
    }

    #[test]
    fn caps_each_sector_when_alternatives_exist() {
        let mut all: Vec<_> = (1..=6).map(|id| test_candidate(id, Some("Tech"), Some(10))).collect();
        all.extend((7..=12).map(|id| test_candidate(id, Some("Bank"), Some(10))));
        all.extend((13..=16).map(|id| test_candidate(id, Some("Retail"), Some(10))));
        let ranked = ranked(&all);

        let out = diversify(&ranked, &opts(8, 3));
        assert_eq!(ids(&out), vec![1, 2, 3, 7, 8, 9, 13, 14]);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for c in &out {
            *counts.entry(c.sector().unwrap()).or_default() += 1;
        }
        assert!(counts.values().all(|&n| n <= 3));
    }

    #[test]
    fn backfills_from_deferred_in_rank_order() {
        let mut all: Vec<_> = (1..=5).map(|id| test_candidate(id, Some("Tech"), Some(10))).collect();
        all.push(test_candidate(6, Some("Bank"), Some(10)));
        let ranked = ranked(&all);

        let out = diversify(&ranked, &opts(5, 2));
        assert_eq!(out.len(), 5);
        assert_eq!(ids(&out), vec![1, 2, 3, 4, 6]);
    }

    #[test]
    fn unknown_sectors_are_never_capped_together() {
        let all: Vec<_> = (1..=5).map(|id| test_candidate(id, None, Some(10))).collect();
        let ranked = ranked(&all);
        let out = diversify(&ranked, &opts(5, 1));
        assert_eq!(ids(&out), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn same_input_gives_same_shortlist() {
        let all: Vec<_> = (1..=20)
            .map(|id| test_candidate(id, Some(["A", "B", "C"][id as usize % 3]), Some(10)))
            .collect();
        let ranked = ranked(&all);
        let o = opts(10, 2);
        assert_eq!(ids(&diversify(&ranked, &o)), ids(&diversify(&ranked, &o)));
    }

    #[test]
    fn excludes_registered_when_pool_stays_above_floor() {
        let all: Vec<_> = (1..=8).map(|id| test_candidate(id, None, Some(10))).collect();
        let shortlist = ranked(&all);
        let registered: HashSet<i64> = [2, 5].into_iter().collect();
        let out = exclude_registered(shortlist, &registered, 5);
        assert_eq!(ids(&out), vec![1, 3, 4, 6, 7, 8]);
    }

    #[test]
    fn keeps_registered_when_exclusion_would_starve_the_pool() {
        let all: Vec<_> = (1..=7).map(|id| test_candidate(id, None, Some(10))).collect();
        let shortlist = ranked(&all);
        let registered: HashSet<i64> = [1, 2, 3].into_iter().collect();
        let out = exclude_registered(shortlist, &registered, 5);
        assert_eq!(ids(&out), vec![1, 2, 3, 4, 5, 6, 7]);
    }
}
