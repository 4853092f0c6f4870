use crate::domain::stock::StockCandidate;
use rust_decimal::Decimal;

/// Candidates a user can afford at least one share of.
///
/// `None` budget returns every candidate. Under an active budget an unknown or
/// non-positive price is treated as unaffordable.
pub fn filter_affordable<'a>(
    candidates: &'a [StockCandidate],
    remaining_budget: Option<Decimal>,
) -> Vec<&'a StockCandidate> {
    match remaining_budget {
        None => candidates.iter().collect(),
        Some(budget) => candidates
            .iter()
            .filter(|c| {
                c.latest_price
                    .filter(|p| *p > Decimal::ZERO)
                    .is_some_and(|price| price <= budget)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::test_candidate;

    fn universe() -> Vec<StockCandidate> {
        vec![
            test_candidate(1, Some("Tech"), Some(100)),
            test_candidate(2, Some("Tech"), Some(5_000)),
            test_candidate(3, None, None),
            test_candidate(4, Some("Energy"), Some(500)),
        ]
    }

    #[test]
    fn unconstrained_budget_keeps_everything() {
        let all = universe();
        assert_eq!(filter_affordable(&all, None).len(), 4);
    }

    #[test]
    fn excludes_expensive_and_unpriced_candidates() {
        let all = universe();
        let ids: Vec<_> = filter_affordable(&all, Some(Decimal::from(500)))
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn zero_price_counts_as_unknown_under_a_budget() {
        let all = vec![
            test_candidate(1, Some("Tech"), Some(0)),
            test_candidate(2, Some("Tech"), Some(300)),
        ];
        assert!(filter_affordable(&all, Some(Decimal::ZERO)).is_empty());
        let ids: Vec<_> = filter_affordable(&all, Some(Decimal::from(1_000)))
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(filter_affordable(&all, None).len(), 2);
    }

    #[test]
    fn filtered_out_implies_over_budget_and_lower_budget_never_grows_the_set() {
        let all = universe();
        let mut previous = usize::MAX;
        for budget in [10_000, 5_000, 499, 100, 99, 0] {
            let budget = Decimal::from(budget);
            let kept = filter_affordable(&all, Some(budget));
            for c in &all {
                if !kept.iter().any(|k| k.id == c.id) {
                    assert!(c.latest_price.map_or(true, |p| p > budget));
                }
            }
            assert!(kept.len() <= previous);
            previous = kept.len();
        }
        assert_eq!(previous, 0);
    }
}
