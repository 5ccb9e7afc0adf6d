use kdp_core::{PipelineBucket, Score};
use tracing::debug;

use crate::scoring::ScoredOpportunity;

/// Groups scored opportunities into one bucket per score, highest first.
///
/// All ten buckets are always present; empty ones carry zero count and value so
/// charts get a fixed-length series.
pub fn aggregate(scored: &[ScoredOpportunity]) -> Vec<PipelineBucket> {
    let mut totals = [(0usize, 0.0f64); Score::MAX as usize];
    for item in scored {
        let slot = &mut totals[usize::from(item.score().get() - Score::MIN)];
        slot.0 += 1;
        slot.1 += item.value();
    }

    let buckets: Vec<PipelineBucket> = Score::all_descending()
        .map(|score| {
            let (count, total_value) = totals[usize::from(score.get() - Score::MIN)];
            PipelineBucket {
                score: score.get(),
                count,
                total_value,
            }
        })
        .collect();

    debug!(opportunities = scored.len(), "aggregated opportunity pipeline");
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Scorer;
    use chrono::{Days, NaiveDate};
    use kdp_core::{Opportunity, OpportunityStatus};

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn scored(records: &[(&str, Option<&str>, f64, u64)]) -> Vec<ScoredOpportunity> {
        let scorer = Scorer::default();
        records
            .iter()
            .map(|(id, naics, value, age)| {
                let opportunity = Opportunity {
                    id: id.to_string(),
                    title: id.to_string(),
                    agency: "GSA".to_string(),
                    naics_code: naics.map(str::to_string),
                    estimated_value: *value,
                    posted_date: as_of().checked_sub_days(Days::new(*age)),
                    status: OpportunityStatus::Open,
                };
                scorer.score_opportunity(&opportunity, as_of()).expect("score")
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_ten_zero_buckets() {
        let buckets = aggregate(&[]);
        assert_eq!(buckets.len(), 10);
        let scores: Vec<u8> = buckets.iter().map(|b| b.score).collect();
        assert_eq!(scores, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert!(buckets.iter().all(|b| b.count == 0 && b.total_value == 0.0));
    }

    #[test]
    fn counts_and_values_are_conserved() {
        let items = scored(&[
            ("a", Some("541614"), 150_000.0, 0),
            ("b", Some("541614"), 150_000.0, 0),
            ("c", Some("999999"), 1_000.0, 365),
            ("d", None, 60_000.0, 30),
            ("e", Some("336611"), 2_500_000.0, 10),
        ]);
        let buckets = aggregate(&items);

        assert_eq!(buckets.len(), 10);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), items.len());
        let input_total: f64 = items.iter().map(ScoredOpportunity::value).sum();
        let bucket_total: f64 = buckets.iter().map(|b| b.total_value).sum();
        assert!((input_total - bucket_total).abs() < 1e-6);

        for item in &items {
            let bucket = buckets
                .iter()
                .find(|b| b.score == item.score().get())
                .expect("bucket for score");
            assert!(bucket.count >= 1);
        }
    }

    #[test]
    fn identical_scores_share_a_bucket() {
        let items = scored(&[
            ("a", Some("541614"), 150_000.0, 0),
            ("b", Some("541614"), 150_000.0, 0),
        ]);
        let buckets = aggregate(&items);
        let score = items[0].score().get();
        let bucket = buckets.iter().find(|b| b.score == score).expect("bucket");
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.total_value, 300_000.0);
        assert_eq!(aggregate(&items), buckets);
    }
}
