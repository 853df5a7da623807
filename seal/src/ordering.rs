use std::collections::BTreeMap;

use crate::record::{Comparison, OrderingBreach, Prediction, SealedDataset};

/// Every comparison whose prediction was not committed strictly before the
/// dataset was sealed. Comparisons naming unknown predictions or datasets are
/// skipped; the seal rejects those at record time.
#[must_use]
pub fn check_temporal_ordering(
    predictions: &[Prediction],
    seals: &[SealedDataset],
    comparisons: &[Comparison],
) -> Vec<OrderingBreach> {
    let predictions: BTreeMap<&str, &Prediction> =
        predictions.iter().map(|p| (p.name.as_str(), p)).collect();
    let seals: BTreeMap<&str, &SealedDataset> =
        seals.iter().map(|s| (s.dataset_name.as_str(), s)).collect();

    comparisons
        .iter()
        .filter_map(|c| {
            let prediction = predictions.get(c.prediction.as_str())?;
            let seal = seals.get(c.dataset_name.as_str())?;
            breach(prediction, seal)
        })
        .collect()
}

pub(crate) fn breach(prediction: &Prediction, seal: &SealedDataset) -> Option<OrderingBreach> {
    (prediction.registered_at >= seal.sealed_at).then(|| OrderingBreach {
        prediction: prediction.name.clone(),
        dataset_name: seal.dataset_name.clone(),
        prediction_registered_at: prediction.registered_at,
        dataset_sealed_at: seal.sealed_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::check_temporal_ordering;
    use crate::record::{Comparison, Prediction, SealedDataset};

    #[test]
    fn prediction_at_or_after_seal_breaches() {
        let t0 = Utc::now();
        let seals = [SealedDataset {
            dataset_name: "dataset_v1".to_string(),
            digest: "0".repeat(64),
            byte_len: 3,
            sealed_at: t0,
        }];
        let predictions = [
            Prediction::new("early", 1.0, t0 - Duration::seconds(5)),
            Prediction::new("same_instant", 1.0, t0),
            Prediction::new("late", 1.0, t0 + Duration::seconds(5)),
        ];
        let comparisons: Vec<Comparison> = predictions
            .iter()
            .map(|p| Comparison {
                prediction: p.name.clone(),
                dataset_name: "dataset_v1".to_string(),
                compared_at: t0 + Duration::seconds(10),
            })
            .collect();

        let breaches = check_temporal_ordering(&predictions, &seals, &comparisons);
        let names: Vec<&str> = breaches.iter().map(|b| b.prediction.as_str()).collect();
        assert_eq!(names, vec!["same_instant", "late"]);
    }
}
