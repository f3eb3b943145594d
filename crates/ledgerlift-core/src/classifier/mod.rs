//! Fallback text classifier for entities the keyword pass could not resolve
//!
//! The Category Store's labeled history doubles as a training set: search
//! keys become TF-IDF documents, and the full hierarchy tuple is joined into
//! one composite label so a single multi-class forest predicts every level
//! jointly. That keeps level co-occurrence consistent (Level2 always agrees
//! with Level1) at the cost of requiring an exact composite match to count
//! as correct in the holdout diagnostics.
//!
//! Training is gated by the caller: no unmatched entities or an empty store
//! partition means no model is built at all.

mod forest;
mod tfidf;

pub use forest::{ForestConfig, RandomForest};
pub use tfidf::TfidfVectorizer;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{CategoryRecord, Entity, LEVEL_COUNT};

/// Delimiter joining hierarchy fields into one composite label. Chosen to
/// never appear in ERP identifiers or descriptions.
pub const LABEL_DELIMITER: &str = " :|: ";

/// Suffix marking store rows whose hierarchy came from the model rather
/// than human curation
pub const PREDICTED_MARKER: &str = " : LEVELS ARE PREDICTED";

/// Cap on rows drawn from the store for training
pub const MAX_TRAINING_ROWS: usize = 10_000;

/// Cap on the TF-IDF vocabulary
pub const MAX_FEATURES: usize = 500;

/// Join a record's hierarchy into the composite label:
/// Level1..Level5, CommonName, then ParentName when present
pub fn compose_label(record: &CategoryRecord) -> String {
    let mut fields: Vec<String> = (0..LEVEL_COUNT)
        .map(|i| record.level(i).unwrap_or("").to_string())
        .collect();
    fields.push(record.common_name.clone());
    if let Some(parent) = record.parent_name.as_deref().filter(|s| !s.is_empty()) {
        fields.push(parent.to_string());
    }
    fields.join(LABEL_DELIMITER)
}

/// Split a composite label back into its ordered fields
pub fn split_label(label: &str) -> Vec<String> {
    label.split(LABEL_DELIMITER).map(|s| s.to_string()).collect()
}

/// Write a predicted composite label onto an entity
pub fn apply_predicted_label(entity: &mut Entity, label: &str) {
    let fields = split_label(label);
    for i in 0..LEVEL_COUNT {
        entity.set_level(i, fields.get(i).cloned());
    }
    entity.common_name = fields
        .get(LEVEL_COUNT)
        .cloned()
        .filter(|s| !s.is_empty());
    entity.parent_name = fields
        .get(LEVEL_COUNT + 1)
        .cloned()
        .filter(|s| !s.is_empty());
}

/// Holdout diagnostics from one training run. Advisory only: the pipeline
/// proceeds whatever the numbers say.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub training_rows: usize,
    pub holdout_rows: usize,
    /// Accuracy per composite-label field position
    pub per_field_accuracy: Vec<f64>,
    /// Fraction of holdout rows with every field correct simultaneously
    pub exact_match_accuracy: f64,
}

/// Trained fallback classifier
pub struct FallbackClassifier {
    vectorizer: TfidfVectorizer,
    forest: RandomForest,
    labels: Vec<String>,
}

impl FallbackClassifier {
    /// Train on fully-labeled store rows.
    ///
    /// Rows with any missing hierarchy level are excluded so the model never
    /// learns from incomplete labels; at most `MAX_TRAINING_ROWS` survivors
    /// are used (sampled when there are more). Errors only when nothing is
    /// eligible — the caller's gating should normally prevent that.
    pub fn train(rows: &[CategoryRecord], seed: u64) -> Result<(Self, TrainReport)> {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut eligible: Vec<&CategoryRecord> =
            rows.iter().filter(|r| r.all_levels_populated()).collect();
        if eligible.is_empty() {
            return Err(Error::Classifier(
                "no fully-labeled rows available for training".to_string(),
            ));
        }
        eligible.shuffle(&mut rng);
        eligible.truncate(MAX_TRAINING_ROWS);

        let docs: Vec<String> = eligible.iter().map(|r| r.search_key.clone()).collect();
        let composite: Vec<String> = eligible.iter().map(|r| compose_label(r)).collect();

        // Distinct composite labels become the class set, in first-seen order
        let mut labels: Vec<String> = Vec::new();
        let mut y: Vec<usize> = Vec::with_capacity(composite.len());
        for label in &composite {
            let class = match labels.iter().position(|l| l == label) {
                Some(class) => class,
                None => {
                    labels.push(label.clone());
                    labels.len() - 1
                }
            };
            y.push(class);
        }

        let vectorizer = TfidfVectorizer::fit(&docs, MAX_FEATURES);
        if vectorizer.n_features() == 0 {
            return Err(Error::Classifier(
                "training vocabulary is empty".to_string(),
            ));
        }
        let x: Vec<Vec<f64>> = docs.iter().map(|d| vectorizer.transform(d)).collect();

        // 80/20 split for the holdout diagnostics
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.shuffle(&mut rng);
        let holdout_len = order.len() / 5;
        let (holdout_idx, train_idx) = order.split_at(holdout_len);

        let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| x[i].clone()).collect();
        let train_y: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();

        let forest = RandomForest::fit(
            &train_x,
            &train_y,
            labels.len(),
            &ForestConfig::default(),
            &mut rng,
        );

        let classifier = Self {
            vectorizer,
            forest,
            labels,
        };

        // Score on the holdout when there is one, else on the training rows
        let eval_idx: &[usize] = if holdout_idx.is_empty() {
            train_idx
        } else {
            holdout_idx
        };
        let report = classifier.score(&x, &composite, eval_idx, train_idx.len());
        info!(
            "Fallback classifier trained on {} rows; holdout exact-match {:.3}, per-field {:?}",
            report.training_rows, report.exact_match_accuracy, report.per_field_accuracy
        );

        Ok((classifier, report))
    }

    fn score(
        &self,
        x: &[Vec<f64>],
        composite: &[String],
        eval_idx: &[usize],
        training_rows: usize,
    ) -> TrainReport {
        let n_fields = composite
            .iter()
            .map(|l| split_label(l).len())
            .max()
            .unwrap_or(0);
        let mut field_hits = vec![0usize; n_fields];
        let mut exact_hits = 0usize;

        for &i in eval_idx {
            let predicted = &self.labels[self.forest.predict(&x[i])];
            if predicted == &composite[i] {
                exact_hits += 1;
            }
            let predicted_fields = split_label(predicted);
            let actual_fields = split_label(&composite[i]);
            for f in 0..n_fields {
                if predicted_fields.get(f) == actual_fields.get(f) {
                    field_hits[f] += 1;
                }
            }
        }

        let denom = eval_idx.len().max(1) as f64;
        TrainReport {
            training_rows,
            holdout_rows: eval_idx.len(),
            per_field_accuracy: field_hits.iter().map(|&h| h as f64 / denom).collect(),
            exact_match_accuracy: exact_hits as f64 / denom,
        }
    }

    /// Predict the composite label for an entity's lookup text
    pub fn predict_label(&self, lookup_text: &str) -> &str {
        let row = self.vectorizer.transform(lookup_text);
        &self.labels[self.forest.predict(&row)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    fn labeled_record(key: &str, l1: &str, common: &str) -> CategoryRecord {
        CategoryRecord {
            index: 0,
            company: Some("ACME".to_string()),
            search_key: key.to_string(),
            common_name: common.to_string(),
            level1: Some(l1.to_string()),
            level2: Some("L2".to_string()),
            level3: Some("OTHER".to_string()),
            level4: Some("OTHER".to_string()),
            level5: Some("OTHER".to_string()),
            parent_name: None,
            found: false,
        }
    }

    #[test]
    fn test_composite_label_round_trip() {
        let mut record = labeled_record("WIRE", "ELEC", "Wire Connector");
        record.level2 = Some("WIRE".to_string());
        let label = compose_label(&record);
        assert_eq!(
            label,
            "ELEC :|: WIRE :|: OTHER :|: OTHER :|: OTHER :|: Wire Connector"
        );
        let fields = split_label(&label);
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], "ELEC");
        assert_eq!(fields[5], "Wire Connector");
    }

    #[test]
    fn test_composite_label_includes_parent_when_present() {
        let mut record = labeled_record("ACME SUPPLY", "RETAIL", "Acme");
        record.parent_name = Some("Acme Corp".to_string());
        let fields = split_label(&compose_label(&record));
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[6], "Acme Corp");
    }

    #[test]
    fn test_apply_predicted_label() {
        let mut entity = Entity::new("I1", EntityKind::Item);
        apply_predicted_label(
            &mut entity,
            "ELEC :|: WIRE :|: OTHER :|: OTHER :|: OTHER :|: Wire Connector",
        );
        assert_eq!(entity.level(0), Some("ELEC"));
        assert_eq!(entity.level(1), Some("WIRE"));
        assert_eq!(entity.common_name.as_deref(), Some("Wire Connector"));
        assert_eq!(entity.parent_name, None);
    }

    #[test]
    fn test_train_rejects_unlabeled_history() {
        let mut record = labeled_record("WIRE", "ELEC", "Wire");
        record.level3 = None;
        let err = FallbackClassifier::train(&[record], 42);
        assert!(err.is_err());
    }

    #[test]
    fn test_train_rejects_keys_with_no_usable_tokens() {
        // Single-character keys all tokenize away, leaving no vocabulary
        let rows = vec![
            labeled_record("A", "ELEC", "Wire"),
            labeled_record("B", "PLUMB", "Pipe"),
        ];
        let err = FallbackClassifier::train(&rows, 42);
        assert!(err.is_err());
    }

    #[test]
    fn test_train_and_predict_separable_vocabulary() {
        // Two disjoint vocabularies, several rows each
        let mut rows = Vec::new();
        for key in [
            "COPPER WIRE",
            "COPPER CABLE WIRE",
            "WIRE SPOOL COPPER",
            "BRAIDED COPPER WIRE",
        ] {
            rows.push(labeled_record(key, "ELEC", "Wire"));
        }
        for key in [
            "PVC PIPE",
            "PVC DRAIN PIPE",
            "PIPE FITTING PVC",
            "SCHEDULE 40 PVC PIPE",
        ] {
            rows.push(labeled_record(key, "PLUMB", "Pipe"));
        }

        let (classifier, report) = FallbackClassifier::train(&rows, 42).unwrap();
        assert!(report.training_rows > 0);

        let predicted = classifier.predict_label("COPPER WIRE 10AWG");
        assert!(predicted.starts_with("ELEC"));
        let predicted = classifier.predict_label("PVC PIPE 2IN");
        assert!(predicted.starts_with("PLUMB"));
    }
}
