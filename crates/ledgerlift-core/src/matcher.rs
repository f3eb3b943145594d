//! Keyword matcher: resolves entities against the Category Store
//!
//! Records must arrive longest-key-first (see `store::sorted_for_matching`);
//! the first key to match an entity wins and shorter keys never reconsider
//! it, which together implement "most specific key wins".

use tracing::debug;

use crate::models::{CategoryRecord, Entity, MatchMode};

/// Outcome of one matching pass
#[derive(Debug)]
pub struct MatchOutcome {
    /// Entities assigned a category this pass
    pub matched: Vec<Entity>,
    /// Entities no key resolved; these flow to the classifier or to
    /// sentinel defaults
    pub unmatched: Vec<Entity>,
    /// The records that matched at least one entity, deduplicated by
    /// common name (first occurrence wins) so a downstream merge does not
    /// fan out
    pub matched_records: Vec<CategoryRecord>,
}

fn key_matches(lookup: &str, key: &str, mode: MatchMode) -> bool {
    if key.is_empty() {
        return false;
    }
    match mode {
        MatchMode::Contains => lookup.contains(key),
        MatchMode::StartsWith => lookup.starts_with(key),
    }
}

/// Match entities against sorted records, setting `found` on every record
/// that resolves at least one entity.
///
/// `records` is mutated in place so the caller's partition keeps the flags
/// for the claim/save steps.
pub fn match_entities(
    entities: Vec<Entity>,
    records: &mut [CategoryRecord],
    mode: MatchMode,
) -> MatchOutcome {
    let mut matched: Vec<Entity> = Vec::new();
    let mut pending: Vec<(Entity, String)> = entities
        .into_iter()
        .map(|e| {
            let lookup = e.lookup_text();
            (e, lookup)
        })
        .collect();

    for record in records.iter_mut() {
        let key = record.search_key.trim().to_uppercase();
        let mut i = 0;
        while i < pending.len() {
            if key_matches(&pending[i].1, &key, mode) {
                let (mut entity, _) = pending.remove(i);
                entity.apply_record(record);
                record.found = true;
                matched.push(entity);
            } else {
                i += 1;
            }
        }
        if pending.is_empty() {
            break;
        }
    }

    let matched_records = dedup_by_common_name(
        records
            .iter()
            .filter(|r| r.found)
            .cloned()
            .collect::<Vec<_>>(),
    );

    let unmatched: Vec<Entity> = pending.into_iter().map(|(e, _)| e).collect();
    debug!(
        "Keyword pass: {} matched, {} unmatched, {} distinct categories",
        matched.len(),
        unmatched.len(),
        matched_records.len()
    );

    MatchOutcome {
        matched,
        unmatched,
        matched_records,
    }
}

/// Keep the first record for each common name, preserving order
pub fn dedup_by_common_name(records: Vec<CategoryRecord>) -> Vec<CategoryRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.common_name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use crate::store::sorted_for_matching;

    fn record(key: &str, common: &str, level1: &str) -> CategoryRecord {
        CategoryRecord {
            index: 0,
            company: None,
            search_key: key.to_string(),
            common_name: common.to_string(),
            level1: Some(level1.to_string()),
            level2: None,
            level3: None,
            level4: None,
            level5: None,
            parent_name: None,
            found: false,
        }
    }

    fn item(id: &str, desc: &str) -> Entity {
        let mut e = Entity::new(id, EntityKind::Item);
        e.description = desc.to_string();
        e
    }

    #[test]
    fn test_contains_match_assigns_category() {
        let mut records = vec![record("WIRE", "Wire", "ELEC")];
        let outcome = match_entities(
            vec![item("I1", "10AWG COPPER WIRE")],
            &mut records,
            MatchMode::Contains,
        );
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].level(0), Some("ELEC"));
        assert!(records[0].found);
    }

    #[test]
    fn test_startswith_does_not_match_interior() {
        let mut records = vec![record("WIRE", "Wire", "ELEC")];
        let outcome = match_entities(
            vec![item("I1", "COPPER WIRE")],
            &mut records,
            MatchMode::StartsWith,
        );
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.unmatched.len(), 1);
        assert!(!records[0].found);
    }

    #[test]
    fn test_longer_key_wins_over_shorter() {
        // Both AB and ABC match, but ABC is more specific and sorted first
        let mut records = sorted_for_matching(vec![
            record("AB", "Broad", "BROAD"),
            record("ABC", "Narrow", "NARROW"),
        ]);
        let outcome = match_entities(
            vec![item("I1", "ABC WIDGET")],
            &mut records,
            MatchMode::Contains,
        );
        assert_eq!(outcome.matched[0].common_name.as_deref(), Some("Narrow"));
        assert_eq!(outcome.matched[0].level(0), Some("NARROW"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let mut records = vec![record("wire", "Wire", "ELEC")];
        let outcome = match_entities(
            vec![item("I1", "copper wire")],
            &mut records,
            MatchMode::Contains,
        );
        assert_eq!(outcome.matched.len(), 1);
    }

    #[test]
    fn test_matched_records_dedup_by_common_name() {
        let mut records = vec![
            record("WIRE", "Wire", "ELEC"),
            record("CABLE", "Wire", "ELEC"),
        ];
        let outcome = match_entities(
            vec![item("I1", "WIRE SPOOL"), item("I2", "CABLE TIE")],
            &mut records,
            MatchMode::Contains,
        );
        assert_eq!(outcome.matched.len(), 2);
        assert_eq!(outcome.matched_records.len(), 1);
        assert_eq!(outcome.matched_records[0].search_key, "WIRE");
    }

    #[test]
    fn test_unmatched_keep_no_category() {
        let mut records = vec![record("WIRE", "Wire", "ELEC")];
        let outcome = match_entities(
            vec![item("I2", "WIDGET")],
            &mut records,
            MatchMode::Contains,
        );
        assert_eq!(outcome.unmatched.len(), 1);
        assert!(outcome.unmatched[0].common_name.is_none());
    }
}
