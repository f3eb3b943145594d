//! Entity enrichment orchestrator
//!
//! Drives one enrichment run end to end: load the Category Store, run the
//! keyword pass, optionally fall back to the classifier, default whatever is
//! left to sentinels, claim newly used shared records, and persist both the
//! store and the enriched entity table. Priority per entity:
//! keyword match (most specific key) -> classifier prediction -> sentinels.
//!
//! All collaborators arrive through `EnrichmentContext`; the engine keeps no
//! global state between calls.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::{
    apply_predicted_label, split_label, FallbackClassifier, PREDICTED_MARKER,
};
use crate::error::{Error, Result};
use crate::matcher::{match_entities, MatchOutcome};
use crate::models::{
    CategoryRecord, Entity, EntityKind, MatchMode, COMMON_NAME_MAX, LEVEL_COUNT, MISSING_SENTINEL,
    OTHER_SENTINEL,
};
use crate::store::{sorted_for_matching, CategoryStore, StorePartition};
use crate::storage::{Fetch, ObjectStore};

/// Everything one enrichment run needs, passed explicitly
pub struct EnrichmentContext<'a> {
    pub storage: &'a dyn ObjectStore,
    pub company: String,
    /// Bucket/key of the persisted Category Store
    pub store_bucket: String,
    pub store_key: String,
    /// Bucket/key the enriched entity table is written to
    pub output_bucket: String,
    pub output_key: String,
    /// Seed for the classifier's RNG; fixed seed means reproducible runs
    pub seed: u64,
}

/// Counters from one enrichment run
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentRun {
    pub processed: usize,
    pub matched_by_keyword: usize,
    pub predicted: usize,
    pub defaulted: usize,
    pub claimed: usize,
    pub store_records: usize,
}

/// Enrichment driver bound to one context
pub struct Enricher<'a> {
    ctx: &'a EnrichmentContext<'a>,
}

impl<'a> Enricher<'a> {
    pub fn new(ctx: &'a EnrichmentContext<'a>) -> Self {
        Self { ctx }
    }

    /// Cold-start pass: keyword matching only.
    ///
    /// Entities no key resolves get sentinel defaults, and a synthetic
    /// missing-entity row is appended so downstream joins against a
    /// deliberately absent id do not drop rows.
    pub fn cold_start(
        &self,
        entities: Vec<Entity>,
        kind: EntityKind,
    ) -> Result<(Vec<Entity>, EnrichmentRun)> {
        let mut run = EnrichmentRun {
            processed: entities.len(),
            ..Default::default()
        };

        let store = self.category_store();
        let mut partition = store.load(&self.ctx.company)?;
        partition.mine = sorted_for_matching(std::mem::take(&mut partition.mine));

        let MatchOutcome {
            mut matched,
            unmatched,
            ..
        } = match_entities(entities, &mut partition.mine, kind.default_match_mode());
        run.matched_by_keyword = matched.len();

        for mut entity in unmatched {
            default_to_sentinels(&mut entity);
            run.defaulted += 1;
            matched.push(entity);
        }
        matched.push(missing_entity_row(kind));

        self.finish(&store, partition, matched, run, false)
    }

    /// Incremental pass: keyword matching with classifier fallback.
    ///
    /// The fallback only trains when this run left entities unmatched AND
    /// the company's partition holds labeled history; otherwise unresolved
    /// entities fall straight through to sentinels. The batch is folded into
    /// the previously persisted entity master, never written over it.
    pub fn incremental(
        &self,
        entities: Vec<Entity>,
        kind: EntityKind,
    ) -> Result<(Vec<Entity>, EnrichmentRun)> {
        let mut run = EnrichmentRun {
            processed: entities.len(),
            ..Default::default()
        };

        let store = self.category_store();
        let mut partition = store.load(&self.ctx.company)?;
        partition.mine = sorted_for_matching(std::mem::take(&mut partition.mine));

        let MatchOutcome {
            mut matched,
            unmatched,
            ..
        } = match_entities(entities, &mut partition.mine, kind.default_match_mode());
        run.matched_by_keyword = matched.len();

        if !unmatched.is_empty() && !partition.mine.is_empty() {
            match FallbackClassifier::train(&partition.mine, self.ctx.seed) {
                Ok((classifier, _report)) => {
                    let mut next_index = partition.next_index();
                    for mut entity in unmatched {
                        let label = classifier.predict_label(&entity.lookup_text()).to_string();
                        apply_predicted_label(&mut entity, &label);
                        partition
                            .mine
                            .push(predicted_record(next_index, &self.ctx.company, &entity, &label));
                        next_index += 1;
                        run.predicted += 1;
                        matched.push(entity);
                    }
                }
                Err(e) => {
                    // Labeled history was present but unusable; fall through
                    warn!("Classifier unavailable ({}); defaulting to sentinels", e);
                    for mut entity in unmatched {
                        default_to_sentinels(&mut entity);
                        run.defaulted += 1;
                        matched.push(entity);
                    }
                }
            }
        } else {
            for mut entity in unmatched {
                default_to_sentinels(&mut entity);
                run.defaulted += 1;
                matched.push(entity);
            }
        }

        self.finish(&store, partition, matched, run, true)
    }

    /// Claim, persist the store and the enriched table, finalize counters.
    /// Storage failures here are fatal by contract. With `update_master` the
    /// batch merges into the previously persisted table (prior non-null
    /// values win); without it the table is replaced outright.
    fn finish(
        &self,
        store: &CategoryStore<'_>,
        mut partition: StorePartition,
        enriched: Vec<Entity>,
        mut run: EnrichmentRun,
        update_master: bool,
    ) -> Result<(Vec<Entity>, EnrichmentRun)> {
        run.claimed = CategoryStore::claim(&mut partition.mine, &self.ctx.company);
        run.store_records = partition.mine.len() + partition.others.len();
        store.save(&partition)?;

        let mut output = if update_master {
            match self
                .ctx
                .storage
                .fetch(&self.ctx.output_bucket, &self.ctx.output_key)?
            {
                Fetch::Found(bytes) => {
                    let mut master = entities_from_csv(&bytes)?;
                    merge_into_master(&mut master, &enriched);
                    master
                }
                Fetch::Missing => enriched,
            }
        } else {
            enriched
        };

        for (i, entity) in output.iter_mut().enumerate() {
            entity.index = i as i64;
        }
        self.ctx.storage.store(
            &self.ctx.output_bucket,
            &self.ctx.output_key,
            &entities_to_csv(&output)?,
        )?;
        // Run summary rides along as a sibling artifact for audits
        self.ctx.storage.store(
            &self.ctx.output_bucket,
            &format!("{}.run.json", self.ctx.output_key),
            &serde_json::to_vec_pretty(&run)?,
        )?;

        info!(
            "Enrichment run for {}: {} processed, {} keyword, {} predicted, {} defaulted, {} claimed",
            self.ctx.company,
            run.processed,
            run.matched_by_keyword,
            run.predicted,
            run.defaulted,
            run.claimed
        );
        Ok((output, run))
    }

    fn category_store(&self) -> CategoryStore<'a> {
        CategoryStore::new(
            self.ctx.storage,
            &self.ctx.store_bucket,
            &self.ctx.store_key,
        )
    }
}

/// Merge a freshly enriched batch into a previously enriched master.
///
/// Existing rows keep their prior non-null values; only null target columns
/// are back-filled. Rows the master has never seen are appended. Any row
/// still without a common name takes its ERP id as a last resort.
pub fn merge_into_master(master: &mut Vec<Entity>, enriched: &[Entity]) {
    for entity in enriched {
        match master.iter_mut().find(|m| m.id == entity.id) {
            Some(existing) => {
                if existing.common_name.is_none() {
                    existing.common_name = entity.common_name.clone();
                }
                for i in 0..LEVEL_COUNT {
                    if existing.level(i).is_none() {
                        existing.set_level(i, entity.level(i).map(|s| s.to_string()));
                    }
                }
                if existing.parent_name.is_none() {
                    existing.parent_name = entity.parent_name.clone();
                }
            }
            None => master.push(entity.clone()),
        }
    }

    for (i, entity) in master.iter_mut().enumerate() {
        entity.index = i as i64;
        if entity.common_name.is_none() {
            entity.common_name = Some(entity.id.clone());
        }
    }
}

/// Sentinel defaults for an entity nothing could classify: common name is
/// the first 15 characters of the display name, every empty level "OTHER"
fn default_to_sentinels(entity: &mut Entity) {
    if entity.common_name.is_none() {
        let name: String = entity.display_name().chars().take(COMMON_NAME_MAX).collect();
        let name = name.trim().to_string();
        entity.common_name = Some(if name.is_empty() {
            entity.kind.as_str().to_string()
        } else {
            name
        });
    }
    for i in 0..LEVEL_COUNT {
        if entity.level(i).is_none() {
            entity.set_level(i, Some(OTHER_SENTINEL.to_string()));
        }
    }
}

/// Synthetic row joined against when a line references an absent entity
fn missing_entity_row(kind: EntityKind) -> Entity {
    let mut entity = Entity::new(MISSING_SENTINEL, kind);
    entity.name = MISSING_SENTINEL.to_string();
    entity.common_name = Some(MISSING_SENTINEL.to_string());
    for i in 0..LEVEL_COUNT {
        entity.set_level(i, Some(OTHER_SENTINEL.to_string()));
    }
    entity
}

/// Synthetic store row recording a prediction, marked machine-derived
fn predicted_record(index: i64, company: &str, entity: &Entity, label: &str) -> CategoryRecord {
    let fields = split_label(label);
    let common = fields
        .get(LEVEL_COUNT)
        .cloned()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| entity.lookup_text());

    let mut record = CategoryRecord {
        index,
        company: Some(company.to_string()),
        search_key: entity.lookup_text(),
        common_name: format!("{}{}", common, PREDICTED_MARKER),
        level1: None,
        level2: None,
        level3: None,
        level4: None,
        level5: None,
        parent_name: fields.get(LEVEL_COUNT + 1).cloned().filter(|s| !s.is_empty()),
        found: true,
    };
    for i in 0..LEVEL_COUNT {
        record.set_level(i, fields.get(i).cloned());
    }
    record
}

/// Serialize entities to the persisted master schema (quote-all CSV)
pub fn entities_to_csv(entities: &[Entity]) -> Result<Vec<u8>> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    for entity in entities {
        wtr.serialize(entity)?;
    }
    wtr.flush()?;
    wtr.into_inner()
        .map_err(|e| Error::InvalidData(format!("CSV write failed: {}", e)))
}

/// Parse a persisted entity master
pub fn entities_from_csv(bytes: &[u8]) -> Result<Vec<Entity>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let mut entities = Vec::new();
    for result in rdr.deserialize() {
        entities.push(result?);
    }
    Ok(entities)
}
