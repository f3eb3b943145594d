//! Data models for the classification and reconciliation engine

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Hierarchy value assigned when neither keyword nor classifier resolves a level
pub const OTHER_SENTINEL: &str = "OTHER";

/// Identifier used for the synthetic absent-entity row in enriched masters
pub const MISSING_SENTINEL: &str = "MISSING";

/// Number of hierarchy levels carried on records and entities
pub const LEVEL_COUNT: usize = 5;

/// Maximum characters of display name used as a defaulted common name
pub const COMMON_NAME_MAX: usize = 15;

/// Kind of master entity being classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    Item,
    Customer,
    Vendor,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Item => "ITEM",
            EntityKind::Customer => "CUSTOMER",
            EntityKind::Vendor => "VENDOR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ITEM" => Some(EntityKind::Item),
            "CUSTOMER" => Some(EntityKind::Customer),
            "VENDOR" => Some(EntityKind::Vendor),
            _ => None,
        }
    }

    /// Match mode used for this kind unless the caller overrides it.
    ///
    /// Item descriptions embed the keyword anywhere ("10AWG COPPER WIRE"),
    /// customer/vendor names lead with it ("ACME SUPPLY OF OHIO").
    pub fn default_match_mode(&self) -> MatchMode {
        match self {
            EntityKind::Item => MatchMode::Contains,
            EntityKind::Customer | EntityKind::Vendor => MatchMode::StartsWith,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a search key is tested against an entity's lookup text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Key appears anywhere in the lookup text
    Contains,
    /// Lookup text begins with the key
    StartsWith,
}

/// One row of the persisted keyword -> hierarchy mapping
///
/// A record with `company = None` is shared: it applies to any company until
/// a run matches it, at which point that company claims it (first-claim-wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    #[serde(rename = "Index")]
    pub index: i64,
    #[serde(rename = "Company")]
    pub company: Option<String>,
    #[serde(rename = "SearchKey")]
    pub search_key: String,
    #[serde(rename = "CommonName")]
    pub common_name: String,
    #[serde(rename = "Level1")]
    pub level1: Option<String>,
    #[serde(rename = "Level2")]
    pub level2: Option<String>,
    #[serde(rename = "Level3")]
    pub level3: Option<String>,
    #[serde(rename = "Level4")]
    pub level4: Option<String>,
    #[serde(rename = "Level5")]
    pub level5: Option<String>,
    #[serde(rename = "ParentName")]
    pub parent_name: Option<String>,
    /// Recomputed each run: true if this run matched at least one entity.
    /// Never persisted.
    #[serde(skip)]
    pub found: bool,
}

impl CategoryRecord {
    pub fn level(&self, i: usize) -> Option<&str> {
        let l = match i {
            0 => &self.level1,
            1 => &self.level2,
            2 => &self.level3,
            3 => &self.level4,
            4 => &self.level5,
            _ => return None,
        };
        l.as_deref().filter(|s| !s.is_empty())
    }

    pub fn set_level(&mut self, i: usize, value: Option<String>) {
        let slot = match i {
            0 => &mut self.level1,
            1 => &mut self.level2,
            2 => &mut self.level3,
            3 => &mut self.level4,
            4 => &mut self.level5,
            _ => return,
        };
        *slot = value.filter(|s| !s.is_empty());
    }

    /// Whether every hierarchy level carries a value. Rows failing this are
    /// excluded from classifier training so the model never learns from
    /// half-labeled history.
    pub fn all_levels_populated(&self) -> bool {
        (0..LEVEL_COUNT).all(|i| self.level(i).is_some())
    }

    pub fn is_unclaimed(&self) -> bool {
        self.company.is_none()
    }
}

/// One raw item/customer/vendor row being classified
///
/// Entities are rebuilt from the source extract each run and enriched in
/// place. Only the Category Store persists between runs; the enriched entity
/// table is written once per run as an output artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "Index")]
    pub index: i64,
    #[serde(rename = "ErpId")]
    pub id: String,
    #[serde(rename = "Kind")]
    pub kind: EntityKind,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Number")]
    pub number: String,
    #[serde(rename = "CommonName")]
    pub common_name: Option<String>,
    #[serde(rename = "Level1")]
    pub level1: Option<String>,
    #[serde(rename = "Level2")]
    pub level2: Option<String>,
    #[serde(rename = "Level3")]
    pub level3: Option<String>,
    #[serde(rename = "Level4")]
    pub level4: Option<String>,
    #[serde(rename = "Level5")]
    pub level5: Option<String>,
    #[serde(rename = "ParentName")]
    pub parent_name: Option<String>,
}

impl Entity {
    pub fn new(id: &str, kind: EntityKind) -> Self {
        Self {
            index: 0,
            id: id.to_string(),
            kind,
            name: String::new(),
            description: String::new(),
            number: String::new(),
            common_name: None,
            level1: None,
            level2: None,
            level3: None,
            level4: None,
            level5: None,
            parent_name: None,
        }
    }

    pub fn level(&self, i: usize) -> Option<&str> {
        let l = match i {
            0 => &self.level1,
            1 => &self.level2,
            2 => &self.level3,
            3 => &self.level4,
            4 => &self.level5,
            _ => return None,
        };
        l.as_deref().filter(|s| !s.is_empty())
    }

    pub fn set_level(&mut self, i: usize, value: Option<String>) {
        let slot = match i {
            0 => &mut self.level1,
            1 => &mut self.level2,
            2 => &mut self.level3,
            3 => &mut self.level4,
            4 => &mut self.level5,
            _ => return,
        };
        *slot = value.filter(|s| !s.is_empty());
    }

    /// Uppercased concatenation of the free-text lookup fields.
    ///
    /// Falls back to the kind token ("ITEM"/"CUSTOMER"/"VENDOR") when every
    /// lookup field is blank, so downstream text processing never sees an
    /// empty document.
    pub fn lookup_text(&self) -> String {
        let joined = [self.name.as_str(), self.description.as_str(), self.number.as_str()]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim())
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        if joined.is_empty() {
            self.kind.as_str().to_string()
        } else {
            joined
        }
    }

    /// Best human-readable name for this entity
    pub fn display_name(&self) -> &str {
        if !self.name.trim().is_empty() {
            &self.name
        } else if !self.description.trim().is_empty() {
            &self.description
        } else {
            &self.id
        }
    }

    /// Copy the hierarchy of a matched record onto this entity
    pub fn apply_record(&mut self, record: &CategoryRecord) {
        self.common_name = Some(record.common_name.clone());
        for i in 0..LEVEL_COUNT {
            self.set_level(i, record.level(i).map(|s| s.to_string()));
        }
        self.parent_name = record.parent_name.clone().filter(|s| !s.is_empty());
    }

    pub fn is_classified(&self) -> bool {
        self.common_name.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// Transaction/order header with its declared total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxnHeader {
    #[serde(rename = "TxnId")]
    pub txn_id: String,
    #[serde(rename = "Total")]
    pub total: f64,
    #[serde(rename = "Date")]
    pub date: Option<NaiveDate>,
}

/// One line of a transaction/order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxnLine {
    #[serde(rename = "TxnId")]
    pub txn_id: String,
    #[serde(rename = "ItemId")]
    pub item_id: String,
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Total")]
    pub total: f64,
}

/// Supported source ERP systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Erp {
    QuickBooks,
    Sage50,
    DynamicsGp,
}

impl Erp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quickbooks" | "qb" | "iif" => Some(Erp::QuickBooks),
            "sage50" | "sage" => Some(Erp::Sage50),
            "dynamicsgp" | "gp" => Some(Erp::DynamicsGp),
            _ => None,
        }
    }

    /// Column map for this ERP's exports.
    ///
    /// Each ERP re-names the same concepts; the engine itself only ever sees
    /// canonical fields, so adding an ERP means adding a map here, not
    /// another enrichment implementation.
    pub fn mapping(&self) -> ErpMapping {
        match self {
            Erp::QuickBooks => ErpMapping {
                entity_id: "NAME",
                entity_name: "NAME",
                entity_description: "DESC",
                entity_number: "REFNUM",
                txn_id: "TRNSID",
                txn_date: "DATE",
                header_total: "AMOUNT",
                line_item: "INVITEM",
                line_account: "ACCNT",
                line_total: "AMOUNT",
            },
            Erp::Sage50 => ErpMapping {
                entity_id: "Item_ID",
                entity_name: "Item_ID",
                entity_description: "Item_Description",
                entity_number: "Item_Class",
                txn_id: "Trx_Number",
                txn_date: "Trx_Date",
                header_total: "Trx_Amount",
                line_item: "Item_ID",
                line_account: "Account_ID",
                line_total: "Row_Amount",
            },
            Erp::DynamicsGp => ErpMapping {
                entity_id: "ITEMNMBR",
                entity_name: "ITEMNMBR",
                entity_description: "ITEMDESC",
                entity_number: "ITMCLSCD",
                txn_id: "DOCNUMBR",
                txn_date: "DOCDATE",
                header_total: "DOCAMNT",
                line_item: "ITEMNMBR",
                line_account: "ACTNUMST",
                line_total: "XTNDPRCE",
            },
        }
    }
}

/// Declarative column map from one ERP's export to the canonical model
#[derive(Debug, Clone, Copy)]
pub struct ErpMapping {
    pub entity_id: &'static str,
    pub entity_name: &'static str,
    pub entity_description: &'static str,
    pub entity_number: &'static str,
    pub txn_id: &'static str,
    pub txn_date: &'static str,
    pub header_total: &'static str,
    pub line_item: &'static str,
    pub line_account: &'static str,
    pub line_total: &'static str,
}

impl ErpMapping {
    /// Build entities from a raw extract frame. Rows with a blank id are
    /// skipped; hygiene (duplicate/invalid ids) belongs to the clean step.
    pub fn entities_from_frame(&self, frame: &Frame, kind: EntityKind) -> Result<Vec<Entity>> {
        let id_col = frame.col(self.entity_id).ok_or_else(|| {
            Error::InvalidData(format!("extract is missing id column {}", self.entity_id))
        })?;
        let name_col = frame.col(self.entity_name);
        let desc_col = frame.col(self.entity_description);
        let number_col = frame.col(self.entity_number);

        let mut entities = Vec::new();
        for row in &frame.rows {
            let id = row.get(id_col).map(|s| s.trim()).unwrap_or("");
            if id.is_empty() {
                continue;
            }
            let mut entity = Entity::new(id, kind);
            entity.index = entities.len() as i64;
            if let Some(c) = name_col {
                entity.name = row.get(c).cloned().unwrap_or_default();
            }
            if let Some(c) = desc_col {
                entity.description = row.get(c).cloned().unwrap_or_default();
            }
            if let Some(c) = number_col {
                entity.number = row.get(c).cloned().unwrap_or_default();
            }
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Build transaction headers from a raw extract frame
    pub fn headers_from_frame(&self, frame: &Frame) -> Result<Vec<TxnHeader>> {
        let id_col = frame.col(self.txn_id).ok_or_else(|| {
            Error::InvalidData(format!("extract is missing txn id column {}", self.txn_id))
        })?;
        let total_col = frame.col(self.header_total).ok_or_else(|| {
            Error::InvalidData(format!("extract is missing total column {}", self.header_total))
        })?;
        let date_col = frame.col(self.txn_date);

        let mut headers = Vec::new();
        for row in &frame.rows {
            let txn_id = row.get(id_col).map(|s| s.trim()).unwrap_or("");
            if txn_id.is_empty() {
                continue;
            }
            let total = parse_amount(row.get(total_col).map(|s| s.as_str()).unwrap_or(""))?;
            let date = date_col
                .and_then(|c| row.get(c))
                .and_then(|s| parse_date(s).ok());
            headers.push(TxnHeader {
                txn_id: txn_id.to_string(),
                total,
                date,
            });
        }
        Ok(headers)
    }

    /// Build transaction lines from a raw extract frame
    pub fn lines_from_frame(&self, frame: &Frame) -> Result<Vec<TxnLine>> {
        let id_col = frame.col(self.txn_id).ok_or_else(|| {
            Error::InvalidData(format!("extract is missing txn id column {}", self.txn_id))
        })?;
        let total_col = frame.col(self.line_total).ok_or_else(|| {
            Error::InvalidData(format!("extract is missing total column {}", self.line_total))
        })?;
        let item_col = frame.col(self.line_item);
        let account_col = frame.col(self.line_account);

        let mut lines = Vec::new();
        for row in &frame.rows {
            let txn_id = row.get(id_col).map(|s| s.trim()).unwrap_or("");
            if txn_id.is_empty() {
                continue;
            }
            let total = parse_amount(row.get(total_col).map(|s| s.as_str()).unwrap_or(""))?;
            lines.push(TxnLine {
                txn_id: txn_id.to_string(),
                item_id: item_col
                    .and_then(|c| row.get(c))
                    .cloned()
                    .unwrap_or_default(),
                account: account_col
                    .and_then(|c| row.get(c))
                    .cloned()
                    .unwrap_or_default(),
                total,
            });
        }
        Ok(lines)
    }
}

/// Parse a date in any of the formats legacy ERP exports use
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%Y-%m-%d", // 2024-01-15
        "%m-%d-%Y", // 01-15-2024
        "%Y-%m-%d %H:%M:%S", // Sage/GP datetime columns
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    Err(Error::InvalidData(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols, commas, and parens
pub fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    if cleaned.is_empty() {
        return Ok(0.0);
    }

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::InvalidData(format!("Unable to parse amount: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str) -> CategoryRecord {
        CategoryRecord {
            index: 0,
            company: None,
            search_key: key.to_string(),
            common_name: "Test".to_string(),
            level1: Some("ELEC".to_string()),
            level2: None,
            level3: None,
            level4: None,
            level5: None,
            parent_name: None,
            found: false,
        }
    }

    #[test]
    fn test_lookup_text_concatenates_and_uppercases() {
        let mut e = Entity::new("I1", EntityKind::Item);
        e.name = "widget".to_string();
        e.description = "10awg copper wire".to_string();
        assert_eq!(e.lookup_text(), "WIDGET 10AWG COPPER WIRE");
    }

    #[test]
    fn test_lookup_text_empty_falls_back_to_kind() {
        let e = Entity::new("C9", EntityKind::Customer);
        assert_eq!(e.lookup_text(), "CUSTOMER");
    }

    #[test]
    fn test_apply_record_copies_hierarchy() {
        let mut e = Entity::new("I1", EntityKind::Item);
        let mut r = record("WIRE");
        r.level2 = Some("WIRE".to_string());
        e.apply_record(&r);
        assert_eq!(e.common_name.as_deref(), Some("Test"));
        assert_eq!(e.level(0), Some("ELEC"));
        assert_eq!(e.level(1), Some("WIRE"));
        assert_eq!(e.level(2), None);
    }

    #[test]
    fn test_all_levels_populated() {
        let mut r = record("WIRE");
        assert!(!r.all_levels_populated());
        for i in 0..LEVEL_COUNT {
            r.set_level(i, Some("X".to_string()));
        }
        assert!(r.all_levels_populated());
    }

    #[test]
    fn test_default_match_modes() {
        assert_eq!(EntityKind::Item.default_match_mode(), MatchMode::Contains);
        assert_eq!(
            EntityKind::Customer.default_match_mode(),
            MatchMode::StartsWith
        );
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_amount("(45.00)").unwrap(), -45.0);
        assert_eq!(parse_amount("").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_date_variants() {
        assert_eq!(
            parse_date("01/15/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_entities_from_frame_uses_mapping() {
        let frame = Frame::new(
            vec!["ITEMNMBR".into(), "ITEMDESC".into(), "ITMCLSCD".into()],
            vec![
                vec!["I1".into(), "COPPER WIRE".into(), "ELEC".into()],
                vec!["".into(), "NO ID".into(), "X".into()],
            ],
        );
        let entities = Erp::DynamicsGp
            .mapping()
            .entities_from_frame(&frame, EntityKind::Item)
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "I1");
        assert_eq!(entities[0].description, "COPPER WIRE");
    }
}
