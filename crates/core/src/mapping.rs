// crates/core/src/mapping.rs
//! Column mapping for manual submissions.
//!
//! The backend renames uploaded columns to fixed Japanese target names before
//! running the association analysis, so the mapping is `source column -> target`.

use serde::{Deserialize, Serialize};

/// Card number / customer id.
pub const CARD_NUMBER: &str = "カード番号";
/// Purchase timestamp.
pub const PURCHASED_AT: &str = "利用日時";
/// Purchase amount.
pub const AMOUNT: &str = "利用金額";
/// Shop short name.
pub const SHOP_NAME: &str = "ショップ名略称";
pub const CATEGORY: &str = "カテゴリ";
pub const AGE: &str = "年齢";

/// Targets the backend refuses to process without.
pub const REQUIRED_TARGETS: [&str; 4] = [CARD_NUMBER, PURCHASED_AT, AMOUNT, SHOP_NAME];
pub const OPTIONAL_TARGETS: [&str; 2] = [CATEGORY, AGE];

pub const DEFAULT_MIN_SUPPORT: f64 = 0.0001;
pub const DEFAULT_MAX_LEN: u32 = 2;

/// Ordered `source -> target` pairs. Serialises as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(serde_json::Map<String, serde_json::Value>);

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `source` to `target`. Any earlier source mapped to the same
    /// target is dropped so each target has exactly one column.
    pub fn assign(&mut self, source: impl Into<String>, target: impl Into<String>) {
        let target = target.into();
        self.0.retain(|_, t| t.as_str() != Some(target.as_str()));
        self.0.insert(source.into(), serde_json::Value::String(target));
    }

    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.0.get(source).and_then(|v| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|t| (k.as_str(), t)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::Value::Object(self.0.clone()).to_string()
    }
}

/// Keep only the first source column proposed for each target, in response
/// order. Non-string targets are dropped.
pub fn dedupe_mapping(proposed: &serde_json::Map<String, serde_json::Value>) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    let mut used: Vec<&str> = Vec::new();
    for (source, target) in proposed {
        let Some(target) = target.as_str() else {
            continue;
        };
        if used.contains(&target) {
            continue;
        }
        used.push(target);
        mapping.assign(source.clone(), target);
    }
    mapping
}

/// Substring match used when the LLM mapping is unavailable: each target takes
/// the first column whose lower-cased name contains it or is contained by it.
pub fn fallback_mapping(columns: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    for target in REQUIRED_TARGETS.iter().chain(OPTIONAL_TARGETS.iter()) {
        let target_lc = target.to_lowercase();
        let matched = columns.iter().find(|col| {
            let col_lc = col.to_lowercase();
            !col_lc.is_empty() && (col_lc.contains(&target_lc) || target_lc.contains(&col_lc))
        });
        if let Some(col) = matched {
            mapping.assign(col.clone(), *target);
        }
    }
    mapping
}

/// Required targets not covered by `mapping`.
pub fn missing_required(mapping: &ColumnMapping) -> Vec<String> {
    REQUIRED_TARGETS
        .iter()
        .filter(|target| !mapping.iter().any(|(_, t)| t == **target))
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedupe_keeps_first_source_per_target() {
        let proposed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"card_no":"カード番号","member_id":"カード番号","amount":"利用金額","x":7}"#,
        )
        .unwrap();
        let mapping = dedupe_mapping(&proposed);
        assert_eq!(
            mapping.iter().collect::<Vec<_>>(),
            vec![("card_no", CARD_NUMBER), ("amount", AMOUNT)]
        );
    }

    #[test]
    fn test_fallback_matches_substrings() {
        let columns = cols(&["顧客カード番号", "利用日時", "利用金額(円)", "ショップ名略称", "memo"]);
        let mapping = fallback_mapping(&columns);
        assert_eq!(mapping.target_of("顧客カード番号"), Some(CARD_NUMBER));
        assert_eq!(mapping.target_of("利用金額(円)"), Some(AMOUNT));
        assert_eq!(mapping.target_of("memo"), None);
        assert!(missing_required(&mapping).is_empty());
    }

    #[test]
    fn test_fallback_ignores_empty_columns() {
        let mapping = fallback_mapping(&cols(&["", "年齢"]));
        assert_eq!(mapping.iter().collect::<Vec<_>>(), vec![("年齢", AGE)]);
    }

    #[test]
    fn test_missing_required() {
        let mut mapping = ColumnMapping::new();
        mapping.assign("card", CARD_NUMBER);
        mapping.assign("shop", SHOP_NAME);
        assert_eq!(missing_required(&mapping), vec![PURCHASED_AT, AMOUNT]);
    }

    #[test]
    fn test_assign_replaces_previous_source() {
        let mut mapping = ColumnMapping::new();
        mapping.assign("a", AMOUNT);
        mapping.assign("b", AMOUNT);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.target_of("b"), Some(AMOUNT));
        assert_eq!(mapping.to_json(), r#"{"b":"利用金額"}"#);
    }
}
