//! Query criteria
//!
//! A [`Criteria`] carries where-predicates, a sort order and pagination
//! bounds. It is built by the caller with the fluent builder below and only
//! read by the planner and the engine.
//!
//! ```
//! use runtara_document_store::{Criteria, SortDirection};
//!
//! let criteria = Criteria::new()
//!     .is("author", "ada")
//!     .between("year", 1840, 1850)
//!     .sort("date", SortDirection::Desc)
//!     .limit(10)
//!     .page(2);
//!
//! let bounds = criteria.bounds();
//! assert_eq!(bounds.offset, 10);
//! assert_eq!(bounds.probe, Some(11));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DocumentStoreError, Result};

/// Predicate command. The set is closed; parsing anything else fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Is,
    Not,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Near,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Is => "is",
            Command::Not => "not",
            Command::Gt => "gt",
            Command::Gte => "gte",
            Command::Lt => "lt",
            Command::Lte => "lte",
            Command::In => "in",
            Command::Nin => "nin",
            Command::Near => "near",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "is" => Ok(Command::Is),
            "not" => Ok(Command::Not),
            "gt" => Ok(Command::Gt),
            "gte" => Ok(Command::Gte),
            "lt" => Ok(Command::Lt),
            "lte" => Ok(Command::Lte),
            "in" => Ok(Command::In),
            "nin" => Ok(Command::Nin),
            "near" => Ok(Command::Near),
            other => Err(DocumentStoreError::UnknownCommand(other.to_string())),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One command applied to a field
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub command: Command,
    /// For `in`/`nin` this is always a flat array
    pub value: Value,
}

/// All predicates on one field, in the order they were first set
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub predicates: Vec<Predicate>,
}

/// Resolved pagination bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub limit: Option<u64>,
    pub offset: u64,
    /// `limit + 1`: fetch one extra row to learn whether more results exist
    pub probe: Option<u64>,
}

/// Default field-name normalizer: surrounding whitespace is dropped
pub fn normalize_field_name(name: &str) -> String {
    name.trim().to_string()
}

/// Query specification
#[derive(Debug, Clone)]
pub struct Criteria {
    filters: Vec<FieldFilter>,
    sort: Vec<(String, SortDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
    page: Option<u64>,
    normalizer: fn(&str) -> String,
}

impl Default for Criteria {
    fn default() -> Self {
        Self::new()
    }
}

impl Criteria {
    /// Empty criteria: no predicates, no sort, unbounded
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
            page: None,
            normalizer: normalize_field_name,
        }
    }

    /// Replace the field-name normalizer.
    ///
    /// Applies to fields added after this call.
    pub fn with_normalizer(mut self, normalizer: fn(&str) -> String) -> Self {
        self.normalizer = normalizer;
        self
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Exact match
    pub fn is(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Is, value.into())
    }

    pub fn not(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Not, value.into())
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Gt, value.into())
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Gte, value.into())
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Lt, value.into())
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Lte, value.into())
    }

    /// Inclusive range; shorthand for `gte(low)` and `lte(high)`
    pub fn between(self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.gte(field, low).lte(field, high)
    }

    /// Membership. Nested arrays are flattened one level.
    pub fn is_in<I, V>(self, field: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = flatten_values(field, Command::In, values)?;
        Ok(self.with_predicate(field, Command::In, values))
    }

    /// Non-membership. Nested arrays are flattened one level.
    pub fn not_in<I, V>(self, field: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = flatten_values(field, Command::Nin, values)?;
        Ok(self.with_predicate(field, Command::Nin, values))
    }

    /// Spatial proximity; only the native document backend can answer it
    pub fn near(self, field: &str, point: impl Into<Value>) -> Self {
        self.with_predicate(field, Command::Near, point.into())
    }

    /// Add a predicate by command name, e.g. from a parsed request.
    ///
    /// `between` expects a two-element array. Unknown commands fail.
    pub fn filter(self, field: &str, command: &str, value: Value) -> Result<Self> {
        if command == "between" {
            return match value {
                Value::Array(mut bounds) if bounds.len() == 2 => {
                    let high = bounds.pop().unwrap_or(Value::Null);
                    let low = bounds.pop().unwrap_or(Value::Null);
                    Ok(self.between(field, low, high))
                }
                _ => Err(DocumentStoreError::validation(format!(
                    "between on field '{}' expects [low, high]",
                    field
                ))),
            };
        }

        match command.parse::<Command>()? {
            Command::In => self.is_in(field, as_list(value)),
            Command::Nin => self.not_in(field, as_list(value)),
            command => Ok(self.with_predicate(field, command, value)),
        }
    }

    fn with_predicate(mut self, field: &str, command: Command, value: Value) -> Self {
        let field = (self.normalizer)(field);
        let predicate = Predicate { command, value };

        match self.filters.iter_mut().find(|f| f.field == field) {
            Some(filter) => match filter
                .predicates
                .iter_mut()
                .find(|p| p.command == command)
            {
                Some(existing) => *existing = predicate,
                None => filter.predicates.push(predicate),
            },
            None => self.filters.push(FieldFilter {
                field,
                predicates: vec![predicate],
            }),
        }
        self
    }

    // =========================================================================
    // Sorting
    // =========================================================================

    /// Append a sort key. Re-declaring a field changes its direction but
    /// keeps its original position.
    pub fn sort(mut self, field: &str, direction: SortDirection) -> Self {
        let field = (self.normalizer)(field);
        match self.sort.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = direction,
            None => self.sort.push((field, direction)),
        }
        self
    }

    pub fn asc(self, field: &str) -> Self {
        self.sort(field, SortDirection::Asc)
    }

    pub fn desc(self, field: &str) -> Self {
        self.sort(field, SortDirection::Desc)
    }

    /// Drop every sort key
    pub fn kill_sort(mut self) -> Self {
        self.sort.clear();
        self
    }

    // =========================================================================
    // Bounds
    // =========================================================================

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Explicit offset; wins over [`Criteria::page`]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 1-based page number; needs a limit to have any effect
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page.max(1));
        self
    }

    /// Resolve limit, offset and the `limit + 1` probe
    pub fn bounds(&self) -> Bounds {
        let offset = match (self.offset, self.page, self.limit) {
            (Some(offset), _, _) => offset,
            (None, Some(page), Some(limit)) => (page - 1).saturating_mul(limit),
            _ => 0,
        };
        Bounds {
            limit: self.limit,
            offset,
            probe: self.limit.map(|limit| limit.saturating_add(1)),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn sort_keys(&self) -> &[(String, SortDirection)] {
        &self.sort
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn filter_for(&self, field: &str) -> Option<&FieldFilter> {
        self.filters.iter().find(|f| f.field == field)
    }
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn flatten_values<I, V>(field: &str, command: Command, values: I) -> Result<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let mut flat = Vec::new();
    for value in values {
        match value.into() {
            Value::Array(items) => flat.extend(items),
            other => flat.push(other),
        }
    }
    if flat.is_empty() {
        return Err(DocumentStoreError::validation(format!(
            "'{}' on field '{}' requires at least one value",
            command, field
        )));
    }
    Ok(Value::Array(flat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // Predicate Tests
    // =========================================================================

    #[test]
    fn test_predicates_keep_insertion_order() {
        let criteria = Criteria::new().is("b", 1).gt("a", 2).lt("b", 9);

        let fields: Vec<&str> = criteria.filters().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["b", "a"]);

        let b = criteria.filter_for("b").unwrap();
        assert_eq!(b.predicates.len(), 2);
        assert_eq!(b.predicates[0].command, Command::Is);
        assert_eq!(b.predicates[1].command, Command::Lt);
    }

    #[test]
    fn test_same_command_overwrites_value() {
        let criteria = Criteria::new().is("a", 1).is("a", 2);
        let a = criteria.filter_for("a").unwrap();
        assert_eq!(a.predicates, vec![Predicate { command: Command::Is, value: json!(2) }]);
    }

    #[test]
    fn test_between_is_gte_and_lte() {
        let criteria = Criteria::new().between("year", 1990, 2000);
        let year = criteria.filter_for("year").unwrap();
        assert_eq!(year.predicates[0], Predicate { command: Command::Gte, value: json!(1990) });
        assert_eq!(year.predicates[1], Predicate { command: Command::Lte, value: json!(2000) });
    }

    #[test]
    fn test_in_flattens_one_level() {
        let criteria = Criteria::new()
            .is_in("tags", vec![json!("a"), json!(["b", "c"]), json!([["d"]])])
            .unwrap();
        let tags = criteria.filter_for("tags").unwrap();
        assert_eq!(tags.predicates[0].value, json!(["a", "b", "c", ["d"]]));
    }

    #[test]
    fn test_in_rejects_empty_list() {
        let err = Criteria::new().is_in("tags", Vec::<Value>::new()).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));

        let err = Criteria::new().not_in("tags", vec![json!([])]).unwrap_err();
        assert!(err.to_string().contains("nin"));
    }

    #[test]
    fn test_field_names_are_normalized() {
        let criteria = Criteria::new().is("  author ", "ada").asc(" date");
        assert!(criteria.filter_for("author").is_some());
        assert_eq!(criteria.sort_keys()[0].0, "date");
    }

    #[test]
    fn test_custom_normalizer() {
        let criteria = Criteria::new()
            .with_normalizer(|name| name.trim().to_lowercase())
            .is("Author", "ada");
        assert!(criteria.filter_for("author").is_some());
    }

    // =========================================================================
    // String Commands
    // =========================================================================

    #[test]
    fn test_command_parsing() {
        assert_eq!("gte".parse::<Command>().unwrap(), Command::Gte);
        assert_eq!("nin".parse::<Command>().unwrap(), Command::Nin);
        assert!(matches!(
            "like".parse::<Command>(),
            Err(DocumentStoreError::UnknownCommand(c)) if c == "like"
        ));
    }

    #[test]
    fn test_filter_by_command_name() {
        let criteria = Criteria::new()
            .filter("a", "lte", json!(5))
            .unwrap()
            .filter("b", "in", json!("x"))
            .unwrap()
            .filter("c", "between", json!([1, 2]))
            .unwrap();

        assert_eq!(criteria.filter_for("a").unwrap().predicates[0].command, Command::Lte);
        assert_eq!(criteria.filter_for("b").unwrap().predicates[0].value, json!(["x"]));
        assert_eq!(criteria.filter_for("c").unwrap().predicates.len(), 2);

        assert!(Criteria::new().filter("a", "regex", json!(".*")).is_err());
        assert!(Criteria::new().filter("a", "between", json!([1])).is_err());
    }

    // =========================================================================
    // Sort Tests
    // =========================================================================

    #[test]
    fn test_sort_redeclare_keeps_position() {
        let criteria = Criteria::new().asc("x").desc("y").desc("x");
        assert_eq!(
            criteria.sort_keys(),
            &[
                ("x".to_string(), SortDirection::Desc),
                ("y".to_string(), SortDirection::Desc)
            ]
        );
    }

    #[test]
    fn test_kill_sort() {
        let criteria = Criteria::new().asc("x").is("a", 1).kill_sort();
        assert!(criteria.sort_keys().is_empty());
        assert!(criteria.has_filters());
    }

    // =========================================================================
    // Bounds Tests
    // =========================================================================

    #[test]
    fn test_bounds_default() {
        assert_eq!(Criteria::new().bounds(), Bounds::default());
    }

    #[test]
    fn test_bounds_probe_is_limit_plus_one() {
        let bounds = Criteria::new().limit(10).bounds();
        assert_eq!(bounds, Bounds { limit: Some(10), offset: 0, probe: Some(11) });
    }

    #[test]
    fn test_bounds_page_derives_offset() {
        assert_eq!(Criteria::new().limit(10).page(3).bounds().offset, 20);
        assert_eq!(Criteria::new().limit(10).page(0).bounds().offset, 0);
        assert_eq!(Criteria::new().page(3).bounds().offset, 0);
    }

    #[test]
    fn test_bounds_offset_wins_over_page() {
        let bounds = Criteria::new().limit(10).page(5).offset(3).bounds();
        assert_eq!(bounds.offset, 3);
    }
}
