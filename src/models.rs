use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Which cell values a column filter lets through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) enum Acceptance {
    Any,
    OneOf(BTreeSet<String>),
}

/// Exact-match membership filter on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ColumnFilter {
    pub(crate) column: String,
    pub(crate) accepted: Acceptance,
}

impl ColumnFilter {
    pub(crate) fn one_of<I, S>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.to_string(),
            accepted: Acceptance::OneOf(values.into_iter().map(Into::into).collect()),
        }
    }

    pub(crate) fn equals(column: &str, value: &str) -> Self {
        Self::one_of(column, [value])
    }

    pub(crate) fn any(column: &str) -> Self {
        Self {
            column: column.to_string(),
            accepted: Acceptance::Any,
        }
    }

    /// A missing cell only passes an `Any` filter.
    pub(crate) fn matches(&self, cell: Option<&str>) -> bool {
        match &self.accepted {
            Acceptance::Any => true,
            Acceptance::OneOf(values) => cell.is_some_and(|c| values.contains(c)),
        }
    }
}

/// Secondary filter compared after trimming and lowercasing both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct QualifierFilter {
    pub(crate) column: String,
    pub(crate) accepted: String,
}

impl QualifierFilter {
    pub(crate) fn new(column: &str, accepted: &str) -> Self {
        Self {
            column: column.to_string(),
            accepted: normalize(accepted),
        }
    }

    pub(crate) fn matches(&self, cell: Option<&str>) -> bool {
        cell.is_some_and(|c| normalize(c) == self.accepted)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Accepted reporting years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PeriodFilter {
    pub(crate) column: String,
    pub(crate) years: BTreeSet<i32>,
}

impl PeriodFilter {
    pub(crate) fn years<I: IntoIterator<Item = i32>>(column: &str, years: I) -> Self {
        Self {
            column: column.to_string(),
            years: years.into_iter().collect(),
        }
    }

    /// Cells like `2020` and `2020.0` both count as the year 2020.
    pub(crate) fn matches(&self, cell: Option<&str>) -> bool {
        cell.and_then(parse_year)
            .is_some_and(|year| self.years.contains(&year))
    }
}

fn parse_year(cell: &str) -> Option<i32> {
    let cell = cell.trim();
    if let Ok(year) = cell.parse::<i32>() {
        return Some(year);
    }
    let value = cell.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value.abs() <= f64::from(i32::MAX) {
        Some(value as i32)
    } else {
        None
    }
}

/// Everything one extraction query needs to know about the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SelectionCriteria {
    pub(crate) entity: ColumnFilter,
    pub(crate) category: ColumnFilter,
    pub(crate) value_column: String,
    pub(crate) qualifier: Option<QualifierFilter>,
    /// Extra exact-match filters applied after the category filter
    /// (e.g. `Sex == Female`).
    pub(crate) restrictions: Vec<ColumnFilter>,
    pub(crate) period: PeriodFilter,
}

impl SelectionCriteria {
    pub(crate) fn new(
        entity: ColumnFilter,
        category: ColumnFilter,
        value_column: &str,
        period: PeriodFilter,
    ) -> Self {
        Self {
            entity,
            category,
            value_column: value_column.to_string(),
            qualifier: None,
            restrictions: Vec::new(),
            period,
        }
    }

    pub(crate) fn with_qualifier(mut self, qualifier: QualifierFilter) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub(crate) fn restricted_to(mut self, filter: ColumnFilter) -> Self {
        self.restrictions.push(filter);
        self
    }

    /// Columns the reader has to project, without repeats.
    pub(crate) fn columns(&self) -> Vec<&str> {
        std::iter::once(self.entity.column.as_str())
            .chain(std::iter::once(self.category.column.as_str()))
            .chain(std::iter::once(self.value_column.as_str()))
            .chain(self.qualifier.iter().map(|q| q.column.as_str()))
            .chain(self.restrictions.iter().map(|r| r.column.as_str()))
            .chain(std::iter::once(self.period.column.as_str()))
            .unique()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub(crate) enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

/// What an aborted extraction hands back to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub(crate) enum FailurePolicy {
    /// Throw away every batch already folded.
    #[default]
    DiscardAll,
    /// Keep the batches folded before the failure.
    KeepPartial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ReadOptions {
    pub(crate) delimiter: u8,
    pub(crate) encoding: Encoding,
    pub(crate) batch_size: usize,
    pub(crate) on_error: FailurePolicy,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            encoding: Encoding::Utf8,
            batch_size: 10_000,
            on_error: FailurePolicy::DiscardAll,
        }
    }
}

/// Entity -> ordered (category, value) pairs. Entities and pairs keep
/// insertion order; a category label appears at most once per entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ResultMapping {
    entries: Vec<(String, Vec<(String, f64)>)>,
    index: HashMap<String, usize>,
}

impl ResultMapping {
    /// Returns false when the entity already holds this category.
    pub(crate) fn insert_first_seen(&mut self, entity: &str, category: &str, value: f64) -> bool {
        match self.index.get(entity) {
            Some(&slot) => {
                let pairs = &mut self.entries[slot].1;
                if pairs.iter().any(|(label, _)| label == category) {
                    return false;
                }
                pairs.push((category.to_string(), value));
            }
            None => {
                self.index.insert(entity.to_string(), self.entries.len());
                self.entries
                    .push((entity.to_string(), vec![(category.to_string(), value)]));
            }
        }
        true
    }

    /// Folds another mapping in, pair by pair, with the same first-seen rule.
    pub(crate) fn absorb(&mut self, other: ResultMapping) {
        for (entity, pairs) in other.entries {
            for (category, value) in pairs {
                self.insert_first_seen(&entity, &category, value);
            }
        }
    }

    pub(crate) fn get(&self, entity: &str) -> Option<&[(String, f64)]> {
        self.index
            .get(entity)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    pub(crate) fn value_of(&self, entity: &str, category: &str) -> Option<f64> {
        self.get(entity)?
            .iter()
            .find(|(label, _)| label == category)
            .map(|(_, value)| *value)
    }

    pub(crate) fn entities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(entity, _)| entity.as_str())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &[(String, f64)])> {
        self.entries
            .iter()
            .map(|(entity, pairs)| (entity.as_str(), pairs.as_slice()))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ResultMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (entity, pairs) in &self.entries {
            map.serialize_entry(entity, pairs)?;
        }
        map.end()
    }
}

/// One extraction as dumped by the `extract` command.
#[derive(Debug, Serialize)]
pub(crate) struct ExtractionRun<'a> {
    pub(crate) criteria: &'a SelectionCriteria,
    pub(crate) options: &'a ReadOptions,
    pub(crate) result: &'a ResultMapping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_category_wins() {
        let mut mapping = ResultMapping::default();
        assert!(mapping.insert_first_seen("Norway", "Primary education", 10.0));
        assert!(mapping.insert_first_seen("Norway", "Upper secondary education", 30.0));
        assert!(!mapping.insert_first_seen("Norway", "Primary education", 99.0));

        assert_eq!(mapping.value_of("Norway", "Primary education"), Some(10.0));
        assert_eq!(mapping.get("Norway").map(<[_]>::len), Some(2));
        assert_eq!(mapping.value_of("Chile", "Primary education"), None);
    }

    #[test]
    fn entities_keep_insertion_order() {
        let mut mapping = ResultMapping::default();
        mapping.insert_first_seen("Portugal", "Total", 1.0);
        mapping.insert_first_seen("Austria", "Total", 2.0);
        mapping.insert_first_seen("Korea", "Total", 3.0);
        let order: Vec<&str> = mapping.entities().collect();
        assert_eq!(order, ["Portugal", "Austria", "Korea"]);
    }

    #[test]
    fn absorb_merges_without_overwriting() {
        let mut female = ResultMapping::default();
        female.insert_first_seen("Spain", "Female", 23.1);
        let mut male = ResultMapping::default();
        male.insert_first_seen("Spain", "Male", 19.3);
        male.insert_first_seen("Spain", "Female", 0.0);
        male.insert_first_seen("Chile", "Male", 17.0);

        female.absorb(male);
        assert_eq!(female.value_of("Spain", "Female"), Some(23.1));
        assert_eq!(female.value_of("Spain", "Male"), Some(19.3));
        assert_eq!(female.len(), 2);
    }

    #[test]
    fn serializes_as_an_ordered_object() {
        let mut mapping = ResultMapping::default();
        mapping.insert_first_seen("Austria", "Primary education", 42.5);
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"Austria":[["Primary education",42.5]]}"#);
    }

    #[test]
    fn qualifier_ignores_case_and_padding() {
        let filter = QualifierFilter::new("Income", "Above 100% of median income");
        assert!(filter.matches(Some("Above 100% Of Median Income")));
        assert!(filter.matches(Some(" above 100% of median income ")));
        assert!(filter.matches(Some("above 100% of median income")));
        assert!(!filter.matches(Some("Below 50% of median income")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn column_filter_is_exact() {
        let filter = ColumnFilter::equals("Sex", "Female");
        assert!(filter.matches(Some("Female")));
        assert!(!filter.matches(Some("female")));
        assert!(!filter.matches(None));
        assert!(ColumnFilter::any("Sex").matches(None));
    }

    #[test]
    fn period_accepts_integral_floats() {
        let period = PeriodFilter::years("TIME_PERIOD", [2020]);
        assert!(period.matches(Some("2020")));
        assert!(period.matches(Some("2020.0")));
        assert!(!period.matches(Some("2019")));
        assert!(!period.matches(Some("2020-Q1")));
        assert!(!period.matches(None));
    }

    #[test]
    fn projection_has_no_repeats() {
        let criteria = SelectionCriteria::new(
            ColumnFilter::any("Reference area"),
            ColumnFilter::any("Sex"),
            "OBS_VALUE",
            PeriodFilter::years("TIME_PERIOD", [2020]),
        )
        .restricted_to(ColumnFilter::equals("Sex", "Female"))
        .restricted_to(ColumnFilter::equals("Age", "65 years"));

        assert_eq!(
            criteria.columns(),
            ["Reference area", "Sex", "OBS_VALUE", "Age", "TIME_PERIOD"]
        );
    }

    #[test]
    fn run_dump_carries_criteria_options_and_result() {
        let criteria = SelectionCriteria::new(
            ColumnFilter::equals("Reference area", "Austria"),
            ColumnFilter::any("Education level"),
            "OBS_VALUE",
            PeriodFilter::years("TIME_PERIOD", [2020]),
        )
        .with_qualifier(QualifierFilter::new("Income", " Above 100% of median income "));
        let options = ReadOptions::default();
        let mut result = ResultMapping::default();
        result.insert_first_seen("Austria", "Primary education", 42.5);

        let run = ExtractionRun {
            criteria: &criteria,
            options: &options,
            result: &result,
        };
        let json = serde_json::to_value(&run).unwrap();

        assert_eq!(json["criteria"]["value_column"], "OBS_VALUE");
        assert_eq!(json["criteria"]["entity"]["accepted"]["OneOf"][0], "Austria");
        assert_eq!(json["criteria"]["category"]["accepted"], "Any");
        assert_eq!(json["criteria"]["qualifier"]["accepted"], "above 100% of median income");
        assert_eq!(json["criteria"]["period"]["years"][0], 2020);
        assert_eq!(json["options"]["batch_size"], 10_000);
        assert_eq!(json["options"]["encoding"], "Utf8");
        assert_eq!(json["options"]["on_error"], "DiscardAll");
        assert_eq!(json["result"]["Austria"][0][1], 42.5);
    }
}
