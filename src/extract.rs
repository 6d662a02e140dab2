use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};
use ordered_float::NotNan;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::models::{Encoding, FailurePolicy, ReadOptions, ResultMapping, SelectionCriteria};

/// Cell spellings read as "no value".
const MISSING_MARKERS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Reads `path` batch by batch and folds matching rows into a mapping.
/// Any error discards everything read so far.
pub(crate) fn extract<P: AsRef<Path>>(
    path: P,
    criteria: &SelectionCriteria,
    options: &ReadOptions,
) -> Result<ResultMapping> {
    let path = path.as_ref();
    let source = path.display().to_string();
    extract_from_reader(open(path)?, &source, criteria, options)
}

/// Report-facing form of [`extract`]: failures are printed, never returned.
pub(crate) fn extract_or_empty<P: AsRef<Path>>(
    path: P,
    criteria: &SelectionCriteria,
    options: &ReadOptions,
) -> ResultMapping {
    let path = path.as_ref();
    let mut mapping = ResultMapping::default();
    match extract_into(path, criteria, options, &mut mapping) {
        Ok(()) => mapping,
        Err(err) => {
            warn!(path = %path.display(), kind = err.kind(), "extraction aborted");
            println!("{}", err);
            match options.on_error {
                FailurePolicy::DiscardAll => ResultMapping::default(),
                FailurePolicy::KeepPartial => mapping,
            }
        }
    }
}

/// Same pipeline over any byte source; `source` only labels diagnostics.
pub(crate) fn extract_from_reader<R: Read>(
    reader: R,
    source: &str,
    criteria: &SelectionCriteria,
    options: &ReadOptions,
) -> Result<ResultMapping> {
    let mut mapping = ResultMapping::default();
    fold_batches(reader, source, criteria, options, &mut mapping)?;
    Ok(mapping)
}

fn extract_into(
    path: &Path,
    criteria: &SelectionCriteria,
    options: &ReadOptions,
    mapping: &mut ResultMapping,
) -> Result<()> {
    let source = path.display().to_string();
    fold_batches(open(path)?, &source, criteria, options, mapping)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ExtractError::FileNotFound {
        path: path.display().to_string(),
        source,
    })
}

fn fold_batches<R: Read>(
    reader: R,
    source: &str,
    criteria: &SelectionCriteria,
    options: &ReadOptions,
    mapping: &mut ResultMapping,
) -> Result<()> {
    if options.batch_size == 0 {
        return Err(ExtractError::unexpected(source, "batch size must be at least 1"));
    }

    let mut rdr = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .byte_headers()
        .map_err(|e| ExtractError::parse(source, e))?
        .clone();
    let projection = Projection::resolve(&headers, criteria, options.encoding, source)?;

    let mut record = ByteRecord::new();
    let mut batch: Vec<Row> = Vec::with_capacity(options.batch_size);
    let mut batches = 0usize;
    let mut skipped = 0usize;

    loop {
        let more = rdr
            .read_byte_record(&mut record)
            .map_err(|e| ExtractError::parse(source, e))?;
        if more {
            if record.len() > headers.len() {
                skipped += 1;
                debug!(
                    source,
                    line = record.position().map(|p| p.line()),
                    fields = record.len(),
                    "skipping malformed row"
                );
                continue;
            }
            batch.push(projection.project(&record, options.encoding, source)?);
            if batch.len() < options.batch_size {
                continue;
            }
        }

        if !batch.is_empty() {
            batches += 1;
            let groups = process_batch(&batch, criteria);
            debug!(
                source,
                batch = batches,
                rows = batch.len(),
                groups = groups.len(),
                "batch processed"
            );
            for (entity, category, value) in groups {
                mapping.insert_first_seen(&entity, &category, value);
            }
            batch.clear();
        }

        if !more {
            break;
        }
    }

    info!(source, batches, skipped, entities = mapping.len(), "extraction finished");
    Ok(())
}

/// Header positions of the projected columns.
struct Projection {
    entity: usize,
    category: usize,
    value: usize,
    qualifier: Option<usize>,
    restrictions: Vec<usize>,
    period: usize,
}

impl Projection {
    fn resolve(
        headers: &ByteRecord,
        criteria: &SelectionCriteria,
        encoding: Encoding,
        source: &str,
    ) -> Result<Self> {
        let names = headers
            .iter()
            .map(|raw| decode(raw, encoding, source))
            .collect::<Result<Vec<String>>>()?;

        let missing: Vec<&str> = criteria
            .columns()
            .into_iter()
            .filter(|wanted| !names.iter().any(|name| name == wanted))
            .collect();
        if !missing.is_empty() {
            return Err(ExtractError::unexpected(
                source,
                format!("columns not found in header: {}", missing.join(", ")),
            ));
        }

        let position = |column: &str| names.iter().position(|name| name == column).unwrap_or(0);
        Ok(Self {
            entity: position(&criteria.entity.column),
            category: position(&criteria.category.column),
            value: position(&criteria.value_column),
            qualifier: criteria.qualifier.as_ref().map(|q| position(&q.column)),
            restrictions: criteria
                .restrictions
                .iter()
                .map(|r| position(&r.column))
                .collect(),
            period: position(&criteria.period.column),
        })
    }

    fn project(&self, record: &ByteRecord, encoding: Encoding, source: &str) -> Result<Row> {
        let cell = |index: usize| -> Result<Option<String>> {
            match record.get(index) {
                Some(raw) => {
                    let text = decode(raw, encoding, source)?;
                    Ok(if MISSING_MARKERS.contains(&text.as_str()) {
                        None
                    } else {
                        Some(text)
                    })
                }
                None => Ok(None),
            }
        };

        Ok(Row {
            entity: cell(self.entity)?,
            category: cell(self.category)?,
            value: cell(self.value)?,
            qualifier: self.qualifier.map(&cell).transpose()?.flatten(),
            restrictions: self
                .restrictions
                .iter()
                .map(|&index| cell(index))
                .collect::<Result<Vec<_>>>()?,
            period: cell(self.period)?,
        })
    }
}

fn decode(raw: &[u8], encoding: Encoding, source: &str) -> Result<String> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|e| ExtractError::unexpected(source, format!("invalid utf-8: {e}"))),
        Encoding::Latin1 => Ok(raw.iter().map(|&b| char::from(b)).collect()),
    }
}

/// One projected row; `None` is a missing cell.
#[derive(Debug, Clone, Default)]
struct Row {
    entity: Option<String>,
    category: Option<String>,
    value: Option<String>,
    qualifier: Option<String>,
    restrictions: Vec<Option<String>>,
    period: Option<String>,
}

/// Runs the per-batch steps and returns one (entity, category, value) per
/// group, in order of first appearance.
fn process_batch(rows: &[Row], criteria: &SelectionCriteria) -> Vec<(String, String, f64)> {
    // Step 1: Row filters, narrowest-first
    let filtered = rows
        .iter()
        .filter(|row| criteria.entity.matches(row.entity.as_deref()))
        .filter(|row| criteria.category.matches(row.category.as_deref()))
        .filter(|row| {
            criteria
                .restrictions
                .iter()
                .zip(&row.restrictions)
                .all(|(filter, cell)| filter.matches(cell.as_deref()))
        })
        .filter(|row| criteria.period.matches(row.period.as_deref()));

    // Step 2: First dedup, before missing cells and qualifiers are looked at
    let mut seen_raw = HashSet::new();
    let deduped = filtered.filter(|row| {
        seen_raw.insert((
            row.entity.as_deref(),
            row.category.as_deref(),
            dedup_value(row.value.as_deref()),
        ))
    });

    // Step 3: Drop rows missing a category, value or qualifier
    let present = deduped.filter(|row| {
        row.category.is_some()
            && row.value.is_some()
            && (criteria.qualifier.is_none() || row.qualifier.is_some())
    });

    // Step 4: Coerce values to numbers
    let coerced = present.map(|row| (row, row.value.as_deref().and_then(to_numeric)));

    // Step 5: Qualifier match
    let qualified = coerced.filter(|(row, _)| {
        criteria
            .qualifier
            .as_ref()
            .map_or(true, |q| q.matches(row.qualifier.as_deref()))
    });

    let mut seen_numeric = HashSet::new();
    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut firsts: HashMap<(&str, &str), Option<f64>> = HashMap::new();

    for (row, value) in qualified {
        // Step 6: Second dedup on the coerced value
        if !seen_numeric.insert((row.entity.as_deref(), row.category.as_deref(), value)) {
            continue;
        }
        let (Some(entity), Some(category)) = (row.entity.as_deref(), row.category.as_deref())
        else {
            continue;
        };
        // Step 7: Group by (entity, category), keeping the first number
        let slot = firsts.entry((entity, category)).or_insert_with(|| {
            order.push((entity, category));
            None
        });
        if slot.is_none() {
            *slot = value.map(NotNan::into_inner);
        }
    }

    // Step 8: Groups without any number are dropped
    order
        .into_iter()
        .filter_map(|key| {
            firsts
                .get(&key)
                .copied()
                .flatten()
                .map(|value| (key.0.to_string(), key.1.to_string(), value))
        })
        .collect()
}

/// Dedup key for a raw value cell: numeric text compares by value
/// (`42.5` == `42.50`), anything else by its text.
fn dedup_value(cell: Option<&str>) -> Option<std::result::Result<NotNan<f64>, &str>> {
    cell.map(|text| to_numeric(text).ok_or(text))
}

/// Non-numeric text becomes a missing value.
fn to_numeric(cell: &str) -> Option<NotNan<f64>> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .and_then(|value| NotNan::new(value).ok())
}
