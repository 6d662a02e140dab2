use std::error::Error;
use std::path::Path;

use tracing::{info, warn};

use crate::extract::extract_or_empty;
use crate::models::{ColumnFilter, PeriodFilter, QualifierFilter, ReadOptions, SelectionCriteria};
use crate::plot::{self, ChartSpec, LegendCorner, MarkerShape, ScatterPoint, SeriesPairing};
use crate::stats;

const ENTITY_COLUMN: &str = "Reference area";
const VALUE_COLUMN: &str = "OBS_VALUE";
const PERIOD_COLUMN: &str = "TIME_PERIOD";
pub(crate) const TARGET_YEAR: i32 = 2020;

pub(crate) const EDUCATION_COUNTRIES: [&str; 6] =
    ["Austria", "Czechia", "Denmark", "Korea", "Norway", "Portugal"];

pub(crate) const EDUCATION_LEVELS: [&str; 3] = [
    "Primary education",
    "Upper secondary education",
    "Bachelor's, Master's and Doctoral or equivalent level",
];

pub(crate) const INCOME_ATTAINMENT_LEVELS: [&str; 3] = [
    "Below upper secondary education",
    "Upper secondary education",
    "Bachelor's, master's, doctoral or equivalent level",
];

pub(crate) const INCOME_BRACKET: &str = "Above 100% of median income";

/// Education label on the left, matching income label on the right.
pub(crate) const EDUCATION_INCOME_PAIRINGS: [SeriesPairing; 3] = [
    SeriesPairing {
        label: "Primary education",
        x_category: EDUCATION_LEVELS[0],
        y_category: INCOME_ATTAINMENT_LEVELS[0],
        marker: MarkerShape::Circle,
    },
    SeriesPairing {
        label: "Upper secondary education",
        x_category: EDUCATION_LEVELS[1],
        y_category: INCOME_ATTAINMENT_LEVELS[1],
        marker: MarkerShape::Diamond,
    },
    SeriesPairing {
        label: "Bachelors, Masters and Doctoral or equivalent level",
        x_category: EDUCATION_LEVELS[2],
        y_category: INCOME_ATTAINMENT_LEVELS[2],
        marker: MarkerShape::Triangle,
    },
];

pub(crate) const LIFE_EXPECTANCY_COUNTRIES: [&str; 9] = [
    "Canada",
    "Chile",
    "Estonia",
    "Germany",
    "Latvia",
    "Netherlands",
    "Norway",
    "Spain",
    "United States",
];

pub(crate) const LIFE_EXPECTANCY_AGE: &str = "65 years";
pub(crate) const SMOKERS_AGE: &str = "Total";

/// Both sexes are compared against the all-population smokers share.
pub(crate) const LIFE_EXPECTANCY_PAIRINGS: [SeriesPairing; 2] = [
    SeriesPairing {
        label: "Female",
        x_category: "Female",
        y_category: "Total",
        marker: MarkerShape::Circle,
    },
    SeriesPairing {
        label: "Male",
        x_category: "Male",
        y_category: "Total",
        marker: MarkerShape::Diamond,
    },
];

fn target_period() -> PeriodFilter {
    PeriodFilter::years(PERIOD_COLUMN, [TARGET_YEAR])
}

/// Women's attainment share per education level.
pub(crate) fn education_criteria() -> SelectionCriteria {
    SelectionCriteria::new(
        ColumnFilter::one_of(ENTITY_COLUMN, EDUCATION_COUNTRIES),
        ColumnFilter::one_of("Education level", EDUCATION_LEVELS),
        VALUE_COLUMN,
        target_period(),
    )
    .restricted_to(ColumnFilter::equals("Sex", "Female"))
}

/// Women earning above the median income, per attainment level.
pub(crate) fn income_criteria() -> SelectionCriteria {
    SelectionCriteria::new(
        ColumnFilter::one_of(ENTITY_COLUMN, EDUCATION_COUNTRIES),
        ColumnFilter::one_of("Educational attainment level", INCOME_ATTAINMENT_LEVELS),
        VALUE_COLUMN,
        target_period(),
    )
    .restricted_to(ColumnFilter::equals("Sex", "Female"))
    .with_qualifier(QualifierFilter::new("Income", INCOME_BRACKET))
}

/// Remaining life expectancy at 65 for one sex.
pub(crate) fn life_expectancy_criteria(sex: &str) -> SelectionCriteria {
    SelectionCriteria::new(
        ColumnFilter::one_of(ENTITY_COLUMN, LIFE_EXPECTANCY_COUNTRIES),
        ColumnFilter::equals("Sex", sex),
        VALUE_COLUMN,
        target_period(),
    )
    .restricted_to(ColumnFilter::equals("Age", LIFE_EXPECTANCY_AGE))
}

pub(crate) fn smokers_criteria() -> SelectionCriteria {
    SelectionCriteria::new(
        ColumnFilter::one_of(ENTITY_COLUMN, LIFE_EXPECTANCY_COUNTRIES),
        ColumnFilter::equals("Sex", "Total"),
        VALUE_COLUMN,
        target_period(),
    )
    .restricted_to(ColumnFilter::equals("Age", SMOKERS_AGE))
}

/// Input files, relative to the data directory.
pub(crate) const EDUCATION_FILE: &str = "education_unfiltered.csv";
pub(crate) const INCOME_FILE: &str = "income_unfiltered.csv";
pub(crate) const LIFE_EXPECTANCY_FILE: &str = "life_expectancy_unfiltered.csv";
pub(crate) const SMOKERS_FILE: &str = "tabaco_unfiltered.csv";

pub(crate) fn education_vs_income(
    data_dir: &Path,
    output_file: &Path,
    options: &ReadOptions,
) -> Result<Vec<ScatterPoint>, Box<dyn Error>> {
    let education = extract_or_empty(data_dir.join(EDUCATION_FILE), &education_criteria(), options);
    let income = extract_or_empty(data_dir.join(INCOME_FILE), &income_criteria(), options);
    info!(
        education_entities = education.len(),
        income_entities = income.len(),
        "education and income extracted"
    );
    if education.is_empty() || income.is_empty() {
        warn!("one of the education/income extractions is empty; the chart will have no points");
    }

    let points = plot::match_pairs(&education, &income, &EDUCATION_INCOME_PAIRINGS);
    let entities: Vec<String> = education.entities().map(str::to_string).collect();
    plot::render_scatter(
        &points,
        &entities,
        &EDUCATION_INCOME_PAIRINGS,
        &ChartSpec {
            title: "Scatter Plot of Education vs Income of Women for Each Country",
            x_desc: "Education Level percent population(%)",
            y_desc: "Income Level (%) Above 100% of median income",
            legend_at: LegendCorner::UpperRight,
        },
        output_file,
    )?;

    let labels: Vec<&str> = EDUCATION_INCOME_PAIRINGS.iter().map(|p| p.label).collect();
    stats::print_report("Education vs income", &points, &labels);
    Ok(points)
}

pub(crate) fn life_expectancy_vs_smokers(
    data_dir: &Path,
    output_file: &Path,
    options: &ReadOptions,
) -> Result<Vec<ScatterPoint>, Box<dyn Error>> {
    let life_file = data_dir.join(LIFE_EXPECTANCY_FILE);
    let mut life_expectancy =
        extract_or_empty(&life_file, &life_expectancy_criteria("Female"), options);
    life_expectancy.absorb(extract_or_empty(
        &life_file,
        &life_expectancy_criteria("Male"),
        options,
    ));
    let smokers = extract_or_empty(data_dir.join(SMOKERS_FILE), &smokers_criteria(), options);
    info!(
        life_expectancy_entities = life_expectancy.len(),
        smokers_entities = smokers.len(),
        "life expectancy and smokers extracted"
    );
    if life_expectancy.is_empty() || smokers.is_empty() {
        warn!("life expectancy or smokers extraction is empty; the chart will have no points");
    }

    let points = plot::match_pairs(&life_expectancy, &smokers, &LIFE_EXPECTANCY_PAIRINGS);
    let entities: Vec<String> = life_expectancy.entities().map(str::to_string).collect();
    plot::render_scatter(
        &points,
        &entities,
        &LIFE_EXPECTANCY_PAIRINGS,
        &ChartSpec {
            title: "Scatter Plot of Life expectancy vs smokers",
            x_desc: "Life expectancy Above 65 years",
            y_desc: "Smokers (%)",
            legend_at: LegendCorner::UpperLeft,
        },
        output_file,
    )?;

    let labels: Vec<&str> = LIFE_EXPECTANCY_PAIRINGS.iter().map(|p| p.label).collect();
    stats::print_report("Life expectancy vs smokers", &points, &labels);
    Ok(points)
}
