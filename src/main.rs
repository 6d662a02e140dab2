mod error;
mod extract;
mod models;
mod plot;
mod reports;
mod stats;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::models::{
    ColumnFilter, Encoding, ExtractionRun, FailurePolicy, PeriodFilter, QualifierFilter,
    ReadOptions, SelectionCriteria,
};

#[derive(Parser)]
#[command(
    name = "sula_plot",
    about = "Scatter reports over OECD-style indicator exports",
    version
)]
struct Cli {
    #[command(flatten)]
    read: ReadArgs,

    /// Directory holding the *_unfiltered.csv exports
    #[arg(long, default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Directory the PNG charts are written to
    #[arg(long, default_value = ".", global = true)]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct ReadArgs {
    /// Field delimiter
    #[arg(long, default_value_t = ',', global = true)]
    delimiter: char,

    /// Text encoding of the input files
    #[arg(long, value_enum, default_value_t = Encoding::Utf8, global = true)]
    encoding: Encoding,

    /// Rows per batch
    #[arg(long, default_value_t = 10_000, global = true)]
    batch_size: usize,

    /// Keep rows folded before a read error instead of discarding them
    #[arg(long, global = true)]
    keep_partial: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Education level vs income of women (2020)
    EducationIncome,
    /// Life expectancy at 65 vs share of smokers (2020)
    LifeExpectancy,
    /// Run both reports
    All,
    /// Run one ad-hoc extraction and print criteria, options and mapping as JSON
    Extract {
        /// CSV file to read
        file: PathBuf,
        #[arg(long, default_value = "Reference area")]
        entity_column: String,
        /// Accepted entities (repeatable)
        #[arg(long = "entity", required = true)]
        entities: Vec<String>,
        #[arg(long)]
        category_column: String,
        /// Accepted categories (repeatable); any category when omitted
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long, default_value = "OBS_VALUE")]
        value_column: String,
        /// Qualifier as column=value, compared case-insensitively
        #[arg(long)]
        qualifier: Option<String>,
        /// Extra exact filter as column=value (repeatable)
        #[arg(long = "restrict")]
        restrictions: Vec<String>,
        #[arg(long, default_value = "TIME_PERIOD")]
        period_column: String,
        /// Accepted years (repeatable)
        #[arg(long = "year", default_values_t = [reports::TARGET_YEAR])]
        years: Vec<i32>,
        /// Exit with the error instead of printing an empty mapping
        #[arg(long)]
        strict: bool,
    },
}

impl ReadArgs {
    fn options(&self) -> Result<ReadOptions, Box<dyn Error>> {
        let delimiter = u8::try_from(self.delimiter).map_err(|_| {
            format!("delimiter '{}' is not a single-byte character", self.delimiter)
        })?;
        Ok(ReadOptions {
            delimiter,
            encoding: self.encoding,
            batch_size: self.batch_size,
            on_error: if self.keep_partial {
                FailurePolicy::KeepPartial
            } else {
                FailurePolicy::DiscardAll
            },
        })
    }
}

fn split_pair(raw: &str) -> Result<(&str, &str), Box<dyn Error>> {
    raw.split_once('=')
        .ok_or_else(|| format!("expected column=value, got '{}'", raw).into())
}

fn run_reports(
    which: &Command,
    data_dir: &Path,
    output_dir: &Path,
    options: &ReadOptions,
) -> Result<(), Box<dyn Error>> {
    if matches!(which, Command::EducationIncome | Command::All) {
        let output = output_dir.join("education_vs_income.png");
        reports::education_vs_income(data_dir, &output, options)?;
    }
    if matches!(which, Command::LifeExpectancy | Command::All) {
        let output = output_dir.join("life_expectancy_vs_smokers.png");
        reports::life_expectancy_vs_smokers(data_dir, &output, options)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = cli.read.options()?;
    let command = cli.command.unwrap_or(Command::All);

    match command {
        Command::Extract {
            file,
            entity_column,
            entities,
            category_column,
            categories,
            value_column,
            qualifier,
            restrictions,
            period_column,
            years,
            strict,
        } => {
            let category = if categories.is_empty() {
                ColumnFilter::any(&category_column)
            } else {
                ColumnFilter::one_of(&category_column, categories)
            };
            let mut criteria = SelectionCriteria::new(
                ColumnFilter::one_of(&entity_column, entities),
                category,
                &value_column,
                PeriodFilter::years(&period_column, years),
            );
            if let Some(raw) = qualifier.as_deref() {
                let (column, value) = split_pair(raw)?;
                criteria = criteria.with_qualifier(QualifierFilter::new(column, value));
            }
            for raw in &restrictions {
                let (column, value) = split_pair(raw)?;
                criteria = criteria.restricted_to(ColumnFilter::equals(column, value));
            }

            let mapping = if strict {
                extract::extract(&file, &criteria, &options)?
            } else {
                extract::extract_or_empty(&file, &criteria, &options)
            };
            let run = ExtractionRun {
                criteria: &criteria,
                options: &options,
                result: &mapping,
            };
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        other => run_reports(&other, &cli.data_dir, &cli.output_dir, &options)?,
    }

    Ok(())
}
