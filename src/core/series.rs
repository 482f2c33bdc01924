use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::info;

use super::error::{ConfigError, SeriesError};
use super::types::{INFLATION_FILE_NAME, InvestmentType, Rate};

/// Wrapped lookup: `values[year_offset mod len]`, `None` for an empty slice.
///
/// Negative offsets wrap as well, so the lookup is defined for every offset.
pub fn value_at(values: &[Rate], year_offset: i64) -> Option<Rate> {
    if values.is_empty() {
        return None;
    }
    let len = values.len() as i64;
    Some(values[year_offset.rem_euclid(len) as usize])
}

/// A non-empty, immutable run of annual rates starting at the store's origin year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnSeries {
    name: String,
    values: Vec<Rate>,
}

impl ReturnSeries {
    pub fn new(name: impl Into<String>, values: Vec<Rate>) -> Result<Self, ConfigError> {
        let name = name.into();
        if values.is_empty() {
            return Err(ConfigError::EmptySeries { name });
        }
        Ok(Self { name, values })
    }

    pub fn from_decimals(name: impl Into<String>, values: &[f64]) -> Result<Self, ConfigError> {
        Self::new(name, values.iter().copied().map(Rate::from_decimal).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of recorded years; never zero.
    pub fn years(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[Rate] {
        &self.values
    }
}

/// Every return series plus the inflation series, sharing one origin year.
///
/// Built once at start-up and only read afterwards, so it can be shared
/// across rayon workers and axum handlers by reference.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    origin_year: i32,
    returns: BTreeMap<String, ReturnSeries>,
    inflation: ReturnSeries,
}

impl SeriesStore {
    pub fn new(origin_year: i32, inflation: ReturnSeries) -> Self {
        Self {
            origin_year,
            returns: BTreeMap::new(),
            inflation,
        }
    }

    pub fn with_returns(mut self, series: ReturnSeries) -> Self {
        self.returns.insert(series.name().to_string(), series);
        self
    }

    /// Loads the four standard investment types and inflation from `dir`.
    pub fn load_dir(dir: &Path, origin_year: i32) -> Result<Self, SeriesError> {
        let inflation = ReturnSeries::new(
            "inflation",
            load_series(&dir.join(INFLATION_FILE_NAME))?,
        )?;
        info!(
            "loaded inflation series: {} years from {origin_year}",
            inflation.years()
        );

        let mut store = Self::new(origin_year, inflation);
        for investment_type in InvestmentType::ALL {
            let path = dir.join(investment_type.file_name());
            let series = ReturnSeries::new(investment_type.name(), load_series(&path)?)?;
            info!(
                "loaded {} series ({}): {} years",
                investment_type.name(),
                investment_type.description(),
                series.years()
            );
            store = store.with_returns(series);
        }
        Ok(store)
    }

    pub fn origin_year(&self) -> i32 {
        self.origin_year
    }

    pub fn inflation(&self) -> &ReturnSeries {
        &self.inflation
    }

    pub fn returns(&self, name: &str) -> Result<&ReturnSeries, ConfigError> {
        self.returns
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInvestmentType {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.returns.keys().map(String::as_str)
    }

    pub fn offset_for_year(&self, calendar_year: i32) -> i64 {
        i64::from(calendar_year) - i64::from(self.origin_year)
    }

    pub fn year_for_offset(&self, offset: i64) -> i32 {
        (i64::from(self.origin_year) + offset) as i32
    }
}

/// Reads one percentage per line and converts each to a decimal [`Rate`].
pub fn load_series(path: &Path) -> Result<Vec<Rate>, SeriesError> {
    let text = fs::read_to_string(path).map_err(|source| SeriesError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_series(path, &text)
}

/// Parses `text` as read from `path`; blank lines are skipped.
pub fn parse_series(path: &Path, text: &str) -> Result<Vec<Rate>, SeriesError> {
    let mut values = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let percent = trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SeriesError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                content: trimmed.to_string(),
            })?;
        values.push(Rate::from_percent(percent));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Per-test temp directory, removed with its contents on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(label: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "nest-egg-{label}-{}",
                std::process::id()
            ));
            fs::create_dir_all(&dir).expect("failed to create scratch dir");
            Self(dir)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn rates(values: &[i64]) -> Vec<Rate> {
        values.iter().copied().map(Rate::from_scaled).collect()
    }

    #[test]
    fn value_at_wraps_past_the_end_and_before_the_start() {
        let values = rates(&[100, 200, 300]);
        assert_eq!(value_at(&values, 0), Some(Rate::from_scaled(100)));
        assert_eq!(value_at(&values, 4), Some(Rate::from_scaled(200)));
        assert_eq!(value_at(&values, 1980), Some(Rate::from_scaled(100)));
        assert_eq!(value_at(&values, -1), Some(Rate::from_scaled(300)));
        assert_eq!(value_at(&[], 3), None);
    }

    #[test]
    fn empty_series_is_rejected() {
        let err = ReturnSeries::new("stocks", Vec::new()).expect_err("must reject empty series");
        assert_eq!(
            err,
            ConfigError::EmptySeries {
                name: "stocks".to_string()
            }
        );
    }

    #[test]
    fn parse_series_converts_percent_to_five_decimal_places() {
        let text = "7.34\n\n  -43.84 \n0.123456\n12\n";
        let values = parse_series(Path::new("inline"), text).expect("valid series");
        assert_eq!(values, rates(&[7_340, -43_840, 123, 12_000]));
        assert!((values[0].as_decimal() - 0.0734).abs() < 1e-12);
    }

    #[test]
    fn parse_series_reports_offending_line() {
        let err = parse_series(Path::new("bonds.txt"), "1.0\n2.0\nabc\n")
            .expect_err("must reject non-numeric line");
        match err {
            SeriesError::Parse { line, content, .. } => {
                assert_eq!(line, 3);
                assert_eq!(content, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_series_reports_missing_file() {
        let scratch = ScratchDir::new("missing");
        let path = scratch.path().join("does-not-exist.txt");
        let err = load_series(&path).expect_err("must fail on missing file");
        assert!(matches!(err, SeriesError::Io { .. }));
        assert!(err.to_string().contains("does-not-exist.txt"));
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let scratch = ScratchDir::new("cleanup");
        let dir = scratch.path().to_path_buf();
        fs::write(dir.join(INFLATION_FILE_NAME), "3\n").expect("write inflation");
        drop(scratch);
        assert!(!dir.exists());
    }

    #[test]
    fn load_dir_reads_standard_file_set() {
        let scratch = ScratchDir::new("load-dir");
        let dir = scratch.path();
        fs::write(dir.join(INFLATION_FILE_NAME), "3\n2\n").expect("write inflation");
        for (idx, investment_type) in InvestmentType::ALL.iter().enumerate() {
            fs::write(
                dir.join(investment_type.file_name()),
                format!("{}\n-5\n8\n", idx + 1),
            )
            .expect("write returns");
        }

        let store = SeriesStore::load_dir(dir, 1926).expect("store should load");
        assert_eq!(store.origin_year(), 1926);
        assert_eq!(store.inflation().years(), 2);
        assert_eq!(
            store.names().collect::<Vec<_>>(),
            vec!["bonds", "sb_blend", "sbc_blend", "stocks"]
        );
        let stocks = store.returns("stocks").expect("stocks present");
        assert_eq!(stocks.as_slice(), rates(&[2_000, -5_000, 8_000]).as_slice());
        assert_eq!(store.offset_for_year(1980), 54);
        assert_eq!(store.year_for_offset(54), 1980);
    }

    #[test]
    fn load_dir_rejects_empty_file() {
        let scratch = ScratchDir::new("load-dir-empty");
        let dir = scratch.path();
        fs::write(dir.join(INFLATION_FILE_NAME), "\n").expect("write inflation");
        let err = SeriesStore::load_dir(dir, 1926).expect_err("must reject empty inflation");
        assert!(matches!(
            err,
            SeriesError::Config(ConfigError::EmptySeries { .. })
        ));
    }

    #[test]
    fn unknown_investment_type_is_a_config_error() {
        let inflation = ReturnSeries::from_decimals("inflation", &[0.02]).expect("non-empty");
        let store = SeriesStore::new(1926, inflation);
        let err = store.returns("gold").expect_err("gold is not loaded");
        assert_eq!(
            err,
            ConfigError::UnknownInvestmentType {
                name: "gold".to_string()
            }
        );
    }
}
