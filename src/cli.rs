use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use wm_import::config::{Config, SkipUnchanged};
use wm_import::import::ImportOptions;

#[derive(Parser, Debug)]
#[command(name = "wm")]
#[command(version, about = "Import archived web page snapshots into web-monitoring-db", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import captures from a web archive
    #[command(subcommand)]
    Import(ImportCommands),
    /// Inspect web-monitoring-db
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// Import Internet Archive captures of one URL or URL pattern
    Ia(IaArgs),
    /// Import Internet Archive captures of pages web-monitoring-db tracks
    IaKnownPages(KnownPagesArgs),
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Print the archive queries the tracked pages turn into
    ListDomains(ListDomainsArgs),
}

#[derive(clap::Args, Debug)]
pub struct IaArgs {
    pub url: String,

    #[command(flatten)]
    pub import: ImportArgs,
}

#[derive(clap::Args, Debug)]
pub struct KnownPagesArgs {
    /// A pattern to match when retrieving URLs from web-monitoring-db
    #[arg(long)]
    pub pattern: Option<String>,

    #[command(flatten)]
    pub import: ImportArgs,
}

#[derive(clap::Args, Debug)]
pub struct ListDomainsArgs {
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Earliest capture: hours ago, a date, or a datetime
    #[arg(long, value_parser = parse_date_argument)]
    pub from: Option<DateTime<Utc>>,

    /// Latest capture: hours ago, a date, or a datetime
    #[arg(long, value_parser = parse_date_argument)]
    pub to: Option<DateTime<Utc>>,

    /// Entity that maintains the imported pages (repeatable)
    #[arg(long)]
    pub maintainer: Vec<String>,

    /// Tag to apply to pages (repeatable)
    #[arg(long)]
    pub tag: Vec<String>,

    /// Skip consecutive captures of the same content: `none`, `response`, or `resolved-response`
    #[arg(long)]
    pub skip_unchanged: Option<SkipUnchanged>,

    /// Number of parallel network requests
    #[arg(long)]
    pub parallel: Option<usize>,

    /// File listing memento URLs that could not be played back; read before and written after importing
    #[arg(long)]
    pub unplaybackable: Option<PathBuf>,

    /// Don't upload data to web-monitoring-db
    #[arg(long)]
    pub dry_run: bool,
}

impl ImportArgs {
    /// Command-line flags over configured defaults
    pub fn into_options(self, config: &Config) -> ImportOptions {
        ImportOptions::builder()
            .maybe_from_date(self.from)
            .maybe_to_date(self.to)
            .maintainers(self.maintainer)
            .tags(self.tag)
            .skip_unchanged(self.skip_unchanged.unwrap_or(config.import.skip_unchanged))
            .parallel(self.parallel.unwrap_or(config.import.parallel))
            .maybe_unplaybackable_path(
                self.unplaybackable
                    .or_else(|| config.import.unplaybackable_path.clone()),
            )
            .unplaybackable_ttl(config.import.unplaybackable_ttl.as_duration())
            .retry_tiers(config.retry.tiers.clone())
            .dry_run(self.dry_run)
            .build()
    }
}

/// A number means that many hours ago; anything else is a date or datetime
pub fn parse_date_argument(value: &str) -> Result<DateTime<Utc>, String> {
    parse_date_at(value, Utc::now())
}

fn parse_date_at(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(hours) = value.parse::<f64>() {
        if !hours.is_finite() {
            return Err(format!("invalid number of hours: {}", value));
        }
        let out_of_range = || format!("{} hours ago is out of range", value);
        let millis = (hours * 3_600_000.0).round();
        if millis.abs() >= i64::MAX as f64 {
            return Err(out_of_range());
        }
        return Duration::try_milliseconds(millis as i64)
            .and_then(|offset| now.checked_sub_signed(offset))
            .ok_or_else(out_of_range);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }

    Err(format!(
        "expected hours ago or a date like 2020-01-31 / 2020-01-31T12:00:00Z (got `{}`)",
        value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_hours_ago() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(parse_date_at("24", now).unwrap(), now - Duration::hours(24));
        assert_eq!(parse_date_at("1.5", now).unwrap(), now - Duration::minutes(90));
    }

    #[test]
    fn test_parse_hours_out_of_range_is_an_error() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert!(parse_date_at("1e12", now).is_err());
        assert!(parse_date_at("-1e30", now).is_err());
        assert!(parse_date_at("1e30", now).is_err());
        assert!(parse_date_at("inf", now).is_err());
    }

    #[test]
    fn test_parse_dates() {
        let now = Utc::now();
        assert_eq!(
            parse_date_at("2020-01-31", now).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 31, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date_at("2020-01-31T12:30:00Z", now).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 31, 12, 30, 0).unwrap()
        );
        assert_eq!(
            parse_date_at("2020-01-31T12:30:00-05:00", now).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 31, 17, 30, 0).unwrap()
        );
        assert_eq!(
            parse_date_at("2020-01-31 12:30", now).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 31, 12, 30, 0).unwrap()
        );
        assert!(parse_date_at("last tuesday", now).is_err());
    }

    #[test]
    fn test_cli_parses_known_pages_import() {
        let cli = Cli::try_parse_from([
            "wm",
            "import",
            "ia-known-pages",
            "--pattern",
            "*.epa.gov/*",
            "--maintainer",
            "EPA",
            "--maintainer",
            "EDGI",
            "--skip-unchanged",
            "response",
            "--parallel",
            "4",
            "--dry-run",
        ])
        .unwrap();

        let Commands::Import(ImportCommands::IaKnownPages(args)) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(args.pattern.as_deref(), Some("*.epa.gov/*"));

        let options = args.import.into_options(&Config::default());
        assert_eq!(options.maintainers, vec!["EPA", "EDGI"]);
        assert_eq!(options.skip_unchanged, SkipUnchanged::Response);
        assert_eq!(options.parallel, 4);
        assert!(options.dry_run);
        assert_eq!(options.retry_tiers.len(), 3);
    }

    #[test]
    fn test_cli_rejects_unknown_skip_mode() {
        let result = Cli::try_parse_from(["wm", "import", "ia", "https://epa.gov/", "--skip-unchanged", "sometimes"]);
        assert!(result.is_err());
    }
}
