// src/reporter.rs
// Report persistence: pretty JSON per run, competitor CSV, console summary.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::error::ResearchError;
use crate::report::{CompetitorProfile, ResearchReport};

pub const REPORT_FILE: &str = "report.json";
pub const COMPETITORS_FILE: &str = "competitors.csv";
/// Directory name used when no brand hint could be derived.
pub const DEFAULT_BRAND_DIR: &str = "default";

pub struct Reporter;

impl Reporter {
    /// `<output_dir>/<brand_hint or "default">`.
    pub fn report_dir(report: &ResearchReport, output_dir: &Path) -> PathBuf {
        let hint = report
            .run_meta
            .brand_hint
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_BRAND_DIR);
        output_dir.join(hint)
    }

    /// Write `report.json` (and `competitors.csv` when there are competitors).
    /// Returns the report path.
    pub fn persist_report(report: &ResearchReport, output_dir: &Path) -> Result<PathBuf, ResearchError> {
        let dir = Self::report_dir(report, output_dir);
        fs::create_dir_all(&dir)?;

        let path = dir.join(REPORT_FILE);
        let mut file = File::create(&path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;
        file.write_all(b"\n")?;

        if !report.competitor_profiles.is_empty() {
            Self::export_competitors_csv(&dir.join(COMPETITORS_FILE), &report.competitor_profiles)?;
        }

        tracing::info!(path = %path.display(), "report persisted");
        Ok(path)
    }

    pub fn load_report(path: &Path) -> Result<ResearchReport, ResearchError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn csv_header() -> [&'static str; 9] {
        [
            "brand",
            "brand_position",
            "price_range",
            "key_products",
            "key_features",
            "market_awareness",
            "consumer_image",
            "site_url",
            "data_quality",
        ]
    }

    pub fn export_competitors_csv(path: &Path, profiles: &[CompetitorProfile]) -> Result<(), ResearchError> {
        let mut wtr = Writer::from_path(path)?;
        wtr.write_record(Self::csv_header())?;

        for profile in profiles {
            let products = profile.key_products.join(" | ");
            wtr.write_record([
                profile.brand.as_str(),
                profile.brand_position.as_str(),
                profile.price_range.as_str(),
                products.as_str(),
                profile.key_features.as_str(),
                profile.market_awareness.as_str(),
                profile.consumer_image.as_str(),
                profile.site_url.as_deref().unwrap_or(""),
                profile.data_quality.as_str(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn print_summary(report: &ResearchReport, output_path: Option<&Path>) {
        let meta = &report.run_meta;
        println!("\nRESEARCH SUMMARY");
        println!("------------------------------------------");
        println!("Brand hint:   {}", meta.brand_hint.as_deref().unwrap_or("-"));
        println!("Seed URL:     {}", meta.seed_url.as_deref().unwrap_or("-"));
        if let Some(fatal) = &meta.fatal_error {
            println!("Fatal error:  {fatal}");
        }

        match report.brand_profile.value() {
            Some(profile) => {
                println!("Brand:        {} ({} pages crawled)", profile.brand, profile.pages_crawled);
                println!("Price range:  {}", profile.price_label());
                if !profile.social_profiles.is_empty() {
                    let socials: Vec<_> = profile
                        .social_profiles
                        .iter()
                        .map(|(platform, p)| format!("{platform}:{}", p.handle))
                        .collect();
                    println!("Socials:      {}", socials.join(", "));
                }
            }
            None => println!("Brand profile: {}", report.brand_profile.status()),
        }

        println!("Ontology:     {}", report.ontology.status());
        println!(
            "News:         {} insight(s) from {} document(s)",
            report.news_analysis.insights().len(),
            report.raw_news_docs.len()
        );
        match report.shopping_data.value() {
            Some(shopping) => println!(
                "Shopping:     {} listing(s) for '{}'",
                shopping.top_results.len(),
                shopping.product_name
            ),
            None => println!("Shopping:     {}", report.shopping_data.status()),
        }

        println!("Competitors:  {}", report.competitor_profiles.len());
        for profile in &report.competitor_profiles {
            println!("  - {} [{}] {}", profile.brand, profile.data_quality.as_str(), profile.price_range);
        }
        println!("Comparison:   {}", report.comparison_table.status());
        if let Some(path) = output_path {
            println!("Saved to:     {}", path.display());
        }
        println!("------------------------------------------\n");
    }
}
