//! Figma design comparison CLI
//!
//! A thin glue layer over the compare pipeline: load the mapping config,
//! run every comparison, write the reports, and exit nonzero when any
//! mapping fails its threshold.

use clap::Parser;
use colored::Colorize;
use figma_compare::{CompareConfig, CompareRunner, RunnerOptions, DEFAULT_STORYBOOK_URL};

/// Compare rendered Storybook stories against their Figma designs
#[derive(Parser, Debug)]
#[command(name = "figma-compare")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run only the mapping for this story id
    #[arg(long, value_name = "STORY_ID")]
    story: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(all_passed) => {
            if !all_passed {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), err);
            eprintln!();
            std::process::exit(1);
        }
    }
}

/// Returns whether every mapping passed. Startup problems (missing or
/// invalid config, browser launch failure) surface as errors instead.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    println!("🎨 {} Figma design comparison", "Starting".green().bold());
    println!();

    let cwd = std::env::current_dir()?;
    let mut config = CompareConfig::load(&cwd)?;

    if let Some(story) = &cli.story {
        config.retain_story(story);
    }

    if config.mappings.is_empty() {
        println!("No mappings to compare.");
        return Ok(true);
    }

    let options = RunnerOptions {
        storybook_url: std::env::var("STORYBOOK_URL")
            .unwrap_or_else(|_| DEFAULT_STORYBOOK_URL.to_string()),
        // An empty token behaves like an unset one.
        figma_token: std::env::var("FIGMA_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty()),
        ..Default::default()
    };

    let runner = CompareRunner::new(options)?;
    let (report, paths) = runner.run_with_reports(&config).await?;

    println!();
    println!("📊 Report: {}", paths.html.display());
    println!();
    println!("📈 Summary:");
    println!("   ✅ Passed: {}", report.passed_count().to_string().green());
    println!("   ❌ Failed: {}", report.failed_count().to_string().red());

    if report.has_failures() {
        println!();
        println!(
            "{}",
            "Some components exceed their diff threshold.".red().bold()
        );
        for result in report.failing() {
            println!(
                "   - {}: {:.2}% (threshold: {}%)",
                result.description, result.diff_percentage, result.threshold
            );
        }
    }

    Ok(!report.has_failures())
}
