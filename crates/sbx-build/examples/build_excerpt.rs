//! Assemble the excerpt from a stored snapshot and print a short summary.
//!
//! Expects `net.json` and a `profiles/` parquet store under the data
//! directory (first argument, default `data`).

use sbx_build::{build_excerpt, overview, ExcerptOptions};
use sbx_profiles::StepSelection;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let data_dir = std::env::args().nth(1).unwrap_or_else(|| "data".into());

    let excerpt = build_excerpt(&ExcerptOptions {
        time_steps: StepSelection::Steps(vec![0, 24, 48, 72, 96, 120, 144, 168]),
        control: Some("LocalCtrl".into()),
        data_dir: data_dir.into(),
        ..ExcerptOptions::default()
    })?;

    println!("{}", excerpt.net.stats());
    println!("{}", overview(&excerpt.net));
    if let Some(report) = &excerpt.strategy_report {
        for (kind, indices) in report {
            println!("{kind}: {} units under control", indices.len());
        }
    }
    Ok(())
}
