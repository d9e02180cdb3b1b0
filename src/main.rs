use clap::Parser;
use epi_analytics::config::LogFormat;
use epi_analytics::utils::error::{EpiError, ErrorSeverity, Result};
use epi_analytics::utils::{logger, validation::Validate};
use epi_analytics::{
    aggregate_by_period, analyze, summarize, AnalysisRequest, CliConfig, DataLoader,
    DatasetCache, HttpFetcher, LocalStorage, Settings,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = CliConfig::parse();

    let settings = match build_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    match settings.logging.format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose, &settings.logging.level),
        LogFormat::Json => logger::init_json_logger(cli.verbose, &settings.logging.level),
    }
    tracing::debug!("Effective settings: {:?}", settings);

    if let Err(e) = run(&cli, settings).await {
        tracing::error!(
            "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(exit_code(&e));
    }
}

/// File, then environment, then flags.
fn build_settings(cli: &CliConfig) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    settings.apply_env_overrides()?;
    cli.apply_to(&mut settings);
    settings.validate()?;
    Ok(settings)
}

async fn run(cli: &CliConfig, settings: Settings) -> Result<()> {
    // Bad metric arguments fail before anything is downloaded.
    let request = if cli.summary {
        None
    } else {
        let params = cli.analysis_params(&settings)?;
        Some(AnalysisRequest::build(cli.metric, &cli.country, &params)?)
    };

    let storage = LocalStorage::new(settings.cache.dir.clone());
    let fetcher = HttpFetcher::new(settings.timeout())?;
    let loader = DataLoader::new(fetcher, DatasetCache::new(storage), settings);

    let report = loader.load(cli.force_download).await?;
    tracing::info!(
        "Loaded {} rows ({:?} from {})",
        report.dataset.len(),
        report.origin,
        report.source
    );

    let dataset = match cli.period {
        Some(period) => aggregate_by_period(&report.dataset, period, cli.aggregation),
        None => report.dataset,
    };

    let output = match request {
        None => serde_json::to_string_pretty(&summarize(&dataset))?,
        Some(request) => serde_json::to_string_pretty(&analyze(&dataset, &request)?)?,
    };
    println!("{}", output);
    Ok(())
}

fn exit_code(error: &EpiError) -> i32 {
    match error.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}
