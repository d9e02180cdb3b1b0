use chrono::{Duration, NaiveDate, Utc};
use epi_analytics::domain::metric::CountryComparison;
use epi_analytics::{
    analyze, AnalysisParams, AnalysisRequest, Column, DataLoader, DataOrigin, DatasetCache,
    EpiError, HttpFetcher, LocalStorage, MetricKind, MetricValue, Settings,
};
use httpmock::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "iso_code,location,date,total_cases,new_cases,total_deaths,new_deaths,population";

fn csv(rows: &[&str]) -> String {
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    body
}

fn settings(primary: String, fallback: Option<String>, cache_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.source.primary_url = primary;
    settings.source.fallback_url = fallback;
    settings.source.timeout_seconds = 5;
    settings.cache.dir = cache_dir.to_path_buf();
    settings
}

type Loader = DataLoader<HttpFetcher, LocalStorage, Settings>;

fn loader(settings: Settings) -> Loader {
    let storage = LocalStorage::new(settings.cache.dir.clone());
    let fetcher = HttpFetcher::new(settings.timeout()).unwrap();
    DataLoader::new(fetcher, DatasetCache::new(storage), settings)
}

#[tokio::test]
async fn test_duplicate_rows_collapse_to_one() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let body = csv(&[
        "FRA,France,2020-03-01,130,30,2,1,67000000",
        "FRA,France,2020-03-01,130,30,2,1,67000000",
        "FRA,France,2020-03-02,191,61,3,1,67000000",
    ]);
    server.mock(|when, then| {
        when.method(GET).path("/owid.csv");
        then.status(200).header("Content-Type", "text/csv").body(body);
    });

    let data = loader(settings(server.url("/owid.csv"), None, temp_dir.path()))
        .load_data(false)
        .await
        .unwrap();

    let first_day = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
    let matching = data
        .iter()
        .filter(|r| r.location == "France" && r.date == Some(first_day))
        .count();
    assert_eq!(matching, 1);
    assert_eq!(data.len(), 2);
}

#[tokio::test]
async fn test_growth_rate_over_three_days() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let body = csv(&[
        "FRA,France,2020-03-01,1000,100,10,1,67000000",
        "FRA,France,2020-03-02,1150,150,12,2,67000000",
        "FRA,France,2020-03-03,1375,225,15,3,67000000",
    ]);
    server.mock(|when, then| {
        when.method(GET).path("/owid.csv");
        then.status(200).body(body);
    });

    let data = loader(settings(server.url("/owid.csv"), None, temp_dir.path()))
        .load_data(false)
        .await
        .unwrap();

    let params = AnalysisParams {
        column: Column::NewCases,
        window_days: 3,
        ..Default::default()
    };
    let request =
        AnalysisRequest::build(MetricKind::Growth, &["France".to_string()], &params).unwrap();
    let growth = analyze(&data, &request).unwrap().scalar().unwrap();

    assert!((growth - 125.0).abs() < 1e-9, "growth was {}", growth);
}

#[tokio::test]
async fn test_compare_marks_unknown_country() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let body = csv(&[
        "FRA,France,2020-03-01,200,200,4,4,67000000",
        "ESP,Spain,2020-03-01,100,100,1,1,47000000",
    ]);
    server.mock(|when, then| {
        when.method(GET).path("/owid.csv");
        then.status(200).body(body);
    });

    let data = loader(settings(server.url("/owid.csv"), None, temp_dir.path()))
        .load_data(false)
        .await
        .unwrap();

    let request = AnalysisRequest::build(
        MetricKind::Compare,
        &["France".to_string(), "Atlantis".to_string()],
        &AnalysisParams::default(),
    )
    .unwrap();

    match analyze(&data, &request).unwrap().value {
        MetricValue::Comparison(table) => {
            assert_eq!(table.len(), 2);
            assert_eq!(table["France"].rate(), Some(2.0));
            assert_eq!(table["Atlantis"], CountryComparison::NotFound);
        }
        other => panic!("expected a comparison table, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fallback_source_populates_cache() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let primary_mock = server.mock(|when, then| {
        when.method(GET).path("/primary.csv");
        then.status(503);
    });
    let fallback_mock = server.mock(|when, then| {
        when.method(GET).path("/backup.csv");
        then.status(200)
            .body(csv(&["FRA,France,2020-03-01,130,30,2,1,67000000"]));
    });

    let fallback_url = server.url("/backup.csv");
    let loader = loader(settings(
        server.url("/primary.csv"),
        Some(fallback_url.clone()),
        temp_dir.path(),
    ));

    let report = loader.load(false).await.unwrap();

    primary_mock.assert();
    fallback_mock.assert();
    assert_eq!(report.origin, DataOrigin::Fallback);
    assert_eq!(report.source, fallback_url);

    let entry = loader.cache().entry("owid_covid").await.unwrap();
    assert_eq!(entry.source, fallback_url);
    assert_eq!(entry.dataset, report.dataset);
    assert!(temp_dir.path().join("owid_covid.json").exists());
}

#[tokio::test]
async fn test_unreachable_primary_uses_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/backup.csv");
        then.status(200)
            .body(csv(&["FRA,France,2020-03-01,130,30,2,1,67000000"]));
    });

    let data = loader(settings(
        "http://127.0.0.1:1/owid.csv".to_string(),
        Some(server.url("/backup.csv")),
        temp_dir.path(),
    ))
    .load_data(false)
    .await
    .unwrap();

    assert!(data.contains_location("France"));
}

#[tokio::test]
async fn test_fresh_cache_avoids_network() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/owid.csv");
        then.status(200)
            .body(csv(&["FRA,France,2020-03-01,130,30,2,1,67000000"]));
    });
    let loader = loader(settings(server.url("/owid.csv"), None, temp_dir.path()));

    let first = loader.load(false).await.unwrap();
    let second = loader.load(false).await.unwrap();

    assert_eq!(first.origin, DataOrigin::Primary);
    assert_eq!(second.origin, DataOrigin::Cache);
    assert_eq!(first.dataset, second.dataset);
    mock.assert_hits(1);

    let forced = loader.load(true).await.unwrap();
    assert_eq!(forced.origin, DataOrigin::Primary);
    mock.assert_hits(2);
}

#[tokio::test]
async fn test_stale_cache_served_when_all_sources_fail() {
    let temp_dir = TempDir::new().unwrap();
    let cache = DatasetCache::new(LocalStorage::new(temp_dir.path()));
    let stale = epi_analytics::clean(
        vec![epi_analytics::Record::new(
            "Spain",
            NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
        )
        .with(Column::TotalCases, 84.0)]
        .into_iter()
        .collect(),
    );
    cache
        .put_at(
            "owid_covid",
            &stale,
            "https://example.org/owid.csv",
            Utc::now() - Duration::hours(72),
        )
        .await
        .unwrap();

    let report = loader(settings(
        "http://127.0.0.1:1/owid.csv".to_string(),
        None,
        temp_dir.path(),
    ))
    .load(false)
    .await
    .unwrap();

    assert_eq!(report.origin, DataOrigin::StaleCache);
    assert_eq!(report.source, "https://example.org/owid.csv");
    assert_eq!(report.dataset, stale);
}

#[tokio::test]
async fn test_schema_error_is_not_cached() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/owid.csv");
        then.status(200)
            .body("location,date,total_cases,new_cases\nFrance,2020-03-01,130,30\n");
    });
    let loader = loader(settings(server.url("/owid.csv"), None, temp_dir.path()));

    match loader.load_data(false).await {
        Err(EpiError::SchemaError { missing, .. }) => {
            assert_eq!(missing, vec!["total_deaths", "new_deaths"]);
        }
        other => panic!("expected SchemaError, got {:?}", other.map(|d| d.len())),
    }
    assert!(loader.cache().entry("owid_covid").await.is_none());
}

#[tokio::test]
async fn test_local_csv_path_source() {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("owid.csv");
    std::fs::write(
        &csv_path,
        csv(&[
            "FRA,France,2020-03-01,130,30,2,1,67000000",
            "FRA,France,2020-03-03,250,60,6,2,67000000",
        ]),
    )
    .unwrap();

    let mut settings = settings(
        csv_path.to_string_lossy().into_owned(),
        None,
        &temp_dir.path().join("cache"),
    );
    settings.cache.enabled = false;
    let loader = loader(settings);

    let report = loader.load(false).await.unwrap();

    assert_eq!(report.origin, DataOrigin::Primary);
    assert_eq!(report.dataset.len(), 2);
    assert!(!temp_dir.path().join("cache").exists());
}
