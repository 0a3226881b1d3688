use std::path::{Path, PathBuf};
use std::sync::Arc;

use pension_ingest_lib::application::{IngestionPipeline, LayoutRules, MemoryLogObserver};
use pension_ingest_lib::domain::layout::DetectionMethod;
use pension_ingest_lib::domain::outcome::{FileStatus, SheetStatus, SummaryStatus};
use pension_ingest_lib::domain::pensioner::AgeCategory;
use pension_ingest_lib::domain::settings::Settings;
use pension_ingest_lib::domain::summary::GroupingDimension;
use pension_ingest_lib::infrastructure::db::pension::repository::PensionRepository;
use regex::Regex;
use tempfile::TempDir;

const ENHANCED_HEADER: &str = "PPO No,Year of Birth,PSA,Disbursing Branch,Branch Pincode,Pensioner Address,Pensioner Pincode,State\n";

struct Harness {
    dir: TempDir,
    repository: Arc<PensionRepository>,
    pipeline: IngestionPipeline,
    log: Arc<MemoryLogObserver>,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.database.path = dir.path().join("pensioners.db");
    settings.ingestion.reference_year = Some(2024);
    settings.ingestion.batch_size = 3;

    let repository = Arc::new(PensionRepository::connect(&settings.database).await.unwrap());
    let log = Arc::new(MemoryLogObserver::new("TEST", 1000));
    let rules = LayoutRules::from_settings(&settings).unwrap();
    let pipeline = IngestionPipeline::new(repository.clone(), settings, rules)
        .with_observer(log.clone());

    Harness {
        dir,
        repository,
        pipeline,
        log,
    }
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn enhanced_file(dir: &Path) -> PathBuf {
    write_file(
        dir,
        "enhanced.csv",
        &format!(
            "{}{}{}{}{}",
            ENHANCED_HEADER,
            "688002400653,21-01-1946,\"SPOs,Goalpara Div, Dhubri-783301\",Dhubri HO,783301,\"Dhubri H.O , Pin- 783301\",,Assam\n",
            "688002400654,1946,\"SPOs,Goalpara Div, Dhubri-783301\",Dhubri HO,783301,Village Road,783101,Assam\n",
            "688002400655,not a date,,,,,78,\n",
            "688002400656,1965,,,,Tura,794001,Meghalaya\n",
        ),
    )
}

#[tokio::test]
async fn enhanced_rows_are_normalized() {
    let h = harness().await;
    let outcome = h.pipeline.run(&[enhanced_file(h.dir.path())]).await.unwrap();
    assert_eq!(outcome.inserted, 4);

    let sheet = &outcome.files[0].sheets[0];
    assert_eq!(
        sheet.status,
        SheetStatus::Processed {
            layout: "enhanced".to_string(),
            positional_mapping: false,
        }
    );
    assert_eq!(sheet.unparsed_pincodes, 1);
    assert_eq!(sheet.unparsed_birth_years, 1);

    let first = h.repository.get_pensioner("688002400653").await.unwrap();
    assert_eq!(first.authority.authority_type.as_deref(), Some("SPOs"));
    assert_eq!(first.authority.authority_division.as_deref(), Some("Goalpara Div"));
    assert_eq!(first.authority.authority_area.as_deref(), Some("Dhubri"));
    assert_eq!(first.authority.authority_pincode.as_deref(), Some("783301"));
    assert_eq!(first.pensioner_pincode.as_deref(), Some("783301"));
    assert_eq!(first.birth_year, Some(1946));
    assert_eq!(first.pensioner_state.as_deref(), Some("ASSAM"));

    let second = h.repository.get_pensioner("688002400654").await.unwrap();
    assert_eq!(second.birth_year, Some(1946));
    assert_eq!(second.age, Some(78));
    assert_eq!(second.age_category, AgeCategory::From70To80);

    let third = h.repository.get_pensioner("688002400655").await.unwrap();
    assert_eq!(third.birth_year, None);
    assert_eq!(third.pensioner_pincode, None);
    assert_eq!(third.age_category, AgeCategory::Unknown);
}

#[tokio::test]
async fn rerunning_a_file_only_produces_duplicates() {
    let h = harness().await;
    let file = enhanced_file(h.dir.path());

    let first = h.pipeline.run(&[file.clone()]).await.unwrap();
    let count_after_first = h.repository.count_pensioners().await.unwrap();
    let second = h.pipeline.run(&[file]).await.unwrap();

    assert_eq!(second.duplicates, first.inserted);
    assert_eq!(second.inserted, 0);
    assert_eq!(h.repository.count_pensioners().await.unwrap(), count_after_first);
}

#[tokio::test]
async fn shared_key_across_files_is_kept_once() {
    let h = harness().await;
    let simple = "PPO Number,DOB,Address\n688002400653,1950,Goalpara\n";
    let a = enhanced_file(h.dir.path());
    let b = write_file(h.dir.path(), "simple.csv", simple);

    let outcome = h.pipeline.run(&[a, b]).await.unwrap();
    assert_eq!(outcome.duplicates, 1);
    assert_eq!(outcome.inserted, 4);

    let duplicated: Vec<(String, i64)> = sqlx::query_as(
        "SELECT ppo_number, COUNT(*) FROM pensioners GROUP BY ppo_number HAVING COUNT(*) > 1",
    )
    .fetch_all(h.repository.pool())
    .await
    .unwrap();
    assert!(duplicated.is_empty());
}

#[tokio::test]
async fn summaries_match_fact_table() {
    let h = harness().await;
    let outcome = h.pipeline.run(&[enhanced_file(h.dir.path())]).await.unwrap();

    let report = match outcome.summary {
        SummaryStatus::Materialized(report) => report,
        other => panic!("summary not materialized: {:?}", other),
    };
    assert_eq!(report.fact_rows, 4);
    assert!(report.drift.is_empty());

    for dimension in GroupingDimension::ALL {
        assert!(h.repository.summary_drift(dimension).await.unwrap().is_empty());
    }

    let states = h.repository.list_summary(GroupingDimension::State).await.unwrap();
    let assam_70_80: u64 = states
        .iter()
        .filter(|b| b.key.value == "ASSAM" && b.key.age_category == AgeCategory::From70To80)
        .map(|b| b.count)
        .sum();
    assert_eq!(assam_70_80, 2);
    assert_eq!(states.iter().map(|b| b.count).sum::<u64>(), 3);
}

#[tokio::test]
async fn stored_pincodes_are_six_digits_and_ages_are_bucketed() {
    let h = harness().await;
    h.pipeline.run(&[enhanced_file(h.dir.path())]).await.unwrap();

    let pincodes: Vec<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT pensioner_pincode, disbursing_branch_pincode, authority_pincode FROM pensioners",
    )
    .fetch_all(h.repository.pool())
    .await
    .unwrap();
    let six_digits = Regex::new(r"^\d{6}$").unwrap();
    for (a, b, c) in pincodes {
        for pin in [a, b, c].into_iter().flatten() {
            assert!(six_digits.is_match(&pin), "bad pincode {}", pin);
        }
    }

    let ages: Vec<(Option<i64>, String)> =
        sqlx::query_as("SELECT age, age_category FROM pensioners")
            .fetch_all(h.repository.pool())
            .await
            .unwrap();
    for (age, category) in ages {
        let expected = match age {
            None => "unknown",
            Some(a) if a < 60 => "<60",
            Some(a) if a < 70 => "60-70",
            Some(a) if a < 80 => "70-80",
            Some(_) => ">80",
        };
        assert_eq!(category, expected);
    }
}

#[tokio::test]
async fn unlabelled_eight_column_sheet_uses_positional_enhanced_layout() {
    let h = harness().await;
    let file = write_file(
        h.dir.path(),
        "annexure.csv",
        "Annexure II\n\
         1,688002400653,1946,\"SPOs,Goalpara Div, Dhubri-783301\",Dhubri branch,783301,\"Dhubri H.O , Pin- 783301\",783301\n\
         2,688002400699,1958,\"SPOs,Goalpara Div, Dhubri-783301\",Dhubri branch,783301,Bilasipara,783348\n",
    );

    let outcome = h.pipeline.run(&[file]).await.unwrap();
    assert_eq!(outcome.inserted, 2);
    assert_eq!(
        outcome.files[0].sheets[0].status,
        SheetStatus::Processed {
            layout: "enhanced".to_string(),
            positional_mapping: true,
        }
    );
    assert!(h
        .log
        .entries()
        .iter()
        .any(|e| e.message.contains("layout enhanced (positional)")));

    let record = h.repository.get_pensioner("688002400699").await.unwrap();
    assert_eq!(record.pensioner_pincode.as_deref(), Some("783348"));
    assert_eq!(record.disbursing_branch_pincode.as_deref(), Some("783301"));
    assert_eq!(record.age_category, AgeCategory::From60To70);
}

#[tokio::test]
async fn unreadable_and_undetected_inputs_do_not_stop_the_run() {
    let h = harness().await;
    let good = enhanced_file(h.dir.path());
    let narrow = write_file(h.dir.path(), "narrow.csv", "remarks\nnone\n");
    let missing = h.dir.path().join("missing.csv");

    let outcome = h.pipeline.run(&[missing, narrow, good]).await.unwrap();
    assert!(matches!(outcome.files[0].status, FileStatus::Failed { .. }));
    assert_eq!(outcome.files[1].status, FileStatus::Completed);
    assert_eq!(outcome.files[2].status, FileStatus::Completed);
    assert_eq!(outcome.failed_files, 1);
    assert_eq!(outcome.undetected_sheets, 1);
    assert_eq!(outcome.inserted, 4);

    let loads = h.repository.list_loads(&outcome.run_id).await.unwrap();
    assert_eq!(loads.len(), 3);
}

#[test]
fn positional_detection_reports_column_count() {
    use pension_ingest_lib::application::use_cases::format_detector::{Detection, FormatDetector};
    use pension_ingest_lib::domain::sheet::RawSheet;

    let settings = Settings::default();
    let rules = LayoutRules::builtin();
    let sheet = RawSheet::from_strings("s", &[&["a", "b", "c", "d", "e", "f", "g", "h"]]);
    match FormatDetector::new(&rules, &settings.ingestion).detect(&sheet.rows) {
        Detection::Detected(layout) => {
            assert_eq!(layout.name, "enhanced");
            assert_eq!(layout.method, DetectionMethod::Positional { columns: 8 });
        }
        other => panic!("unexpected detection: {:?}", other),
    }
}
