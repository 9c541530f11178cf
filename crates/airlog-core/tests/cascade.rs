use std::fs;
use std::path::Path;

use airlog_core::CascadeConfig;
use airlog_core::storage::{
    BuildEvent, BuildOptions, BuildOutcome, Cascade, Level, ProgressSink, StorageLayout,
};
use chrono::{Days, NaiveDate};

fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

fn cascade(root: &Path) -> Cascade {
    Cascade::new(CascadeConfig::with_root(root)).unwrap()
}

fn gen_missing() -> BuildOptions {
    BuildOptions {
        generate_missing: true,
        ..BuildOptions::default()
    }
}

fn line_count(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

fn snapshot(layout: &StorageLayout, dates: &[NaiveDate]) -> Vec<String> {
    dates
        .iter()
        .flat_map(|&d| Level::ALL[1..].iter().map(move |&l| (l, d)))
        .map(|(level, d)| fs::read_to_string(layout.aggregate_file(level, d)).unwrap())
        .collect()
}

#[derive(Default)]
struct Recorder {
    started: Vec<Level>,
    finished: usize,
}

impl ProgressSink for Recorder {
    fn on_event(&mut self, event: BuildEvent<'_>) {
        match event {
            BuildEvent::Started { level, .. } => self.started.push(level),
            BuildEvent::Finished { .. } => self.finished += 1,
            _ => {}
        }
    }
}

#[test]
fn test_backfill_with_generated_raw_builds_every_level() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade = cascade(dir.path());
    let (from, to) = (date("2024-01-01"), date("2024-01-03"));

    let report = cascade.backfill(from, to, &gen_missing());

    assert!(report.is_success());
    assert_eq!(report.built, 15);
    assert_eq!(report.missing_input, 0);

    let layout = cascade.layout();
    for d in ["2024-01-01", "2024-01-02", "2024-01-03"] {
        assert!(layout.synthetic_raw_file(date(d)).is_file());
        assert_eq!(line_count(&layout.aggregate_file(Level::FiveMinutes, date(d))), 288 * 7);
    }

    // Upper levels read every 5m file produced in phase 1 up to their date.
    assert_eq!(line_count(&layout.aggregate_file(Level::ThirtyMinutes, from)), 48 * 7);
    assert_eq!(line_count(&layout.aggregate_file(Level::ThirtyMinutes, to)), 3 * 48 * 7);
    assert_eq!(line_count(&layout.aggregate_file(Level::TwoHours, to)), 3 * 12 * 7);
    assert_eq!(line_count(&layout.aggregate_file(Level::TwelveHours, to)), 3 * 2 * 7);

    // 2024-01-01 is a Monday, so the three days share one weekly bucket.
    let weekly = fs::read_to_string(layout.aggregate_file(Level::OneWeek, to)).unwrap();
    assert_eq!(weekly.lines().count(), 7);
    assert!(weekly.lines().all(|l| l.starts_with("2024-01-01T00:00:00.000Z\t")));

    // The first day's weekly file carries one reading per minute of that day.
    let weekly = fs::read_to_string(layout.aggregate_file(Level::OneWeek, from)).unwrap();
    assert_eq!(weekly.lines().count(), 7);
    assert!(weekly.lines().all(|l| l.ends_with("\t1440")), "{weekly}");
}

#[test]
fn test_backfill_without_raw_data_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade = cascade(dir.path());

    let report = cascade.backfill(date("2024-01-01"), date("2024-01-03"), &BuildOptions::default());

    assert!(report.is_success());
    assert_eq!(report.built, 0);
    assert_eq!(report.missing_input, 15);
    for level in Level::UPPER {
        assert!(cascade.layout().list_aggregate_files(level).unwrap().is_empty());
    }
    assert!(
        cascade
            .layout()
            .list_aggregate_files(Level::FiveMinutes)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_backfill_rerun_is_idempotent_and_force_rebuilds_identically() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade = cascade(dir.path());
    let dates = [date("2024-02-10"), date("2024-02-11")];

    assert_eq!(cascade.backfill(dates[0], dates[1], &gen_missing()).built, 10);
    let first = snapshot(cascade.layout(), &dates);

    let rerun = cascade.backfill(dates[0], dates[1], &gen_missing());
    assert_eq!((rerun.built, rerun.existing), (0, 10));
    assert_eq!(snapshot(cascade.layout(), &dates), first);

    let forced = BuildOptions {
        force: true,
        ..gen_missing()
    };
    let rebuilt = cascade.backfill(dates[0], dates[1], &forced);
    assert_eq!(rebuilt.built, 10);
    assert_eq!(snapshot(cascade.layout(), &dates), first);
}

#[test]
fn test_force_picks_up_changed_raw_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade = cascade(dir.path());
    let day = date("2024-05-01");

    fs::write(
        dir.path().join("temp_2024-05-01T00-00-01.log"),
        "2024-05-01T00:01:00.000Z\tCO2\t400\n",
    )
    .unwrap();
    cascade.generate_5m_for_date(day, &BuildOptions::default()).unwrap();

    fs::write(
        dir.path().join("temp_2024-05-01T00-00-01.log"),
        "2024-05-01T00:01:00.000Z\tCO2\t400\n2024-05-01T00:02:00.000Z\tCO2\t500\n",
    )
    .unwrap();

    let output = cascade.layout().aggregate_file(Level::FiveMinutes, day);
    assert!(matches!(
        cascade.generate_5m_for_date(day, &BuildOptions::default()).unwrap(),
        BuildOutcome::Exists(_)
    ));
    assert_eq!(fs::read_to_string(&output).unwrap(), "2024-05-01T00:00:00.000Z\tCO2\t400.00\t1\n");

    let forced = BuildOptions {
        force: true,
        ..BuildOptions::default()
    };
    cascade.generate_5m_for_date(day, &forced).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), "2024-05-01T00:00:00.000Z\tCO2\t450.00\t2\n");
}

#[test]
fn test_failed_date_does_not_abort_backfill() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade = cascade(dir.path());
    let broken = date("2024-01-02");

    // A directory squatting on the temporary output path makes the write fail.
    let output = cascade.layout().aggregate_file(Level::FiveMinutes, broken);
    fs::create_dir_all(format!("{}.tmp", output.display())).unwrap();

    let report = cascade.backfill(date("2024-01-01"), date("2024-01-03"), &gen_missing());

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].date, broken);
    assert_eq!(report.failures[0].level, Level::FiveMinutes);
    assert!(!output.exists());

    let layout = cascade.layout();
    assert!(layout.aggregate_file(Level::FiveMinutes, date("2024-01-03")).is_file());
    assert!(layout.aggregate_file(Level::ThirtyMinutes, broken).is_file());
    assert_eq!(
        line_count(&layout.aggregate_file(Level::ThirtyMinutes, date("2024-01-03"))),
        2 * 48 * 7
    );
}

#[test]
fn test_daily_run_prunes_relative_to_run_date() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade = cascade(dir.path());
    let today = date("2024-06-30");
    let days_ago = |n: u64| today.checked_sub_days(Days::new(n)).unwrap();

    let layout = cascade.layout().clone();
    let stale_5m = layout.aggregate_file(Level::FiveMinutes, days_ago(38));
    let kept_5m = layout.aggregate_file(Level::FiveMinutes, days_ago(37));
    let stale_30m = layout.aggregate_file(Level::ThirtyMinutes, days_ago(121));
    let kept_30m = layout.aggregate_file(Level::ThirtyMinutes, days_ago(120));
    let old_2h = layout.aggregate_file(Level::TwoHours, days_ago(2000));
    for path in [&stale_5m, &kept_5m, &stale_30m, &kept_30m, &old_2h] {
        fs::write(path, "").unwrap();
    }

    let report = cascade.run_daily_cascade_on(today, &gen_missing());

    assert!(report.is_success());
    assert_eq!(report.built, 5);
    assert_eq!(report.pruned, 2);
    assert!(!stale_5m.exists());
    assert!(!stale_30m.exists());
    assert!(kept_5m.exists());
    assert!(kept_30m.exists());
    assert!(old_2h.exists());
}

#[test]
fn test_gen_range_skips_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = cascade(dir.path());
    let existing = cascade.layout().synthetic_raw_file(date("2024-03-02"));
    fs::write(&existing, "kept").unwrap();

    let report = cascade.gen_range(date("2024-03-01"), date("2024-03-03"), 2);

    assert_eq!((report.generated, report.existing), (2, 1));
    assert_eq!(fs::read_to_string(&existing).unwrap(), "kept");
    assert_eq!(
        line_count(&cascade.layout().synthetic_raw_file(date("2024-03-03"))),
        2 * 1440 * 7
    );
}

#[test]
fn test_progress_sink_sees_every_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut cascade =
        Cascade::with_progress(CascadeConfig::with_root(dir.path()), Recorder::default()).unwrap();

    let report = cascade.backfill(date("2024-01-01"), date("2024-01-01"), &gen_missing());
    assert_eq!(report.built, 5);

    let rerun = cascade.backfill(date("2024-01-01"), date("2024-01-01"), &gen_missing());
    assert_eq!(rerun.existing, 5);

    let recorder = cascade.into_progress();
    assert_eq!(
        recorder.started,
        [
            Level::FiveMinutes,
            Level::ThirtyMinutes,
            Level::TwoHours,
            Level::TwelveHours,
            Level::OneWeek
        ]
    );
    assert_eq!(recorder.finished, 5);
}
