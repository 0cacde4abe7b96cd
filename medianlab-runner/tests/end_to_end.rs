//! End-to-end runs over real files in temporary directories.

use std::path::Path;

use medianlab_core::data::TieBreak;
use medianlab_core::CancelToken;
use medianlab_runner::config::MainSection;
use medianlab_runner::{generate_dataset, run_median, GenerateOptions, RunConfig, RunSummary};

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn config(input: &Path, output: &Path) -> RunConfig {
    RunConfig {
        main: MainSection {
            input: Some(input.to_path_buf()),
            output: Some(output.to_path_buf()),
            filename_mask: Vec::new(),
        },
        ..RunConfig::default()
    }
}

fn result_rows(summary: &RunSummary) -> Vec<String> {
    std::fs::read_to_string(&summary.output_path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

#[test]
fn writes_a_row_only_when_the_median_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(
        &input,
        "btcusdt_trade.csv",
        "receive_ts;exchange_ts;price;quantity;side\n\
         1716810808663260;1716810808661000;68480.10;0.01;bid\n\
         1716810808693217;1716810808691000;68480.10;0.02;ask\n",
    );
    write(
        &input,
        "btcusdt_level.csv",
        "receive_ts;exchange_ts;price;quantity;side;rebuild\n\
         1716810808683000;1716810808681000;68480.00;1.5;bid;1\n\
         1716810808700000;1716810808699000;68480.10;0.5;ask;1\n",
    );

    let summary = run_median(&config(&input, &tmp.path().join("out")), None).unwrap();
    assert_eq!(
        result_rows(&summary),
        vec![
            "1716810808663260;68480.10000000",
            "1716810808683000;68480.05000000",
            "1716810808693217;68480.10000000",
        ]
    );
    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.files_merged, 2);
    assert_eq!(summary.records_processed, 4);
    assert_eq!(summary.median_changes, 3);
    assert!(!summary.cancelled);
}

#[test]
fn bad_files_and_rows_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "a.csv", "receive_ts;price\n1000;1.0\nbad;2.0\n3000;3.0\n");
    write(&input, "b.csv", "timestamp;value\n2000;2.0\n");
    write(&input, "c.csv", "");
    write(&input, "notes.txt", "receive_ts;price\n1;100.0\n");

    let summary = run_median(&config(&input, &tmp.path().join("out")), None).unwrap();
    assert_eq!(summary.files_found, 3);
    assert_eq!(summary.files_merged, 1);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.final_median, Some(2.0));
}

#[test]
fn filename_masks_limit_the_inputs() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "x_trade.csv", "receive_ts;price\n1;10.0\n");
    write(&input, "x_funding.csv", "receive_ts;price\n2;99.0\n");

    let mut cfg = config(&input, &tmp.path().join("out"));
    cfg.main.filename_mask = vec!["trade".into()];
    let summary = run_median(&cfg, None).unwrap();
    assert_eq!(summary.files_found, 1);
    assert_eq!(summary.final_median, Some(10.0));
}

#[test]
fn mask_priority_changes_equal_timestamp_order() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "a_level.csv", "receive_ts;price\n5;1.0\n");
    write(&input, "b_trade.csv", "receive_ts;price\n5;3.0\n");

    let mut cfg = config(&input, &tmp.path().join("out"));
    cfg.main.filename_mask = vec!["trade".into(), "level".into()];

    let first = run_median(&cfg, None).unwrap();
    assert_eq!(result_rows(&first)[0], "5;1.00000000");

    cfg.merge.tie_break = TieBreak::MaskPriority;
    let second = run_median(&cfg, None).unwrap();
    assert_eq!(result_rows(&second)[0], "5;3.00000000");
}

#[test]
fn output_is_reproducible_across_worker_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let opts = GenerateOptions {
        bytes_per_symbol: 32 * 1024,
        symbols: vec!["btcusdt".into(), "ethusdt".into()],
        ..GenerateOptions::default()
    };
    generate_dataset(&input, &opts).unwrap();

    let mut digests = Vec::new();
    for workers in [1, 2, 4] {
        let mut cfg = config(&input, &tmp.path().join(format!("out{workers}")));
        cfg.merge.workers = workers;
        let summary = run_median(&cfg, None).unwrap();
        assert_eq!(summary.files_merged, 4);
        assert_eq!(summary.rows_skipped, 0);
        assert!(summary.median_changes > 0);
        digests.push(summary.output_digest);
    }
    assert!(digests.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn pre_cancelled_run_writes_header_only() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "a.csv", "receive_ts;price\n1;1.0\n2;2.0\n");

    let token = CancelToken::new();
    token.cancel();
    let summary = run_median(&config(&input, &tmp.path().join("out")), Some(&token)).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.records_processed, 0);
    assert!(result_rows(&summary).is_empty());
}

#[test]
fn summary_file_is_optional() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();

    let mut cfg = config(&input, &tmp.path().join("out"));
    cfg.output.write_summary = false;
    run_median(&cfg, None).unwrap();
    assert!(!cfg.summary_path().exists());
    assert!(cfg.result_path().exists());
}

#[test]
fn config_file_drives_a_run() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "a.csv", "ts,px\n1,4.0\n2,6.0\n");

    let cfg_path = tmp.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        format!(
            "[main]\ninput = {:?}\noutput = {:?}\n\
             [columns]\ntimestamp = 'ts'\nprice = 'px'\ndelimiter = ','\n\
             [output]\nfile_name = 'medians.csv'\n",
            input.display().to_string(),
            tmp.path().join("out").display().to_string(),
        ),
    )
    .unwrap();

    let cfg = RunConfig::from_file(&cfg_path).unwrap();
    let summary = run_median(&cfg, None).unwrap();
    assert!(summary.output_path.ends_with("medians.csv"));
    assert_eq!(result_rows(&summary), vec!["1;4.00000000", "2;5.00000000"]);
}
