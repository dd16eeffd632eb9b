//! End-to-end runs: records on disk, learning, classification, weight reuse.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;

use wknn::distance::MISSING;
use wknn::io::{self, DirSource, LogSink, WriterSink};
use wknn::{
    generate_clustered_dataset, Config, DistanceFanOut, KnnError, QueryOutcome, SyntheticParams, TrainingPool,
    WeightLearner, WeightVector,
};

fn small_config() -> Config {
    Config {
        site_num: 5,
        train_num: 6,
        test_num: 3,
        open_test_num: 10,
        feat_num: 20,
        rounds: 2,
        neighbour_num: 2,
        reco_points_num: 2,
        workers: 2,
        seed: Some(7),
        ..Config::default()
    }
}

fn record(v: &[f64]) -> String {
    v.iter()
        .map(|&x| if x == MISSING { "'X'".to_string() } else { x.to_string() })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lay the dataset out the way a collection run does: one directory, test
/// instances first, then weight-learning instances, with a hole in site 0.
fn write_batch(dir: &Path, config: &Config) -> wknn::Dataset {
    let data = generate_clustered_dataset(config, SyntheticParams::default()).expect("dataset");
    for site in 0..config.site_num {
        for i in 0..config.test_num {
            let v = data.reference.get(site * config.test_num + i);
            fs::write(dir.join(format!("{site}-{i}s")), record(v)).expect("write");
        }
        for i in 0..config.train_num {
            let mut instance = config.test_num + i;
            if site == 0 && i >= 1 {
                instance += 1;
            }
            let v = data.training.get(site * config.train_num + i);
            fs::write(dir.join(format!("{site}-{instance}s")), record(v)).expect("write");
        }
    }
    for j in 0..config.open_test_num {
        let v = data.reference.get(data.reference.closed_len() + j);
        fs::write(dir.join(format!("{j}s")), record(v)).expect("write");
    }
    data
}

fn with_dir(config: &Config, dir: &Path) -> Config {
    Config {
        weight_dir: dir.to_path_buf(),
        train_dir: dir.to_path_buf(),
        test_dir: dir.to_path_buf(),
        open_dir: dir.to_path_buf(),
        ..config.clone()
    }
}

#[test]
fn loads_batch_directory_with_holes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = with_dir(&small_config(), tmp.path());
    let expected = write_batch(tmp.path(), &config);

    let loaded = io::load_dataset(&DirSource::from_config(&config), &config).expect("load");
    assert_eq!(loaded.training.vectors(), expected.training.vectors());
    assert_eq!(loaded.reference.vectors(), expected.reference.vectors());
    assert_eq!(loaded.query.vectors(), expected.reference.vectors());
}

#[test]
fn missing_budget_exhaustion_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = Config {
        missing_budget: 0,
        ..with_dir(&small_config(), tmp.path())
    };
    write_batch(tmp.path(), &config);

    let err = io::load_dataset(&DirSource::from_config(&config), &config).unwrap_err();
    match err {
        KnnError::DataUnavailable { key, budget } => {
            assert_eq!(budget, 0);
            assert!(key.ends_with("0-4s"), "unexpected key {key}");
        }
        other => panic!("expected DataUnavailable, got {other:?}"),
    }
}

#[test]
fn learned_weights_are_reusable() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = with_dir(&small_config(), tmp.path());
    write_batch(tmp.path(), &config);
    let dataset = io::load_dataset(&DirSource::from_config(&config), &config).expect("load");

    let trace_path = tmp.path().join("trace.log");
    let mut sink = WriterSink::new(fs::File::create(&trace_path).expect("trace"));
    let report = wknn::learn_and_evaluate(&config, &dataset, &mut sink).expect("run");
    assert_eq!(report.seed, 7);
    assert_eq!(report.weights.len(), config.feat_num);
    assert!(report.accuracy.tp > 0.9, "tight clusters should be recognised: {:?}", report.accuracy);
    assert!((0.0..=1.0).contains(&report.accuracy.tn));

    let trace = fs::read_to_string(&trace_path).expect("read trace");
    assert_eq!(trace.lines().count(), config.eval_len());
    assert!(trace.lines().all(|l| l.starts_with("guessed: ")));

    let weights_path = tmp.path().join("weights.out");
    io::write_weights(&weights_path, &report.weights).expect("write weights");
    let reloaded = io::read_weights(&weights_path, config.feat_num).expect("read weights");
    for (a, b) in reloaded.as_slice().iter().zip(report.weights.as_slice()) {
        assert!((a - b).abs() < 1e-8);
    }

    let accuracy =
        wknn::evaluate_with(&config, &dataset.eval_set(), &report.weights, &mut LogSink).expect("classify");
    assert_eq!(accuracy, report.accuracy);
}

#[test]
fn runs_are_reproducible_for_a_seed() {
    let config = small_config();
    let dataset = generate_clustered_dataset(&config, SyntheticParams::default()).expect("dataset");
    let a = wknn::learn_and_evaluate(&config, &dataset, &mut LogSink).expect("run a");
    let b = wknn::learn_and_evaluate(&config, &dataset, &mut LogSink).expect("run b");
    assert_eq!(a.weights, b.weights);
    assert_eq!(a.accuracy, b.accuracy);
}

#[test]
fn empty_open_world_has_unit_true_negative_rate() {
    let config = Config {
        open_test_num: 0,
        ..small_config()
    };
    let dataset = generate_clustered_dataset(&config, SyntheticParams::default()).expect("dataset");
    let report = wknn::learn_and_evaluate(&config, &dataset, &mut LogSink).expect("run");
    assert_eq!(report.accuracy.tn, 1.0);
}

#[test]
fn constant_feature_weight_survives_reload() {
    let config = Config {
        site_num: 3,
        train_num: 4,
        test_num: 1,
        open_test_num: 0,
        feat_num: 2,
        rounds: 1000,
        reco_points_num: 2,
        workers: 2,
        ..Config::default()
    };
    // Feature 0 separates the sites, feature 1 is padding.
    let vectors: Vec<Vec<f64>> = (0..config.training_len())
        .map(|i| {
            let site = i / config.train_num;
            let instance = i % config.train_num;
            vec![10.0 * site as f64 + 0.1 * instance as f64, 7.0]
        })
        .collect();
    let pool = TrainingPool::new(vectors, &config).expect("pool");
    let fanout = DistanceFanOut::new(config.workers).expect("fanout");
    let learner = WeightLearner::new(&config, &pool, &fanout).expect("learner");

    let mut rng = StdRng::seed_from_u64(5);
    let mut weights = WeightVector::random(config.feat_num, &mut rng);
    learner.learn(&mut weights, &mut rng).expect("learn");
    let padding = weights.as_slice()[1];
    assert!(padding > 0.0 && padding < 5e-10, "padding weight {padding}");

    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("weights.out");
    io::write_weights(&path, &weights).expect("write weights");
    let reloaded = io::read_weights(&path, config.feat_num).expect("read weights");
    for (a, b) in reloaded.as_slice().iter().zip(weights.as_slice()) {
        assert!(*a > 0.0);
        assert!((a - b).abs() <= 1e-12 * b.abs());
    }
}

#[test]
fn classification_only_run_needs_no_training_records() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (train_dir, test_dir, open_dir) = (tmp.path().join("train"), tmp.path().join("test"), tmp.path().join("open"));
    for dir in [&train_dir, &test_dir, &open_dir] {
        fs::create_dir(dir).expect("mkdir");
    }
    let config = Config {
        site_num: 2,
        test_num: 2,
        open_test_num: 1,
        feat_num: 2,
        neighbour_num: 1,
        // Learning constraints do not hold; they are not needed here.
        train_num: 1,
        missing_budget: 0,
        weight_dir: tmp.path().join("absent"),
        train_dir: train_dir.clone(),
        test_dir: test_dir.clone(),
        open_dir: open_dir.clone(),
        ..Config::default()
    };
    assert!(config.validate_learning().is_err());

    let reference = [[0.0, 0.0], [1.0, 0.0], [10.0, 10.0], [11.0, 10.0]];
    // Each query sits next to the other reference instance of its site.
    let queries = [[1.2, 0.0], [0.1, 0.0], [11.1, 10.0], [9.8, 10.0]];
    for site in 0..2 {
        for i in 0..2 {
            let p = site * 2 + i;
            fs::write(train_dir.join(format!("{site}-{i}s")), record(&reference[p])).expect("write");
            fs::write(test_dir.join(format!("{site}-{i}s")), record(&queries[p])).expect("write");
        }
    }
    fs::write(open_dir.join("0s"), record(&[50.0, 50.0])).expect("write");

    let source = DirSource::from_config(&config);
    assert!(io::load_dataset(&source, &config).is_err());
    let eval = io::load_eval(&source, &config).expect("load eval");
    assert_eq!(eval.query.get(0), &[1.2, 0.0]);
    assert_eq!(eval.reference.get(0), &[0.0, 0.0]);

    let weights = WeightVector::from_record("1000 0", 2).expect("weights");
    let mut trace: Vec<QueryOutcome> = Vec::new();
    let accuracy = wknn::evaluate_with(&config, &eval, &weights, &mut trace).expect("classify");

    let neighbours: Vec<Vec<usize>> = trace.iter().map(|o| o.neighbours.clone()).collect();
    assert_eq!(neighbours, vec![vec![1], vec![0], vec![3], vec![2], vec![3]]);
    assert_eq!(accuracy.tp, 1.0);
    assert_eq!(accuracy.tn, 0.0);
}
