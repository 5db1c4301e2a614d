use std::{fs, path::Path};

use ndarray::arr2;

use protoml::{
    Classifier, DatasetLoader, ProtoErr, SavedModelStore, Species, Trainer, TrainingConfig,
    network,
    runtime::{Feed, Tensor},
};

// A slice of the iris dataset, five samples of each species.
const IRIS_ROWS: &str = "\
5.1,3.5,1.4,0.2,Iris-setosa
4.9,3.0,1.4,0.2,Iris-setosa
4.7,3.2,1.3,0.2,Iris-setosa
5.0,3.6,1.4,0.2,Iris-setosa
5.4,3.9,1.7,0.4,Iris-setosa
7.0,3.2,4.7,1.4,Iris-versicolor
6.4,3.2,4.5,1.5,Iris-versicolor
6.9,3.1,4.9,1.5,Iris-versicolor
5.5,2.3,4.0,1.3,Iris-versicolor
6.5,2.8,4.6,1.5,Iris-versicolor
6.3,3.3,6.0,2.5,Iris-virginica
5.8,2.7,5.1,1.9,Iris-virginica
7.1,3.0,5.9,2.1,Iris-virginica
6.3,2.9,5.6,1.8,Iris-virginica
6.5,3.0,5.8,2.2,Iris-virginica
";

/// Writes a 150 row dataset, the same size as the reference one.
fn write_dataset(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("iris.data");
    fs::write(&path, IRIS_ROWS.repeat(10)).unwrap();
    path
}

#[test]
fn training_twice_gives_the_same_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = write_dataset(dir.path());
    let trainer = Trainer::new(TrainingConfig::default());

    let first = trainer
        .run(&dataset, &SavedModelStore, &dir.path().join("a"))
        .unwrap();
    let second = trainer
        .run(&dataset, &SavedModelStore, &dir.path().join("b"))
        .unwrap();

    assert_eq!(first.len(), 4);
    assert!(first.iter().all(|r| r.total == 150));
    assert_eq!(first, second);
}

#[test]
fn exported_model_classifies_deterministically() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = write_dataset(dir.path());
    let model_path = dir.path().join("iris");

    Trainer::default()
        .run(&dataset, &SavedModelStore, &model_path)
        .unwrap();

    let classifier = Classifier::new();
    classifier.load(&SavedModelStore, &model_path).unwrap();

    let first = classifier.classify(5.1, 3.5, 1.4, 0.2).unwrap();
    for _ in 0..10 {
        assert_eq!(classifier.classify(5.1, 3.5, 1.4, 0.2).unwrap(), first);
    }

    let name = classifier.classify_name(5.1, 3.5, 1.4, 0.2).unwrap();
    assert_eq!(Species::from_name(name), Some(first));
}

#[test]
fn loaded_model_matches_the_trained_session() {
    let dir = tempfile::tempdir().unwrap();
    let samples = DatasetLoader::new()
        .read(IRIS_ROWS.as_bytes())
        .unwrap();
    let model_path = dir.path().join("iris");

    let trainer = Trainer::default();
    let trained = trainer.train(&samples).unwrap();
    trainer.save(&trained, &SavedModelStore, &model_path).unwrap();

    let classifier = Classifier::new();
    classifier.load(&SavedModelStore, &model_path).unwrap();

    for sample in &samples {
        let features = sample.features();
        let feed = Feed::from([(network::INPUT.to_string(), Tensor::from(arr2(&[features])))]);
        let output = trained.session().run(&feed, network::OUTPUT).unwrap();
        let output = output.to_matrix("output", 3).unwrap();

        let [a, b, c, d] = features;
        assert_eq!(
            classifier.classify(a, b, c, d).unwrap(),
            Species::decide(output.row(0)).unwrap()
        );
    }
}

#[test]
fn unknown_species_abort_training() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("iris.data");
    let mut rows = IRIS_ROWS.to_string();
    rows.push_str("6.0,3.0,4.8,1.8,Iris-unknown\n");
    fs::write(&dataset, rows).unwrap();
    let model_path = dir.path().join("iris");

    let result = Trainer::default().run(&dataset, &SavedModelStore, &model_path);

    assert!(matches!(result, Err(ProtoErr::DataFormat { line: 16, .. })));
    assert!(!model_path.exists());
}

#[test]
fn classifier_can_be_shared_between_threads() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = write_dataset(dir.path());
    let model_path = dir.path().join("iris");
    Trainer::default()
        .run(&dataset, &SavedModelStore, &model_path)
        .unwrap();

    let classifier = Classifier::new();
    classifier.load(&SavedModelStore, &model_path).unwrap();
    let expected = classifier.classify(6.3, 3.3, 6.0, 2.5).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| classifier.classify(6.3, 3.3, 6.0, 2.5).unwrap()))
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
