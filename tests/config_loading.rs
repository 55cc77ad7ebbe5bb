//! Compiling models from JSON configuration files.

use rustylayers::config::{ConfigError, Layout, ModelConfig};
use rustylayers::model::{Model, ModelError};
use std::path::PathBuf;

fn demo_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join("lenet.json")
}

#[test]
fn lenet_demo_compiles() {
    let model = Model::from_config_file(demo_config()).unwrap();
    assert_eq!(model.name(), "lenet");
    assert_eq!(
        model.graph().layer_names(),
        vec![
            "input",
            "conv_1",
            "maxpool2d_2",
            "conv_2",
            "maxpool2d_4",
            "flatten_5",
            "dense_1",
            "dropout_7",
            "logits"
        ]
    );
    assert_eq!(model.layer("flatten_5").unwrap().output_shape.as_ref().unwrap().dims, vec![3136]);

    let summary = model.summary();
    assert_eq!(summary.total_params(), 832 + 51_264 + 1_606_144 + 5_130);
    assert_eq!(summary.frozen_params, 0);
}

#[test]
fn exported_config_recompiles_identically() {
    let model = Model::from_config_file(demo_config()).unwrap();
    let exported = ModelConfig::from_graph(model.name(), model.graph());
    assert_eq!(exported.layout, Layout::Functional);

    let path = std::env::temp_dir().join(format!("rustylayers_config_{}.json", std::process::id()));
    exported.to_file(&path).unwrap();
    let again = Model::from_config_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(again.graph().layer_names(), model.graph().layer_names());
    assert_eq!(again.summary().total_params(), model.summary().total_params());
}

#[test]
fn missing_file_is_reported() {
    let err = Model::from_config_file("/nonexistent/model.json").unwrap_err();
    assert!(matches!(err, ModelError::Config(ConfigError::FileNotFound(_))));
}

#[test]
fn invalid_layer_config_fails_at_compile() {
    let json = r#"{"layout": "sequential", "layers": [
        {"class_name": "Input", "dims": [4, 4, 1]},
        {"class_name": "Conv2D", "filters": 2, "kernel_size": [5, 5]}
    ]}"#;
    let config = ModelConfig::from_json_str(json).unwrap();
    let err = Model::from_config(&config).unwrap_err();
    assert!(matches!(err, ModelError::Shape(_)), "{}", err);
}

#[test]
fn unknown_class_name_is_a_json_error() {
    let json = r#"{"layers": [{"class_name": "Lstm", "units": 3}]}"#;
    assert!(matches!(
        ModelConfig::from_json_str(json),
        Err(ConfigError::JsonError(_))
    ));
}
