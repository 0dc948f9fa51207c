mod common;

use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_core::{ConfigError, SimConfig, SimError};
use biosphere_data::{CompositeSpec, Path, ProcessDecl, Schema};
use common::{adder, SimBuilder};

fn config_error(builder: SimBuilder) -> ConfigError {
    match builder.try_build() {
        Ok(_) => panic!("build should have failed"),
        Err(SimError::Config(err)) => err,
        Err(other) => panic!("unexpected error: {other}"),
    }
}

/// Doubles a value that must be supplied by the composite.
struct Needy;

impl Process for Needy {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "input".to_string(),
            PortSchema::new()
                .with("value", Schema::float(0.0).required().read_only())
                .with("doubled", Schema::float(0.0).replace()),
        );
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let value = view.float("input", "value")?;
        Ok(Step::full(
            ProcessUpdate::new().with("input", "doubled", 2.0 * value),
            timestep,
        ))
    }
}

fn with_needy(builder: SimBuilder) -> SimBuilder {
    builder
        .with_registry(|registry| {
            registry
                .register_process("needy", |_| Ok(Box::new(Needy) as Box<dyn Process>))
                .unwrap();
        })
        .with_process("needy", ProcessDecl::new("needy"))
}

#[test]
fn test_unknown_process_type() {
    let err = config_error(SimBuilder::new().with_process("x", ProcessDecl::new("photosynthesis")));
    assert!(matches!(err, ConfigError::UnknownProcessType(kind) if kind == "photosynthesis"));
}

#[test]
fn test_bad_parameters_fail_construction() {
    let decl = ProcessDecl::new("adder").with_params(serde_json::json!({ "timestep": 1.0 }));
    let err = config_error(SimBuilder::new().with_process("x", decl));
    assert!(matches!(err, ConfigError::Construction { kind, .. } if kind == "adder"));
}

#[test]
fn test_text_override_rejects_float_writer() {
    let spec = CompositeSpec::new()
        .with_schema("target/value", Schema::text("label"))
        .with_process("add", adder(1.0, 1.0));
    let err = config_error(SimBuilder::new().with_spec(spec));
    match err {
        ConfigError::IncompatibleBinding { process, port, path, .. } => {
            assert_eq!(process, Path::parse("add"));
            assert_eq!(port, "target");
            assert_eq!(path, Path::parse("target/value"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_topology_naming_an_unknown_port() {
    let decl = adder(1.0, 1.0).with_port("nowhere", "x");
    let err = config_error(SimBuilder::new().with_process("add", decl));
    assert!(matches!(err, ConfigError::UnknownPort { port, .. } if port == "nowhere"));
}

#[test]
fn test_zero_timestep_is_rejected() {
    let err = config_error(SimBuilder::new().with_process("add", adder(1.0, 0.0)));
    assert!(matches!(err, ConfigError::InvalidTimestep { timestep, .. } if timestep == 0.0));
}

#[test]
fn test_declared_timestep_overrides_the_process() {
    let mut engine = SimBuilder::new()
        .with_process("add", adder(1.0, 1.0).with_timestep(0.25))
        .build();
    let summary = engine.run(1.0).unwrap();
    assert_eq!(summary.rounds, 4);
    assert_value_near!(engine, "target/value", 4.0);
}

#[test]
fn test_unregistered_updater() {
    let mut decl = adder(1.0, 1.0);
    decl.params["updater"] = serde_json::json!("median");
    let err = config_error(SimBuilder::new().with_process("add", decl));
    assert!(matches!(err, ConfigError::UnknownUpdater(name) if name == "median"));
}

#[test]
fn test_required_value_must_be_provided() {
    let err = config_error(with_needy(SimBuilder::new()));
    assert!(matches!(err, ConfigError::MissingRequired { path } if path == Path::parse("input/value")));

    let mut engine = with_needy(SimBuilder::new())
        .with_spec(
            CompositeSpec::new()
                .with_state("input/value", 21.0)
                .with_process("needy", ProcessDecl::new("needy")),
        )
        .build();
    engine.run(1.0).unwrap();
    assert_value_near!(engine, "input/doubled", 42.0);
}

#[test]
fn test_invalid_settings_are_reported_before_running() {
    let builder = SimBuilder::new()
        .with_process("add", adder(1.0, 1.0))
        .with_config(|config| config.logging.level = "loud".to_string());
    let err = config_error(builder);
    assert!(matches!(err, ConfigError::InvalidSettings(reason) if reason.contains("loud")));
}

#[test]
fn test_settings_file_round_trip() {
    let path = std::env::temp_dir().join(format!("biosphere-config-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
        [engine]
        stop_time = 25.0
        parallel = false
        max_rounds = 50

        [logging]
        level = "warn"
        "#,
    )
    .unwrap();
    let config = SimConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.engine.stop_time, 25.0);
    assert!(!config.engine.parallel);
    assert_eq!(config.engine.max_rounds, 50);
    assert_eq!(config.logging.level, "warn");

    let missing = SimConfig::load(std::env::temp_dir().join("biosphere-absent.toml")).unwrap();
    assert_eq!(missing.engine.stop_time, SimConfig::default().engine.stop_time);
    assert!(SimConfig::from_toml("[engine]\ntime_epsilon = 1.0").is_err());
}
