/// Asserts that a float leaf is within `1e-9` of the expected value.
#[macro_export]
macro_rules! assert_value_near {
    ($engine:expr, $path:expr, $expected:expr) => {
        let actual = $engine
            .store()
            .value(&biosphere_data::Path::parse($path))
            .and_then(biosphere_data::Value::as_f64)
            .unwrap_or_else(|| panic!("no numeric value at {}", $path));
        assert!(
            (actual - $expected).abs() < 1e-9,
            "value at {} is {} but expected {}",
            $path,
            actual,
            $expected
        );
    };
}

/// Asserts that nothing is stored at the given path.
#[macro_export]
macro_rules! assert_absent {
    ($engine:expr, $path:expr) => {
        assert!(
            !$engine.store().contains(&biosphere_data::Path::parse($path)),
            "{} should have been removed",
            $path
        );
    };
}
