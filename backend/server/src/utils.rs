const KELVIN_OFFSET: f64 = 273.15;

/// Rounds half-way values up, so `-2.5` becomes `-2` and `2.5` becomes `3`.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn celsius_from_kelvin(kelvin: f64) -> i64 {
    round_half_up(kelvin - KELVIN_OFFSET) as i64
}

/// Kelvin with two decimals, matching the precision the upstream reports.
pub fn kelvin_from_celsius(celsius: i64) -> f64 {
    round_half_up((celsius as f64 + KELVIN_OFFSET) * 100.0) / 100.0
}

pub fn parse_number(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
}
