/// Render a millisecond span using its two most significant non-zero units,
/// e.g. `3m 12s`; an hour and five seconds reads `1h 5s`.
pub fn format_time_diff(millis: i64) -> String {
    let total = millis.max(0) / 1000;
    let units = [
        (total / 86_400, "d"),
        (total % 86_400 / 3_600, "h"),
        (total % 3_600 / 60, "m"),
        (total % 60, "s"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(value, _)| *value > 0)
        .take(2)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}
