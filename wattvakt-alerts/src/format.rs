//! Unit-aware rendering of metric values for notification text.

use std::time::Duration;

use wattvakt_core::model::Unit;

/// Renders `value` the way an operator expects to read it.
pub fn format_value(value: f64, unit: Unit) -> String {
    match unit {
        Unit::Percent => format!("{value:.0}%"),
        Unit::Watts => format_power(value),
        Unit::Volts => format!("{value:.1} V"),
        Unit::Amps => format!("{value:.1} A"),
        Unit::Fahrenheit => format!("{value:.0}°F"),
        Unit::Celsius => format!("{value:.1}°C"),
        Unit::None => format_plain(value),
    }
}

/// Watts below one kilowatt, kilowatts above.
pub fn format_power(watts: f64) -> String {
    if watts.abs() >= 1000.0 {
        format!("{:.2} kW", watts / 1000.0)
    } else {
        format!("{watts:.0} W")
    }
}

fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// Coarse human duration: `45m`, `2h 5m`, `3d 4h`.
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    match (days, hours) {
        (0, 0) => format!("{mins}m"),
        (0, _) if mins == 0 => format!("{hours}h"),
        (0, _) => format!("{hours}h {mins}m"),
        _ => format!("{days}d {hours}h"),
    }
}
