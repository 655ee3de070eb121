/// Fixed-width numeric formatting shared by every displayed value and
/// axis label: 6 significant digits, falling back to exponential
/// notation when the fixed form exceeds 7 characters.
pub fn format_fixed_len(n: f64) -> String {
    if !n.is_finite() {
        return n.to_string();
    }

    let exp = if n == 0.0 {
        0
    } else {
        n.abs().log10().floor() as i32
    };
    let decimals = (6 - 1 - exp).max(0) as usize;
    let fixed = format!("{:.*}", decimals, n);

    if fixed.len() <= 7 {
        fixed
    } else {
        format!("{:.2e}", n)
    }
}

/// Human-readable duration from nanoseconds, scaling through
/// ns/us/ms/s/m the way the metrics server reports windows.
pub fn format_duration(nanos: f64) -> String {
    if nanos == 0.0 {
        return "0".to_string();
    }

    let mut t = nanos;
    for unit in ["ns", "us", "ms"] {
        if t < 1000.0 {
            return format!("{t}{unit}");
        }
        t /= 1000.0;
    }

    if t < 60.0 {
        format!("{t}s")
    } else {
        format!("{}m", t / 60.0)
    }
}
