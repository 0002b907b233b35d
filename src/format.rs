/// `"name (X.XX MB)"` with the resident size given in kB.
pub fn format_process_memory(name: &str, rss_kb: u64) -> String {
    format!("{name} ({:.2} MB)", rss_kb as f64 / 1024.0)
}

pub fn format_percent(value: f32) -> String {
    format!("{value:.1}%")
}

pub fn format_rate(mb_per_sec: f32) -> String {
    if mb_per_sec >= 1.0 {
        format!("{mb_per_sec:.2} MB/s")
    } else {
        format!("{:.1} kB/s", mb_per_sec * 1000.0)
    }
}

/// Megabytes with a GB switch past 1000, matching the decimal network units.
pub fn format_megabytes(mb: f32) -> String {
    if mb >= 1000.0 {
        format!("{:.2} GB", mb / 1000.0)
    } else {
        format!("{mb:.1} MB")
    }
}

pub fn format_bandwidth(mbps: f32) -> String {
    if mbps <= 0.0 {
        "unknown".to_string()
    } else {
        format!("{mbps:.0} Mbps")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_memory_uses_two_decimals() {
        assert_eq!(format_process_memory("firefox", 1_048_576), "firefox (1024.00 MB)");
        assert_eq!(format_process_memory("sh", 512), "sh (0.50 MB)");
    }

    #[test]
    fn rates_switch_units() {
        assert_eq!(format_rate(2.5), "2.50 MB/s");
        assert_eq!(format_rate(0.25), "250.0 kB/s");
        assert_eq!(format_rate(0.0), "0.0 kB/s");
    }

    #[test]
    fn megabytes_switch_to_gigabytes() {
        assert_eq!(format_megabytes(12.34), "12.3 MB");
        assert_eq!(format_megabytes(2500.0), "2.50 GB");
    }

    #[test]
    fn unknown_bandwidth_is_labelled() {
        assert_eq!(format_bandwidth(0.0), "unknown");
        assert_eq!(format_bandwidth(1000.0), "1000 Mbps");
        assert_eq!(format_percent(42.26), "42.3%");
    }
}
