const UNITS: [&str; 5] = ["bytes", "KiB", "MiB", "GiB", "TiB"];

pub fn pretty_bytes_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::pretty_bytes_size;

    #[test]
    fn small_sizes_stay_in_bytes() {
        assert_eq!(pretty_bytes_size(0), "0 bytes");
        assert_eq!(pretty_bytes_size(1023), "1023 bytes");
    }

    #[test]
    fn larger_sizes_scale_up() {
        assert_eq!(pretty_bytes_size(1024), "1.00 KiB");
        assert_eq!(pretty_bytes_size(1536), "1.50 KiB");
        assert_eq!(pretty_bytes_size(3 * 1024 * 1024), "3.00 MiB");
        assert_eq!(pretty_bytes_size(5 * 1024 * 1024 * 1024), "5.00 GiB");
    }
}
