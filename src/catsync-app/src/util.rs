// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::{SystemTime, UNIX_EPOCH};

/// Normalize a name to lowercase alphanumeric.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Wall-clock time in nanoseconds since the Unix epoch; 0 if the clock is
/// set before 1970.
pub fn unix_time_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Dummy"), "dummy");
        assert_eq!(normalize_name("IC-7300"), "ic7300");
        assert_eq!(normalize_name("net_rigctl"), "netrigctl");
    }

    #[test]
    fn test_unix_time_moves_forward() {
        let a = unix_time_ns();
        let b = unix_time_ns();
        assert!(a > 0);
        assert!(b >= a);
    }
}
