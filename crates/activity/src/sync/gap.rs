//! Gap computation between a requested window and the covered days

use chrono::{Days, NaiveDate};

use crate::models::FetchWindow;

/// Days of `window` that are not in `synced`, ascending
///
/// `synced` may be in any order and contain days outside the window.
pub fn missing_days(window: &FetchWindow, synced: &[NaiveDate]) -> Vec<NaiveDate> {
    window.days().filter(|day| !synced.contains(day)).collect()
}

/// Group ascending days into maximal contiguous windows
pub fn contiguous_runs(days: &[NaiveDate]) -> Vec<FetchWindow> {
    let mut runs: Vec<FetchWindow> = Vec::new();

    for &day in days {
        match runs.last_mut() {
            Some(run) if run.end.checked_add_days(Days::new(1)) == Some(day) => run.end = day,
            _ => runs.push(FetchWindow::single(day)),
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_missing_days_alternating() {
        let window = FetchWindow::new(d("2025-01-01"), d("2025-01-05")).unwrap();
        let synced = [d("2025-01-05"), d("2025-01-01"), d("2025-01-03")];
        assert_eq!(
            missing_days(&window, &synced),
            vec![d("2025-01-02"), d("2025-01-04")]
        );
    }

    #[test]
    fn test_missing_days_ignores_days_outside_window() {
        let window = FetchWindow::new(d("2025-01-03"), d("2025-01-04")).unwrap();
        let synced = [d("2025-01-01"), d("2025-01-09")];
        assert_eq!(missing_days(&window, &synced).len(), 2);
        assert!(missing_days(&window, &[d("2025-01-03"), d("2025-01-04")]).is_empty());
    }

    #[test]
    fn test_contiguous_runs() {
        let days = [
            d("2025-01-02"),
            d("2025-01-04"),
            d("2025-01-05"),
            d("2025-01-06"),
            d("2025-01-09"),
        ];
        let runs = contiguous_runs(&days);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], FetchWindow::single(d("2025-01-02")));
        assert_eq!(
            runs[1],
            FetchWindow::new(d("2025-01-04"), d("2025-01-06")).unwrap()
        );
        assert_eq!(runs[2], FetchWindow::single(d("2025-01-09")));
        assert!(contiguous_runs(&[]).is_empty());
    }
}
