//! Time helpers for forecast cycles and output time axes.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Enumerate the output time axis: start through end inclusive, stepping
/// by `step_seconds`.
pub fn time_steps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_seconds: i64,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut t = start;
    while t <= end {
        out.push(t);
        t += Duration::seconds(step_seconds);
    }
    out
}

/// The most recent cycle hour at or before `at`, given a model's cycle
/// schedule and its publication delay.
pub fn latest_available_cycle(
    cycles: &[u32],
    delay_hours: u32,
    at: DateTime<Utc>,
) -> DateTime<Utc> {
    let shifted = at - Duration::hours(delay_hours as i64);
    let hour = shifted.hour();

    match cycles.iter().filter(|&&c| c <= hour).max() {
        Some(&c) => shifted
            .date_naive()
            .and_hms_opt(c, 0, 0)
            .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
            .unwrap_or(shifted),
        None => {
            // Previous day's last cycle
            let last = *cycles.last().unwrap_or(&0);
            (shifted - Duration::days(1))
                .date_naive()
                .and_hms_opt(last, 0, 0)
                .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
                .unwrap_or(shifted)
        }
    }
}

/// Cycle timestamps to examine within a lookback window, ascending.
pub fn cycles_in_window(
    cycles: &[u32],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut day = start.date_naive();
    let last_day = end.date_naive();
    while day <= last_day {
        for &c in cycles {
            if let Some(ndt) = day.and_hms_opt(c, 0, 0) {
                let t = DateTime::from_naive_utc_and_offset(ndt, Utc);
                if t >= start && t <= end {
                    out.push(t);
                }
            }
        }
        day += Duration::days(1);
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_time_steps_inclusive() {
        let steps = time_steps(ts("2024-01-01 00:00"), ts("2024-01-02 00:00"), 3600);
        assert_eq!(steps.len(), 25);
        assert_eq!(steps[0], ts("2024-01-01 00:00"));
        assert_eq!(steps[24], ts("2024-01-02 00:00"));
    }

    #[test]
    fn test_time_steps_non_aligned_end() {
        let steps = time_steps(ts("2024-01-01 00:00"), ts("2024-01-01 02:30"), 3600);
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_latest_available_cycle() {
        let cycles = [0u32, 6, 12, 18];
        let c = latest_available_cycle(&cycles, 0, ts("2024-01-01 14:30"));
        assert_eq!(c, ts("2024-01-01 12:00"));

        // With a 4h delay only the 06Z cycle is published by 09Z
        let c = latest_available_cycle(&cycles, 4, ts("2024-01-01 09:00"));
        assert_eq!(c, ts("2024-01-01 00:00"));

        // Before the first cycle of the day, roll back to yesterday
        let c = latest_available_cycle(&[6, 18], 0, ts("2024-01-01 03:00"));
        assert_eq!(c, ts("2023-12-31 18:00"));
    }

    #[test]
    fn test_cycles_in_window() {
        let got = cycles_in_window(&[0, 12], ts("2024-01-01 06:00"), ts("2024-01-02 06:00"));
        assert_eq!(
            got,
            vec![ts("2024-01-01 12:00"), ts("2024-01-02 00:00")]
        );
    }
}
