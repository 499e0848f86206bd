//! Plain-text rendering of aggregation results.
//!
//! Everything here is a pure function from engine outputs to `String`; the
//! caller decides where the text goes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::models::{ExtremalEvent, SeriesStats, SummaryRecord};

/// Month names indexed by `month - 1`.
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use meter_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by half an ULP at the target precision so exact decimal midpoints
    // such as 1.005 round away from zero.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();

    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        // `frac_str` starts with "0.", e.g. "0.50".
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero to avoid division by zero.
///
/// # Examples
///
/// ```
/// use meter_core::formatting::percentage;
///
/// assert!((percentage(50.0, 200.0, 1) - 25.0).abs() < 1e-9);
/// assert_eq!(percentage(0.0, 0.0, 2), 0.0);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let raw = (part / whole) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    (raw * factor).round() / factor
}

/// English name of a 1-based month number, `"?"` when out of range.
pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i as usize))
        .copied()
        .unwrap_or("?")
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Render the campus energy report.
///
/// `total` is the consumption over every entity, `top` the highest consumer
/// and `peak` the single largest reading. `summaries` are listed in the
/// order given.
pub fn render_energy_report(
    total: f64,
    top: &SummaryRecord,
    peak: &ExtremalEvent,
    summaries: &[SummaryRecord],
    unit: &str,
) -> String {
    let mut out = String::new();
    out.push_str("CAMPUS ENERGY CONSUMPTION REPORT\n");
    out.push_str("================================\n\n");
    let _ = writeln!(out, "Total Campus Consumption: {} {}", format_number(total, 2), unit);
    let _ = writeln!(
        out,
        "Highest Consuming Building: {} ({} {}, {}% of total)",
        top.entity_name,
        format_number(top.total, 2),
        unit,
        percentage(top.total, total, 1)
    );
    let _ = writeln!(
        out,
        "Peak Load Event: {} {} at {} in {}\n",
        format_number(peak.value, 2),
        unit,
        peak.timestamp.format("%Y-%m-%d %H:%M:%S"),
        peak.entity_name
    );
    out.push_str("Building Summaries:\n");
    out.push_str(&render_summary_table(summaries));
    out
}

/// Render the summary records as a fixed-width table.
pub fn render_summary_table(summaries: &[SummaryRecord]) -> String {
    let name_width = summaries
        .iter()
        .map(|s| s.entity_name.len())
        .chain(std::iter::once("Entity".len()))
        .max()
        .unwrap_or(6);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<nw$}  {:>14}  {:>14}  {:>12}  {:>12}",
        "Entity",
        "Total",
        "Mean Daily",
        "Max",
        "Min",
        nw = name_width
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<nw$}  {:>14}  {:>14}  {:>12}  {:>12}",
            s.entity_name,
            format_number(s.total, 2),
            format_number(s.mean_of_daily_totals, 2),
            format_number(s.max, 2),
            format_number(s.min, 2),
            nw = name_width
        );
    }
    out
}

/// Render the weather analysis report.
///
/// `stats` holds one entry per metric; `monthly` holds, per metric, a
/// month → value mapping. Months absent from every metric are left out.
pub fn render_weather_report(
    stats: &[(String, SeriesStats)],
    monthly: &[(String, BTreeMap<u32, f64>)],
) -> String {
    let mut out = String::new();
    out.push_str("WEATHER DATA ANALYSIS REPORT\n");
    out.push_str("============================\n\n");

    out.push_str("1. OVERALL STATISTICS\n");
    out.push_str("---------------------\n");
    for (metric, s) in stats {
        let _ = writeln!(
            out,
            "{}: mean {}, max {}, min {}, std dev {}, total {} ({} readings)",
            metric,
            format_number(s.mean, 2),
            format_number(s.max, 2),
            format_number(s.min, 2),
            format_number(s.std_dev, 2),
            format_number(s.total, 2),
            s.count
        );
    }

    out.push_str("\n2. MONTHLY AGGREGATION\n");
    out.push_str("----------------------\n");
    let _ = write!(out, "{:<10}", "Month");
    for (metric, _) in monthly {
        let _ = write!(out, "  {:>16}", metric);
    }
    out.push('\n');

    let months: std::collections::BTreeSet<u32> = monthly
        .iter()
        .flat_map(|(_, by_month)| by_month.keys().copied())
        .collect();
    for month in months {
        let _ = write!(out, "{:<10}", month_name(month));
        for (_, by_month) in monthly {
            match by_month.get(&month) {
                Some(v) => {
                    let _ = write!(out, "  {:>16}", format_number(*v, 2));
                }
                None => {
                    let _ = write!(out, "  {:>16}", "-");
                }
            }
        }
        out.push('\n');
    }
    out
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(name: &str, total: f64, max: f64, min: f64) -> SummaryRecord {
        SummaryRecord {
            entity_name: name.to_string(),
            total,
            mean_of_daily_totals: total,
            max,
            min,
        }
    }

    // ── format_number ────────────────────────────────────────────────────────

    #[test]
    fn test_format_number_zero() {
        assert_eq!(format_number(0.0, 0), "0");
        assert_eq!(format_number(0.0, 2), "0.00");
    }

    #[test]
    fn test_format_number_with_thousands() {
        assert_eq!(format_number(1_234.5, 1), "1,234.5");
        assert_eq!(format_number(1_000.0, 0), "1,000");
    }

    #[test]
    fn test_format_number_negative() {
        assert_eq!(format_number(-9_876.5, 1), "-9,876.5");
    }

    #[test]
    fn test_format_number_rounds_up() {
        assert_eq!(format_number(1.005, 2), "1.01");
    }

    // ── percentage ───────────────────────────────────────────────────────────

    #[test]
    fn test_percentage_zero_whole() {
        assert_eq!(percentage(10.0, 0.0, 2), 0.0);
    }

    #[test]
    fn test_percentage_rounding() {
        let p = percentage(1.0, 3.0, 2);
        assert!((p - 33.33).abs() < 1e-2, "percentage = {p}");
    }

    // ── month_name ───────────────────────────────────────────────────────────

    #[test]
    fn test_month_name_bounds() {
        assert_eq!(month_name(1), "January");
        assert_eq!(month_name(12), "December");
        assert_eq!(month_name(0), "?");
        assert_eq!(month_name(13), "?");
    }

    // ── reports ──────────────────────────────────────────────────────────────

    #[test]
    fn test_energy_report_contents() {
        let summaries = vec![record("A", 30.0, 20.0, 10.0), record("B", 50.0, 50.0, 50.0)];
        let peak = ExtremalEvent {
            timestamp: NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap(),
            entity_name: "B".to_string(),
            value: 50.0,
        };

        let text = render_energy_report(80.0, &summaries[1], &peak, &summaries, "kWh");

        assert!(text.starts_with("CAMPUS ENERGY CONSUMPTION REPORT"));
        assert!(text.contains("Total Campus Consumption: 80.00 kWh"));
        assert!(text.contains("Highest Consuming Building: B (50.00 kWh, 62.5% of total)"));
        assert!(text.contains("Peak Load Event: 50.00 kWh at 2023-01-01 06:00:00 in B"));
        assert!(text.contains("Building Summaries:"));
    }

    #[test]
    fn test_summary_table_one_line_per_entity() {
        let summaries = vec![
            record("Science_Block", 1_234.5, 20.0, 1.0),
            record("Library", 10.0, 5.0, 1.0),
        ];
        let table = render_summary_table(&summaries);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Entity"));
        assert!(lines[1].starts_with("Science_Block"));
        assert!(lines[1].contains("1,234.50"));
        assert!(lines[2].starts_with("Library"));
    }

    #[test]
    fn test_weather_report_month_rows() {
        let stats = vec![(
            "Temperature".to_string(),
            SeriesStats {
                count: 3,
                total: 75.0,
                mean: 25.0,
                max: 30.0,
                min: 20.0,
                std_dev: 4.08,
            },
        )];
        let monthly = vec![
            ("Temperature".to_string(), BTreeMap::from([(1, 22.5), (2, 30.0)])),
            ("Rainfall".to_string(), BTreeMap::from([(1, 4.0)])),
        ];

        let text = render_weather_report(&stats, &monthly);

        assert!(text.contains("Temperature: mean 25.00, max 30.00, min 20.00"));
        assert!(text.contains("(3 readings)"));
        let feb = text.lines().find(|l| l.starts_with("February")).unwrap();
        assert!(feb.contains("30.00"));
        assert!(feb.trim_end().ends_with('-'));
        assert!(!text.contains("March"));
    }
}
