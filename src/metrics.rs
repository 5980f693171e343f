//! Training metric extraction from free-form text
//!
//! Pure parsing, no side effects. Recognizes the numeric signals users
//! drop into chat (distance, duration, pace, repetitions) so the
//! prompt can cite them and the reward policy can treat the message as
//! a training report.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;

static DISTANCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+(?:\.[0-9]+)?)(?:km|キロ|㌔)").expect("valid regex"));
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)(?:分|min)").expect("valid regex"));
static HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+(?:\.[0-9]+)?)(?:時間|h)").expect("valid regex"));
static PACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)[':：]([0-9]{1,2})/?km").expect("valid regex"));
static REPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)(?:回|reps?)").expect("valid regex"));

/// Numeric training signals extracted from a message.
///
/// Absent fields mean "no signal", never zero. Serialized field names
/// match the metric-hint line format the prompt embeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Distance in kilometers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,

    /// Total duration in minutes (hours and minutes patterns summed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u32>,

    /// Pace as fractional minutes per kilometer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace_min_per_km: Option<f64>,

    /// Repetition count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
}

impl Metrics {
    /// Whether any signal was extracted
    #[must_use]
    pub const fn any(&self) -> bool {
        self.distance_km.is_some()
            || self.minutes.is_some()
            || self.pace_min_per_km.is_some()
            || self.reps.is_some()
    }

    /// System-prompt hint line describing the extracted values
    #[must_use]
    pub fn hint_line(&self) -> String {
        if self.any() {
            let json = serde_json::to_string(self).unwrap_or_default();
            format!("抽出した数値: {json}")
        } else {
            "抽出できる数値は無し。".to_string()
        }
    }
}

/// Extract training metrics from raw message text.
///
/// Full-width comma/period are normalized and whitespace is stripped
/// before matching, so `"３０ 分"`-style spacing still parses.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_metrics(text: &str) -> Metrics {
    let normalized: String = text
        .replace('，', ",")
        .replace('．', ".")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let mut metrics = Metrics::default();

    if let Some(cap) = DISTANCE.captures(&normalized) {
        metrics.distance_km = cap[1].parse().ok();
    }
    if let Some(cap) = HOURS.captures(&normalized) {
        metrics.minutes = cap[1]
            .parse::<f64>()
            .ok()
            .map(|h| (h * 60.0).round() as u32);
    }
    if let Some(cap) = MINUTES.captures(&normalized) {
        let mins: u32 = cap[1].parse().unwrap_or(0);
        metrics.minutes = Some(metrics.minutes.unwrap_or(0) + mins);
    }
    if let Some(cap) = PACE.captures(&normalized) {
        let (min, sec) = (cap[1].parse::<u32>().ok(), cap[2].parse::<u32>().ok());
        if let (Some(min), Some(sec)) = (min, sec) {
            metrics.pace_min_per_km = Some(f64::from(min) + f64::from(sec) / 60.0);
        }
    }
    if let Some(cap) = REPS.captures(&normalized) {
        metrics.reps = cap[1].parse().ok();
    }

    metrics
}

/// Race day: Itabashi City Marathon, 2026-03-15 JST
fn race_day() -> DateTime<FixedOffset> {
    let jst = FixedOffset::east_opt(9 * 3600).expect("valid offset");
    jst.with_ymd_and_hms(2026, 3, 15, 0, 0, 0)
        .single()
        .expect("valid race date")
}

/// Days remaining until race day, rounded up, floored at zero
#[must_use]
pub fn days_until_race(now: DateTime<Utc>) -> i64 {
    let remaining = race_day().signed_duration_since(now);
    let ms = remaining.num_milliseconds();
    const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
    (ms.div_euclid(MS_PER_DAY) + i64::from(ms.rem_euclid(MS_PER_DAY) > 0)).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_and_minutes() {
        let m = parse_metrics("3.5km 25分で走った");
        assert_eq!(m.distance_km, Some(3.5));
        assert_eq!(m.minutes, Some(25));
        assert_eq!(m.pace_min_per_km, None);
        assert_eq!(m.reps, None);
    }

    #[test]
    fn katakana_distance_units() {
        assert_eq!(parse_metrics("5キロ走った").distance_km, Some(5.0));
        assert_eq!(parse_metrics("10㌔いった").distance_km, Some(10.0));
    }

    #[test]
    fn hours_and_minutes_sum() {
        let m = parse_metrics("1時間20分のジョグ");
        assert_eq!(m.minutes, Some(80));

        let m = parse_metrics("1.5時間走");
        assert_eq!(m.minutes, Some(90));
    }

    #[test]
    fn pace_variants() {
        let m = parse_metrics("5'30/km で巡航");
        assert_eq!(m.pace_min_per_km, Some(5.5));

        let m = parse_metrics("キロ6：00kmくらい");
        assert_eq!(m.pace_min_per_km, Some(6.0));
    }

    #[test]
    fn reps() {
        assert_eq!(parse_metrics("スクワット30回").reps, Some(30));
        assert_eq!(parse_metrics("did 12 reps").reps, Some(12));
    }

    #[test]
    fn fullwidth_punctuation_normalized() {
        let m = parse_metrics("３．５は無理でも 2．5km walked");
        assert_eq!(m.distance_km, Some(2.5));
    }

    #[test]
    fn no_signal_means_absent() {
        let m = parse_metrics("今日は疲れたから休む");
        assert!(!m.any());
        assert_eq!(m.hint_line(), "抽出できる数値は無し。");
    }

    #[test]
    fn hint_line_embeds_json() {
        let m = parse_metrics("今日は5km、30分走った");
        assert!(m.any());
        let line = m.hint_line();
        assert!(line.starts_with("抽出した数値: "));
        assert!(line.contains("\"distanceKm\":5.0"));
        assert!(line.contains("\"minutes\":30"));
    }

    #[test]
    fn countdown_floors_at_zero() {
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(days_until_race(before), 14);

        let after = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(days_until_race(after), 0);
    }
}
