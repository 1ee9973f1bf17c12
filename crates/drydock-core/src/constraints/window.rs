//! Day/hour windows used by `allowed-times` and blackout vetoes

use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use drydock_api::Constraint;
use drydock_plugin::PluginError;
use serde::{Deserialize, Serialize};

/// A window as written in configs: `days = "mon-fri"`, `hours = "9-17,20"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TimeWindow {
    /// Empty means every day
    days: Vec<Weekday>,
    /// Inclusive hour ranges, empty means all day
    hours: Vec<(u32, u32)>,
}

impl TimeWindow {
    fn contains(&self, weekday: Weekday, hour: u32) -> bool {
        let day_ok = self.days.is_empty() || self.days.contains(&weekday);
        let hour_ok = self.hours.is_empty()
            || self.hours.iter().any(|&(start, end)| {
                if start <= end {
                    (start..=end).contains(&hour)
                } else {
                    hour >= start || hour <= end
                }
            });
        day_ok && hour_ok
    }
}

/// A set of windows in one UTC offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindows {
    windows: Vec<TimeWindow>,
    offset: FixedOffset,
}

impl TimeWindows {
    /// Parse window specs
    ///
    /// # Errors
    /// Returns `PluginError::InvalidSpec` on malformed days, hours or offset
    pub fn parse(specs: &[TimeWindowSpec], utc_offset: Option<&str>) -> Result<Self, PluginError> {
        let windows = specs
            .iter()
            .map(|spec| {
                Ok(TimeWindow {
                    days: spec.days.as_deref().map(parse_days).transpose()?.unwrap_or_default(),
                    hours: spec
                        .hours
                        .as_deref()
                        .map(parse_hours)
                        .transpose()?
                        .unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, PluginError>>()?;

        Ok(Self {
            windows,
            offset: parse_offset(utc_offset.unwrap_or("Z"))?,
        })
    }

    /// Read the `windows` and `utcOffset` attributes of a constraint
    ///
    /// # Errors
    /// Returns `PluginError::InvalidSpec` if the attributes are missing or malformed
    pub fn from_constraint(constraint: &Constraint) -> Result<Self, PluginError> {
        let specs: Vec<TimeWindowSpec> = constraint
            .attributes
            .get("windows")
            .cloned()
            .map(serde_json::from_value::<Vec<TimeWindowSpec>>)
            .transpose()
            .map_err(|e| PluginError::InvalidSpec(format!("windows: {e}")))?
            .unwrap_or_default();
        if specs.is_empty() {
            return Err(PluginError::InvalidSpec(format!(
                "{} constraint declares no windows",
                constraint.kind
            )));
        }
        Self::parse(&specs, constraint.attribute_str("utcOffset"))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Whether the instant falls inside any window
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        self.windows
            .iter()
            .any(|w| w.contains(local.weekday(), local.hour()))
    }
}

fn invalid(what: &str, raw: &str) -> PluginError {
    PluginError::InvalidSpec(format!("invalid {what}: {raw}"))
}

fn parse_days(raw: &str) -> Result<Vec<Weekday>, PluginError> {
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |s: &str| Weekday::from_str(s.trim()).map_err(|_| invalid("day", s));
        match part.split_once('-') {
            Some((start, end)) => {
                let (mut day, end) = (parse(start)?, parse(end)?);
                loop {
                    if !days.contains(&day) {
                        days.push(day);
                    }
                    if day == end {
                        break;
                    }
                    day = day.succ();
                }
            }
            None => {
                let day = parse(part)?;
                if !days.contains(&day) {
                    days.push(day);
                }
            }
        }
    }
    Ok(days)
}

fn parse_hours(raw: &str) -> Result<Vec<(u32, u32)>, PluginError> {
    let hour = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| invalid("hour", s))
    };
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| match part.split_once('-') {
            Some((start, end)) => Ok((hour(start)?, hour(end)?)),
            None => hour(part).map(|h| (h, h)),
        })
        .collect()
}

fn parse_offset(raw: &str) -> Result<FixedOffset, PluginError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc")
    {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid("utc offset", raw));
    }
    trimmed.parse().map_err(|_| invalid("utc offset", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn spec(days: &str, hours: &str) -> TimeWindowSpec {
        TimeWindowSpec {
            days: Some(days.to_string()),
            hours: Some(hours.to_string()),
        }
    }

    #[test]
    fn test_business_hours() {
        let windows = TimeWindows::parse(&[spec("mon-fri", "9-17")], None).unwrap();

        // 2024-01-03 is a Wednesday
        let wednesday_noon = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let wednesday_night = Utc.with_ymd_and_hms(2024, 1, 3, 22, 0, 0).unwrap();
        let saturday_noon = Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap();

        assert!(windows.contains(wednesday_noon));
        assert!(!windows.contains(wednesday_night));
        assert!(!windows.contains(saturday_noon));
    }

    #[test]
    fn test_wrapping_ranges_and_offset() {
        let windows = TimeWindows::parse(&[spec("fri-mon", "22-2")], Some("+02:00")).unwrap();

        // Sunday 23:30 UTC is Monday 01:30 at +02:00
        let at = Utc.with_ymd_and_hms(2024, 1, 7, 23, 30, 0).unwrap();
        assert!(windows.contains(at));

        // Wednesday 23:00 local
        let at = Utc.with_ymd_and_hms(2024, 1, 3, 21, 0, 0).unwrap();
        assert!(!windows.contains(at));
    }

    #[test]
    fn test_invalid_specs() {
        assert!(TimeWindows::parse(&[spec("someday", "9-17")], None).is_err());
        assert!(TimeWindows::parse(&[spec("mon", "9-25")], None).is_err());
        assert!(TimeWindows::parse(&[spec("mon", "9")], Some("02:00")).is_err());
    }

    #[test]
    fn test_offset_bounds() {
        assert_eq!(parse_offset("+02:00").unwrap(), FixedOffset::east_opt(7200).unwrap());
        assert_eq!(parse_offset("-0530").unwrap(), FixedOffset::west_opt(19800).unwrap());
        assert_eq!(parse_offset("Z").unwrap(), FixedOffset::east_opt(0).unwrap());

        for raw in ["+999999", "+99999999:00", "+24:00", "+02:xx"] {
            assert!(parse_offset(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_from_constraint() {
        let constraint = Constraint::new("allowed-times")
            .with_attribute("windows", json!([{"days": "sat,sun"}]))
            .with_attribute("utcOffset", json!("-05:00"));
        let windows = TimeWindows::from_constraint(&constraint).unwrap();

        // Saturday 03:00 UTC is Friday 22:00 at -05:00
        let at = Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap();
        assert!(!windows.contains(at));

        assert!(TimeWindows::from_constraint(&Constraint::new("allowed-times")).is_err());
    }
}
