use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use chrono_tz::Tz;

/// Timezone used to decide which calendar day a submission belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SurveyTimezone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Default for SurveyTimezone {
    fn default() -> Self {
        SurveyTimezone::Fixed(Utc.fix())
    }
}

impl SurveyTimezone {
    /// Accepts IANA names (`Africa/Cairo`), `UTC`/`GMT`, and offsets such as `UTC+02:00` or `+0300`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let upper = trimmed.to_uppercase();
        if upper == "UTC" || upper == "GMT" || upper == "Z" {
            return Some(Self::default());
        }

        let offset = upper
            .strip_prefix("UTC")
            .or_else(|| upper.strip_prefix("GMT"))
            .unwrap_or(&upper);
        if offset.starts_with('+') || offset.starts_with('-') {
            return parse_fixed_offset(offset).map(SurveyTimezone::Fixed);
        }

        trimmed.parse::<Tz>().ok().map(SurveyTimezone::Named)
    }

    /// Calendar date of `at` in this timezone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            SurveyTimezone::Named(tz) => at.with_timezone(tz).date_naive(),
            SurveyTimezone::Fixed(offset) => at.with_timezone(offset).date_naive(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }
}

fn parse_fixed_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.chars().next()? {
        '+' => (1, &raw[1..]),
        '-' => (-1, &raw[1..]),
        _ => return None,
    };

    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if rest.len() > 2 {
        let (h, m) = rest.split_at(rest.len() - 2);
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else {
        (rest.parse::<i32>().ok()?, 0)
    };

    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_variants() {
        assert_eq!(SurveyTimezone::parse("utc"), Some(SurveyTimezone::default()));
        assert_eq!(
            SurveyTimezone::parse("UTC+02:00"),
            Some(SurveyTimezone::Fixed(FixedOffset::east_opt(7200).unwrap()))
        );
        assert_eq!(
            SurveyTimezone::parse("-0330"),
            Some(SurveyTimezone::Fixed(FixedOffset::east_opt(-(3 * 3600 + 1800)).unwrap()))
        );
        assert!(matches!(
            SurveyTimezone::parse("Africa/Cairo"),
            Some(SurveyTimezone::Named(_))
        ));
        assert_eq!(SurveyTimezone::parse("Mars/Olympus"), None);
        assert_eq!(SurveyTimezone::parse("+15"), None);
        assert_eq!(SurveyTimezone::parse(""), None);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap();
        let utc = SurveyTimezone::default();
        let plus_three = SurveyTimezone::parse("+03:00").unwrap();
        assert_eq!(utc.local_date(at), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(
            plus_three.local_date(at),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }
}
