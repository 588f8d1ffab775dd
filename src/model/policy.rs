use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OvertimeRule {
    pub id: u64,
    #[schema(example = "Weekday overtime")]
    pub name: String,
    pub description: Option<String>,
    /// Hours worked in a day after which the rule kicks in.
    #[schema(example = "8")]
    pub threshold_hours: Decimal,
    #[schema(example = "1.5")]
    pub multiplier: Decimal,
    pub active: bool,
    pub approved: bool,
    pub created_by: u64,
    pub updated_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewOvertimeRule {
    pub name: String,
    pub description: Option<String>,
    pub threshold_hours: Decimal,
    pub multiplier: Decimal,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct OvertimeRuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub threshold_hours: Option<Decimal>,
    pub multiplier: Option<Decimal>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LatenessRule {
    pub id: u64,
    #[schema(example = "Standard lateness")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = 15)]
    pub grace_period_minutes: u32,
    #[schema(example = "2.50")]
    pub deduction_per_minute: Decimal,
    pub active: bool,
    pub approved: bool,
    pub created_by: u64,
    pub updated_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewLatenessRule {
    pub name: String,
    pub description: Option<String>,
    pub grace_period_minutes: u32,
    pub deduction_per_minute: Decimal,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct LatenessRuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub grace_period_minutes: Option<u32>,
    pub deduction_per_minute: Option<Decimal>,
    pub active: Option<bool>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HolidayType {
    National,
    Organizational,
    WeeklyRest,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Holiday {
    pub id: u64,
    #[schema(example = "Revolution Day")]
    pub name: String,
    pub holiday_type: HolidayType,
    pub start_date: NaiveDate,
    /// Absent for single-day holidays.
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub created_by: u64,
    pub updated_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewHoliday {
    pub name: String,
    pub holiday_type: HolidayType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct HolidayUpdate {
    pub name: Option<String>,
    pub holiday_type: Option<HolidayType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HolidayCheck {
    pub is_holiday: bool,
    pub holiday: Option<Holiday>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceHolidayCheck {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub is_holiday: bool,
    pub holiday: Option<Holiday>,
    pub penalty_suppressed: bool,
}

fn default_true() -> bool {
    true
}

impl OvertimeRule {
    pub fn apply(&mut self, update: &OvertimeRuleUpdate) {
        if let Some(v) = &update.name {
            self.name = v.clone();
        }
        if update.description.is_some() {
            self.description = update.description.clone();
        }
        if let Some(v) = update.threshold_hours {
            self.threshold_hours = v;
        }
        if let Some(v) = update.multiplier {
            self.multiplier = v;
        }
        if let Some(v) = update.active {
            self.active = v;
        }
    }

    pub fn applies_to(&self, hours_worked: Decimal) -> bool {
        self.active && self.approved && hours_worked > self.threshold_hours
    }
}

impl LatenessRule {
    pub fn apply(&mut self, update: &LatenessRuleUpdate) {
        if let Some(v) = &update.name {
            self.name = v.clone();
        }
        if update.description.is_some() {
            self.description = update.description.clone();
        }
        if let Some(v) = update.grace_period_minutes {
            self.grace_period_minutes = v;
        }
        if let Some(v) = update.deduction_per_minute {
            self.deduction_per_minute = v;
        }
        if let Some(v) = update.active {
            self.active = v;
        }
    }

    pub fn applies_to(&self, minutes_late: u32) -> bool {
        self.active && self.approved && minutes_late > self.grace_period_minutes
    }
}

impl Holiday {
    pub fn apply(&mut self, update: &HolidayUpdate) {
        if let Some(v) = &update.name {
            self.name = v.clone();
        }
        if let Some(v) = update.holiday_type {
            self.holiday_type = v;
        }
        if let Some(v) = update.start_date {
            self.start_date = v;
        }
        if update.end_date.is_some() {
            self.end_date = update.end_date;
        }
        if let Some(v) = update.active {
            self.active = v;
        }
    }

    /// Ranged holidays cover `start..=end`; single-day ones only their start date.
    pub fn covers(&self, date: NaiveDate) -> bool {
        match self.end_date {
            Some(end) => self.start_date <= date && date <= end,
            None => self.start_date == date,
        }
    }
}

/// First active holiday covering `date`, earliest start first.
pub fn find_covering(holidays: &[Holiday], date: NaiveDate) -> Option<&Holiday> {
    holidays
        .iter()
        .filter(|h| h.active && h.covers(date))
        .min_by_key(|h| (h.start_date, h.id))
}

pub fn valid_range(start: NaiveDate, end: Option<NaiveDate>) -> bool {
    end.is_none_or(|end| end >= start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holiday(id: u64, start: NaiveDate, end: Option<NaiveDate>, active: bool) -> Holiday {
        let now = Utc::now();
        Holiday {
            id,
            name: format!("holiday-{id}"),
            holiday_type: HolidayType::National,
            start_date: start,
            end_date: end,
            active,
            created_by: 1,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ranged_holiday_covers_bounds_inclusive() {
        let h = holiday(1, date(2025, 4, 20), Some(date(2025, 4, 22)), true);
        assert!(h.covers(date(2025, 4, 20)));
        assert!(h.covers(date(2025, 4, 21)));
        assert!(h.covers(date(2025, 4, 22)));
        assert!(!h.covers(date(2025, 4, 23)));
        assert!(!h.covers(date(2025, 4, 19)));
    }

    #[test]
    fn single_day_holiday_matches_only_its_date() {
        let h = holiday(1, date(2025, 1, 7), None, true);
        assert!(h.covers(date(2025, 1, 7)));
        assert!(!h.covers(date(2025, 1, 8)));
    }

    #[test]
    fn inactive_holidays_never_match() {
        let holidays = vec![holiday(1, date(2025, 1, 7), None, false)];
        assert!(find_covering(&holidays, date(2025, 1, 7)).is_none());
    }

    #[test]
    fn overlapping_holidays_pick_earliest() {
        let holidays = vec![
            holiday(2, date(2025, 6, 5), Some(date(2025, 6, 9)), true),
            holiday(1, date(2025, 6, 1), Some(date(2025, 6, 6)), true),
        ];
        assert_eq!(find_covering(&holidays, date(2025, 6, 5)).unwrap().id, 1);
        assert_eq!(find_covering(&holidays, date(2025, 6, 8)).unwrap().id, 2);
        assert!(find_covering(&holidays, date(2025, 6, 10)).is_none());
    }

    #[test]
    fn range_validation() {
        assert!(valid_range(date(2025, 1, 1), None));
        assert!(valid_range(date(2025, 1, 1), Some(date(2025, 1, 1))));
        assert!(!valid_range(date(2025, 1, 2), Some(date(2025, 1, 1))));
    }

    #[test]
    fn lateness_rule_respects_grace_period() {
        let now = Utc::now();
        let rule = LatenessRule {
            id: 1,
            name: "std".into(),
            description: None,
            grace_period_minutes: 10,
            deduction_per_minute: Decimal::ONE,
            active: true,
            approved: true,
            created_by: 1,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!rule.applies_to(10));
        assert!(rule.applies_to(11));
    }
}
