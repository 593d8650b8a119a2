use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use sqlx::{MySql, QueryBuilder};
use utoipa::{IntoParams, ToSchema};

use crate::model::time_entry::OVERTIME_MINUTES;
use crate::utils::time_utils::{day_start, start_of_month, start_of_previous_month, start_of_week};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Yesterday,
    Week,
    Month,
    LastMonth,
}

impl Period {
    /// Local-date range `[start, end)`; `None` end means open-ended.
    pub fn date_range(self, today: NaiveDate) -> (NaiveDate, Option<NaiveDate>) {
        match self {
            Period::Today => (today, Some(today + Duration::days(1))),
            Period::Yesterday => (today - Duration::days(1), Some(today)),
            Period::Week => (start_of_week(today), None),
            Period::Month => (start_of_month(today), None),
            Period::LastMonth => (start_of_previous_month(today), Some(start_of_month(today))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Open,
    Closed,
    Overtime,
    Manual,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct EntryFilter {
    /// today, yesterday, week, month, last_month
    pub period: Option<Period>,
    /// open, closed, overtime (over 8h), manual
    pub status: Option<EntryStatus>,
    pub location_id: Option<u64>,
    pub user_id: Option<u64>,
    /// Matches username, full name or notes
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl EntryFilter {
    pub fn check_in_bounds<Tz: TimeZone>(
        &self,
        tz: &Tz,
        today: NaiveDate,
    ) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        self.period.map(|period| {
            let (start, end) = period.date_range(today);
            (day_start(tz, start), end.map(|end| day_start(tz, end)))
        })
    }

    /// Appends ` WHERE ...` for this filter to a query selecting from
    /// `time_entries e JOIN users u JOIN locations l`.
    pub fn push_where(
        &self,
        qb: &mut QueryBuilder<'_, MySql>,
        bounds: Option<(DateTime<Utc>, Option<DateTime<Utc>>)>,
    ) {
        qb.push(" WHERE 1=1");

        if let Some((start, end)) = bounds {
            qb.push(" AND e.check_in >= ").push_bind(start);
            if let Some(end) = end {
                qb.push(" AND e.check_in < ").push_bind(end);
            }
        }

        match self.status {
            Some(EntryStatus::Open) => {
                qb.push(" AND e.check_out IS NULL");
            }
            Some(EntryStatus::Closed) => {
                qb.push(" AND e.check_out IS NOT NULL");
            }
            Some(EntryStatus::Overtime) => {
                qb.push(" AND e.check_out IS NOT NULL AND TIMESTAMPDIFF(MINUTE, e.check_in, e.check_out) > ")
                    .push_bind(OVERTIME_MINUTES);
            }
            Some(EntryStatus::Manual) => {
                qb.push(" AND e.is_manual = TRUE");
            }
            None => {}
        }

        if let Some(location_id) = self.location_id {
            qb.push(" AND e.location_id = ").push_bind(location_id);
        }

        if let Some(user_id) = self.user_id {
            qb.push(" AND e.user_id = ").push_bind(user_id);
        }

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let like = format!("%{}%", search);
            qb.push(" AND (u.username LIKE ")
                .push_bind(like.clone())
                .push(" OR u.full_name LIKE ")
                .push_bind(like.clone())
                .push(" OR e.notes LIKE ")
                .push_bind(like)
                .push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_ranges() {
        let today = date(2026, 3, 5);
        assert_eq!(
            Period::Today.date_range(today),
            (today, Some(date(2026, 3, 6)))
        );
        assert_eq!(
            Period::Yesterday.date_range(today),
            (date(2026, 3, 4), Some(today))
        );
        assert_eq!(Period::Week.date_range(today), (date(2026, 3, 2), None));
        assert_eq!(Period::Month.date_range(today), (date(2026, 3, 1), None));
        assert_eq!(
            Period::LastMonth.date_range(today),
            (date(2026, 2, 1), Some(date(2026, 3, 1)))
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM time_entries e");
        EntryFilter::default().push_where(&mut qb, None);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM time_entries e WHERE 1=1");
    }

    #[test]
    fn combined_filters_bind_every_value() {
        let filter = EntryFilter {
            period: Some(Period::Today),
            status: Some(EntryStatus::Overtime),
            location_id: Some(1),
            user_id: Some(3),
            search: Some("  ana ".to_string()),
            ..Default::default()
        };
        let bounds = filter.check_in_bounds(&Utc, date(2026, 3, 5));
        let mut qb = QueryBuilder::<MySql>::new("SELECT e.id FROM time_entries e");
        filter.push_where(&mut qb, bounds);

        let sql = qb.sql();
        assert!(sql.contains("e.check_in >= ? AND e.check_in < ?"));
        assert!(sql.contains("TIMESTAMPDIFF(MINUTE, e.check_in, e.check_out) > ?"));
        assert!(sql.contains("e.location_id = ?"));
        assert!(sql.contains("e.user_id = ?"));
        assert!(sql.contains("(u.username LIKE ? OR u.full_name LIKE ? OR e.notes LIKE ?)"));
        assert_eq!(sql.matches('?').count(), 8);
    }

    #[test]
    fn blank_search_is_ignored() {
        let filter = EntryFilter {
            search: Some("   ".to_string()),
            status: Some(EntryStatus::Open),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<MySql>::new("SELECT 1 FROM time_entries e");
        filter.push_where(&mut qb, None);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM time_entries e WHERE 1=1 AND e.check_out IS NULL"
        );
    }

    #[test]
    fn filter_parses_from_query_string() {
        let filter: EntryFilter =
            parse_query("period=last_month&status=manual&user_id=4&page=2");
        assert_eq!(filter.period, Some(Period::LastMonth));
        assert_eq!(filter.status, Some(EntryStatus::Manual));
        assert_eq!(filter.user_id, Some(4));
        assert_eq!(filter.page, Some(2));
    }

    fn parse_query(query: &str) -> EntryFilter {
        actix_web::web::Query::<EntryFilter>::from_query(query)
            .unwrap()
            .into_inner()
    }
}
