use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// UTC instant of local midnight starting `date`.
pub fn day_start<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // midnight skipped by a DST jump, treat the wall clock as UTC
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Last representable microsecond of the local day containing `instant`.
pub fn end_of_local_day<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>) -> DateTime<Utc> {
    let date = instant.with_timezone(tz).date_naive();
    let next = date.succ_opt().unwrap_or(date);
    day_start(tz, next) - Duration::microseconds(1)
}

pub fn start_of_week(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

pub fn start_of_month(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

pub fn start_of_previous_month(today: NaiveDate) -> NaiveDate {
    let last_of_previous = start_of_month(today) - Duration::days(1);
    start_of_month(last_of_previous)
}

/// Hours from minutes, rounded to `decimals` places.
pub fn round_hours(minutes: i64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (minutes as f64 / 60.0 * factor).round() / factor
}

pub fn local_hm<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.with_timezone(tz).format("%H:%M").to_string()
}
