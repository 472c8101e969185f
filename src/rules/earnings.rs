use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Driver trip history is capped to the most recent trips
pub const TRIP_HISTORY_LIMIT: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    /// `page` is 1-based
    pub fn new(page: Option<u64>, page_size: Option<u64>, default_page_size: u64) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(default_page_size);

        if page == 0 {
            return Err(AppError::BadRequest("page must be at least 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::BadRequest(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }

    /// Metadata for a page that returned `count` rows. No total is reported;
    /// a short page means there is nothing further.
    pub fn info(&self, count: usize) -> PageInfo {
        PageInfo {
            page: self.page,
            page_size: self.page_size,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u64,
    pub page_size: u64,
    pub count: usize,
}

/// Inclusive time window; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates; a plain end
    /// date covers the whole day.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> AppResult<Self> {
        let start = start.map(|raw| parse_bound(raw, false)).transpose()?;
        let end = end.map(|raw| parse_bound(raw, true)).transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AppError::BadRequest(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        Ok(Self { start, end })
    }
}

fn parse_bound(raw: &str, end_of_day: bool) -> AppResult<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{}'", raw)))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };

    time.map(|t| t.and_utc())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid date '{}'", raw)))
}

/// The part of a trip that feeds the earnings metrics
#[derive(Debug, Clone, Copy)]
pub struct TripEarning {
    pub fare: f64,
    pub rating: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    pub total_earnings: f64,
    pub total_trips: u64,
    pub avg_rating: Option<f64>,
}

pub fn summarize(trips: impl IntoIterator<Item = TripEarning>) -> EarningsSummary {
    let mut total_earnings = 0.0;
    let mut total_trips = 0;
    let mut rating_sum = 0.0;
    let mut rating_count = 0u32;

    for trip in trips {
        total_earnings += trip.fare;
        total_trips += 1;
        if let Some(rating) = trip.rating {
            rating_sum += f64::from(rating);
            rating_count += 1;
        }
    }

    let avg_rating = (rating_count > 0)
        .then(|| (rating_sum / f64::from(rating_count) * 100.0).round() / 100.0);

    EarningsSummary {
        total_earnings,
        total_trips,
        avg_rating,
    }
}
