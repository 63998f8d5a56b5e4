use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseStatus {
    Active,
    Closed,
}

impl LeaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaseStatus::Active => "active",
            LeaseStatus::Closed => "closed",
        }
    }
}

impl FromStr for LeaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LeaseStatus::Active),
            "closed" => Ok(LeaseStatus::Closed),
            other => Err(format!("Unknown lease status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lease {
    pub id: Uuid,
    pub container_sku: String,
    pub customer_name: String,
    pub per_diem_rate: Decimal,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Last day a per-diem charge was raised for.
    pub billed_through: Option<NaiveDate>,
    pub status: LeaseStatus,
    pub created_at: DateTime<Utc>,
}

impl Lease {
    /// Days still owed when billing up to and including `today`.
    pub fn unbilled_days(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let last = match self.end_date {
            Some(end) if end < today => end,
            _ => today,
        };
        let first = match self.billed_through {
            Some(billed) => match billed.succ_opt() {
                Some(next) => next,
                None => return Vec::new(),
            },
            None => self.start_date,
        };

        first.iter_days().take_while(|day| *day <= last).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaseCharge {
    pub id: i64,
    pub lease_id: Uuid,
    pub charge_date: NaiveDate,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateLeaseRequest {
    #[validate(length(min = 1, max = 64))]
    pub container_sku: String,
    #[validate(length(min = 1, max = 128))]
    pub customer_name: String,
    #[validate(custom(function = "crate::models::validate_non_negative"))]
    pub per_diem_rate: Decimal,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloseLeaseRequest {
    pub end_date: Option<NaiveDate>,
}

/// Result of one billing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SweepSummary {
    pub run_date: Option<NaiveDate>,
    pub leases_processed: u32,
    pub charges_created: u32,
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(start: NaiveDate, billed: Option<NaiveDate>, end: Option<NaiveDate>) -> Lease {
        Lease {
            id: Uuid::new_v4(),
            container_sku: "DEN-20DV-001".into(),
            customer_name: "Acme Storage".into(),
            per_diem_rate: Decimal::new(250, 2),
            start_date: start,
            end_date: end,
            billed_through: billed,
            status: LeaseStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn unbilled_days_start_at_lease_start() {
        let days = lease(day(1), None, None).unbilled_days(day(3));
        assert_eq!(days, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn unbilled_days_resume_after_billed_through() {
        let days = lease(day(1), Some(day(3)), None).unbilled_days(day(5));
        assert_eq!(days, vec![day(4), day(5)]);
        assert!(lease(day(1), Some(day(5)), None).unbilled_days(day(5)).is_empty());
    }

    #[test]
    fn unbilled_days_stop_at_end_date() {
        let days = lease(day(1), Some(day(2)), Some(day(4))).unbilled_days(day(10));
        assert_eq!(days, vec![day(3), day(4)]);
    }

    #[test]
    fn future_leases_owe_nothing() {
        assert!(lease(day(10), None, None).unbilled_days(day(5)).is_empty());
    }
}
