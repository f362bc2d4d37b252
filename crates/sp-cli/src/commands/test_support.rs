//! Database fixtures shared by command tests.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate, TimeZone, Utc};

use sp_core::{
    Contributor, ContributorId, EmploymentTerm, Granularity, ProfileId, StaffingMetric,
};
use sp_db::Database;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Adds an active 35h/week contributor whose name is the capitalized ID.
pub fn add_contributor(db: &mut Database, id: &str, profiles: &[&str]) {
    let mut name = id.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    db.upsert_contributor(&Contributor {
        id: ContributorId::new(id).unwrap(),
        name,
        active: true,
    })
    .unwrap();
    db.insert_employment_term(&EmploymentTerm {
        contributor_id: ContributorId::new(id).unwrap(),
        weekly_hours: 35.0,
        work_time_percentage: 100.0,
        start_date: date(2024, 1, 1),
        end_date: None,
        profiles: profiles
            .iter()
            .map(|p| ProfileId::new(*p).unwrap())
            .collect::<BTreeSet<_>>(),
    })
    .unwrap();
}

/// Stores one weekly snapshot with the given TACE.
pub fn store_weekly(db: &mut Database, id: &str, week_start: NaiveDate, tace: f64) {
    let contributor = ContributorId::new(id).unwrap();
    let worked = tace * 35.0 / 100.0;
    let metric = StaffingMetric {
        id: StaffingMetric::snapshot_id(&contributor, week_start, Granularity::Weekly),
        contributor_id: contributor,
        period_start: week_start,
        period_end: week_start + Days::new(6),
        granularity: Granularity::Weekly,
        expected_hours: 35.0,
        worked_hours: worked,
        planned_hours: 0.0,
        staffing_rate: Some(tace),
        tace: Some(tace),
        computed_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
    };
    let outcome = db.insert_metrics(&[metric]).unwrap();
    assert_eq!(outcome.inserted, 1);
}
