//! Read-side statistics over the access-scoped record set.
//!
//! Everything here is a pure rollup: no statistics call mutates anything.
//! The scoped patient set is "patients with at least one consultation
//! matching the caller's visibility" (all patients under global
//! visibility), mirroring how the listing screens are scoped.
//!
//! Consultation-based rollups count working encounters (non-snapshot rows)
//! bucketed by `updated_at`. That column is "last section saved", not the
//! visit date; the contamination is inherited deliberately, see DESIGN.md.

use crate::classify::classify_text;
use crate::scope::{consultation_filter, Visibility};
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use clinica_types::Sex;
use rusqlite::ToSql;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

/// A labelled count, the unit every rollup returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountBucket {
    pub label: String,
    pub count: i64,
}

/// Canonical five-year age ranges, inclusive on both ends.
///
/// Ages above the last range fall into the `90+` catch-all.
pub const AGE_RANGES: [(i64, i64); 18] = [
    (0, 5),
    (6, 10),
    (11, 15),
    (16, 20),
    (21, 25),
    (26, 30),
    (31, 35),
    (36, 40),
    (41, 45),
    (46, 50),
    (51, 55),
    (56, 60),
    (61, 65),
    (66, 70),
    (71, 75),
    (76, 80),
    (81, 85),
    (86, 90),
];

/// Number of trailing months (current month included) in the consultation
/// trend.
pub const TREND_MONTHS: i64 = 6;

fn scoped_patient_sql(vis: Visibility, columns: &str) -> (String, Vec<i64>) {
    if vis == Visibility::Global {
        return (format!("SELECT {columns} FROM patients p"), vec![]);
    }
    let (filter, bind) = consultation_filter(vis);
    (
        format!(
            "SELECT {columns} FROM patients p WHERE EXISTS \
             (SELECT 1 FROM consultations c WHERE c.patient_id = p.id AND {filter})"
        ),
        bind,
    )
}

fn add_months(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = year * 12 + month as i32 - 1 + delta;
    (zero_based.div_euclid(12), (zero_based.rem_euclid(12) + 1) as u32)
}

fn month_start(year: i32, month: u32) -> ClinicResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| ClinicError::InvalidInput(format!("invalid month {year}-{month}")))
}

impl Store {
    /// Patients by sex, nulls excluded.
    pub fn stats_gender(&self, vis: Visibility) -> ClinicResult<Vec<(Sex, i64)>> {
        let (base, bind) = scoped_patient_sql(vis, "p.sex, COUNT(*)");
        let conn = self.conn()?;
        let sql = format!(
            "{base} {and} p.sex IS NOT NULL GROUP BY p.sex ORDER BY p.sex",
            and = if bind.is_empty() { "WHERE" } else { "AND" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let rows = stmt
            .query_map(&bind[..], |row| {
                let sex: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((sex, count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(sex, count)| Ok((Sex::from_str(&sex)?, count)))
            .collect()
    }

    /// Age histogram over the canonical ranges plus the `90+` catch-all.
    ///
    /// Bucket counts sum exactly to the number of scoped patients with a
    /// non-null age; every age lands in exactly one bucket.
    pub fn stats_age_histogram(&self, vis: Visibility) -> ClinicResult<Vec<CountBucket>> {
        let (base, bind) = scoped_patient_sql(vis, "p.age");
        let conn = self.conn()?;
        let sql = format!(
            "{base} {and} p.age IS NOT NULL",
            and = if bind.is_empty() { "WHERE" } else { "AND" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let ages = stmt
            .query_map(&bind[..], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut buckets: Vec<CountBucket> = AGE_RANGES
            .iter()
            .map(|(lo, hi)| CountBucket {
                label: format!("{lo}-{hi}"),
                count: 0,
            })
            .collect();
        buckets.push(CountBucket {
            label: "90+".into(),
            count: 0,
        });

        for age in ages {
            let idx = AGE_RANGES
                .iter()
                .position(|(lo, hi)| (*lo..=*hi).contains(&age))
                .unwrap_or(AGE_RANGES.len());
            buckets[idx].count += 1;
        }
        Ok(buckets)
    }

    /// Consultation counts for the trailing six months anchored at `now`,
    /// oldest bucket first.
    ///
    /// Buckets are half-open `[month start, next month start)`, so a
    /// consultation stamped exactly on a boundary falls into exactly one
    /// bucket.
    pub fn stats_monthly_consultations(
        &self,
        vis: Visibility,
        now: DateTime<Utc>,
    ) -> ClinicResult<Vec<CountBucket>> {
        let (filter, bind) = consultation_filter(vis);
        let conn = self.conn()?;

        let mut buckets = Vec::with_capacity(TREND_MONTHS as usize);
        for offset in (1 - TREND_MONTHS as i32)..=0 {
            let (year, month) = add_months(now.year(), now.month(), offset);
            let start = month_start(year, month)?;
            let (next_year, next_month) = add_months(year, month, 1);
            let end = month_start(next_year, next_month)?;

            let mut bind_all: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
            let start_param = bind_all.len() + 1;
            let end_param = bind_all.len() + 2;
            bind_all.push(&start);
            bind_all.push(&end);

            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM consultations c \
                     WHERE c.snapshot_of IS NULL AND {filter} \
                     AND c.updated_at >= ?{start_param} AND c.updated_at < ?{end_param}"
                ),
                &bind_all[..],
                |row| row.get(0),
            )?;

            buckets.push(CountBucket {
                label: format!("{year:04}-{month:02}"),
                count,
            });
        }
        Ok(buckets)
    }

    /// Most common diagnoses by exact (trimmed, lowercased) text.
    pub fn stats_common_diagnoses(
        &self,
        vis: Visibility,
        top_n: usize,
    ) -> ClinicResult<Vec<CountBucket>> {
        let (filter, bind) = consultation_filter(vis);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.diagnosis FROM consultations c \
             WHERE c.snapshot_of IS NULL AND c.diagnosis IS NOT NULL AND {filter}"
        ))?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let texts = stmt
            .query_map(&bind[..], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts: HashMap<String, i64> = HashMap::new();
        for text in texts {
            let normalized = text.trim().to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            *counts.entry(normalized).or_insert(0) += 1;
        }

        let mut buckets: Vec<CountBucket> = counts
            .into_iter()
            .map(|(label, count)| CountBucket { label, count })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        buckets.truncate(top_n);
        Ok(buckets)
    }

    /// Consultations classified into medical systems by keyword, counted
    /// once per system per consultation.
    pub fn stats_systems(&self, vis: Visibility) -> ClinicResult<Vec<CountBucket>> {
        let (filter, bind) = consultation_filter(vis);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.diagnosis, c.visit_reason, c.systems_review FROM consultations c \
             WHERE c.snapshot_of IS NULL AND {filter} \
             AND (c.diagnosis IS NOT NULL OR c.visit_reason IS NOT NULL \
                  OR c.systems_review IS NOT NULL)"
        ))?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let rows = stmt
            .query_map(&bind[..], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts: HashMap<&'static str, i64> = HashMap::new();
        for (diagnosis, visit_reason, systems_review) in rows {
            let text = [diagnosis, visit_reason, systems_review]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            for system in classify_text(&text) {
                *counts.entry(system).or_insert(0) += 1;
            }
        }

        let mut buckets: Vec<CountBucket> = counts
            .into_iter()
            .map(|(label, count)| CountBucket {
                label: label.to_string(),
                count,
            })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::consultations::ConsultationSection;
    use crate::testutil;
    use chrono::Duration;

    #[test]
    fn age_buckets_sum_to_patients_with_known_age() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        for (name, age) in [
            ("Ana", Some(67)),
            ("Bruno", Some(18)),
            ("Carla", Some(90)),
            ("Diego", Some(95)),
            ("Elsa", None),
        ] {
            testutil::seed_patient(&store, &admin, name, age);
        }

        let histogram = store
            .stats_age_histogram(Visibility::Global)
            .expect("histogram should succeed");
        let total: i64 = histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 4, "null ages are excluded");

        let bucket = |label: &str| {
            histogram
                .iter()
                .find(|b| b.label == label)
                .map(|b| b.count)
                .unwrap_or_default()
        };
        // Ana, 67, lands in 66-70 and nowhere else.
        assert_eq!(bucket("66-70"), 1);
        assert_eq!(bucket("61-65"), 0);
        assert_eq!(bucket("71-75"), 0);
        // The 16-20 range exists and catches Bruno.
        assert_eq!(bucket("16-20"), 1);
        // 90 is the top of the last range; 95 spills into the catch-all.
        assert_eq!(bucket("86-90"), 1);
        assert_eq!(bucket("90+"), 1);
    }

    #[test]
    fn gender_distribution_excludes_unknown() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        testutil::seed_patient_with_sex(&store, &admin, "Ana", Some(clinica_types::Sex::Female));
        testutil::seed_patient_with_sex(&store, &admin, "Bruno", Some(clinica_types::Sex::Male));
        testutil::seed_patient_with_sex(&store, &admin, "Cris", None);

        let dist = store
            .stats_gender(Visibility::Global)
            .expect("gender stats should succeed");
        let total: i64 = dist.iter().map(|(_, c)| c).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn month_boundary_lands_in_exactly_one_bucket() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));

        let now = Utc
            .with_ymd_and_hms(2025, 8, 20, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let boundary = Utc
            .with_ymd_and_hms(2025, 7, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");

        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let draft = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("begin should succeed");
        testutil::set_consultation_updated_at(&store, draft.id, boundary);

        let buckets = store
            .stats_monthly_consultations(Visibility::Global, now)
            .expect("trend should succeed");
        assert_eq!(buckets.len(), TREND_MONTHS as usize);
        assert_eq!(buckets.last().unwrap().label, "2025-08");

        let july = buckets.iter().find(|b| b.label == "2025-07").unwrap();
        let june = buckets.iter().find(|b| b.label == "2025-06").unwrap();
        assert_eq!(july.count, 1, "boundary timestamp belongs to July");
        assert_eq!(june.count, 0, "and must not double-count into June");

        let total: i64 = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn trend_window_spans_year_boundaries() {
        let (store, _dir) = testutil::store();
        let now = Utc
            .with_ymd_and_hms(2025, 2, 10, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        let buckets = store
            .stats_monthly_consultations(Visibility::Global, now)
            .expect("trend should succeed");
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["2024-09", "2024-10", "2024-11", "2024-12", "2025-01", "2025-02"]
        );
    }

    #[test]
    fn stats_respect_clinic_scope() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic_a = testutil::seed_clinic(&store, "Room A");
        let clinic_b = testutil::seed_clinic(&store, "Room B");
        let phys_a = testutil::seed_physician(&store, &admin, "bruno", Some(clinic_a));
        let phys_b = testutil::seed_physician(&store, &admin, "carla", Some(clinic_b));

        let p1 = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let p2 = testutil::seed_patient(&store, &admin, "Rosa", Some(30));
        store
            .begin_consultation(&phys_a, p1, Some(clinic_a), None)
            .expect("clinic A consultation");
        store
            .begin_consultation(&phys_b, p2, Some(clinic_b), None)
            .expect("clinic B consultation");

        let vis = phys_a.listing_visibility().expect("physician has a clinic");
        let histogram = store.stats_age_histogram(vis).expect("scoped histogram");
        let total: i64 = histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 1, "only the clinic A patient is in scope");

        let trend = store
            .stats_monthly_consultations(vis, Utc::now() + Duration::minutes(1))
            .expect("scoped trend");
        let trend_total: i64 = trend.iter().map(|b| b.count).sum();
        assert_eq!(trend_total, 1);
    }

    #[test]
    fn systems_count_once_per_consultation_per_system() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let draft = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("begin should succeed");

        // Two respiratory keywords plus one neurological in the same note.
        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Diagnosis {
                    diagnosis: Some("Bronchitis with persistent cough".into()),
                    lab_orders: None,
                },
            )
            .expect("diagnosis save");
        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::VisitReason {
                    visit_reason: Some("headache".into()),
                    history: None,
                },
            )
            .expect("visit reason save");

        let systems = store
            .stats_systems(Visibility::Global)
            .expect("systems stats");
        let count = |label: &str| {
            systems
                .iter()
                .find(|b| b.label == label)
                .map(|b| b.count)
                .unwrap_or_default()
        };
        assert_eq!(count("Respiratory"), 1);
        assert_eq!(count("Neurological"), 1);
    }

    #[test]
    fn common_diagnoses_normalize_case_and_rank() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));

        for (name, diagnosis) in [
            ("Ana", "Bronchitis"),
            ("Rosa", "bronchitis "),
            ("Luis", "Gastritis"),
        ] {
            let p = testutil::seed_patient(&store, &admin, name, Some(40));
            let draft = store
                .begin_consultation(&phys, p, Some(clinic), None)
                .expect("begin should succeed");
            store
                .update_section(
                    &phys,
                    draft.id,
                    ConsultationSection::Diagnosis {
                        diagnosis: Some(diagnosis.into()),
                        lab_orders: None,
                    },
                )
                .expect("diagnosis save");
        }

        let common = store
            .stats_common_diagnoses(Visibility::Global, 10)
            .expect("common diagnoses");
        assert_eq!(common[0].label, "bronchitis");
        assert_eq!(common[0].count, 2);
        assert_eq!(common[1].label, "gastritis");
        assert_eq!(common[1].count, 1);
    }
}
