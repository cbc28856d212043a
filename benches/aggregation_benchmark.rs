use std::hint::black_box;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use fitsync::models::{WeightEntry, WorkoutSession};
use fitsync::services::aggregation::compute_stats;

fn history(days: i64) -> (Vec<WorkoutSession>, Vec<WeightEntry>) {
    let start = Utc.with_ymd_and_hms(2022, 1, 1, 7, 0, 0).unwrap();
    let sessions = (0..days)
        // Skip every seventh day so streaks keep breaking.
        .filter(|d| d % 7 != 6)
        .map(|d| {
            let begin = start + Duration::days(d);
            WorkoutSession {
                id: format!("s{}", d),
                owner_id: "bench".to_string(),
                start_time: begin,
                end_time: Some(begin + Duration::minutes(40 + d % 30)),
                duration_minutes: (40 + d % 30) as u32,
                notes: String::new(),
                exercises: Vec::new(),
                created_at: None,
                updated_at: None,
            }
        })
        .collect();
    let weights = (0..days)
        .step_by(3)
        .map(|d| WeightEntry {
            id: format!("w{}", d),
            owner_id: "bench".to_string(),
            weight: 90.0 - d as f64 * 0.01,
            date: start.date_naive() + Duration::days(d),
            notes: None,
            created_at: None,
        })
        .collect();
    (sessions, weights)
}

fn benchmark_compute_stats(c: &mut Criterion) {
    let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
    let (one_year, one_year_weights) = history(365);
    let (three_years, three_year_weights) = history(3 * 365);

    let mut group = c.benchmark_group("compute_stats");

    group.bench_function("one_year_history", |b| {
        b.iter(|| compute_stats(black_box(&one_year), black_box(&one_year_weights), today))
    });

    group.bench_function("three_year_history", |b| {
        b.iter(|| {
            compute_stats(
                black_box(&three_years),
                black_box(&three_year_weights),
                today,
            )
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_compute_stats);
criterion_main!(benches);
