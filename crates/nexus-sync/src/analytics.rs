//! Usage summary for the analytics view.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use nexus_core::defaults;
use nexus_core::{Label, Note, NoteType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelUsage {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    /// Notes not in the trash.
    pub total_notes: usize,
    /// Non-trashed notes created in the last week.
    pub created_this_week: usize,
    /// Most used labels, highest count first, ties by name.
    pub top_labels: Vec<LabelUsage>,
    /// One row per day of the heatmap window, oldest first.
    pub daily_activity: Vec<DailyActivity>,
    pub type_distribution: BTreeMap<NoteType, usize>,
}

/// Summarize an owner's notes as of `now`.
pub fn summarize(notes: &[Note], labels: &[Label], now: DateTime<Utc>) -> AnalyticsSummary {
    let live: Vec<&Note> = notes.iter().filter(|n| !n.is_trashed).collect();

    let week_start = now - Duration::days(defaults::ANALYTICS_WEEK_DAYS);
    let created_this_week = live.iter().filter(|n| n.created_at >= week_start).count();

    let names: HashMap<_, _> = labels.iter().map(|l| (l.id, l.name.as_str())).collect();
    let mut usage: HashMap<&str, usize> = HashMap::new();
    for note in &live {
        for id in &note.labels {
            if let Some(name) = names.get(id) {
                *usage.entry(*name).or_default() += 1;
            }
        }
    }
    let mut top_labels: Vec<LabelUsage> = usage
        .into_iter()
        .map(|(name, count)| LabelUsage {
            name: name.to_string(),
            count,
        })
        .collect();
    top_labels.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    top_labels.truncate(defaults::ANALYTICS_TOP_LABELS);

    let today = now.date_naive();
    let first_day = today - Duration::days(defaults::ANALYTICS_HEATMAP_DAYS - 1);
    let mut per_day: BTreeMap<NaiveDate, usize> = (0..defaults::ANALYTICS_HEATMAP_DAYS)
        .map(|offset| (first_day + Duration::days(offset), 0))
        .collect();
    for note in notes {
        if let Some(count) = per_day.get_mut(&note.created_at.date_naive()) {
            *count += 1;
        }
    }
    let daily_activity = per_day
        .into_iter()
        .map(|(date, created)| DailyActivity { date, created })
        .collect();

    let mut type_distribution = BTreeMap::new();
    for note in &live {
        *type_distribution.entry(note.note_type).or_insert(0) += 1;
    }

    AnalyticsSummary {
        total_notes: live.len(),
        created_this_week,
        top_labels,
        daily_activity,
        type_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::NoteDraft;
    use uuid::Uuid;

    fn note_at(created_at: DateTime<Utc>, labels: &[Uuid]) -> Note {
        let mut note = NoteDraft::text("t", "")
            .into_record(Uuid::nil(), None, 1)
            .into_note(Uuid::new_v4(), created_at);
        note.labels = labels.iter().copied().collect();
        note
    }

    fn label(name: &str) -> Label {
        Label {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: defaults::LABEL_COLOR.to_string(),
            owner_id: Uuid::nil(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_counts_exclude_trash() {
        let now = Utc::now();
        let mut trashed = note_at(now, &[]);
        trashed.is_trashed = true;
        let old = note_at(now - Duration::days(20), &[]);
        let summary = summarize(&[trashed, old, note_at(now, &[])], &[], now);

        assert_eq!(summary.total_notes, 2);
        assert_eq!(summary.created_this_week, 1);
        assert_eq!(summary.type_distribution.get(&NoteType::Text), Some(&2));
    }

    #[test]
    fn test_top_labels_ties_by_name() {
        let now = Utc::now();
        let (work, home, misc) = (label("work"), label("home"), label("misc"));
        let notes = [
            note_at(now, &[work.id, home.id]),
            note_at(now, &[work.id, home.id, misc.id]),
            note_at(now, &[misc.id]),
        ];
        let summary = summarize(&notes, &[work, home, misc], now);
        let names: Vec<&str> = summary.top_labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["home", "misc", "work"]);
    }

    #[test]
    fn test_heatmap_covers_thirty_days_ascending() {
        let now = Utc::now();
        let summary = summarize(&[note_at(now, &[]), note_at(now - Duration::days(45), &[])], &[], now);

        assert_eq!(summary.daily_activity.len(), 30);
        assert!(summary
            .daily_activity
            .windows(2)
            .all(|w| w[0].date < w[1].date));
        let last = summary.daily_activity.last().unwrap();
        assert_eq!(last.date, now.date_naive());
        assert_eq!(last.created, 1);
        let total: usize = summary.daily_activity.iter().map(|d| d.created).sum();
        assert_eq!(total, 1);
    }
}
