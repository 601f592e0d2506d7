use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::{Movement, MovementId, PersonalRecord, WorkoutScore};

/// In-memory copy of the catalog plus the current user's records and scores.
/// Always replaced wholesale after a mutation, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub movements: Vec<Movement>,
    pub records: Vec<PersonalRecord>,
    pub scores: Vec<WorkoutScore>,
}

impl Snapshot {
    pub fn new(
        movements: Vec<Movement>,
        records: Vec<PersonalRecord>,
        scores: Vec<WorkoutScore>,
    ) -> Self {
        Self {
            movements,
            records,
            scores,
        }
    }

    /// Most recent record per movement, ordered by movement name.
    ///
    /// Records are stably sorted by date descending first, so among rows sharing
    /// a date the one fetched first wins.
    pub fn latest_records(&self) -> Vec<&PersonalRecord> {
        let mut by_date: Vec<&PersonalRecord> = self.records.iter().collect();
        by_date.sort_by(|a, b| b.date.cmp(&a.date));

        let mut seen = HashSet::new();
        let mut latest: Vec<&PersonalRecord> = by_date
            .into_iter()
            .filter(|r| seen.insert(r.movement_id))
            .collect();
        latest.sort_by_key(|r| r.movement_name().unwrap_or_default().to_lowercase());
        latest
    }

    /// Latest records whose movement name contains `term` (case-insensitive).
    pub fn search_latest(&self, term: &str) -> Vec<&PersonalRecord> {
        let needle = term.trim().to_lowercase();
        let latest = self.latest_records();
        if needle.is_empty() {
            return latest;
        }
        latest
            .into_iter()
            .filter(|r| {
                r.movement_name()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Every record for one movement, newest first.
    pub fn history(&self, movement_id: MovementId) -> Vec<&PersonalRecord> {
        let mut history: Vec<&PersonalRecord> = self
            .records
            .iter()
            .filter(|r| r.movement_id == movement_id)
            .collect();
        history.sort_by(|a, b| b.date.cmp(&a.date));
        history
    }

    /// Every score logged for one benchmark, newest first.
    pub fn scores_for(&self, workout_name: &str) -> Vec<&WorkoutScore> {
        let mut scores: Vec<&WorkoutScore> = self
            .scores
            .iter()
            .filter(|s| s.workout_name.eq_ignore_ascii_case(workout_name))
            .collect();
        scores.sort_by(|a, b| b.date.cmp(&a.date));
        scores
    }

    pub fn movement(&self, id: MovementId) -> Option<&Movement> {
        self.movements.iter().find(|m| m.id == id)
    }

    /// Case-insensitive exact name match. No fuzzy matching.
    pub fn find_movement_by_name(&self, name: &str) -> Option<&Movement> {
        find_movement_by_name(&self.movements, name)
    }

    /// Catalog grouped by category; a blank category lands in "Other".
    pub fn movements_by_category(&self) -> BTreeMap<String, Vec<&Movement>> {
        let mut groups: BTreeMap<String, Vec<&Movement>> = BTreeMap::new();
        for movement in &self.movements {
            let category = if movement.category.trim().is_empty() {
                "Other".to_string()
            } else {
                movement.category.clone()
            };
            groups.entry(category).or_default().push(movement);
        }
        groups
    }
}

/// Case-insensitive exact name match against a catalog slice.
pub fn find_movement_by_name<'a>(movements: &'a [Movement], name: &str) -> Option<&'a Movement> {
    let wanted = name.trim().to_lowercase();
    movements.iter().find(|m| m.name.to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::MovementRef;

    fn movement(id: MovementId, name: &str, category: &str) -> Movement {
        Movement {
            id,
            name: name.to_string(),
            category: category.to_string(),
        }
    }

    fn record(id: i64, movement: &Movement, value: &str, date: (i32, u32, u32)) -> PersonalRecord {
        PersonalRecord {
            id,
            user_id: Uuid::nil(),
            movement_id: movement.id,
            value: value.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            notes: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            movement: Some(MovementRef {
                name: movement.name.clone(),
                category: movement.category.clone(),
            }),
        }
    }

    fn fixture() -> Snapshot {
        let squat = movement(7, "Back Squat", "Weightlifting");
        let deadlift = movement(3, "Deadlift", "Weightlifting");
        let muscle_up = movement(9, "Muscle-up", "");
        let records = vec![
            record(1, &squat, "140kg", (2024, 1, 10)),
            record(2, &deadlift, "200kg", (2024, 2, 1)),
            record(3, &squat, "150kg", (2024, 3, 5)),
            record(4, &squat, "145kg", (2024, 2, 20)),
        ];
        Snapshot::new(vec![squat, deadlift, muscle_up], records, Vec::new())
    }

    #[test]
    fn latest_keeps_newest_per_movement_sorted_by_name() {
        let snapshot = fixture();
        let latest = snapshot.latest_records();
        let summary: Vec<(&str, &str)> = latest
            .iter()
            .map(|r| (r.movement_name().unwrap(), r.value.as_str()))
            .collect();
        assert_eq!(summary, vec![("Back Squat", "150kg"), ("Deadlift", "200kg")]);
    }

    #[test]
    fn search_filters_latest_by_name_fragment() {
        let snapshot = fixture();
        let hits = snapshot.search_latest("SQU");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, "150kg");
        assert_eq!(snapshot.search_latest("  ").len(), 2);
        assert!(snapshot.search_latest("clean").is_empty());
    }

    #[test]
    fn history_is_newest_first() {
        let snapshot = fixture();
        let values: Vec<&str> = snapshot.history(7).iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["150kg", "145kg", "140kg"]);
        assert!(snapshot.history(42).is_empty());
    }

    #[test]
    fn name_lookup_is_case_insensitive_exact() {
        let snapshot = fixture();
        assert_eq!(snapshot.find_movement_by_name("back squat").map(|m| m.id), Some(7));
        assert!(snapshot.find_movement_by_name("Back Squa").is_none());
        assert!(snapshot.find_movement_by_name("Front Squat").is_none());
    }

    #[test]
    fn blank_category_is_grouped_as_other() {
        let snapshot = fixture();
        let groups = snapshot.movements_by_category();
        assert_eq!(groups["Weightlifting"].len(), 2);
        assert_eq!(groups["Other"][0].name, "Muscle-up");
    }
}
