//! Harvested record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key naming one external record (a roll number)
pub type Identifier = String;

/// One student directory entry
///
/// Every field other than `roll` may be empty when the source page lacks the
/// corresponding section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub roll: Identifier,
    pub username: String,
    pub name: String,
    pub program: String,
    pub dept: String,
    pub hall: String,
    pub room: String,
    pub blood_group: String,
    pub gender: String,
    pub hometown: String,
    pub updated_at: DateTime<Utc>,
}

impl StudentRecord {
    /// Empty record for `roll`, stamped with the current time
    pub fn new(roll: impl Into<Identifier>) -> Self {
        Self {
            roll: roll.into(),
            username: String::new(),
            name: String::new(),
            program: String::new(),
            dept: String::new(),
            hall: String::new(),
            room: String::new(),
            blood_group: String::new(),
            gender: String::new(),
            hometown: String::new(),
            updated_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for StudentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Student {} {} {}", self.roll, self.name, self.dept)
    }
}

/// Compact JSON shape consumed by the search frontend
///
/// Single-letter keys keep the exported roster small enough to ship to the
/// browser in one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactStudent {
    #[serde(rename = "i")]
    pub roll: String,
    #[serde(rename = "u")]
    pub username: String,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "p")]
    pub program: String,
    #[serde(rename = "d")]
    pub dept: String,
    #[serde(rename = "h")]
    pub hall: String,
    #[serde(rename = "r")]
    pub room: String,
    #[serde(rename = "b")]
    pub blood_group: String,
    #[serde(rename = "g")]
    pub gender: String,
    #[serde(rename = "a")]
    pub hometown: String,
}

impl From<StudentRecord> for CompactStudent {
    fn from(record: StudentRecord) -> Self {
        Self {
            roll: record.roll,
            username: record.username,
            name: record.name,
            program: record.program,
            dept: record.dept,
            hall: record.hall,
            room: record.room,
            blood_group: record.blood_group,
            gender: record.gender,
            hometown: record.hometown,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_keys() {
        let mut record = StudentRecord::new("190001");
        record.name = "Asha Rao".to_string();
        record.gender = "F".to_string();

        let json = serde_json::to_value(CompactStudent::from(record)).unwrap();
        assert_eq!(json["i"], "190001");
        assert_eq!(json["n"], "Asha Rao");
        assert_eq!(json["g"], "F");
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_display() {
        let mut record = StudentRecord::new("190001");
        record.name = "Asha Rao".to_string();
        record.dept = "Physics".to_string();
        assert_eq!(record.to_string(), "Student 190001 Asha Rao Physics");
    }
}
