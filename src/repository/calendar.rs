use std::{collections::BTreeSet, sync::Arc};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// A weekly `calendar.txt` rule.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarRule {
    pub service_id: Arc<str>,
    /// Monday first.
    pub weekdays: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CalendarRule {
    pub fn is_active(&self, date: NaiveDate) -> bool {
        self.weekdays[date.weekday().num_days_from_monday() as usize]
            && self.start_date <= date
            && date <= self.end_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptionKind {
    Added,
    Removed,
}

impl ExceptionKind {
    /// `calendar_dates.txt` exception type, `1` adds service and `2` removes it.
    pub fn from_gtfs(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarException {
    pub service_id: Arc<str>,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

/// Resolves which service ids run on a date.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceCalendar {
    rules: Vec<CalendarRule>,
    exceptions: Vec<CalendarException>,
}

impl ServiceCalendar {
    pub fn new(rules: Vec<CalendarRule>, exceptions: Vec<CalendarException>) -> Self {
        Self { rules, exceptions }
    }

    pub fn rules(&self) -> &[CalendarRule] {
        &self.rules
    }

    pub fn exceptions(&self) -> &[CalendarException] {
        &self.exceptions
    }

    /// Weekly services active on `date`, with that date's exceptions applied
    /// in feed order. Sorted and free of duplicates.
    pub fn service_ids_for_date(&self, date: NaiveDate) -> Vec<Arc<str>> {
        let mut active: BTreeSet<Arc<str>> = self
            .rules
            .iter()
            .filter(|rule| rule.is_active(date))
            .map(|rule| rule.service_id.clone())
            .collect();
        for exception in self.exceptions.iter().filter(|e| e.date == date) {
            match exception.kind {
                ExceptionKind::Added => {
                    active.insert(exception.service_id.clone());
                }
                ExceptionKind::Removed => {
                    active.remove(&exception.service_id);
                }
            }
        }
        active.into_iter().collect()
    }
}
