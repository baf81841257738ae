//! Report aggregation
//!
//! Turns the ordered activity log into per-category counts plus detail lists.
//! This is the shape persisted as the JSON report.

use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ActivityEntry};
use crate::policy::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub duration_seconds: f64,
    pub total_activities: usize,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

/// Counts and details for one operation category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySummary {
    pub total: usize,
    pub allowed: usize,
    pub blocked: usize,
    pub details: Vec<Activity>,
}

impl CategorySummary {
    fn push(&mut self, activity: Activity, allowed: bool) {
        self.total += 1;
        if allowed {
            self.allowed += 1;
        } else {
            self.blocked += 1;
        }
        self.details.push(activity);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExceptionSummary {
    pub total: usize,
    pub details: Vec<Activity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimitSummary {
    pub details: Vec<Activity>,
}

/// Finalized activity report of one execution
///
/// `imports` lists imports issued by user and third-party code. Imports the
/// standard library performs internally while loading are not recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub execution_summary: ExecutionSummary,
    pub imports: CategorySummary,
    pub file_operations: CategorySummary,
    pub network_operations: CategorySummary,
    pub exceptions: ExceptionSummary,
    pub resource_limits: ResourceLimitSummary,
    /// Every entry in insertion order
    pub all_activities: Vec<Activity>,
}

impl Report {
    pub(crate) fn build(
        started_at: DateTime<Local>,
        elapsed: Duration,
        activities: Vec<Activity>,
    ) -> Self {
        let mut imports = CategorySummary::default();
        let mut file_operations = CategorySummary::default();
        let mut network_operations = CategorySummary::default();
        let mut exceptions = ExceptionSummary::default();
        let mut resource_limits = ResourceLimitSummary::default();

        for activity in &activities {
            match &activity.entry {
                ActivityEntry::Operation(record) => {
                    let allowed = record.decision.is_allowed();
                    let summary = match record.kind.category() {
                        Category::Imports => &mut imports,
                        Category::FileOperations => &mut file_operations,
                        Category::NetworkOperations => &mut network_operations,
                    };
                    summary.push(activity.clone(), allowed);
                }
                ActivityEntry::Exception(_) => {
                    exceptions.total += 1;
                    exceptions.details.push(activity.clone());
                }
                ActivityEntry::ResourceLimit(_) => {
                    resource_limits.details.push(activity.clone());
                }
            }
        }

        let end_time = TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| started_at.checked_add_signed(delta))
            .unwrap_or(started_at);

        Self {
            execution_summary: ExecutionSummary {
                duration_seconds: elapsed.as_secs_f64(),
                total_activities: activities.len(),
                start_time: started_at,
                end_time,
            },
            imports,
            file_operations,
            network_operations,
            exceptions,
            resource_limits,
            all_activities: activities,
        }
    }

    /// Summary for one category
    pub fn category(&self, category: Category) -> &CategorySummary {
        match category {
            Category::Imports => &self.imports,
            Category::FileOperations => &self.file_operations,
            Category::NetworkOperations => &self.network_operations,
        }
    }

    /// Total number of blocked operations across all categories
    pub fn blocked_total(&self) -> usize {
        self.imports.blocked + self.file_operations.blocked + self.network_operations.blocked
    }
}
