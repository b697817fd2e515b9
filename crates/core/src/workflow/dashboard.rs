use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalAction, ApprovalRecord, ApprovalStatus};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStatistics {
    pub total_pending: u32,
    pub total_approved: u32,
    pub total_rejected: u32,
    pub total_changes_requested: u32,
    /// Mean time from submission to review over reviewed records.
    pub average_response_secs: Option<i64>,
}

impl DashboardStatistics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ApprovalRecord>) -> Self {
        let mut statistics = Self::default();
        let mut response_total: i64 = 0;
        let mut reviewed: i64 = 0;

        for record in records {
            match record.status {
                ApprovalStatus::Pending => statistics.total_pending += 1,
                ApprovalStatus::Approved => statistics.total_approved += 1,
                ApprovalStatus::Rejected => statistics.total_rejected += 1,
                ApprovalStatus::ChangesRequested => statistics.total_changes_requested += 1,
            }
            if let Some(reviewed_at) = record.reviewed_at {
                response_total += (reviewed_at - record.submitted_at).num_seconds();
                reviewed += 1;
            }
        }

        if reviewed > 0 {
            statistics.average_response_secs = Some(response_total / reviewed);
        }
        statistics
    }
}

/// Role-shaped overview. Reviewers see the whole queue and their own decisions;
/// submitters see only their own records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub pending_approvals: Vec<ApprovalRecord>,
    pub my_approvals: Vec<ApprovalRecord>,
    pub recent_activity: Vec<ApprovalAction>,
    pub statistics: DashboardStatistics,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::DashboardStatistics;
    use crate::domain::approval::{ApprovalId, ApprovalRecord, ApprovalStatus, SiteRef};
    use crate::domain::cost::CostBreakdown;
    use crate::domain::selection::Selection;

    fn record(status: ApprovalStatus, response_secs: Option<i64>) -> ApprovalRecord {
        let submitted_at = Utc::now();
        ApprovalRecord {
            id: ApprovalId(format!("apr-{}", status.as_str())),
            site_ref: SiteRef("site-1".to_owned()),
            site_name: "Site".to_owned(),
            submitter_id: "eng-1".to_owned(),
            submitter_name: "Erin".to_owned(),
            reviewer_id: response_secs.map(|_| "ops-1".to_owned()),
            reviewer_name: None,
            status,
            submitted_at,
            reviewed_at: response_secs.map(|secs| submitted_at + Duration::seconds(secs)),
            review_comment: None,
            rejection_reason: None,
            selection: Selection::new(),
            costs: CostBreakdown::default(),
            version: 1,
            previous_version_id: None,
        }
    }

    #[test]
    fn statistics_count_statuses_and_average_response_time() {
        let records = vec![
            record(ApprovalStatus::Pending, None),
            record(ApprovalStatus::Approved, Some(60)),
            record(ApprovalStatus::Rejected, Some(180)),
            record(ApprovalStatus::ChangesRequested, Some(120)),
        ];

        let statistics = DashboardStatistics::from_records(&records);

        assert_eq!(statistics.total_pending, 1);
        assert_eq!(statistics.total_approved, 1);
        assert_eq!(statistics.total_rejected, 1);
        assert_eq!(statistics.total_changes_requested, 1);
        assert_eq!(statistics.average_response_secs, Some(120));
    }

    #[test]
    fn no_reviews_means_no_average() {
        let statistics = DashboardStatistics::from_records(&[record(ApprovalStatus::Pending, None)]);

        assert_eq!(statistics.average_response_secs, None);
    }
}
