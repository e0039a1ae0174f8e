//! Workload-balanced counsellor selection.

use shared_types::{Counsellor, CounsellorId};

/// Pick the active counsellor with the minimum open-case load. Ties break by
/// the earliest `last_assigned_at`, with never-assigned counsellors first.
/// Returns `None` when nobody is active.
pub fn select_counsellor(counsellors: &[Counsellor]) -> Option<CounsellorId> {
    counsellors
        .iter()
        .filter(|c| c.is_active)
        .min_by(|a, b| {
            a.active_case_count
                .cmp(&b.active_case_count)
                .then_with(|| match (a.last_assigned_at, b.last_assigned_at) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(&y),
                })
        })
        .map(|c| c.counsellor_id)
}
