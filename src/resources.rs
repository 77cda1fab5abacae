//! Mobile-unit planning for target districts

use crate::config::ResourcePolicy;
use crate::model::{ClusterName, LabeledDistrict};
use crate::profile::{median_activity, DistrictProfile};

/// A School Hub district with its van requirement
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDistrict {
    pub state: String,
    pub district: String,
    pub total_activity: u64,
    pub student_share: f64,
    pub vans_required: u64,
}

impl ResourcePolicy {
    /// Vans needed to absorb `total_activity` over one period:
    /// `ceil(ceil(load / days) / capacity)`
    pub fn vans_required(&self, total_activity: u64) -> u64 {
        total_activity
            .div_ceil(self.days_per_period())
            .div_ceil(self.capacity_per_van())
    }
}

/// Vans required under the default 30-day, 50-per-van policy
pub fn calc_vans(total_activity: u64) -> u64 {
    ResourcePolicy::default().vans_required(total_activity)
}

/// School Hub districts by descending activity, truncated to `top_n`
pub fn select_targets(
    districts: &[LabeledDistrict],
    policy: &ResourcePolicy,
    top_n: usize,
) -> Vec<TargetDistrict> {
    let mut hubs: Vec<&LabeledDistrict> = districts
        .iter()
        .filter(|d| d.assignment.name == ClusterName::SchoolHub)
        .collect();
    hubs.sort_by(|a, b| b.profile.total_activity.cmp(&a.profile.total_activity));

    hubs.into_iter()
        .take(top_n)
        .map(|d| TargetDistrict {
            state: d.profile.state.clone(),
            district: d.profile.district.clone(),
            total_activity: d.profile.total_activity,
            student_share: d.profile.student_share,
            vans_required: policy.vans_required(d.profile.total_activity),
        })
        .collect()
}

/// Districts above the median volume whose student share exceeds `share_threshold`,
/// by descending activity
pub fn median_rule_priorities(
    profiles: &[DistrictProfile],
    share_threshold: f64,
    top_n: usize,
) -> Vec<DistrictProfile> {
    let Some(median) = median_activity(profiles) else {
        return Vec::new();
    };

    let mut picked: Vec<DistrictProfile> = profiles
        .iter()
        .filter(|p| p.total_activity as f64 > median && p.student_share > share_threshold)
        .cloned()
        .collect();
    picked.sort_by(|a, b| b.total_activity.cmp(&a.total_activity));
    picked.truncate(top_n);
    picked
}
