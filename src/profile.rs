//! Aggregation of enriched records by region, pincode and month using Polars

use polars::prelude::*;

use crate::data::EnrichedRecord;

/// Aggregated counts for one (state, district) region
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictProfile {
    pub state: String,
    pub district: String,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
    pub total_activity: u64,
    /// age_5_17 / total_activity, 0 for an idle district
    pub student_share: f64,
    /// age_0_5 / total_activity, 0 for an idle district
    pub birth_share: f64,
}

/// Summed activity for one pincode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PincodeActivity {
    pub pincode: String,
    pub total_activity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyActivity {
    pub month: String,
    pub total_activity: u64,
}

/// Build the activity frame the aggregations run on.
///
/// One row per record with the region keys, nullable `month`, the three
/// counts and `total_activity`.
pub fn activity_frame(records: &[EnrichedRecord]) -> crate::Result<DataFrame> {
    let states: Vec<&str> = records.iter().map(|r| r.record.state.as_str()).collect();
    let districts: Vec<&str> = records.iter().map(|r| r.record.district.as_str()).collect();
    let pincodes: Vec<&str> = records.iter().map(|r| r.record.pincode.as_str()).collect();
    let months: Vec<Option<&str>> = records.iter().map(|r| r.month.as_deref()).collect();
    let age_0_5: Vec<u64> = records.iter().map(|r| r.record.age_0_5).collect();
    let age_5_17: Vec<u64> = records.iter().map(|r| r.record.age_5_17).collect();
    let age_18_greater: Vec<u64> = records.iter().map(|r| r.record.age_18_greater).collect();
    let totals: Vec<u64> = records.iter().map(|r| r.total_activity).collect();

    Ok(DataFrame::new(vec![
        Series::new("state", states),
        Series::new("district", districts),
        Series::new("pincode", pincodes),
        Series::new("month", months),
        Series::new("age_0_5", age_0_5),
        Series::new("age_5_17", age_5_17),
        Series::new("age_18_greater", age_18_greater),
        Series::new("total_activity", totals),
    ])?)
}

/// `part / total_activity`, 0 where the district is idle
fn share_expr(part: &str, alias: &str) -> Expr {
    when(col("total_activity").eq(lit(0u64)))
        .then(lit(0.0))
        .otherwise(col(part).cast(DataType::Float64) / col("total_activity").cast(DataType::Float64))
        .alias(alias)
}

/// Group by (state, district), ordered by state then district
pub fn district_frame(activity: &DataFrame) -> crate::Result<DataFrame> {
    Ok(activity
        .clone()
        .lazy()
        .group_by([col("state"), col("district")])
        .agg([
            col("age_0_5").sum(),
            col("age_5_17").sum(),
            col("age_18_greater").sum(),
            col("total_activity").sum(),
        ])
        .with_columns([
            share_expr("age_5_17", "student_share"),
            share_expr("age_0_5", "birth_share"),
        ])
        .sort_by_exprs([col("state"), col("district")], SortMultipleOptions::default())
        .collect()?)
}

/// District profiles in state, district order
pub fn profile_districts(activity: &DataFrame) -> crate::Result<Vec<DistrictProfile>> {
    let df = district_frame(activity)?;

    let states = df.column("state")?.str()?;
    let districts = df.column("district")?.str()?;
    let age_0_5 = df.column("age_0_5")?.u64()?;
    let age_5_17 = df.column("age_5_17")?.u64()?;
    let age_18_greater = df.column("age_18_greater")?.u64()?;
    let totals = df.column("total_activity")?.u64()?;
    let student = df.column("student_share")?.f64()?;
    let birth = df.column("birth_share")?.f64()?;

    Ok((0..df.height())
        .map(|idx| DistrictProfile {
            state: states.get(idx).unwrap_or_default().to_string(),
            district: districts.get(idx).unwrap_or_default().to_string(),
            age_0_5: age_0_5.get(idx).unwrap_or(0),
            age_5_17: age_5_17.get(idx).unwrap_or(0),
            age_18_greater: age_18_greater.get(idx).unwrap_or(0),
            total_activity: totals.get(idx).unwrap_or(0),
            student_share: student.get(idx).unwrap_or(0.0),
            birth_share: birth.get(idx).unwrap_or(0.0),
        })
        .collect())
}

/// Sum `total_activity` per `key`, skipping null keys, ordered by key
fn sum_activity_by(activity: &DataFrame, key: &str) -> crate::Result<Vec<(String, u64)>> {
    let df = activity
        .clone()
        .lazy()
        .filter(col(key).is_not_null())
        .group_by([col(key)])
        .agg([col("total_activity").sum()])
        .sort_by_exprs([col(key)], SortMultipleOptions::default())
        .collect()?;

    let keys = df.column(key)?.str()?;
    let totals = df.column("total_activity")?.u64()?;
    Ok(keys
        .into_iter()
        .zip(totals)
        .filter_map(|(k, total)| Some((k?.to_string(), total.unwrap_or(0))))
        .collect())
}

/// Sum activity per pincode, ordered by pincode label
pub fn profile_pincodes(activity: &DataFrame) -> crate::Result<Vec<PincodeActivity>> {
    Ok(sum_activity_by(activity, "pincode")?
        .into_iter()
        .map(|(pincode, total_activity)| PincodeActivity {
            pincode,
            total_activity,
        })
        .collect())
}

/// Activity per calendar month. Records without a date are left out.
pub fn monthly_trend(activity: &DataFrame) -> crate::Result<Vec<MonthlyActivity>> {
    Ok(sum_activity_by(activity, "month")?
        .into_iter()
        .map(|(month, total_activity)| MonthlyActivity { month, total_activity })
        .collect())
}

/// Median district volume (mean of the middle pair for even counts)
pub fn median_activity(profiles: &[DistrictProfile]) -> Option<f64> {
    let volumes: Vec<u64> = profiles.iter().map(|p| p.total_activity).collect();
    Series::new("total_activity", volumes).median()
}
