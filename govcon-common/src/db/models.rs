//! Read-side record models and lookups for derived tables

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::SqlitePool;

/// One category of a top-N revenue breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    pub category: String,
    pub revenue: f64,
    /// Share of total revenue, 0-100
    pub percentage: f64,
}

/// Iceberg opportunity row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IcebergOpportunity {
    pub uei: String,
    pub prime_revenue: f64,
    pub sub_revenue: f64,
    pub total_revenue: f64,
    pub sub_to_prime_ratio: Option<f64>,
    pub hidden_revenue_pct: f64,
    pub opportunity_score: f64,
    pub opportunity_tier: String,
    pub updated_at: DateTime<Utc>,
}

/// Deduplicated company across one or more UEIs
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContractorProfile {
    pub id: i64,
    pub profile_key: String,
    pub display_name: String,
    pub primary_uei: String,
    pub uei_count: i64,
    pub total_lifetime_revenue: f64,
    pub is_active: bool,
    pub is_prime: bool,
    pub is_sub: bool,
    pub is_hybrid: bool,
    pub avg_revenue_percentile: Option<f64>,
    pub avg_growth_percentile: Option<f64>,
    pub agency_hhi: f64,
    pub concentration_risk: String,
    pub top_agencies: Json<Vec<CategoryShare>>,
    pub top_naics: Json<Vec<CategoryShare>>,
    pub updated_at: DateTime<Utc>,
}

/// Profile plus the UEIs mapped to it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileWithMembers {
    #[serde(flatten)]
    pub profile: ContractorProfile,
    pub ueis: Vec<String>,
}

pub async fn fetch_iceberg(pool: &SqlitePool, uei: &str) -> Result<Option<IcebergOpportunity>> {
    let record = sqlx::query_as::<_, IcebergOpportunity>(
        r#"
        SELECT uei, prime_revenue, sub_revenue, total_revenue, sub_to_prime_ratio,
               hidden_revenue_pct, opportunity_score, opportunity_tier, updated_at
        FROM iceberg_opportunities
        WHERE uei = ?
        "#,
    )
    .bind(uei)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn fetch_profile(
    pool: &SqlitePool,
    profile_key: &str,
) -> Result<Option<ProfileWithMembers>> {
    let profile = sqlx::query_as::<_, ContractorProfile>(
        r#"
        SELECT id, profile_key, display_name, primary_uei, uei_count, total_lifetime_revenue,
               is_active, is_prime, is_sub, is_hybrid, avg_revenue_percentile,
               avg_growth_percentile, agency_hhi, concentration_risk, top_agencies,
               top_naics, updated_at
        FROM contractor_profiles
        WHERE profile_key = ?
        "#,
    )
    .bind(profile_key)
    .fetch_optional(pool)
    .await?;

    let Some(profile) = profile else {
        return Ok(None);
    };

    let ueis: Vec<String> = sqlx::query_scalar(
        "SELECT uei FROM profile_uei_map WHERE profile_key = ? ORDER BY uei",
    )
    .bind(profile_key)
    .fetch_all(pool)
    .await?;

    Ok(Some(ProfileWithMembers { profile, ueis }))
}

/// Profile a UEI is mapped to
pub async fn fetch_profile_for_uei(
    pool: &SqlitePool,
    uei: &str,
) -> Result<Option<ProfileWithMembers>> {
    let key: Option<String> =
        sqlx::query_scalar("SELECT profile_key FROM profile_uei_map WHERE uei = ?")
            .bind(uei)
            .fetch_optional(pool)
            .await?;

    match key {
        Some(key) => fetch_profile(pool, &key).await,
        None => Ok(None),
    }
}
