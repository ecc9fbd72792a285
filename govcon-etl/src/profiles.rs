//! Contractor profile aggregation
//!
//! Full rebuild: every UEI in `contractor_universe` is assigned to a
//! profile group, each group is summarized into one `contractor_profiles`
//! row, and `profile_uei_map` records the assignment. Profiles not
//! regenerated by the current rebuild are marked inactive, never deleted.

use crate::error::LoadError;
use crate::loader::{finish_load, LoadOptions, LoadProgress, LoadReport};
use crate::metrics::{self, RevenueBreakdown, TOP_N};
use chrono::Utc;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Trailing words dropped when normalizing a legal name
const CORPORATE_SUFFIXES: &[&[&str]] = &[
    &["L", "L", "C"],
    &["LLC"],
    &["INC"],
    &["INCORPORATED"],
    &["CORP"],
    &["CORPORATION"],
    &["CO"],
    &["COMPANY"],
    &["LTD"],
    &["LP"],
    &["LLP"],
    &["PLLC"],
    &["PC"],
];

/// Outcome of a rebuild
#[derive(Debug, Clone, Serialize)]
pub struct ProfileRebuildSummary {
    pub rebuild_id: String,
    /// Profiles written by this rebuild
    pub profiles_created: u64,
    pub ueis_mapped: u64,
    /// Profiles from earlier rebuilds that no longer have members
    pub profiles_deactivated: u64,
    /// Row-level errors; none of them abort the rebuild
    pub errors: Vec<String>,
    pub report: LoadReport,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MemberRow {
    uei: String,
    legal_name: Option<String>,
    parent_uei: Option<String>,
    lifetime_revenue: f64,
    is_active: bool,
    is_prime: bool,
    is_sub: bool,
    is_hybrid: bool,
    agency_revenue: Option<String>,
    naics_revenue: Option<String>,
}

/// Latest-month peer percentiles of one UEI
#[derive(Debug, Clone, Copy, Default)]
struct Percentiles {
    revenue: Option<f64>,
    growth: Option<f64>,
}

/// Aggregate of one profile group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDraft {
    pub profile_key: String,
    pub display_name: String,
    pub primary_uei: String,
    pub ueis: Vec<String>,
    pub total_lifetime_revenue: f64,
    pub is_active: bool,
    pub is_prime: bool,
    pub is_sub: bool,
    pub is_hybrid: bool,
    pub avg_revenue_percentile: Option<f64>,
    pub avg_growth_percentile: Option<f64>,
    pub agency_hhi: f64,
    pub concentration_risk: &'static str,
    pub top_agencies: Vec<govcon_common::db::CategoryShare>,
    pub top_naics: Vec<govcon_common::db::CategoryShare>,
}

/// Upper-case, strip punctuation and trailing corporate suffixes
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                ' '
            }
        })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();

    loop {
        let suffix = CORPORATE_SUFFIXES
            .iter()
            .find(|s| words.len() > s.len() && words.ends_with(s));
        match suffix {
            Some(s) => words.truncate(words.len() - s.len()),
            None => break,
        }
    }

    words.join(" ")
}

/// Group key: parent UEI, else the UEI's own `parent:` group when other
/// rows name it as their parent, else normalized legal name, else the UEI
pub fn profile_key(
    uei: &str,
    legal_name: Option<&str>,
    parent_uei: Option<&str>,
    known_parents: &HashSet<String>,
) -> String {
    if let Some(parent) = parent_uei.map(str::trim).filter(|p| !p.is_empty()) {
        return format!("parent:{}", parent.to_ascii_uppercase());
    }

    let own = uei.trim().to_ascii_uppercase();
    if known_parents.contains(&own) {
        return format!("parent:{}", own);
    }

    let name = legal_name.map(normalize_name).unwrap_or_default();
    if name.is_empty() {
        format!("uei:{}", uei)
    } else {
        format!("name:{}", name)
    }
}

/// UEIs that at least one row names as its parent, upper-cased
fn referenced_parents(members: &[MemberRow]) -> HashSet<String> {
    members
        .iter()
        .filter_map(|m| m.parent_uei.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

/// Parse a category → revenue JSON object; absent means empty
pub fn parse_breakdown(json: Option<&str>) -> Result<RevenueBreakdown, String> {
    let Some(json) = json else {
        return Ok(RevenueBreakdown::new());
    };

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    let mut breakdown = RevenueBreakdown::with_capacity(object.len());
    for (category, revenue) in object {
        match revenue {
            serde_json::Value::Null => {}
            serde_json::Value::Number(n) => {
                breakdown.insert(category.clone(), n.as_f64().unwrap_or(0.0));
            }
            other => return Err(format!("{} has non-numeric revenue {}", category, other)),
        }
    }

    Ok(breakdown)
}

fn merge_into(target: &mut RevenueBreakdown, source: RevenueBreakdown) {
    for (category, revenue) in source {
        *target.entry(category).or_insert(0.0) += revenue;
    }
}

/// Collapse member rows into profile drafts, keyed by profile key
fn build_drafts(
    members: Vec<MemberRow>,
    percentiles: &HashMap<String, Percentiles>,
    errors: &mut Vec<String>,
) -> BTreeMap<String, ProfileDraft> {
    let parents = referenced_parents(&members);
    let mut groups: BTreeMap<String, Vec<MemberRow>> = BTreeMap::new();
    for member in members {
        let key = profile_key(
            &member.uei,
            member.legal_name.as_deref(),
            member.parent_uei.as_deref(),
            &parents,
        );
        groups.entry(key).or_default().push(member);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let draft = summarize_group(&key, members, percentiles, errors);
            (key, draft)
        })
        .collect()
}

fn summarize_group(
    key: &str,
    mut members: Vec<MemberRow>,
    percentiles: &HashMap<String, Percentiles>,
    errors: &mut Vec<String>,
) -> ProfileDraft {
    // Highest lifetime revenue first; ties by UEI
    members.sort_by(|a, b| {
        b.lifetime_revenue
            .total_cmp(&a.lifetime_revenue)
            .then_with(|| a.uei.cmp(&b.uei))
    });
    let primary = &members[0];

    let mut agencies = RevenueBreakdown::new();
    let mut naics = RevenueBreakdown::new();
    for member in &members {
        match parse_breakdown(member.agency_revenue.as_deref()) {
            Ok(b) => merge_into(&mut agencies, b),
            Err(e) => errors.push(format!("{}: agency_revenue {}", member.uei, e)),
        }
        match parse_breakdown(member.naics_revenue.as_deref()) {
            Ok(b) => merge_into(&mut naics, b),
            Err(e) => errors.push(format!("{}: naics_revenue {}", member.uei, e)),
        }
    }

    let any_prime = members.iter().any(|m| m.is_prime);
    let any_sub = members.iter().any(|m| m.is_sub);
    let member_percentiles: Vec<Percentiles> = members
        .iter()
        .map(|m| percentiles.get(&m.uei).copied().unwrap_or_default())
        .collect();
    let raw_hhi = metrics::raw_hhi(&agencies);

    let mut ueis: Vec<String> = members.iter().map(|m| m.uei.clone()).collect();
    ueis.sort();

    ProfileDraft {
        profile_key: key.to_string(),
        display_name: primary
            .legal_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| primary.uei.clone()),
        primary_uei: primary.uei.clone(),
        total_lifetime_revenue: members.iter().map(|m| m.lifetime_revenue).sum(),
        is_active: members.iter().any(|m| m.is_active),
        is_prime: any_prime,
        is_sub: any_sub,
        is_hybrid: members.iter().any(|m| m.is_hybrid) || (any_prime && any_sub),
        avg_revenue_percentile: metrics::mean(member_percentiles.iter().filter_map(|p| p.revenue)),
        avg_growth_percentile: metrics::mean(member_percentiles.iter().filter_map(|p| p.growth)),
        agency_hhi: raw_hhi / 10_000.0,
        concentration_risk: metrics::concentration_risk(raw_hhi),
        top_agencies: metrics::top_categories(&agencies, TOP_N),
        top_naics: metrics::top_categories(&naics, TOP_N),
        ueis,
    }
}

async fn fetch_members(pool: &SqlitePool) -> sqlx::Result<Vec<MemberRow>> {
    sqlx::query_as::<_, MemberRow>(
        r#"
        SELECT uei, legal_name, parent_uei, lifetime_revenue, is_active, is_prime,
               is_sub, is_hybrid, agency_revenue, naics_revenue
        FROM contractor_universe
        ORDER BY uei
        "#,
    )
    .fetch_all(pool)
    .await
}

async fn fetch_latest_percentiles(pool: &SqlitePool) -> sqlx::Result<HashMap<String, Percentiles>> {
    let rows = sqlx::query_as::<_, (String, Option<f64>, Option<f64>)>(
        r#"
        SELECT p.uei, AVG(p.revenue_percentile), AVG(p.growth_percentile)
        FROM peer_comparisons p
        JOIN (
            SELECT uei, MAX(month) AS month FROM peer_comparisons GROUP BY uei
        ) latest ON latest.uei = p.uei AND latest.month = p.month
        GROUP BY p.uei
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(uei, revenue, growth)| (uei, Percentiles { revenue, growth }))
        .collect())
}

/// Upsert one profile and its UEI mappings in a single transaction
async fn write_profile(
    pool: &SqlitePool,
    draft: &ProfileDraft,
    rebuild_id: &str,
) -> Result<(), LoadError> {
    let top_agencies = serde_json::to_string(&draft.top_agencies)?;
    let top_naics = serde_json::to_string(&draft.top_naics)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO contractor_profiles (
            profile_key, display_name, primary_uei, uei_count, total_lifetime_revenue,
            is_active, is_prime, is_sub, is_hybrid, avg_revenue_percentile,
            avg_growth_percentile, agency_hhi, concentration_risk, top_agencies,
            top_naics, last_rebuild_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(profile_key) DO UPDATE SET
            display_name = excluded.display_name,
            primary_uei = excluded.primary_uei,
            uei_count = excluded.uei_count,
            total_lifetime_revenue = excluded.total_lifetime_revenue,
            is_active = excluded.is_active,
            is_prime = excluded.is_prime,
            is_sub = excluded.is_sub,
            is_hybrid = excluded.is_hybrid,
            avg_revenue_percentile = excluded.avg_revenue_percentile,
            avg_growth_percentile = excluded.avg_growth_percentile,
            agency_hhi = excluded.agency_hhi,
            concentration_risk = excluded.concentration_risk,
            top_agencies = excluded.top_agencies,
            top_naics = excluded.top_naics,
            last_rebuild_id = excluded.last_rebuild_id,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&draft.profile_key)
    .bind(&draft.display_name)
    .bind(&draft.primary_uei)
    .bind(draft.ueis.len() as i64)
    .bind(draft.total_lifetime_revenue)
    .bind(draft.is_active)
    .bind(draft.is_prime)
    .bind(draft.is_sub)
    .bind(draft.is_hybrid)
    .bind(draft.avg_revenue_percentile)
    .bind(draft.avg_growth_percentile)
    .bind(draft.agency_hhi)
    .bind(draft.concentration_risk)
    .bind(top_agencies)
    .bind(top_naics)
    .bind(rebuild_id)
    .execute(&mut *tx)
    .await?;

    for uei in &draft.ueis {
        sqlx::query(
            r#"
            INSERT INTO profile_uei_map (uei, profile_key)
            VALUES (?, ?)
            ON CONFLICT(uei) DO UPDATE SET
                profile_key = excluded.profile_key,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(uei)
        .bind(&draft.profile_key)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn profile_count(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM contractor_profiles")
        .fetch_one(pool)
        .await
}

/// Regenerate every profile from current data
pub async fn rebuild_profiles(pool: &SqlitePool, options: &LoadOptions) -> ProfileRebuildSummary {
    let started_at = Utc::now();
    let timer = Instant::now();
    let rebuild_id = Uuid::new_v4().to_string();
    info!(rebuild_id = %rebuild_id, "Starting contractor profile rebuild");

    let mut progress = LoadProgress::default();
    let mut ueis_mapped = 0u64;
    let mut profiles_deactivated = 0u64;
    let mut created_rows = 0i64;

    let inputs = async {
        let before = profile_count(pool).await?;
        let members = fetch_members(pool).await?;
        let percentiles = fetch_latest_percentiles(pool).await?;
        Ok::<_, sqlx::Error>((before, members, percentiles))
    }
    .await;

    let fatal = match inputs {
        Ok((before, members, percentiles)) => {
            let drafts = build_drafts(members, &percentiles, &mut progress.errors);
            progress.processed = drafts.len() as u64;

            let mut unwritten: Vec<&str> = Vec::new();
            for draft in drafts.values() {
                progress.batches += 1;
                match write_profile(pool, draft, &rebuild_id).await {
                    Ok(()) => {
                        progress.inserted += 1;
                        ueis_mapped += draft.ueis.len() as u64;
                    }
                    Err(e) => {
                        warn!(profile_key = %draft.profile_key, error = %e, "Profile write failed");
                        progress.failed += 1;
                        progress.errors.push(format!("{}: {}", draft.profile_key, e));
                        unwritten.push(&draft.profile_key);
                    }
                }
            }

            match deactivate_stale(pool, &rebuild_id, &unwritten).await {
                Ok(n) => profiles_deactivated = n,
                Err(e) => progress.errors.push(format!("deactivate stale profiles: {}", e)),
            }

            created_rows = profile_count(pool)
                .await
                .map(|after| (after - before).max(0))
                .unwrap_or(0);
            None
        }
        Err(e) => Some(LoadError::from(e)),
    };

    let profiles_created = progress.inserted;
    let errors = progress.errors.clone();
    let report = finish_load(
        pool,
        "contractor_profiles",
        options,
        started_at,
        timer,
        progress,
        created_rows,
        fatal,
    )
    .await;

    info!(
        profiles = profiles_created,
        ueis = ueis_mapped,
        deactivated = profiles_deactivated,
        errors = errors.len(),
        "Contractor profile rebuild finished"
    );

    ProfileRebuildSummary {
        rebuild_id,
        profiles_created,
        ueis_mapped,
        profiles_deactivated,
        errors,
        report,
    }
}

/// Mark profiles untouched by this rebuild inactive
///
/// `unwritten` holds keys that still have members but whose write failed;
/// they keep their previous state.
async fn deactivate_stale(
    pool: &SqlitePool,
    rebuild_id: &str,
    unwritten: &[&str],
) -> sqlx::Result<u64> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "UPDATE contractor_profiles SET is_active = 0, updated_at = CURRENT_TIMESTAMP \
         WHERE is_active = 1 AND last_rebuild_id IS NOT ",
    );
    query.push_bind(rebuild_id);

    if !unwritten.is_empty() {
        query.push(" AND profile_key NOT IN (");
        let mut keys = query.separated(", ");
        for key in unwritten {
            keys.push_bind(*key);
        }
        keys.push_unseparated(")");
    }

    let result = query.build().execute(pool).await?;
    Ok(result.rows_affected())
}
