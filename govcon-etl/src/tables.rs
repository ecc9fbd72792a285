//! Table mappings
//!
//! Each destination table is described once, as data: the source shards'
//! file stem, the natural key, and an ordered list of
//! source column → field kind → destination column. The loader, reader
//! and writer are generic over these descriptions.

use crate::fields::FieldKind;

/// SQLite's default cap on bound parameters per statement
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

/// One source column and where it lands
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Header name in the export (matched case-insensitively)
    pub source: &'static str,
    /// Column in the destination table
    pub dest: &'static str,
    pub kind: FieldKind,
}

impl ColumnSpec {
    pub const fn new(source: &'static str, dest: &'static str, kind: FieldKind) -> Self {
        Self { source, dest, kind }
    }
}

/// Destination table description
#[derive(Debug)]
pub struct TableSpec {
    pub table: &'static str,
    /// Shards are `<file_stem>*.csv.gz` in the import directory
    pub file_stem: &'static str,
    /// Natural-key destination columns, the ON CONFLICT target
    pub key_columns: &'static [&'static str],
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    /// Destination columns in bind order
    pub fn dest_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.dest)
    }

    /// Columns overwritten on conflict (everything outside the key)
    pub fn update_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .map(|c| c.dest)
            .filter(move |dest| !self.key_columns.contains(dest))
    }

    /// Largest batch whose bound parameters fit one statement
    pub fn max_batch_rows(&self) -> usize {
        (SQLITE_MAX_BIND_PARAMS / self.columns.len().max(1)).max(1)
    }
}

use FieldKind::*;

pub static CONTRACTOR_UNIVERSE: TableSpec = TableSpec {
    table: "contractor_universe",
    file_stem: "contractor_universe",
    key_columns: &["uei"],
    columns: &[
        ColumnSpec::new("UEI", "uei", Key),
        ColumnSpec::new("LEGAL_NAME", "legal_name", Text),
        ColumnSpec::new("PARENT_UEI", "parent_uei", Text),
        ColumnSpec::new("LIFETIME_REVENUE", "lifetime_revenue", Number),
        ColumnSpec::new("IS_ACTIVE", "is_active", Flag),
        ColumnSpec::new("IS_PRIME", "is_prime", Flag),
        ColumnSpec::new("IS_SUB", "is_sub", Flag),
        ColumnSpec::new("IS_HYBRID", "is_hybrid", Flag),
        ColumnSpec::new("FIRST_AWARD_DATE", "first_award_date", Date),
        ColumnSpec::new("LAST_AWARD_DATE", "last_award_date", Date),
        ColumnSpec::new("AGENCY_REVENUE", "agency_revenue", Json),
        ColumnSpec::new("NAICS_REVENUE", "naics_revenue", Json),
    ],
};

pub static MONTHLY_METRICS: TableSpec = TableSpec {
    table: "monthly_metrics",
    file_stem: "monthly_metrics",
    key_columns: &["uei", "month"],
    columns: &[
        ColumnSpec::new("UEI", "uei", Key),
        ColumnSpec::new("MONTH", "month", MonthKey),
        ColumnSpec::new("TOTAL_REVENUE", "total_revenue", Number),
        ColumnSpec::new("PRIME_REVENUE", "prime_revenue", Number),
        ColumnSpec::new("SUB_REVENUE", "sub_revenue", Number),
        ColumnSpec::new("AWARD_AMOUNT", "award_amount", Number),
        ColumnSpec::new("CONTRACT_COUNT", "contract_count", Integer),
        ColumnSpec::new("REVENUE_GROWTH_PCT", "revenue_growth_pct", OptionalNumber),
        ColumnSpec::new("AWARD_GROWTH_PCT", "award_growth_pct", OptionalNumber),
    ],
};

pub static PEER_COMPARISONS: TableSpec = TableSpec {
    table: "peer_comparisons",
    file_stem: "peer_comparisons",
    key_columns: &["uei", "peer_group", "month"],
    columns: &[
        ColumnSpec::new("UEI", "uei", Key),
        ColumnSpec::new("PEER_GROUP", "peer_group", Key),
        ColumnSpec::new("MONTH", "month", MonthKey),
        ColumnSpec::new("REVENUE_PERCENTILE", "revenue_percentile", OptionalNumber),
        ColumnSpec::new("GROWTH_PERCENTILE", "growth_percentile", OptionalNumber),
        ColumnSpec::new(
            "CONTRACT_COUNT_PERCENTILE",
            "contract_count_percentile",
            OptionalNumber,
        ),
        ColumnSpec::new("PEER_COUNT", "peer_count", Integer),
    ],
};

pub static NETWORK_RELATIONSHIPS: TableSpec = TableSpec {
    table: "network_relationships",
    file_stem: "network_relationships",
    key_columns: &["prime_uei", "sub_uei", "month"],
    columns: &[
        ColumnSpec::new("PRIME_UEI", "prime_uei", Key),
        ColumnSpec::new("SUB_UEI", "sub_uei", Key),
        ColumnSpec::new("MONTH", "month", MonthKey),
        ColumnSpec::new("SHARED_REVENUE", "shared_revenue", Number),
        ColumnSpec::new("SHARED_CONTRACTS", "shared_contracts", Integer),
        ColumnSpec::new("RELATIONSHIP_STRENGTH", "relationship_strength", OptionalNumber),
    ],
};

/// Written by the iceberg pass, not imported from files
pub static ICEBERG_OPPORTUNITIES: TableSpec = TableSpec {
    table: "iceberg_opportunities",
    file_stem: "iceberg_opportunities",
    key_columns: &["uei"],
    columns: &[
        ColumnSpec::new("UEI", "uei", Key),
        ColumnSpec::new("PRIME_REVENUE", "prime_revenue", Number),
        ColumnSpec::new("SUB_REVENUE", "sub_revenue", Number),
        ColumnSpec::new("TOTAL_REVENUE", "total_revenue", Number),
        ColumnSpec::new("SUB_TO_PRIME_RATIO", "sub_to_prime_ratio", OptionalNumber),
        ColumnSpec::new("HIDDEN_REVENUE_PCT", "hidden_revenue_pct", Number),
        ColumnSpec::new("OPPORTUNITY_SCORE", "opportunity_score", Number),
        ColumnSpec::new("OPPORTUNITY_TIER", "opportunity_tier", Text),
    ],
};

/// Import tables in load order
pub static IMPORT_TABLES: [&TableSpec; 4] = [
    &CONTRACTOR_UNIVERSE,
    &MONTHLY_METRICS,
    &PEER_COMPARISONS,
    &NETWORK_RELATIONSHIPS,
];

/// Look up an import table by destination name
pub fn import_table(name: &str) -> Option<&'static TableSpec> {
    IMPORT_TABLES.iter().copied().find(|t| t.table == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_column_is_mapped_with_key_kind() {
        for spec in IMPORT_TABLES.iter().chain([&&ICEBERG_OPPORTUNITIES]) {
            for key in spec.key_columns {
                let column = spec
                    .columns
                    .iter()
                    .find(|c| c.dest == *key)
                    .unwrap_or_else(|| panic!("{}: key {} not mapped", spec.table, key));
                assert!(column.kind.is_key(), "{}: {} must be a key kind", spec.table, key);
            }
        }
    }

    #[test]
    fn test_update_columns_exclude_key() {
        let updates: Vec<_> = MONTHLY_METRICS.update_columns().collect();
        assert!(!updates.contains(&"uei"));
        assert!(!updates.contains(&"month"));
        assert_eq!(updates.len(), MONTHLY_METRICS.columns.len() - 2);
    }

    #[test]
    fn test_max_batch_rows_respects_bind_limit() {
        let rows = CONTRACTOR_UNIVERSE.max_batch_rows();
        assert!(rows * CONTRACTOR_UNIVERSE.columns.len() <= SQLITE_MAX_BIND_PARAMS);
        assert!(rows >= 1000);
    }

    #[test]
    fn test_import_table_lookup() {
        assert_eq!(import_table("peer_comparisons").map(|t| t.table), Some("peer_comparisons"));
        assert!(import_table("iceberg_opportunities").is_none());
    }
}
