//! Binary key layout for DDL metadata.
//!
//! All keys live under the schema namespace and append fixed-size numeric
//! ids in native 8-byte encoding:
//!
//! - `SCHEMA_IDENTIFY || DDLWORK_IDENTIFY || table_id` -> serialized job
//! - `SCHEMA_IDENTIFY || GLOBAL_DDLWORK_REGION_IDENTIFY || table_id || region_id`
//!   -> serialized region work
//!
//! Region rows for a job are removed with one range delete over
//! `[region_work_prefix(t), region_work_range_end(t))`.

use odl_common::{RegionId, TableId};

/// Namespace byte for all schema metadata.
pub const SCHEMA_IDENTIFY: u8 = 0x01;
/// Sub-namespace for table-level DDL job records.
pub const DDLWORK_IDENTIFY: u8 = 0x06;
/// Sub-namespace for per-region DDL work records.
pub const GLOBAL_DDLWORK_REGION_IDENTIFY: u8 = 0x07;

/// Key of one table's DDL job record.
pub fn ddl_job_key(table_id: TableId) -> Vec<u8> {
    let mut key = vec![SCHEMA_IDENTIFY, DDLWORK_IDENTIFY];
    key.extend_from_slice(&table_id.0.to_ne_bytes());
    key
}

/// Prefix under which all DDL job records live.
pub fn ddl_job_prefix() -> Vec<u8> {
    vec![SCHEMA_IDENTIFY, DDLWORK_IDENTIFY]
}

/// Prefix under which all region work records live, across all tables.
pub fn region_work_namespace() -> Vec<u8> {
    vec![SCHEMA_IDENTIFY, GLOBAL_DDLWORK_REGION_IDENTIFY]
}

/// Key of one region's work record.
pub fn region_work_key(table_id: TableId, region_id: RegionId) -> Vec<u8> {
    let mut key = region_work_prefix(table_id);
    key.extend_from_slice(&region_id.0.to_ne_bytes());
    key
}

/// Prefix under which all of a table's region work records live.
pub fn region_work_prefix(table_id: TableId) -> Vec<u8> {
    let mut key = vec![SCHEMA_IDENTIFY, GLOBAL_DDLWORK_REGION_IDENTIFY];
    key.extend_from_slice(&table_id.0.to_ne_bytes());
    key
}

/// Exclusive upper bound for the range delete of a table's region rows.
pub fn region_work_range_end(table_id: TableId) -> Vec<u8> {
    let mut key = region_work_prefix(table_id);
    key.extend_from_slice(&[0xFF; 8]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_keys_sit_inside_their_table_range() {
        let t = TableId(42);
        let begin = region_work_prefix(t);
        let end = region_work_range_end(t);
        for region in [0_i64, 1, 7, i64::MAX] {
            let key = region_work_key(t, RegionId(region));
            assert!(key.as_slice() >= begin.as_slice());
            assert!(key.as_slice() < end.as_slice());
        }
    }

    #[test]
    fn job_and_region_namespaces_are_disjoint() {
        let t = TableId(1);
        assert_ne!(ddl_job_key(t)[1], region_work_key(t, RegionId(1))[1]);
        assert!(ddl_job_key(t).starts_with(&ddl_job_prefix()));
    }
}
