//! redb table definitions for the appgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized documents).

use redb::TableDefinition;

/// Appset documents keyed by appset name.
pub const APPSETS: TableDefinition<&str, &[u8]> = TableDefinition::new("appsets");

/// Repair policies keyed by `{repair_template_id}:{app_container_id}`.
pub const REPAIR_POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("repair_policies");

/// Repair records keyed by `{repair_id}`.
pub const REPAIR_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("repair_records");
