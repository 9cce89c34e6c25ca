//! Building logical schemas from raw catalogs and rules.
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use rulestore::types::{DataNode, RuleConfigurationSet};
use serde::Serialize;
use tracing::debug;

use crate::catalog::{ColumnMetadata, RawCatalog};
use crate::errors::{MetadataBuildError, Result};

/// Where the rows of a logical table live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TableKind {
    /// Not covered by a sharding rule. Backed by a single physical table of
    /// the same name.
    Plain { data_node: DataNode },
    /// Covered by a sharding rule.
    Sharded { data_nodes: Vec<DataNode> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalTable {
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
    pub kind: TableKind,
}

impl LogicalTable {
    pub const fn is_sharded(&self) -> bool {
        matches!(self.kind, TableKind::Sharded { .. })
    }

    /// Position of a column by name, compared case-insensitively.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// The logical view of a single schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalSchema {
    pub name: String,
    /// Logical tables. Sharded tables first in rule order, then plain tables
    /// in catalog order.
    pub tables: IndexMap<String, LogicalTable>,
    /// Rules this schema was built with.
    pub rules: Arc<RuleConfigurationSet>,
}

impl LogicalSchema {
    pub fn table(&self, name: &str) -> Option<&LogicalTable> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub fn rules_version(&self) -> u64 {
        self.rules.version
    }
}

/// Build the logical schema for `schema`.
///
/// A sharded logical table takes its columns from the first of its data
/// nodes present in the catalog. Physical tables not claimed by any sharding
/// rule become plain tables. A physical table sharing its name with a sharded
/// logical table is hidden by the rule.
pub fn build(
    schema: &str,
    catalog: &RawCatalog,
    rules: Arc<RuleConfigurationSet>,
) -> Result<LogicalSchema> {
    if rules.schema != schema {
        return Err(MetadataBuildError::SchemaMismatch {
            schema: schema.to_string(),
            rules: rules.schema.clone(),
        });
    }

    let mut tables = IndexMap::new();
    let mut claimed: HashSet<&DataNode> = HashSet::new();

    if let Some(sharding) = &rules.sharding {
        for rule in &sharding.tables {
            claimed.extend(rule.data_nodes.iter());

            let columns = match rule.data_nodes.iter().find_map(|node| catalog.find(node)) {
                Some(physical) => physical.columns.clone(),
                None => {
                    debug!(%schema, table = %rule.logic_table, "no data nodes found in catalog for sharded table");
                    continue;
                }
            };

            tables.insert(
                rule.logic_table.clone(),
                LogicalTable {
                    name: rule.logic_table.clone(),
                    columns,
                    kind: TableKind::Sharded {
                        data_nodes: rule.data_nodes.clone(),
                    },
                },
            );
        }
    }

    for physical in &catalog.tables {
        let node = physical.data_node();
        if claimed.contains(&node) || rules.is_sharded(&physical.name) {
            continue;
        }

        if let Some(existing) = tables.get(&physical.name) {
            if let LogicalTable {
                kind: TableKind::Plain { .. },
                ..
            } = existing
            {
                return Err(MetadataBuildError::DuplicateLogicalTable {
                    schema: schema.to_string(),
                    table: physical.name.clone(),
                });
            }
            continue;
        }

        tables.insert(
            physical.name.clone(),
            LogicalTable {
                name: physical.name.clone(),
                columns: physical.columns.clone(),
                kind: TableKind::Plain { data_node: node },
            },
        );
    }

    Ok(LogicalSchema {
        name: schema.to_string(),
        tables,
        rules,
    })
}
