//! Raw table catalogs as reported by physical backends.
use std::collections::HashMap;

use async_trait::async_trait;
use common::config::SchemaBootstrap;
use coretypes::datatype::DataType;
use coretypes::BoxError;
use parking_lot::RwLock;
use rulestore::types::DataNode;
use serde::{Deserialize, Serialize};

use crate::errors::{MetadataBuildError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub datatype: DataType,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        ColumnMetadata {
            name: name.into(),
            datatype,
        }
    }
}

/// A single table on a physical data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalTable {
    pub data_source: String,
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl PhysicalTable {
    pub fn new(
        data_source: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnMetadata>,
    ) -> Self {
        PhysicalTable {
            data_source: data_source.into(),
            name: name.into(),
            columns,
        }
    }

    pub fn data_node(&self) -> DataNode {
        DataNode::new(self.data_source.clone(), self.name.clone())
    }
}

/// Every physical table visible to a schema, in the order the backends
/// reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCatalog {
    pub tables: Vec<PhysicalTable>,
}

impl RawCatalog {
    pub fn new(tables: Vec<PhysicalTable>) -> Self {
        RawCatalog { tables }
    }

    pub fn with_table(mut self, table: PhysicalTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn find(&self, node: &DataNode) -> Option<&PhysicalTable> {
        self.tables
            .iter()
            .find(|t| t.data_source == node.data_source && t.name == node.table)
    }
}

/// Source for fetching the raw catalog of a schema from its backends.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self, schema: &str) -> Result<RawCatalog, BoxError>;
}

/// A catalog source backed by catalogs held in memory.
#[derive(Debug, Default)]
pub struct StaticCatalogSource {
    catalogs: RwLock<HashMap<String, RawCatalog>>,
}

impl StaticCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from static schema descriptions.
    pub fn from_bootstrap(schemas: &[SchemaBootstrap]) -> Result<Self> {
        let source = Self::new();
        for schema in schemas {
            let mut catalog = RawCatalog::default();
            for table in &schema.tables {
                let columns = table
                    .columns
                    .iter()
                    .map(|col| {
                        let datatype = col.data_type.parse::<DataType>().map_err(|e| {
                            MetadataBuildError::InvalidCatalog(format!(
                                "{}.{}.{}: {e}",
                                table.data_source, table.name, col.name
                            ))
                        })?;
                        Ok(ColumnMetadata::new(col.name.clone(), datatype))
                    })
                    .collect::<Result<Vec<_>>>()?;
                catalog.tables.push(PhysicalTable::new(
                    table.data_source.clone(),
                    table.name.clone(),
                    columns,
                ));
            }
            source.insert(&schema.name, catalog);
        }
        Ok(source)
    }

    /// Set the catalog for a schema, replacing any existing one.
    pub fn insert(&self, schema: &str, catalog: RawCatalog) {
        self.catalogs.write().insert(schema.to_string(), catalog);
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch_catalog(&self, schema: &str) -> Result<RawCatalog, BoxError> {
        match self.catalogs.read().get(schema) {
            Some(catalog) => Ok(catalog.clone()),
            None => Err(format!("no catalog for schema '{schema}'").into()),
        }
    }
}
