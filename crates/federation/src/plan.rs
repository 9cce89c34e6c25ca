//! Planning statements for federated execution.
use coretypes::scalar::ScalarValue;
use router::classify::{classify, JoinColumns, RouteDecision};
use router::route::{RouteRequest, Router};
use router::target::RouteTarget;
use schemameta::builder::LogicalSchema;
use schemameta::catalog::ColumnMetadata;
use tracing::debug;

use crate::aggregate::{AggregateOutput, AggregatePlan};
use crate::errors::{PlanError, Result};
use crate::join::JoinStep;
use crate::merge::{OutputPlan, SortKey};
use crate::physical::PhysicalQuery;
use crate::statement::{AggregateFunction, ColumnRef, SelectItem, SelectStatement};

/// A table of the statement bound to its metadata and route target.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBinding {
    /// Name the table is referenced by in the statement.
    pub reference: String,
    pub logic_table: String,
    pub columns: Vec<ColumnMetadata>,
    /// Position of this table's first column in the joined row.
    pub offset: usize,
    /// Equality filters pushed into every sub-query for this table.
    pub filters: Vec<(String, ScalarValue)>,
    pub target: RouteTarget,
}

impl TableBinding {
    /// Sub-queries for each physical target, in target order.
    pub fn sub_queries(&self, schema: &str) -> Vec<PhysicalQuery> {
        let columns: Vec<_> = self.columns.iter().map(|c| c.name.clone()).collect();
        self.target
            .nodes()
            .into_iter()
            .map(|node| PhysicalQuery {
                schema: schema.to_string(),
                logic_table: self.logic_table.clone(),
                data_node: node.data_node,
                shard_index: node.shard_index,
                columns: columns.clone(),
                filters: self.filters.clone(),
            })
            .collect()
    }
}

/// Everything needed to execute one statement across physical targets.
#[derive(Debug, Clone, PartialEq)]
pub struct FederationPlan {
    pub schema: String,
    /// Version of the rules the statement was routed with.
    pub rules_version: u64,
    pub decision: RouteDecision,
    /// Tables in FROM order.
    pub bindings: Vec<TableBinding>,
    /// `join_steps[i]` joins `bindings[i + 1]`.
    pub join_steps: Vec<JoinStep>,
    pub output: OutputPlan,
    pub column_names: Vec<String>,
}

impl FederationPlan {
    pub fn sub_query_count(&self) -> usize {
        self.bindings.iter().map(|b| b.target.target_count()).sum()
    }
}

/// Resolves column references against the bound tables.
struct Scope<'a> {
    tables: Vec<(&'a str, &'a [ColumnMetadata], usize)>,
}

impl<'a> Scope<'a> {
    /// Resolve to `(binding index, column index within the binding)`.
    fn resolve(&self, col: &ColumnRef) -> Result<(usize, usize), PlanError> {
        match &col.qualifier {
            Some(q) => {
                let (idx, (_, columns, _)) = self
                    .tables
                    .iter()
                    .enumerate()
                    .find(|(_, (name, _, _))| name.eq_ignore_ascii_case(q))
                    .ok_or_else(|| PlanError::UnknownQualifier(q.clone()))?;
                let col_idx = position(columns, &col.column)
                    .ok_or_else(|| PlanError::UnknownColumn(col.to_string()))?;
                Ok((idx, col_idx))
            }
            None => {
                let mut found = None;
                for (idx, (_, columns, _)) in self.tables.iter().enumerate() {
                    if let Some(col_idx) = position(columns, &col.column) {
                        if found.is_some() {
                            return Err(PlanError::AmbiguousColumn(col.column.clone()));
                        }
                        found = Some((idx, col_idx));
                    }
                }
                found.ok_or_else(|| PlanError::UnknownColumn(col.column.clone()))
            }
        }
    }

    /// Resolve to a position in the joined row.
    fn resolve_joined(&self, col: &ColumnRef) -> Result<usize, PlanError> {
        let (table, idx) = self.resolve(col)?;
        Ok(self.tables[table].2 + idx)
    }

    fn column(&self, table: usize, idx: usize) -> &'a ColumnMetadata {
        let columns: &'a [ColumnMetadata] = self.tables[table].1;
        &columns[idx]
    }
}

fn position(columns: &[ColumnMetadata], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
}

/// Bind, route and plan a statement.
///
/// Routing happens before any sub-query is issued, so an unknown table fails
/// the statement without touching any backend.
pub fn plan_statement(
    router: &Router,
    metadata: &LogicalSchema,
    stmt: &SelectStatement,
) -> Result<FederationPlan> {
    if stmt.from.is_empty() {
        return Err(PlanError::EmptyFrom.into());
    }

    // Bind tables to their columns.
    let mut bound: Vec<(&str, &[ColumnMetadata], usize)> = Vec::with_capacity(stmt.from.len());
    let mut offset = 0;
    for table_ref in &stmt.from {
        let reference = table_ref.reference_name();
        if bound.iter().any(|(r, _, _)| r.eq_ignore_ascii_case(reference)) {
            return Err(PlanError::DuplicateReference(reference.to_string()).into());
        }
        let columns: &[ColumnMetadata] = match metadata.table(&table_ref.table) {
            Some(table) => &table.columns,
            None => {
                return Err(router::errors::RouteResolutionError::UnknownTable {
                    schema: metadata.name.clone(),
                    table: table_ref.table.clone(),
                }
                .into())
            }
        };
        bound.push((reference, columns, offset));
        offset += columns.len();
    }
    let scope = Scope { tables: bound };

    // Push filters down to the table they reference.
    let mut filters: Vec<Vec<(String, ScalarValue)>> = vec![Vec::new(); stmt.from.len()];
    for filter in &stmt.filters {
        let (table, idx) = scope.resolve(&filter.column)?;
        filters[table].push((scope.column(table, idx).name.clone(), filter.value.clone()));
    }

    let requests: Vec<_> = stmt
        .from
        .iter()
        .zip(&filters)
        .map(|(table_ref, filters)| RouteRequest {
            table: table_ref.table.clone(),
            filters: filters.clone(),
        })
        .collect();
    let routed = router.route_requests(&metadata.name, &requests)?;

    // Join keys, attached to the step joining the later of the two tables.
    let mut join_steps = vec![JoinStep::default(); stmt.from.len() - 1];
    let mut join_columns = Vec::with_capacity(stmt.joins.len());
    for join in &stmt.joins {
        let left = scope.resolve(&join.left)?;
        let right = scope.resolve(&join.right)?;
        if left.0 == right.0 {
            return Err(PlanError::UnsupportedJoin(format!("{} = {}", join.left, join.right)).into());
        }
        join_columns.push(JoinColumns {
            left: left.0,
            left_column: scope.column(left.0, left.1).name.clone(),
            right: right.0,
            right_column: scope.column(right.0, right.1).name.clone(),
        });

        let (outer, inner) = if left.0 < right.0 {
            (left, right)
        } else {
            (right, left)
        };
        join_steps[inner.0 - 1]
            .keys
            .push((scope.tables[outer.0].2 + outer.1, inner.1));
    }

    let decision = classify(&routed.rules, &routed.targets, &join_columns);

    let (output, column_names) = if stmt.is_aggregate() {
        plan_aggregate(&scope, stmt)?
    } else {
        plan_projection(&scope, stmt)?
    };

    let bindings = scope
        .tables
        .iter()
        .zip(stmt.from.iter())
        .zip(filters)
        .zip(routed.targets)
        .map(|((((reference, columns, offset), table_ref), filters), target)| TableBinding {
            reference: reference.to_string(),
            logic_table: table_ref.table.clone(),
            columns: columns.to_vec(),
            offset: *offset,
            filters,
            target,
        })
        .collect();

    let plan = FederationPlan {
        schema: metadata.name.clone(),
        rules_version: routed.rules.version,
        decision,
        bindings,
        join_steps,
        output,
        column_names,
    };
    debug!(schema = %plan.schema, decision = ?plan.decision, sub_queries = plan.sub_query_count(), "planned statement");

    Ok(plan)
}

fn plan_projection(
    scope: &Scope<'_>,
    stmt: &SelectStatement,
) -> Result<(OutputPlan, Vec<String>), PlanError> {
    let mut columns = Vec::new();
    let mut names = Vec::new();
    let mut aliases: Vec<(String, usize)> = Vec::new();

    let push_table = |table: usize, columns: &mut Vec<usize>, names: &mut Vec<String>| {
        let (_, cols, offset) = scope.tables[table];
        for (idx, col) in cols.iter().enumerate() {
            columns.push(offset + idx);
            names.push(col.name.clone());
        }
    };

    let wildcard = [SelectItem::Wildcard(None)];
    let projection = if stmt.projection.is_empty() {
        &wildcard[..]
    } else {
        &stmt.projection[..]
    };

    for item in projection {
        match item {
            SelectItem::Wildcard(None) => {
                for table in 0..scope.tables.len() {
                    push_table(table, &mut columns, &mut names);
                }
            }
            SelectItem::Wildcard(Some(q)) => {
                let table = scope
                    .tables
                    .iter()
                    .position(|(name, _, _)| name.eq_ignore_ascii_case(q))
                    .ok_or_else(|| PlanError::UnknownQualifier(q.clone()))?;
                push_table(table, &mut columns, &mut names);
            }
            SelectItem::Column { column, alias } => {
                let (table, idx) = scope.resolve(column)?;
                let joined = scope.tables[table].2 + idx;
                columns.push(joined);
                let name = match alias {
                    Some(alias) => {
                        aliases.push((alias.clone(), joined));
                        alias.clone()
                    }
                    None => scope.column(table, idx).name.clone(),
                };
                names.push(name);
            }
            SelectItem::Aggregate { .. } => {
                return Err(PlanError::InvalidAggregate(
                    "aggregate in non-aggregating projection".to_string(),
                ))
            }
        }
    }

    let order_by = stmt
        .order_by
        .iter()
        .map(|expr| {
            // Output aliases take precedence over table columns.
            let alias = match &expr.column.qualifier {
                None => aliases
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(&expr.column.column))
                    .map(|(_, idx)| *idx),
                Some(_) => None,
            };
            let index = match alias {
                Some(idx) => idx,
                None => scope.resolve_joined(&expr.column)?,
            };
            Ok(SortKey {
                index,
                descending: expr.descending,
            })
        })
        .collect::<Result<Vec<_>, PlanError>>()?;

    Ok((OutputPlan::Project { columns, order_by }, names))
}

fn plan_aggregate(
    scope: &Scope<'_>,
    stmt: &SelectStatement,
) -> Result<(OutputPlan, Vec<String>), PlanError> {
    let group_by = stmt
        .group_by
        .iter()
        .map(|col| scope.resolve_joined(col))
        .collect::<Result<Vec<_>, _>>()?;

    let mut outputs = Vec::with_capacity(stmt.projection.len());
    let mut names = Vec::with_capacity(stmt.projection.len());
    for item in &stmt.projection {
        match item {
            SelectItem::Wildcard(_) => {
                return Err(PlanError::NotGrouped("*".to_string()));
            }
            SelectItem::Column { column, alias } => {
                let (table, idx) = scope.resolve(column)?;
                let joined = scope.tables[table].2 + idx;
                let pos = group_by
                    .iter()
                    .position(|g| *g == joined)
                    .ok_or_else(|| PlanError::NotGrouped(column.to_string()))?;
                outputs.push(AggregateOutput::Group(pos));
                names.push(
                    alias
                        .clone()
                        .unwrap_or_else(|| scope.column(table, idx).name.clone()),
                );
            }
            SelectItem::Aggregate { func, arg, alias } => {
                let input = match (func, arg) {
                    (AggregateFunction::CountStar, _) => None,
                    (_, None) => {
                        return Err(PlanError::InvalidAggregate(format!(
                            "{func} requires an argument"
                        )))
                    }
                    (_, Some(col)) => {
                        let (table, idx) = scope.resolve(col)?;
                        if *func == AggregateFunction::Sum
                            && !scope.column(table, idx).datatype.is_numeric()
                        {
                            return Err(PlanError::InvalidAggregate(format!(
                                "sum of non-numeric column {col}"
                            )));
                        }
                        Some(scope.tables[table].2 + idx)
                    }
                };
                outputs.push(AggregateOutput::Aggregate { func: *func, input });
                let name = match (alias, arg) {
                    (Some(alias), _) => alias.clone(),
                    (None, Some(col)) if *func != AggregateFunction::CountStar => {
                        format!("{func}({})", col.column)
                    }
                    (None, _) => format!("{func}(*)"),
                };
                names.push(name);
            }
        }
    }

    // Ordering refers to output columns by name.
    let order_by = stmt
        .order_by
        .iter()
        .map(|expr| {
            let index = names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(&expr.column.column))
                .ok_or_else(|| PlanError::NotGrouped(expr.column.to_string()))?;
            Ok(SortKey {
                index,
                descending: expr.descending,
            })
        })
        .collect::<Result<Vec<_>, PlanError>>()?;

    Ok((
        OutputPlan::Aggregate {
            plan: AggregatePlan { group_by, outputs },
            order_by,
        },
        names,
    ))
}
