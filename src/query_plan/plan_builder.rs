//! Filter literal → [`QueryPlan`].
//!
//! [`parse_find_query`] walks an [`EntityFilter`] against entity metadata,
//! emitting tables and a condition tree. Relation fields decide whether a
//! join is needed:
//!
//! | field kind     | bare id / list / ops         | sub-filter                                      |
//! |----------------|------------------------------|-------------------------------------------------|
//! | many-to-one    | predicate on the FK column   | join only if it filters non-id fields or the target soft-deletes |
//! | one-to-one     | outer join, predicate on id  | outer join                                      |
//! | one-to-many    | outer join (collection)      | outer join (collection)                         |
//! | many-to-many   | junction join (collection)   | junction join, plus target join as many-to-one  |
//! | polymorphic    | one predicate per component  | error unless it only filters `id`               |
//!
//! Once the tree is built the collection joins are rewritten, null checks on
//! outer-joined tables are disambiguated, ordering is appended, and unused
//! joins are pruned.

use std::collections::{HashMap, HashSet};

use crate::config::PlanConfig;
use crate::filter::{
    AliasedCondition, EntityFilter, ExpressionLiteral, FilterValue, OrderByLiteral, RawLiteral,
    Value, ValueFilter,
};
use crate::join_pruner::{AliasReferencePruner, JoinPruner};
use crate::metadata::{
    EntityMetadata, FieldKind, Inheritance, MetadataProvider, PolymorphicComponent,
};
use crate::rewrite::{rewrite_collection_joins, JoinStrategy};

use super::alias_assigner::AliasAssigner;
use super::condition_builder::{ConditionBuilder, ConditionResolver};
use super::errors::PlanError;
use super::ids::{id_filter, parse_id, split_tag};
use super::{
    fixups, ordering, CollectionJoin, ColumnCondition, ColumnRef, DiscriminatorCase, Expression,
    ExpressionFilter, JoinTable, JoinType, PrimaryTable, QueryPlan, RawCondition, SelectItem,
    Table,
};

/// Column name of the computed class-table-inheritance discriminator
pub const CLASS_COLUMN: &str = "__class";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeletes {
    Include,
    #[default]
    Exclude,
}

/// Per-call options. Unset fields fall back to [`PlanConfig`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Extra `and`/`or` conditions over aliases bound in the filter
    pub conditions: Option<ExpressionLiteral>,
    pub order_by: OrderByLiteral,
    pub soft_deletes: SoftDeletes,
    pub strategy: Option<JoinStrategy>,
    pub prune_joins: Option<bool>,
    /// Alias bindings whose joins must survive pruning
    pub keep_aliases: Vec<String>,
}

/// Build the plan for finding `type_name` entities matching `filter`.
pub fn parse_find_query<M: MetadataProvider + ?Sized>(
    metadata: &M,
    config: &PlanConfig,
    type_name: &str,
    filter: &EntityFilter,
    options: &FindOptions,
) -> Result<QueryPlan, PlanError> {
    let meta = metadata.entity(type_name)?;
    let mut builder = PlanBuilder::new(metadata, config, options.soft_deletes);

    let alias = builder.assigner.next_alias(&meta.table_name);
    builder.add_entity(
        meta,
        Table::Primary(PrimaryTable {
            alias: alias.clone(),
            table: meta.table_name.clone(),
        }),
    )?;
    builder.add_primary_selects(meta, &alias)?;
    builder.walk_filter(meta, &alias, filter, false)?;
    if let Some(literal) = &options.conditions {
        builder.add_user_conditions(literal)?;
    }
    let keep_aliases = options
        .keep_aliases
        .iter()
        .map(|name| {
            builder
                .bindings
                .get(name)
                .map(|b| b.alias.clone())
                .ok_or_else(|| PlanError::UnknownAliasBinding(name.clone()))
        })
        .collect::<Result<HashSet<String>, PlanError>>()?;

    let PlanBuilder {
        mut assigner,
        tables,
        selects,
        conditions,
        collection_joins,
        id_db_types,
        ..
    } = builder;
    let mut plan = QueryPlan {
        selects,
        tables,
        condition: conditions.to_expression(),
        ..Default::default()
    };
    log::debug!(
        "built plan for {} with {} table(s) and {} collection join(s)",
        type_name,
        plan.tables.len(),
        collection_joins.len()
    );

    let strategy = options.strategy.unwrap_or(config.default_strategy);
    rewrite_collection_joins(
        &mut plan,
        &collection_joins,
        strategy,
        config.lateral_sibling_threshold,
        &mut assigner,
    )?;
    fixups::add_null_id_checks(&mut plan, &id_db_types)?;
    ordering::add_order_bys(
        &mut plan,
        metadata,
        meta,
        &alias,
        &options.order_by,
        &mut assigner,
    )?;

    if options.prune_joins.unwrap_or(config.prune_joins) {
        let before = plan.tables.len();
        AliasReferencePruner.prune(&mut plan, &keep_aliases)?;
        log::debug!(
            "pruned {} unused join(s) from {} plan",
            before - plan.tables.len(),
            type_name
        );
    }
    Ok(plan)
}

/// Class-table base joins for an entity at `alias`: `<alias>_b<i>`, nearest
/// base first.
pub(super) fn base_joins<M: MetadataProvider + ?Sized>(
    metadata: &M,
    meta: &EntityMetadata,
    alias: &str,
    join_type: JoinType,
) -> Result<Vec<JoinTable>, PlanError> {
    meta.base_types()
        .iter()
        .enumerate()
        .map(|(i, base)| {
            let base_meta = metadata.entity(base)?;
            let base_alias = format!("{alias}_b{i}");
            Ok(JoinTable {
                table: base_meta.table_name.clone(),
                join_type,
                col1: ColumnRef::new(alias, "id"),
                col2: ColumnRef::new(&base_alias, "id"),
                alias: base_alias,
                distinct: Some(false),
            })
        })
        .collect()
}

struct Binding<'m> {
    alias: String,
    meta: &'m EntityMetadata,
}

struct PlanBuilder<'m, M: MetadataProvider + ?Sized> {
    metadata: &'m M,
    config: &'m PlanConfig,
    soft_deletes: SoftDeletes,
    assigner: AliasAssigner,
    tables: Vec<Table>,
    selects: Vec<SelectItem>,
    conditions: ConditionBuilder,
    collection_joins: Vec<CollectionJoin>,
    bindings: HashMap<String, Binding<'m>>,
    /// Id column type per table alias, for the null-id fix-up
    id_db_types: HashMap<String, String>,
}

impl<'m, M: MetadataProvider + ?Sized> PlanBuilder<'m, M> {
    fn new(metadata: &'m M, config: &'m PlanConfig, soft_deletes: SoftDeletes) -> Self {
        PlanBuilder {
            metadata,
            config,
            soft_deletes,
            assigner: AliasAssigner::new(),
            tables: vec![],
            selects: vec![],
            conditions: ConditionBuilder::new(),
            collection_joins: vec![],
            bindings: HashMap::new(),
            id_db_types: HashMap::new(),
        }
    }

    /// Where the soft-delete column of `meta` lives: its own table (`None`)
    /// or class-table base `i`, and the column name.
    fn soft_delete_target(
        &self,
        meta: &EntityMetadata,
    ) -> Result<Option<(Option<usize>, String)>, PlanError> {
        if self.soft_deletes == SoftDeletes::Include {
            return Ok(None);
        }
        let column = |m: &EntityMetadata| {
            m.soft_delete_column
                .clone()
                .unwrap_or_else(|| self.config.soft_delete_column.clone())
        };
        if meta.soft_delete {
            return Ok(Some((None, column(meta))));
        }
        for (i, base) in meta.base_types().iter().enumerate() {
            let base_meta = self.metadata.entity(base)?;
            if base_meta.soft_delete {
                return Ok(Some((Some(i), column(base_meta))));
            }
        }
        if let Inheritance::SingleTable {
            base_type: Some(base),
            ..
        } = &meta.inheritance
        {
            let base_meta = self.metadata.entity(base)?;
            if base_meta.soft_delete {
                return Ok(Some((None, column(base_meta))));
            }
        }
        Ok(None)
    }

    /// Push `table` for `meta` along with its base joins and injected
    /// (pruneable) soft-delete and discriminator conditions.
    fn add_entity(&mut self, meta: &'m EntityMetadata, table: Table) -> Result<(), PlanError> {
        let alias = table.alias().to_string();
        let base_join_type = match &table {
            Table::Join(j) => j.join_type,
            _ => JoinType::Inner,
        };
        self.tables.push(table);
        self.id_db_types
            .insert(alias.clone(), meta.id_db_type.clone());
        for base in base_joins(self.metadata, meta, &alias, base_join_type)? {
            self.id_db_types
                .insert(base.alias.clone(), meta.id_db_type.clone());
            self.tables.push(Table::Join(base));
        }

        if let Some((base, column)) = self.soft_delete_target(meta)? {
            let target = match base {
                Some(i) => format!("{alias}_b{i}"),
                None => alias.clone(),
            };
            self.conditions.add_simple_condition(
                ColumnCondition::new(&target, &column, "timestamptz", ValueFilter::IsNull)
                    .pruneable(),
            );
        }
        if let Inheritance::SingleTable {
            discriminator_column,
            discriminator_value: Some(value),
            ..
        } = &meta.inheritance
        {
            self.conditions.add_simple_condition(
                ColumnCondition::new(
                    &alias,
                    discriminator_column,
                    "int",
                    ValueFilter::Eq(Value::Int(*value)),
                )
                .pruneable(),
            );
        }
        Ok(())
    }

    /// `alias.*` for the primary entity and its base tables, plus outer
    /// joins to every class-table subtype and the computed `__class` column.
    fn add_primary_selects(
        &mut self,
        meta: &'m EntityMetadata,
        alias: &str,
    ) -> Result<(), PlanError> {
        self.selects.push(SelectItem::star(alias));
        for i in 0..meta.base_types().len() {
            self.selects.push(SelectItem::star(&format!("{alias}_b{i}")));
        }
        let mut cases = vec![];
        for (i, sub) in meta.sub_types().iter().enumerate() {
            let sub_meta = self.metadata.entity(sub)?;
            let sub_alias = format!("{alias}_s{i}");
            self.tables.push(Table::Join(JoinTable {
                alias: sub_alias.clone(),
                table: sub_meta.table_name.clone(),
                join_type: JoinType::Outer,
                col1: ColumnRef::new(alias, "id"),
                col2: ColumnRef::new(&sub_alias, "id"),
                distinct: Some(false),
            }));
            self.id_db_types
                .insert(sub_alias.clone(), sub_meta.id_db_type.clone());
            self.selects.push(SelectItem::star(&sub_alias));
            cases.push(DiscriminatorCase {
                alias: sub_alias,
                type_name: sub.clone(),
            });
        }
        if !cases.is_empty() {
            self.selects.push(SelectItem::Discriminator {
                cases,
                default_type: meta.type_name.clone(),
                col_alias: CLASS_COLUMN.to_string(),
            });
        }
        Ok(())
    }

    /// A many-to-one style sub-filter needs the target table joined
    fn needs_join(&self, other: &EntityMetadata, sub: &EntityFilter) -> Result<bool, PlanError> {
        Ok(sub.alias.is_some()
            || sub.defined_fields().any(|f| f != "id")
            || self.soft_delete_target(other)?.is_some())
    }

    fn walk_filter(
        &mut self,
        meta: &'m EntityMetadata,
        alias: &str,
        filter: &EntityFilter,
        outer: bool,
    ) -> Result<(), PlanError> {
        let metadata = self.metadata;
        if let Some(name) = &filter.alias {
            self.bindings.insert(
                name.clone(),
                Binding {
                    alias: alias.to_string(),
                    meta,
                },
            );
        }

        for (name, value) in &filter.fields {
            if matches!(value, FilterValue::Undefined) {
                continue;
            }
            let bound;
            let value = match value {
                FilterValue::AliasBinding(binding) => {
                    bound = FilterValue::SubFilter(EntityFilter::new().with_alias(binding));
                    &bound
                }
                other => other,
            };
            let field = metadata.resolve_field(meta, name)?;
            let column_alias = field.column_alias(alias);

            match &field.kind {
                FieldKind::PrimaryKey => {
                    let filters = self.value_filters(meta, name, value)?;
                    self.add_id_conditions(&filters, meta, alias, "id")?;
                }
                FieldKind::Primitive { column, db_type } | FieldKind::Enum { column, db_type } => {
                    for filter in self.value_filters(meta, name, value)? {
                        self.conditions.add_simple_condition(ColumnCondition::new(
                            &column_alias,
                            column,
                            db_type,
                            filter,
                        ));
                    }
                }
                FieldKind::ManyToOne {
                    column,
                    other_type,
                    required,
                } => {
                    let other = metadata.entity(other_type)?;
                    match value {
                        FilterValue::SubFilter(sub) if self.needs_join(other, sub)? => {
                            let join_type = if *required && !outer {
                                JoinType::Inner
                            } else {
                                JoinType::Outer
                            };
                            let other_alias = self.assigner.next_alias(&other.table_name);
                            self.add_entity(
                                other,
                                Table::Join(JoinTable {
                                    alias: other_alias.clone(),
                                    table: other.table_name.clone(),
                                    join_type,
                                    col1: ColumnRef::new(&column_alias, column),
                                    col2: ColumnRef::new(&other_alias, "id"),
                                    distinct: None,
                                }),
                            )?;
                            self.walk_filter(
                                other,
                                &other_alias,
                                sub,
                                join_type == JoinType::Outer,
                            )?;
                        }
                        FilterValue::SubFilter(sub) => {
                            let filters = id_filters_of(sub);
                            self.add_id_conditions(&filters, other, &column_alias, column)?;
                        }
                        value => {
                            let filters = self.value_filters(meta, name, value)?;
                            self.add_id_conditions(&filters, other, &column_alias, column)?;
                        }
                    }
                }
                FieldKind::OneToOne {
                    other_type,
                    other_column,
                }
                | FieldKind::OneToMany {
                    other_type,
                    other_column,
                } => {
                    let other = metadata.entity(other_type)?;
                    let other_alias = self.assigner.next_alias(&other.table_name);
                    let join = JoinTable {
                        alias: other_alias.clone(),
                        table: other.table_name.clone(),
                        join_type: JoinType::Outer,
                        col1: ColumnRef::new(alias, "id"),
                        col2: ColumnRef::new(&other_alias, other_column),
                        distinct: None,
                    };
                    if matches!(field.kind, FieldKind::OneToMany { .. }) {
                        self.collection_joins.push(CollectionJoin {
                            parent_alias: alias.to_string(),
                            join: join.clone(),
                        });
                    }
                    self.add_entity(other, Table::Join(join))?;
                    match value {
                        FilterValue::SubFilter(sub) => {
                            self.walk_filter(other, &other_alias, sub, true)?
                        }
                        value => {
                            let filters = self.value_filters(meta, name, value)?;
                            self.add_id_conditions(&filters, other, &other_alias, "id")?;
                        }
                    }
                }
                FieldKind::ManyToMany {
                    join_table,
                    column,
                    other_column,
                    other_type,
                    junction_id_db_type,
                } => {
                    let other = metadata.entity(other_type)?;
                    let junction_alias = self.assigner.next_alias(join_table);
                    let junction = JoinTable {
                        alias: junction_alias.clone(),
                        table: join_table.clone(),
                        join_type: JoinType::Outer,
                        col1: ColumnRef::new(alias, "id"),
                        col2: ColumnRef::new(&junction_alias, column),
                        distinct: None,
                    };
                    self.collection_joins.push(CollectionJoin {
                        parent_alias: alias.to_string(),
                        join: junction.clone(),
                    });
                    self.tables.push(Table::Join(junction));
                    self.id_db_types
                        .insert(junction_alias.clone(), junction_id_db_type.clone());

                    match value {
                        FilterValue::SubFilter(sub) if self.needs_join(other, sub)? => {
                            let other_alias = self.assigner.next_alias(&other.table_name);
                            self.add_entity(
                                other,
                                Table::Join(JoinTable {
                                    alias: other_alias.clone(),
                                    table: other.table_name.clone(),
                                    join_type: JoinType::Outer,
                                    col1: ColumnRef::new(&junction_alias, other_column),
                                    col2: ColumnRef::new(&other_alias, "id"),
                                    distinct: None,
                                }),
                            )?;
                            self.walk_filter(other, &other_alias, sub, true)?;
                        }
                        FilterValue::SubFilter(sub) => {
                            let filters = id_filters_of(sub);
                            self.add_junction_conditions(
                                &filters,
                                other,
                                &junction_alias,
                                junction_id_db_type,
                                other_column,
                            )?;
                        }
                        value => {
                            let filters = self.value_filters(meta, name, value)?;
                            self.add_junction_conditions(
                                &filters,
                                other,
                                &junction_alias,
                                junction_id_db_type,
                                other_column,
                            )?;
                        }
                    }
                }
                FieldKind::Polymorphic { components } => {
                    let filters = match value {
                        FilterValue::SubFilter(sub)
                            if sub.alias.is_none() && sub.defined_fields().all(|f| f == "id") =>
                        {
                            id_filters_of(sub)
                        }
                        FilterValue::SubFilter(_) => {
                            return Err(PlanError::JoinThroughPolymorphic {
                                entity: meta.type_name.clone(),
                                field: name.clone(),
                            })
                        }
                        value => self.value_filters(meta, name, value)?,
                    };
                    for filter in &filters {
                        self.add_polymorphic_condition(&column_alias, name, components, filter)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn value_filters(
        &self,
        meta: &EntityMetadata,
        field: &str,
        value: &FilterValue,
    ) -> Result<Vec<ValueFilter>, PlanError> {
        value
            .value_filters()
            .ok_or_else(|| PlanError::UnsupportedFilterShape {
                entity: meta.type_name.clone(),
                field: field.to_string(),
                shape: match value {
                    FilterValue::AliasBinding(_) => "alias binding".to_string(),
                    _ => "sub-filter".to_string(),
                },
            })
    }

    /// Conditions on a column holding ids of `target`
    fn add_id_conditions(
        &mut self,
        filters: &[ValueFilter],
        target: &EntityMetadata,
        alias: &str,
        column: &str,
    ) -> Result<(), PlanError> {
        for filter in filters {
            let parsed = id_filter(
                filter,
                target,
                &self.config.nil_ids,
                &format!("{alias}.{column}"),
            )?;
            self.conditions.add_simple_condition(ColumnCondition::new(
                alias,
                column,
                &target.id_db_type,
                parsed,
            ));
        }
        Ok(())
    }

    /// Null checks look at the junction row itself; everything else at its
    /// target column.
    fn add_junction_conditions(
        &mut self,
        filters: &[ValueFilter],
        target: &EntityMetadata,
        junction_alias: &str,
        junction_id_db_type: &str,
        other_column: &str,
    ) -> Result<(), PlanError> {
        for filter in filters {
            match filter {
                ValueFilter::IsNull | ValueFilter::NotNull => {
                    self.conditions.add_simple_condition(ColumnCondition::new(
                        junction_alias,
                        "id",
                        junction_id_db_type,
                        filter.clone(),
                    ))
                }
                other => {
                    self.add_id_conditions(
                        std::slice::from_ref(other),
                        target,
                        junction_alias,
                        other_column,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn add_polymorphic_condition(
        &mut self,
        alias: &str,
        field: &str,
        components: &[PolymorphicComponent],
        filter: &ValueFilter,
    ) -> Result<(), PlanError> {
        let metadata = self.metadata;
        let config = self.config;
        let targets = components
            .iter()
            .map(|c| metadata.entity(&c.other_type))
            .collect::<Result<Vec<_>, _>>()?;
        let nil = &config.nil_ids;
        let column = |i: usize, cond: ValueFilter| -> Expression {
            ColumnCondition::new(alias, &components[i].column, &targets[i].id_db_type, cond).into()
        };
        let component_of = |value: &Value| -> Result<usize, PlanError> {
            let found = match value {
                Value::Text(s) => split_tag(s)
                    .and_then(|(tag, _)| targets.iter().position(|t| t.tag == tag)),
                Value::NewEntity(type_name) => {
                    targets.iter().position(|t| &t.type_name == type_name)
                }
                _ => None,
            };
            found.ok_or_else(|| PlanError::InvalidId {
                value: value.to_string(),
                reason: format!("does not identify a component of polymorphic field {field}"),
            })
        };

        match filter {
            ValueFilter::IsNull => {
                for (component, target) in components.iter().zip(&targets) {
                    self.conditions.add_simple_condition(ColumnCondition::new(
                        alias,
                        &component.column,
                        &target.id_db_type,
                        ValueFilter::IsNull,
                    ));
                }
            }
            ValueFilter::NotNull => {
                let any = (0..components.len())
                    .map(|i| column(i, ValueFilter::NotNull))
                    .collect();
                self.conditions
                    .add_parsed_expression(ExpressionFilter::or(any));
            }
            ValueFilter::Eq(value) => {
                let i = component_of(value)?;
                let id = parse_id(value, targets[i], nil)?;
                self.conditions.add_simple_condition(ColumnCondition::new(
                    alias,
                    &components[i].column,
                    &targets[i].id_db_type,
                    ValueFilter::Eq(id),
                ));
            }
            ValueFilter::Ne(value) => {
                let i = component_of(value)?;
                let id = parse_id(value, targets[i], nil)?;
                self.conditions.add_parsed_expression(ExpressionFilter::or(vec![
                    column(i, ValueFilter::Ne(id)),
                    column(i, ValueFilter::IsNull),
                ]));
            }
            ValueFilter::In(values) => {
                let mut branches = vec![];
                if values.iter().any(Value::is_null) {
                    branches.push(Expression::and(
                        (0..components.len())
                            .map(|i| column(i, ValueFilter::IsNull))
                            .collect(),
                    ));
                }
                for (i, ids) in group_by_component(values, &component_of, &targets, nil)? {
                    branches.push(column(i, ValueFilter::In(ids)));
                }
                self.conditions
                    .add_parsed_expression(ExpressionFilter::or(branches));
            }
            ValueFilter::Nin(values) => {
                if values.iter().any(Value::is_null) {
                    let any = (0..components.len())
                        .map(|i| column(i, ValueFilter::NotNull))
                        .collect();
                    self.conditions
                        .add_parsed_expression(ExpressionFilter::or(any));
                }
                for (i, ids) in group_by_component(values, &component_of, &targets, nil)? {
                    self.conditions.add_parsed_expression(ExpressionFilter::or(vec![
                        column(i, ValueFilter::IsNull),
                        column(i, ValueFilter::Nin(ids)),
                    ]));
                }
            }
            other => {
                return Err(PlanError::UnhandledValueFilter {
                    kind: other.kind().to_string(),
                    column: format!("{alias}.{field}"),
                })
            }
        }
        Ok(())
    }

    fn add_user_conditions(&mut self, literal: &ExpressionLiteral) -> Result<(), PlanError> {
        let mut conditions = std::mem::take(&mut self.conditions);
        let result = conditions.add_expression(literal, self);
        self.conditions = conditions;
        result
    }

    fn binding(&self, name: &str) -> Result<(String, &'m EntityMetadata), PlanError> {
        self.bindings
            .get(name)
            .map(|b| (b.alias.clone(), b.meta))
            .ok_or_else(|| PlanError::UnknownAliasBinding(name.to_string()))
    }
}

impl<M: MetadataProvider + ?Sized> ConditionResolver for PlanBuilder<'_, M> {
    fn resolve_column(&mut self, condition: &AliasedCondition) -> Result<ColumnCondition, PlanError> {
        let (alias, meta) = self.binding(&condition.alias)?;
        let field = self.metadata.resolve_field(meta, &condition.field)?;
        let filter = condition.filter.clone().normalize();
        let nil = &self.config.nil_ids;
        match &field.kind {
            FieldKind::PrimaryKey => Ok(ColumnCondition::new(
                &alias,
                "id",
                &meta.id_db_type,
                id_filter(&filter, meta, nil, &format!("{alias}.id"))?,
            )),
            FieldKind::Primitive { column, db_type } | FieldKind::Enum { column, db_type } => Ok(
                ColumnCondition::new(&field.column_alias(&alias), column, db_type, filter),
            ),
            FieldKind::ManyToOne {
                column, other_type, ..
            } => {
                let other = self.metadata.entity(other_type)?;
                let fk_alias = field.column_alias(&alias);
                Ok(ColumnCondition::new(
                    &fk_alias,
                    column,
                    &other.id_db_type,
                    id_filter(&filter, other, nil, &format!("{fk_alias}.{column}"))?,
                ))
            }
            other => Err(PlanError::UnsupportedFilterShape {
                entity: meta.type_name.clone(),
                field: condition.field.clone(),
                shape: format!("condition on {} field", other.name()),
            }),
        }
    }

    fn resolve_raw(&mut self, raw: &RawLiteral) -> Result<RawCondition, PlanError> {
        let mut sql = raw.sql.clone();
        let mut aliases = vec![];
        for name in &raw.aliases {
            let (alias, _) = self.binding(name)?;
            sql = sql.replace(&format!("{{{name}}}"), &alias);
            aliases.push(alias);
        }
        Ok(RawCondition {
            aliases,
            condition: sql,
            bindings: raw.bindings.clone(),
            pruneable: false,
        })
    }
}

/// Value filters under the `id` key of a sub-filter
fn id_filters_of(sub: &EntityFilter) -> Vec<ValueFilter> {
    sub.get("id")
        .and_then(FilterValue::value_filters)
        .unwrap_or_default()
}

/// Parsed non-null ids grouped per polymorphic component, in component order
fn group_by_component<F>(
    values: &[Value],
    component_of: &F,
    targets: &[&EntityMetadata],
    nil: &crate::config::NilIdSentinels,
) -> Result<Vec<(usize, Vec<Value>)>, PlanError>
where
    F: Fn(&Value) -> Result<usize, PlanError>,
{
    let mut grouped: Vec<Vec<Value>> = vec![vec![]; targets.len()];
    for value in values.iter().filter(|v| !v.is_null()) {
        let i = component_of(value)?;
        grouped[i].push(parse_id(value, targets[i], nil)?);
    }
    Ok(grouped
        .into_iter()
        .enumerate()
        .filter(|(_, ids)| !ids.is_empty())
        .collect())
}
