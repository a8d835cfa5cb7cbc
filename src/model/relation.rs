//! Relation key resolution at bootstrap and include traversal at request time.

use crate::case::foreign_key_for;
use crate::config::{Relation, RelationType};
use crate::datasource::{Filter, IncludeItem};
use crate::error::AppError;
use crate::model::{EventContext, Instance, Model, ModelRegistryBuilder, Related};
use crate::value::{lookup, Value, ID_FIELD, M};
use std::collections::HashSet;
use std::sync::Arc;

/// Fill in default keys for one relation. Returns false when the target (or join model)
/// is not registered; the relation is then left without derived keys.
pub fn resolve_relation(
    owner: &str,
    name: &str,
    relation: &mut Relation,
    known: &HashSet<String>,
) -> bool {
    if !known.contains(&relation.model) {
        tracing::warn!(model = %owner, relation = %name, target = %relation.model, "relation target not registered, skipping");
        return false;
    }
    if let Some(through) = &relation.through {
        if !known.contains(through) {
            tracing::warn!(model = %owner, relation = %name, through = %through, "join model not registered, skipping");
            return false;
        }
    }
    if relation.primary_key.is_none() {
        relation.primary_key = Some(ID_FIELD.to_string());
    }
    if relation.foreign_key.is_none() {
        let from = match relation.kind {
            RelationType::BelongsTo => relation.model.as_str(),
            RelationType::HasOne | RelationType::HasMany | RelationType::HasAndBelongsToMany => owner,
        };
        relation.foreign_key = Some(foreign_key_for(from));
    }
    if relation.kind == RelationType::HasAndBelongsToMany && relation.key_through.is_none() {
        relation.key_through = Some(foreign_key_for(&relation.model));
    }
    true
}

pub fn resolve_relations(builder: &mut ModelRegistryBuilder) {
    let known: HashSet<String> = builder.names().into_iter().collect();
    for draft in builder.drafts_mut() {
        let owner = draft.config.name.clone();
        for (name, relation) in draft.config.relations.iter_mut() {
            resolve_relation(&owner, name, relation, &known);
        }
    }
}

fn is_resolved(relation: &Relation) -> bool {
    relation.foreign_key.is_some() && relation.primary_key.is_some()
}

fn scoped(base: M, scope: Option<&Filter>) -> Filter {
    match scope {
        Some(scope) => scope.clone().and_where(base),
        None => Filter::with_where(base),
    }
}

fn eq(field: &str, value: Value) -> M {
    let mut m = M::new();
    m.insert(field.to_string(), value);
    m
}

fn empty_for(kind: RelationType) -> Related {
    if kind.is_many() {
        Related::Many(Vec::new())
    } else {
        Related::One(None)
    }
}

/// Materialize the listed relations on every instance. Unknown or unresolved relations
/// materialize as empty.
pub(crate) async fn include_relations(
    model: &Arc<Model>,
    instances: &mut [Instance],
    include: &[IncludeItem],
    ctx: &EventContext,
) -> Result<(), AppError> {
    for item in include {
        let Some(relation) = model.relation(&item.relation) else {
            tracing::warn!(model = %model.name(), relation = %item.relation, "include of unknown relation");
            continue;
        };
        let target = ctx.registry().get(&relation.model).cloned();
        let target = match target {
            Some(t) if is_resolved(relation) => t,
            _ => {
                tracing::warn!(model = %model.name(), relation = %item.relation, "relation unresolved, materializing empty");
                for inst in instances.iter_mut() {
                    inst.set_related(&item.relation, empty_for(relation.kind));
                }
                continue;
            }
        };
        let scope = item.scope.as_deref();
        let child = ctx.child();
        for inst in instances.iter_mut() {
            let related = load_one(&target, relation, inst, scope, &child).await?;
            inst.set_related(&item.relation, related);
        }
    }
    Ok(())
}

async fn load_one(
    target: &Arc<Model>,
    relation: &Relation,
    owner: &Instance,
    scope: Option<&Filter>,
    ctx: &EventContext,
) -> Result<Related, AppError> {
    let primary_key = relation.primary_key.as_deref().unwrap_or(ID_FIELD);
    let foreign_key = relation.foreign_key.as_deref().unwrap_or_default();
    match relation.kind {
        RelationType::BelongsTo => {
            let key = match lookup(owner.data(), foreign_key) {
                Some(v) if !v.is_null() => v.clone(),
                _ => return Ok(Related::One(None)),
            };
            let filter = scoped(eq(primary_key, key), scope);
            Ok(Related::One(target.find_one(&filter, ctx).await?.map(Box::new)))
        }
        RelationType::HasOne | RelationType::HasMany => {
            let key = match lookup(owner.data(), primary_key) {
                Some(v) if !v.is_null() => v.clone(),
                _ => return Ok(empty_for(relation.kind)),
            };
            let filter = scoped(eq(foreign_key, key), scope);
            if relation.kind == RelationType::HasOne {
                Ok(Related::One(target.find_one(&filter, ctx).await?.map(Box::new)))
            } else {
                Ok(Related::Many(target.find_many(&filter, ctx).await?.into_vec()))
            }
        }
        RelationType::HasAndBelongsToMany => {
            let (Some(through), Some(key_through)) =
                (relation.through.as_deref(), relation.key_through.as_deref())
            else {
                return Ok(Related::Many(Vec::new()));
            };
            let Some(join) = ctx.registry().get(through).cloned() else {
                return Ok(Related::Many(Vec::new()));
            };
            let key = match lookup(owner.data(), primary_key) {
                Some(v) if !v.is_null() => v.clone(),
                _ => return Ok(Related::Many(Vec::new())),
            };
            let links = join
                .find_many(&Filter::with_where(eq(foreign_key, key)), ctx)
                .await?;
            let ids: Vec<Value> = links
                .iter()
                .filter_map(|l| lookup(l.data(), key_through).cloned())
                .filter(|v| !v.is_null())
                .collect();
            if ids.is_empty() {
                return Ok(Related::Many(Vec::new()));
            }
            let mut in_ids = M::new();
            in_ids.insert("$in".into(), Value::Array(ids));
            let filter = scoped(eq(ID_FIELD, Value::Map(in_ids)), scope);
            Ok(Related::Many(target.find_many(&filter, ctx).await?.into_vec()))
        }
    }
}
