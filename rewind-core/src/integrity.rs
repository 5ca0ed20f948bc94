//! Referential integrity of a proposed tree.
//!
//! Relations are data: a [`Schema`] lists which entity field points at which
//! entity type, and [`IntegrityChecker`] walks that table. Adding a relation
//! never touches the algorithm.

use crate::error::{Error, Result};
use crate::models::{Entity, EntityRef, Fields, Tree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

pub const DEFAULT_MIRROR_DIR: &str = "db";
const ENTITY_EXTENSION: &str = ".json";

/// `entity.field` holds the id of a `references` entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRule {
    pub entity: String,
    pub field: String,
    pub references: String,
}

impl RelationRule {
    pub fn new(entity: &str, field: &str, references: &str) -> Self {
        Self {
            entity: entity.to_string(),
            field: field.to_string(),
            references: references.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    mirror_dir: String,
    relations: Vec<RelationRule>,
}

impl Schema {
    pub fn new(mirror_dir: impl Into<String>) -> Self {
        Self {
            mirror_dir: mirror_dir.into().trim_matches('/').to_string(),
            relations: Vec::new(),
        }
    }

    pub fn with_relation(mut self, entity: &str, field: &str, references: &str) -> Self {
        self.relations
            .push(RelationRule::new(entity, field, references));
        self
    }

    /// Relations of a WordPress database.
    pub fn wordpress(mirror_dir: impl Into<String>) -> Self {
        Self::new(mirror_dir)
            .with_relation("post", "post_author", "user")
            .with_relation("post", "post_parent", "post")
            .with_relation("comment", "comment_post_ID", "post")
            .with_relation("comment", "user_id", "user")
            .with_relation("comment", "comment_parent", "comment")
            .with_relation("postmeta", "post_id", "post")
            .with_relation("commentmeta", "comment_id", "comment")
            .with_relation("usermeta", "user_id", "user")
            .with_relation("term_taxonomy", "term_id", "term")
            .with_relation("term_taxonomy", "parent", "term_taxonomy")
            .with_relation("term_relationship", "object_id", "post")
            .with_relation("term_relationship", "term_taxonomy_id", "term_taxonomy")
    }

    pub fn mirror_dir(&self) -> &str {
        &self.mirror_dir
    }

    pub fn relations(&self) -> &[RelationRule] {
        &self.relations
    }

    pub fn is_mirrored(&self, path: &str) -> bool {
        path.strip_prefix(&self.mirror_dir)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn entity_path(&self, entity: &EntityRef) -> String {
        format!(
            "{}/{}/{}{}",
            self.mirror_dir, entity.entity_type, entity.id, ENTITY_EXTENSION
        )
    }

    /// Maps `<mirror_dir>/<type>/<id>.json` back to its entity.
    pub fn entity_ref(&self, path: &str) -> Option<EntityRef> {
        let rest = path.strip_prefix(&self.mirror_dir)?.strip_prefix('/')?;
        let (entity_type, file) = rest.split_once('/')?;
        let id = file.strip_suffix(ENTITY_EXTENSION)?;
        if entity_type.is_empty() || id.is_empty() || id.contains('/') {
            return None;
        }
        Some(EntityRef::new(entity_type, id))
    }

    pub fn entity_file(&self, entity: &Entity) -> Result<(String, String)> {
        Ok((self.entity_path(&entity.reference), entity.to_content()?))
    }

    fn outgoing<'s>(&'s self, entity_type: &'s str) -> impl Iterator<Item = &'s RelationRule> {
        self.relations.iter().filter(move |r| r.entity == entity_type)
    }
}

pub fn parse_fields(path: &str, content: &str) -> Result<Fields> {
    serde_json::from_str(content).map_err(|e| Error::InvalidEntity {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// A reference that would dangle after the revert.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Violation {
    pub entity: EntityRef,
    pub field: String,
    pub missing: EntityRef,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} -> missing {}", self.entity, self.field, self.missing)
    }
}

pub struct IntegrityChecker<'a> {
    schema: &'a Schema,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Lists references that `target` would leave dangling if it replaced `live`.
    ///
    /// Only what differs between the two trees is inspected: entities added or
    /// changed by the target must find every referenced entity in it, and
    /// entities it removes must not be referenced by anything that remains.
    pub fn check(&self, target: &Tree, live: &Tree) -> Result<Vec<Violation>> {
        let mut violations = BTreeSet::new();

        let mut removed: HashSet<EntityRef> = HashSet::new();
        for path in live.keys().filter(|p| !target.contains_key(*p)) {
            if let Some(entity) = self.schema.entity_ref(path) {
                removed.insert(entity);
            }
        }

        let removed_types: HashSet<&str> = removed.iter().map(|r| r.entity_type.as_str()).collect();

        for (path, content) in target {
            let Some(entity) = self.schema.entity_ref(path) else {
                continue;
            };
            let changed = live.get(path) != Some(content);
            let rules: Vec<&RelationRule> = self
                .schema
                .outgoing(&entity.entity_type)
                .filter(|rule| changed || removed_types.contains(rule.references.as_str()))
                .collect();
            if rules.is_empty() {
                continue;
            }

            let fields = parse_fields(path, content)?;
            for rule in rules {
                let Some(value) = fields.get(&rule.field).map(|v| v.trim()) else {
                    continue;
                };
                if value.is_empty() || value == "0" {
                    continue;
                }

                let missing = EntityRef::new(rule.references.clone(), value);
                // unchanged entities only break through something the target removes
                let dangling = if changed {
                    !target.contains_key(&self.schema.entity_path(&missing))
                } else {
                    removed.contains(&missing)
                };
                if dangling {
                    violations.insert(Violation {
                        entity: entity.clone(),
                        field: rule.field.clone(),
                        missing,
                    });
                }
            }
        }

        if !violations.is_empty() {
            debug!(count = violations.len(), "Referential integrity violated");
        }

        Ok(violations.into_iter().collect())
    }
}
