//! Programmatic graph wiring. Entities are registered once; links are declared
//! between the returned ids and resolved (with validation) by [`GraphBuilder::build`].

use crate::case::{display_alias_for, foreign_key_for, to_snake_case};
use crate::config::resolved::{
    next_brand, ChildLink, EntityGraph, EntityId, EntitySchema, JunctionLink, ParentLink,
};
use crate::config::validator::validate;
use crate::error::GraphError;
use crate::model::{Field, ModelSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// Definition of one entity before wiring.
#[derive(Clone, Debug)]
pub struct EntityDef {
    pub name: String,
    /// Defaults to the snake_case entity name.
    pub table: Option<String>,
    /// Defaults to `id`; `None` for junction tables.
    pub primary_key: Option<String>,
    /// Defaults to the primary key, or to the parent foreign keys when there is none.
    pub identifiers: Vec<String>,
    pub fields: Vec<Field>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        EntityDef {
            name: name.into(),
            table: None,
            primary_key: Some("id".into()),
            identifiers: Vec::new(),
            fields,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(mut self, column: Option<&str>) -> Self {
        self.primary_key = column.map(String::from);
        self
    }

    pub fn identifiers(mut self, columns: &[&str]) -> Self {
        self.identifiers = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
enum LinkDecl {
    Parent {
        entity: EntityId,
        parent: EntityId,
        foreign_key: Option<String>,
        display: String,
    },
    Child {
        entity: EntityId,
        child: EntityId,
        foreign_key: Option<String>,
        order_by: Option<String>,
    },
    Junction {
        entity: EntityId,
        junction: EntityId,
        other: EntityId,
    },
}

#[derive(Debug)]
pub struct GraphBuilder {
    brand: u32,
    defs: Vec<EntityDef>,
    by_name: HashMap<String, EntityId>,
    links: Vec<LinkDecl>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        GraphBuilder {
            brand: next_brand(),
            defs: Vec::new(),
            by_name: HashMap::new(),
            links: Vec::new(),
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity. Names must be unique.
    pub fn entity(&mut self, def: EntityDef) -> Result<EntityId, GraphError> {
        if self.by_name.contains_key(&def.name) {
            return Err(GraphError::DuplicateEntity(def.name));
        }
        let id = EntityId(self.defs.len(), self.brand);
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        Ok(id)
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// `entity` references `parent` by the conventional `<parent_table>_id` column.
    pub fn add_parent(&mut self, entity: EntityId, parent: EntityId, display: &str) -> &mut Self {
        self.push_parent(entity, parent, None, display)
    }

    /// `entity` references `parent` through an explicit foreign key column.
    pub fn add_parent_via(
        &mut self,
        entity: EntityId,
        parent: EntityId,
        foreign_key: &str,
        display: &str,
    ) -> &mut Self {
        self.push_parent(entity, parent, Some(foreign_key.to_string()), display)
    }

    fn push_parent(
        &mut self,
        entity: EntityId,
        parent: EntityId,
        foreign_key: Option<String>,
        display: &str,
    ) -> &mut Self {
        if !self.is_parent(entity, parent) {
            self.links.push(LinkDecl::Parent {
                entity,
                parent,
                foreign_key,
                display: display.to_string(),
            });
        }
        self
    }

    /// `child` references `entity` by the conventional `<entity_table>_id` column.
    pub fn add_child(&mut self, entity: EntityId, child: EntityId, order_by: Option<&str>) -> &mut Self {
        self.push_child(entity, child, None, order_by)
    }

    pub fn add_child_via(
        &mut self,
        entity: EntityId,
        child: EntityId,
        foreign_key: &str,
        order_by: Option<&str>,
    ) -> &mut Self {
        self.push_child(entity, child, Some(foreign_key.to_string()), order_by)
    }

    fn push_child(
        &mut self,
        entity: EntityId,
        child: EntityId,
        foreign_key: Option<String>,
        order_by: Option<&str>,
    ) -> &mut Self {
        if !self.is_child(entity, child) {
            self.links.push(LinkDecl::Child {
                entity,
                child,
                foreign_key,
                order_by: order_by.map(String::from),
            });
        }
        self
    }

    /// Many-to-many between `entity` and `other` through `junction`. The junction must
    /// declare both of them as parents.
    pub fn add_junction(&mut self, entity: EntityId, junction: EntityId, other: EntityId) -> &mut Self {
        if !self.is_junction(entity, junction) {
            self.links.push(LinkDecl::Junction {
                entity,
                junction,
                other,
            });
        }
        self
    }

    pub fn is_parent(&self, entity: EntityId, parent: EntityId) -> bool {
        self.links.iter().any(|l| {
            matches!(l, LinkDecl::Parent { entity: e, parent: p, .. } if *e == entity && *p == parent)
        })
    }

    pub fn is_child(&self, entity: EntityId, child: EntityId) -> bool {
        self.links.iter().any(|l| {
            matches!(l, LinkDecl::Child { entity: e, child: c, .. } if *e == entity && *c == child)
        })
    }

    pub fn is_junction(&self, entity: EntityId, junction: EntityId) -> bool {
        self.links.iter().any(|l| {
            matches!(l, LinkDecl::Junction { entity: e, junction: j, .. } if *e == entity && *j == junction)
        })
    }

    /// Resolve every link, validate the result and freeze it.
    pub fn build(self) -> Result<EntityGraph, GraphError> {
        let mut entities: Vec<EntitySchema> = self
            .defs
            .iter()
            .enumerate()
            .map(|(i, def)| EntitySchema {
                id: EntityId(i, self.brand),
                name: def.name.clone(),
                table: def.table.clone().unwrap_or_else(|| to_snake_case(&def.name)),
                primary_key: def.primary_key.clone(),
                identifiers: def.identifiers.clone(),
                model: Arc::new(ModelSchema::new(def.name.clone(), def.fields.clone())),
                parents: Vec::new(),
                children: Vec::new(),
                junctions: Vec::new(),
            })
            .collect();

        let count = entities.len();
        let brand = self.brand;
        let known = move |id: EntityId| -> Result<usize, GraphError> {
            if id.1 == brand && id.0 < count {
                Ok(id.0)
            } else {
                Err(GraphError::MissingReference {
                    kind: "entity",
                    id: format!("#{}", id.0),
                })
            }
        };

        let mut parents: Vec<(usize, ParentLink)> = Vec::new();
        let mut children: Vec<(usize, ChildLink)> = Vec::new();
        for link in &self.links {
            match link {
                LinkDecl::Parent {
                    entity,
                    parent,
                    foreign_key,
                    display,
                } => {
                    let (e, p) = (known(*entity)?, known(*parent)?);
                    let target = &entities[p];
                    let references = target.primary_key.clone().ok_or_else(|| {
                        GraphError::InvalidLink(format!(
                            "parent {} of {} has no primary key",
                            target.name, entities[e].name
                        ))
                    })?;
                    parents.push((
                        e,
                        ParentLink {
                            parent: *parent,
                            foreign_key: foreign_key.clone().unwrap_or_else(|| foreign_key_for(&target.table)),
                            references,
                            display: display.clone(),
                            alias: display_alias_for(&target.table),
                        },
                    ));
                }
                LinkDecl::Child {
                    entity,
                    child,
                    foreign_key,
                    order_by,
                } => {
                    let (e, _) = (known(*entity)?, known(*child)?);
                    let this = &entities[e];
                    let references = this.primary_key.clone().ok_or_else(|| {
                        GraphError::InvalidLink(format!("{} has children but no primary key", this.name))
                    })?;
                    children.push((
                        e,
                        ChildLink {
                            child: *child,
                            foreign_key: foreign_key.clone().unwrap_or_else(|| foreign_key_for(&this.table)),
                            references,
                            order_by: order_by.clone(),
                        },
                    ));
                }
                LinkDecl::Junction { .. } => {}
            }
        }
        for (e, link) in parents {
            entities[e].parents.push(link);
        }
        for (e, link) in children {
            entities[e].children.push(link);
        }

        // Junctions resolve against the junction's own parent links.
        let mut junctions: Vec<(usize, JunctionLink)> = Vec::new();
        for link in &self.links {
            let LinkDecl::Junction {
                entity,
                junction,
                other,
            } = link
            else {
                continue;
            };
            let (e, j, _) = (known(*entity)?, known(*junction)?, known(*other)?);
            if entity == other {
                return Err(GraphError::InvalidLink(format!(
                    "{} cannot be linked to itself through {}",
                    entities[e].name, entities[j].name
                )));
            }
            let through = &entities[j];
            let key_to = |target: EntityId| {
                through
                    .parent_link(target)
                    .map(|l| l.foreign_key.clone())
                    .ok_or_else(|| {
                        GraphError::InvalidLink(format!(
                            "junction {} has no parent link to {}",
                            through.name, entities[target.0].name
                        ))
                    })
            };
            let this_key = key_to(*entity)?;
            let other_key = key_to(*other)?;
            let references = entities[e].primary_key.clone().ok_or_else(|| {
                GraphError::InvalidLink(format!("{} has junctions but no primary key", entities[e].name))
            })?;
            junctions.push((
                e,
                JunctionLink {
                    junction: *junction,
                    other: *other,
                    this_key,
                    other_key,
                    references,
                },
            ));
        }
        for (e, link) in junctions {
            entities[e].junctions.push(link);
        }

        for entity in &mut entities {
            if entity.identifiers.is_empty() {
                entity.identifiers = match &entity.primary_key {
                    Some(pk) => vec![pk.clone()],
                    None => entity.parents.iter().map(|l| l.foreign_key.clone()).collect(),
                };
            }
        }

        validate(&entities)?;
        let by_name = self.by_name;
        tracing::info!(entities = entities.len(), "entity graph resolved");
        for e in &entities {
            tracing::debug!(
                entity = %e.name,
                table = %e.table,
                parents = e.parents.len(),
                children = e.children.len(),
                junctions = e.junctions.len(),
                "wired entity"
            );
        }
        Ok(EntityGraph { entities, by_name })
    }
}
