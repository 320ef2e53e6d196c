//! Graph validation: link columns exist on the right models and parent resolution terminates.

use crate::config::resolved::{EntityId, EntitySchema};
use crate::error::GraphError;
use std::collections::HashSet;

pub fn validate(entities: &[EntitySchema]) -> Result<(), GraphError> {
    check_parent_cycles(entities)?;
    for e in entities {
        check_columns(e, entities)?;
        check_join_tables(e, entities)?;
    }
    Ok(())
}

fn require_field(entity: &EntitySchema, field: &str) -> Result<(), GraphError> {
    if entity.model.has_field(field) {
        Ok(())
    } else {
        Err(GraphError::UnknownField {
            entity: entity.name.clone(),
            field: field.to_string(),
        })
    }
}

fn check_columns(e: &EntitySchema, entities: &[EntitySchema]) -> Result<(), GraphError> {
    if e.identifiers.is_empty() {
        return Err(GraphError::InvalidLink(format!(
            "{} declares no identifiers (no primary key and no parents)",
            e.name
        )));
    }
    if let Some(pk) = &e.primary_key {
        require_field(e, pk)?;
    }
    for id in &e.identifiers {
        require_field(e, id)?;
    }
    for link in &e.parents {
        let parent = &entities[link.parent.0];
        require_field(e, &link.foreign_key)?;
        require_field(parent, &link.references)?;
        require_field(parent, &link.display)?;
    }
    for link in &e.children {
        let child = &entities[link.child.0];
        require_field(child, &link.foreign_key)?;
        if let Some(col) = &link.order_by {
            require_field(child, col)?;
        }
    }
    Ok(())
}

/// Every joined table must be distinct within one select.
fn check_join_tables(e: &EntitySchema, entities: &[EntitySchema]) -> Result<(), GraphError> {
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(e.table.as_str());
    let joined = e
        .parents
        .iter()
        .map(|l| l.parent)
        .chain(e.children.iter().map(|l| l.child))
        .chain(e.junctions.iter().map(|l| l.junction));
    for id in joined {
        let table = entities[id.0].table.as_str();
        if !seen.insert(table) {
            return Err(GraphError::InvalidLink(format!(
                "{} joins table {} more than once",
                e.name, table
            )));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// `find` resolves parents recursively, so the parent graph must be acyclic.
fn check_parent_cycles(entities: &[EntitySchema]) -> Result<(), GraphError> {
    let mut marks = vec![Mark::Unvisited; entities.len()];
    let mut path: Vec<EntityId> = Vec::new();
    for e in entities {
        visit(e.id, entities, &mut marks, &mut path)?;
    }
    Ok(())
}

fn visit(
    id: EntityId,
    entities: &[EntitySchema],
    marks: &mut [Mark],
    path: &mut Vec<EntityId>,
) -> Result<(), GraphError> {
    match marks[id.0] {
        Mark::Done => return Ok(()),
        Mark::Active => {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut names: Vec<&str> = path[start..].iter().map(|p| entities[p.0].name.as_str()).collect();
            names.push(entities[id.0].name.as_str());
            return Err(GraphError::Cycle(names.join(" -> ")));
        }
        Mark::Unvisited => {}
    }
    marks[id.0] = Mark::Active;
    path.push(id);
    for link in &entities[id.0].parents {
        visit(link.parent, entities, marks, path)?;
    }
    path.pop();
    marks[id.0] = Mark::Done;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::{EntityDef, GraphBuilder};
    use crate::error::GraphError;
    use crate::model::{Field, FieldKind};

    fn text(names: &[&str]) -> Vec<Field> {
        names.iter().map(|n| Field::new(*n, FieldKind::Text)).collect()
    }

    #[test]
    fn parent_cycle_is_reported_with_path() {
        let mut b = GraphBuilder::new();
        let a = b.entity(EntityDef::new("Alpha", text(&["id", "name", "beta_id"]))).unwrap();
        let c = b.entity(EntityDef::new("Beta", text(&["id", "name", "alpha_id"]))).unwrap();
        b.add_parent(a, c, "name").add_parent(c, a, "name");
        match b.build() {
            Err(GraphError::Cycle(path)) => assert_eq!(path, "Alpha -> Beta -> Alpha"),
            other => panic!("expected cycle, got {:?}", other.map(|g| g.len())),
        }
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let mut b = GraphBuilder::new();
        let cat = b.entity(EntityDef::new("Category", text(&["id", "name", "category_id"]))).unwrap();
        b.add_parent(cat, cat, "name");
        assert!(matches!(b.build(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn unknown_display_column_is_rejected() {
        let mut b = GraphBuilder::new();
        let w = b.entity(EntityDef::new("Workout", text(&["id", "name", "muscle_id"]))).unwrap();
        let m = b.entity(EntityDef::new("Muscle", text(&["id", "name"]))).unwrap();
        b.add_parent(w, m, "title");
        match b.build() {
            Err(GraphError::UnknownField { entity, field }) => {
                assert_eq!(entity, "Muscle");
                assert_eq!(field, "title");
            }
            other => panic!("expected unknown field, got {:?}", other.map(|g| g.len())),
        }
    }

    #[test]
    fn missing_foreign_key_column_is_rejected() {
        let mut b = GraphBuilder::new();
        let w = b.entity(EntityDef::new("Workout", text(&["id", "name"]))).unwrap();
        let m = b.entity(EntityDef::new("Muscle", text(&["id", "name"]))).unwrap();
        b.add_parent(w, m, "name");
        assert!(matches!(
            b.build(),
            Err(GraphError::UnknownField { ref field, .. }) if field == "muscle_id"
        ));
    }

    #[test]
    fn table_joined_twice_is_rejected() {
        let mut b = GraphBuilder::new();
        let w = b.entity(EntityDef::new("Workout", text(&["id", "name", "muscle_id", "primary_id"]))).unwrap();
        let m = b.entity(EntityDef::new("Muscle", text(&["id", "name"]))).unwrap();
        let p = b.entity(EntityDef::new("PrimaryMuscle", text(&["id", "name"])).table("muscle")).unwrap();
        b.add_parent(w, m, "name").add_parent_via(w, p, "primary_id", "name");
        assert!(matches!(b.build(), Err(GraphError::InvalidLink(_))));
    }

    #[test]
    fn entity_without_identifiers_is_rejected() {
        let mut b = GraphBuilder::new();
        b.entity(EntityDef::new("Log", text(&["message"])).primary_key(None)).unwrap();
        assert!(matches!(b.build(), Err(GraphError::InvalidLink(_))));
    }
}
