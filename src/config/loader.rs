//! Build the entity graph from a [`GraphConfig`], in memory or from a JSON file.

use crate::config::builder::{EntityDef, GraphBuilder};
use crate::config::resolved::{EntityGraph, EntityId};
use crate::config::types::GraphConfig;
use crate::error::GraphError;
use std::path::Path;

/// Register every entity, then wire its links by name.
pub fn resolve(config: &GraphConfig) -> Result<EntityGraph, GraphError> {
    let mut builder = GraphBuilder::new();
    for e in &config.entities {
        let mut def = EntityDef::new(e.name.clone(), e.fields.iter().map(|f| f.to_field()).collect());
        def.table = e.table.clone();
        def.primary_key = e.primary_key.clone();
        def.identifiers = e.identifiers.clone();
        builder.entity(def)?;
    }

    let lookup = |builder: &GraphBuilder, name: &str| -> Result<EntityId, GraphError> {
        builder.id_of(name).ok_or_else(|| GraphError::MissingReference {
            kind: "entity",
            id: name.to_string(),
        })
    };

    for e in &config.entities {
        let this = lookup(&builder, &e.name)?;
        for p in &e.parents {
            let parent = lookup(&builder, &p.entity)?;
            match &p.foreign_key {
                Some(fk) => builder.add_parent_via(this, parent, fk, &p.display),
                None => builder.add_parent(this, parent, &p.display),
            };
        }
        for c in &e.children {
            let child = lookup(&builder, &c.entity)?;
            match &c.foreign_key {
                Some(fk) => builder.add_child_via(this, child, fk, c.order_by.as_deref()),
                None => builder.add_child(this, child, c.order_by.as_deref()),
            };
        }
        for j in &e.junctions {
            let junction = lookup(&builder, &j.through)?;
            let other = lookup(&builder, &j.other)?;
            builder.add_junction(this, junction, other);
        }
    }
    builder.build()
}

/// Read a JSON [`GraphConfig`] from `path` and resolve it.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<EntityGraph, GraphError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading entity graph");
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GraphError::Load(format!("{}: {}", path.display(), e)))?;
    let config: GraphConfig =
        serde_json::from_str(&text).map_err(|e| GraphError::Load(format!("{}: {}", path.display(), e)))?;
    resolve(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;
    use serde_json::json;

    fn gym_config() -> GraphConfig {
        serde_json::from_value(json!({
            "entities": [
                {
                    "name": "Muscle",
                    "fields": [{"name": "id", "kind": "int"}, "name"]
                },
                {
                    "name": "Workout",
                    "fields": [{"name": "id", "kind": "int"}, "name", {"name": "muscle_id", "kind": "int"}],
                    "parents": [{"entity": "Muscle", "display": "name"}],
                    "junctions": [{"through": "WorkoutExercise", "other": "Exercise"}]
                },
                {
                    "name": "Exercise",
                    "fields": [{"name": "id", "kind": "int"}, "name"]
                },
                {
                    "name": "WorkoutExercise",
                    "primary_key": null,
                    "fields": [{"name": "workout_id", "kind": "int"}, {"name": "exercise_id", "kind": "int"}, {"name": "sets", "kind": "int"}],
                    "parents": [
                        {"entity": "Workout", "display": "name"},
                        {"entity": "Exercise", "display": "name"}
                    ]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn resolves_config_by_name() {
        let graph = resolve(&gym_config()).unwrap();
        assert_eq!(graph.len(), 4);
        let workout = graph.by_name("Workout").unwrap();
        let muscle = graph.id_of("Muscle").unwrap();
        assert!(workout.is_parent(muscle));
        assert_eq!(workout.model.fields[2].kind, FieldKind::Int);
        assert_eq!(workout.model.fields[1].kind, FieldKind::Text);
        let junction = graph.id_of("WorkoutExercise").unwrap();
        assert!(workout.is_junction(junction));
        assert_eq!(graph.entity(junction).primary_key, None);
    }

    #[test]
    fn unknown_entity_names_fail() {
        let mut config = gym_config();
        config.entities[1].parents[0].entity = "Tendon".into();
        assert!(matches!(
            resolve(&config),
            Err(GraphError::MissingReference { ref id, .. }) if id == "Tendon"
        ));
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let err = load_from_path("/nonexistent/graph.json").await.unwrap_err();
        assert!(matches!(err, GraphError::Load(_)));
    }
}
