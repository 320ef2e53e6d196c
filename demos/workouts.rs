//! Wires Workout / Muscle / Exercise / WorkoutExercise against PostgreSQL and prints a resolved workout.
//!
//! Run: `DATABASE_URL=postgres://localhost/gateway cargo run --example workouts`

use entity_gateway::{
    config, EntityDef, Field, FieldKind, Gateways, GraphBuilder, PgExecutor, RecordHydrator, Row, Settings,
};
use serde_json::json;
use std::sync::Arc;

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS muscle (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS exercise (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS workout (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, \
     muscle_id BIGINT NOT NULL REFERENCES muscle(id), created_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
    "CREATE TABLE IF NOT EXISTS workout_exercise (workout_id BIGINT NOT NULL REFERENCES workout(id), \
     exercise_id BIGINT NOT NULL REFERENCES exercise(id), sets BIGINT, PRIMARY KEY (workout_id, exercise_id))",
];

fn graph() -> Result<entity_gateway::EntityGraph, entity_gateway::GraphError> {
    let int = |n: &str| Field::new(n, FieldKind::Int);
    let text = |n: &str| Field::new(n, FieldKind::Text);

    let mut b = GraphBuilder::new();
    let muscle = b.entity(EntityDef::new("Muscle", vec![int("id"), text("name")]))?;
    let exercise = b.entity(EntityDef::new("Exercise", vec![int("id"), text("name")]))?;
    let workout = b.entity(EntityDef::new(
        "Workout",
        vec![
            int("id"),
            text("name"),
            int("muscle_id"),
            Field::new("created_at", FieldKind::Timestamp),
        ],
    ))?;
    let workout_exercise = b.entity(
        EntityDef::new("WorkoutExercise", vec![int("workout_id"), int("exercise_id"), int("sets")]).primary_key(None),
    )?;
    b.add_parent(workout, muscle, "name");
    b.add_parent(workout_exercise, workout, "name")
        .add_parent(workout_exercise, exercise, "name");
    b.add_junction(workout, workout_exercise, exercise);
    b.build()
}

fn row(v: serde_json::Value) -> Row {
    match v {
        serde_json::Value::Object(m) => m,
        _ => Row::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("entity_gateway=debug")),
        )
        .init();

    let executor = PgExecutor::connect(&settings).await?;
    for ddl in DDL {
        sqlx::query(ddl).execute(executor.pool()).await?;
    }

    let graph = match &settings.graph_path {
        Some(path) => config::load_from_path(path).await?,
        None => graph()?,
    };
    let gateways = Gateways::new(graph, Arc::new(executor), Arc::new(RecordHydrator));

    let muscles = gateways.get("Muscle")?;
    let workouts = gateways.get("Workout")?;
    let exercises = gateways.get("Exercise")?;

    let chest = muscles.create(row(json!({"name": "Chest"}))).await?;
    let push = workouts
        .create(row(json!({"name": "Push Day", "muscle_id": chest.get("id")?.clone()})))
        .await?;
    let bench = exercises.create(row(json!({"name": "Bench Press"}))).await?;
    workouts
        .link(&exercises, push.get("id")?.clone(), bench.get("id")?.clone())
        .await?;

    let found = workouts.find_map(&push).await?;
    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}
