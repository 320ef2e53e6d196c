//! Gateway behaviour end to end against the in-memory executor.

use entity_gateway::{
    EntityDef, EntityGraph, FetchOptions, Fetched, Field, FieldKind, FieldHydrator, GatewayError, Gateways,
    GraphBuilder, MemoryExecutor, Predicate, RecordHydrator, Row, Saved, SortOrder,
};
use entity_gateway::error::BackendError;
use entity_gateway::sql::Insert;
use entity_gateway::SqlExecutor;
use serde_json::{json, Value};
use std::sync::Arc;

fn row(v: Value) -> Row {
    match v {
        Value::Object(m) => m,
        other => panic!("not an object: {}", other),
    }
}

fn int(name: &str) -> Field {
    Field::new(name, FieldKind::Int)
}

fn text(name: &str) -> Field {
    Field::new(name, FieldKind::Text)
}

#[derive(Clone, Copy, PartialEq)]
enum Wiring {
    /// Workout -> Muscle only.
    ParentOnly,
    /// WorkoutExercise as an explicit junction between Workout and Exercise.
    Junction,
    /// WorkoutExercise as a plain child of Workout, ordered by exercise_id.
    Child,
}

fn graph(wiring: Wiring) -> EntityGraph {
    let mut b = GraphBuilder::new();
    let muscle = b.entity(EntityDef::new("Muscle", vec![int("id"), text("name")])).unwrap();
    let exercise = b.entity(EntityDef::new("Exercise", vec![int("id"), text("name")])).unwrap();
    let workout = b
        .entity(EntityDef::new("Workout", vec![int("id"), text("name"), int("muscle_id")]))
        .unwrap();
    let workout_exercise = b
        .entity(
            EntityDef::new("WorkoutExercise", vec![int("workout_id"), int("exercise_id"), int("sets")])
                .primary_key(None),
        )
        .unwrap();
    b.add_parent(workout, muscle, "name");
    b.add_parent(workout_exercise, workout, "name")
        .add_parent(workout_exercise, exercise, "name");
    match wiring {
        Wiring::ParentOnly => {}
        Wiring::Junction => {
            b.add_junction(workout, workout_exercise, exercise);
        }
        Wiring::Child => {
            b.add_child(workout, workout_exercise, Some("exercise_id"));
        }
    }
    b.build().unwrap()
}

fn database() -> Arc<MemoryExecutor> {
    let db = MemoryExecutor::new();
    db.create_table("muscle", Some("id"))
        .create_table("exercise", Some("id"))
        .create_table("workout", Some("id"))
        .create_table("workout_exercise", None)
        .require("workout", "name")
        .unique("workout_exercise", &["workout_id", "exercise_id"])
        .foreign_key("workout", "muscle_id", "muscle", "id")
        .foreign_key("workout_exercise", "workout_id", "workout", "id")
        .foreign_key("workout_exercise", "exercise_id", "exercise", "id");
    Arc::new(db)
}

/// Chest (1) and Back (2); Bench Press (1) and Flies (2); workouts 1..=5, workout 2 on Back.
async fn gym(wiring: Wiring) -> (Gateways, Arc<MemoryExecutor>) {
    let db = database();
    let gateways = Gateways::new(graph(wiring), db.clone(), Arc::new(RecordHydrator));
    let muscles = gateways.get("Muscle").unwrap();
    let exercises = gateways.get("Exercise").unwrap();
    let workouts = gateways.get("Workout").unwrap();
    muscles.create(row(json!({"name": "Chest"}))).await.unwrap();
    muscles.create(row(json!({"name": "Back"}))).await.unwrap();
    exercises.create(row(json!({"name": "Bench Press"}))).await.unwrap();
    exercises.create(row(json!({"name": "Flies"}))).await.unwrap();
    for id in 1..=5 {
        let muscle = if id == 2 { 2 } else { 1 };
        workouts
            .create(row(json!({"id": id, "name": format!("Workout {}", id), "muscle_id": muscle})))
            .await
            .unwrap();
    }
    (gateways, db)
}

/// Junction rows written straight to the backend.
async fn link_pairs(db: &MemoryExecutor, pairs: &[(i64, i64)]) {
    for (w, e) in pairs {
        db.insert(&Insert {
            table: "workout_exercise".into(),
            values: row(json!({"workout_id": w, "exercise_id": e, "sets": 3})),
            returning: Vec::new(),
            casts: Default::default(),
        })
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn find_workout_resolves_muscle_and_junction_rows() {
    let (gateways, db) = gym(Wiring::Junction).await;
    link_pairs(&db, &[(5, 2), (5, 1), (4, 1)]).await;
    let workouts = gateways.get("Workout").unwrap();

    let ids = workouts.identifiers().with("id", 5);
    let found = workouts.find_map(&ids).await.unwrap();

    assert_eq!(found["name"], json!("Workout 5"));
    assert_eq!(found["muscle_name"], json!("Chest"));
    let related = &found["related"]["workout_exercise"];
    assert_eq!(related["total_items"], json!(2));
    assert_eq!(related["page"], json!(1));
    assert_eq!(related["page_size"], json!(20));
    let items = related["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|r| r["workout_id"] == json!(5)));
    assert!(items.iter().all(|r| r["workout_name"] == json!("Workout 5")));
    assert_eq!(items[0]["exercise_name"], json!("Flies"));
}

#[tokio::test]
async fn child_link_pages_are_ordered_by_declared_column() {
    let (gateways, db) = gym(Wiring::Child).await;
    link_pairs(&db, &[(5, 2), (5, 1)]).await;
    let workouts = gateways.get("Workout").unwrap();

    let record = workouts.find(&workouts.identifiers().with("id", 5)).await.unwrap();
    let page = record.related("workout_exercise").unwrap();
    let exercise_ids: Vec<_> = page.items.iter().map(|r| r["exercise_id"].clone()).collect();
    assert_eq!(exercise_ids, vec![json!(1), json!(2)]);
    assert_eq!(record.attribute("muscle_name"), Some(&json!("Chest")));
}

#[tokio::test]
async fn find_without_links_returns_the_bare_row() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let muscles = gateways.get("Muscle").unwrap();
    let found = muscles.find_map(&muscles.identifiers().with("id", 2)).await.unwrap();
    assert_eq!(found, row(json!({"id": 2, "name": "Back"})));
}

#[tokio::test]
async fn find_with_one_parent_adds_exactly_one_name_attribute() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let record = workouts.find(&workouts.identifiers().with("id", 2)).await.unwrap();
    assert_eq!(record.attributes(), &[("muscle_name".to_string(), json!("Back"))]);
    assert_eq!(record.related_tables().count(), 0);
}

#[tokio::test]
async fn create_then_find_by_returned_identifier() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let exercises = gateways.get("Exercise").unwrap();
    let ids = exercises.create(row(json!({"name": "Deadlift"}))).await.unwrap();
    let id = ids.get("id").unwrap().as_i64().unwrap();
    assert!(id > 0);
    let found = exercises.find(&ids).await.unwrap();
    assert_eq!(found.get("name"), Some(&json!("Deadlift")));
}

#[tokio::test]
async fn create_accepts_records_and_coerces_form_values() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let mut record = workouts.record();
    record.set("name", "Bench Press");
    record.set("muscle_id", "2");
    let ids = workouts.create(record).await.unwrap();
    let found = workouts.find_map(&ids).await.unwrap();
    assert_eq!(found["name"], json!("Bench Press"));
    assert_eq!(found["muscle_id"], json!(2));
    assert_eq!(found["muscle_name"], json!("Back"));
}

#[tokio::test]
async fn find_requires_declared_and_complete_identifiers() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();

    let undeclared = entity_gateway::IdentifierStore::new("Workout");
    assert!(matches!(
        workouts.find(&undeclared).await,
        Err(GatewayError::NotDeclared { ref key, .. }) if key == "id"
    ));
    assert!(matches!(
        workouts.find(&workouts.identifiers()).await,
        Err(GatewayError::InvalidData(_))
    ));
    assert!(workouts
        .find(&workouts.identifiers().with("id", 42))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn destroy_missing_row_reports_not_found() {
    let (gateways, db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let err = workouts
        .destroy(&workouts.identifiers().with("id", 99))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(db.rows("workout").len(), 5);
}

#[tokio::test]
async fn destroy_removes_the_row() {
    let (gateways, db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let ids = workouts.identifiers().with("id", 3);
    workouts.destroy(&ids).await.unwrap();
    assert_eq!(db.rows("workout").len(), 4);
    assert!(workouts.find(&ids).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn destroy_of_referenced_row_is_a_backend_failure() {
    let (gateways, db) = gym(Wiring::ParentOnly).await;
    let muscles = gateways.get("Muscle").unwrap();
    let err = muscles
        .destroy(&muscles.identifiers().with("id", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Backend(BackendError::Constraint(_))));
    assert_eq!(db.rows("muscle").len(), 2);
}

#[tokio::test]
async fn fetch_joins_parent_display_column_and_sorts_by_name() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let fetched = workouts
        .fetch(FetchOptions::new().sort_by("name", SortOrder::Desc))
        .await
        .unwrap();
    let page = fetched.page().unwrap();
    assert_eq!(page.total_items, 5);
    assert_eq!(page.items[0]["name"], json!("Workout 5"));
    assert_eq!(page.items[3]["muscle_name"], json!("Back"));
    assert!(page.items.iter().all(|r| r.contains_key("muscle_name")));
}

#[tokio::test]
async fn fetch_filters_and_returns_rows_unpaginated() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let fetched = workouts
        .fetch(
            FetchOptions::new()
                .filter(Predicate::eq("muscle_id", 1))
                .unpaginated(),
        )
        .await
        .unwrap();
    assert!(matches!(fetched, Fetched::Rows(_)));
    assert_eq!(fetched.len(), 4);
    assert!(fetched.rows().iter().all(|r| r["muscle_name"] == json!("Chest")));

    let none = workouts
        .fetch(FetchOptions::new().filter(Predicate::eq("muscle_id", 7)))
        .await
        .unwrap();
    assert!(none.is_empty());
    assert_eq!(none.page().unwrap().page, 1);

    let others = workouts
        .fetch(
            FetchOptions::new()
                .filter(Predicate::not_eq("muscle_id", 1))
                .unpaginated(),
        )
        .await
        .unwrap()
        .into_rows();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0]["name"], json!("Workout 2"));
    assert_eq!(others[0]["muscle_name"], json!("Back"));
}

#[tokio::test]
async fn fetch_through_junction_yields_one_row_per_link() {
    let (gateways, db) = gym(Wiring::Junction).await;
    link_pairs(&db, &[(5, 1), (5, 2), (4, 1)]).await;
    let workouts = gateways.get("Workout").unwrap();
    let fetched = workouts.fetch(FetchOptions::new().unpaginated()).await.unwrap();
    let names: Vec<_> = fetched.rows().iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("Workout 4"), json!("Workout 5"), json!("Workout 5")]);
}

#[tokio::test]
async fn pagination_caps_page_size_and_clamps_past_the_end() {
    let db = database();
    let gateways = Gateways::new(graph(Wiring::ParentOnly), db.clone(), Arc::new(RecordHydrator));
    let muscles = gateways.get("Muscle").unwrap();
    for i in 1..=25 {
        muscles
            .create(row(json!({"name": format!("Muscle {:02}", i)})))
            .await
            .unwrap();
    }

    let first = muscles.fetch(FetchOptions::new()).await.unwrap();
    let page = first.page().unwrap();
    assert_eq!(page.items.len(), 20);
    assert_eq!(page.total_items, 25);
    assert_eq!(page.page_count(), 2);
    assert!(page.has_next());
    assert_eq!(page.items[0]["name"], json!("Muscle 01"));

    let beyond = muscles.fetch(FetchOptions::new().page(9, 20)).await.unwrap();
    let page = beyond.page().unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.items[0]["name"], json!("Muscle 21"));
    assert!(!page.has_next());
    assert!(page.has_previous());

    let all = muscles.fetch(FetchOptions::new().unpaginated()).await.unwrap();
    assert_eq!(all.len(), 25);
}

#[tokio::test]
async fn raw_filters_are_rejected_by_the_memory_backend() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let err = workouts
        .fetch(FetchOptions::new().filter(Predicate::raw("name LIKE ?", vec![json!("W%")])))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Backend(BackendError::Unsupported(_))));
}

#[tokio::test]
async fn search_returns_first_match_or_none() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let muscles = gateways.get("Muscle").unwrap();
    let hit = muscles
        .search(Some(&["name"]), Some(Predicate::eq("name", "Back")))
        .await
        .unwrap();
    assert_eq!(hit, Some(row(json!({"name": "Back"}))));
    let miss = muscles
        .search(None, Some(Predicate::eq("name", "Calves")))
        .await
        .unwrap();
    assert_eq!(miss, None);

    let every_column = muscles
        .search(Some(&[]), Some(Predicate::eq("name", "Back")))
        .await
        .unwrap();
    assert_eq!(every_column, Some(row(json!({"id": 2, "name": "Back"}))));
}

#[tokio::test]
async fn modify_with_diff_skips_unchanged_records() {
    let (gateways, db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let ids = workouts.identifiers().with("id", 1);

    let same = workouts
        .modify(&ids, row(json!({"name": "Workout 1", "muscle_id": "1"})), true)
        .await
        .unwrap();
    assert!(!same);

    let changed = workouts
        .modify(&ids, row(json!({"name": "Upper Body", "muscle_id": ""})), true)
        .await
        .unwrap();
    assert!(changed);
    let stored = &db.rows("workout")[0];
    assert_eq!(stored["name"], json!("Upper Body"));
    assert_eq!(stored["muscle_id"], json!(1));

    let forced = workouts
        .modify(&ids, row(json!({"name": "Upper Body"})), false)
        .await
        .unwrap();
    assert!(forced);
}

#[tokio::test]
async fn modify_missing_row_is_not_found() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let err = workouts
        .modify(&workouts.identifiers().with("id", 77), row(json!({"name": "x"})), true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn save_inserts_by_default_and_updates_on_request() {
    let (gateways, db) = gym(Wiring::ParentOnly).await;
    let exercises = gateways.get("Exercise").unwrap();

    let ids = match exercises.save(row(json!({"name": "Squat"})), true).await.unwrap() {
        Saved::Inserted(ids) => ids,
        other => panic!("expected insert, got {:?}", other),
    };
    let id = ids.get("id").unwrap().clone();
    assert_eq!(db.rows("exercise").len(), 3);

    let updated = exercises
        .save(row(json!({"id": id, "name": "Front Squat"})), false)
        .await
        .unwrap();
    assert_eq!(updated, Saved::Updated(true));
    assert_eq!(db.rows("exercise")[2]["name"], json!("Front Squat"));

    let missing = exercises
        .save_with(&exercises.identifiers().with("id", 500), row(json!({"name": "Lunge"})), false)
        .await
        .unwrap();
    assert_eq!(missing, Saved::Updated(false));
    assert_eq!(db.rows("exercise").len(), 3);
}

#[tokio::test]
async fn save_update_without_identifier_value_updates_nothing() {
    let (gateways, db) = gym(Wiring::ParentOnly).await;
    let exercises = gateways.get("Exercise").unwrap();

    let saved = exercises.save(row(json!({"name": "Lunge"})), false).await.unwrap();
    assert_eq!(saved, Saved::Updated(false));

    let saved = exercises
        .save_with(&exercises.identifiers(), row(json!({"name": "Lunge"})), false)
        .await
        .unwrap();
    assert_eq!(saved, Saved::Updated(false));
    assert_eq!(db.rows("exercise").len(), 2);
    assert!(db.rows("exercise").iter().all(|r| r["name"] != json!("Lunge")));
}

#[tokio::test]
async fn link_then_find_shows_junction_row_and_unlink_removes_it() {
    let (gateways, _db) = gym(Wiring::Junction).await;
    let workouts = gateways.get("Workout").unwrap();
    let exercises = gateways.get("Exercise").unwrap();

    let junction_ids = workouts.link(&exercises, 3, 2).await.unwrap();
    assert_eq!(junction_ids.get("workout_id").unwrap(), &json!(3));
    assert_eq!(junction_ids.get("exercise_id").unwrap(), &json!(2));

    let ids = workouts.identifiers().with("id", 3);
    let record = workouts.find(&ids).await.unwrap();
    let page = record.related("workout_exercise").unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.items[0]["exercise_name"], json!("Flies"));

    workouts.unlink(&exercises, 3, "2").await.unwrap();
    let record = workouts.find(&ids).await.unwrap();
    assert!(record.related("workout_exercise").unwrap().is_empty());

    assert!(workouts
        .unlink(&exercises, 3, 2)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn duplicate_link_is_a_constraint_failure() {
    let (gateways, _db) = gym(Wiring::Junction).await;
    let workouts = gateways.get("Workout").unwrap();
    let exercises = gateways.get("Exercise").unwrap();
    workouts.link(&exercises, 1, 1).await.unwrap();
    let err = workouts.link(&exercises, 1, 1).await.unwrap_err();
    assert!(matches!(err, GatewayError::Backend(BackendError::Constraint(_))));
}

#[tokio::test]
async fn link_without_junction_is_rejected() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    let workouts = gateways.get("Workout").unwrap();
    let exercises = gateways.get("Exercise").unwrap();
    let err = workouts.link(&exercises, 1, 1).await.unwrap_err();
    assert!(matches!(err, GatewayError::Graph(_)));
}

#[tokio::test]
async fn field_hydrator_omits_synthetic_attributes() {
    let db = database();
    let records = Gateways::new(graph(Wiring::ParentOnly), db.clone(), Arc::new(RecordHydrator));
    records
        .get("Muscle")
        .unwrap()
        .create(row(json!({"name": "Chest"})))
        .await
        .unwrap();
    records
        .get("Workout")
        .unwrap()
        .create(row(json!({"name": "Push", "muscle_id": 1})))
        .await
        .unwrap();

    let fields = Gateways::new(graph(Wiring::ParentOnly), db, Arc::new(FieldHydrator));
    let workouts = fields.get("Workout").unwrap();
    let found = workouts.find_map(&workouts.identifiers().with("id", 1)).await.unwrap();
    assert_eq!(found, row(json!({"id": 1, "name": "Push", "muscle_id": 1})));
}

#[tokio::test]
async fn unknown_entity_is_an_error() {
    let (gateways, _db) = gym(Wiring::ParentOnly).await;
    assert!(matches!(
        gateways.get("Tendon"),
        Err(GatewayError::UnknownEntity(ref n)) if n == "Tendon"
    ));
}
