//! Case conversion for entity naming: `WorkoutExercise` -> `workout_exercise`.

/// Convert a single identifier from CamelCase (or camelCase) to snake_case.
/// e.g. "WorkoutExercise" -> "workout_exercise", "muscleId" -> "muscle_id"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Foreign key column that references `table` by convention: `<table>_id`.
pub fn foreign_key_for(table: &str) -> String {
    format!("{}_id", table)
}

/// Synthetic attribute carrying a parent's display value: `<table>_name`.
pub fn display_alias_for(table: &str) -> String {
    format!("{}_name", table)
}
