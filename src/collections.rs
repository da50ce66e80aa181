//! Static registry of the collections served by the generic CRUD API.
//!
//! Every write is passed through the collection's model before storage:
//! the body must deserialize (basic field typing, no unknown fields) and is
//! re-serialized so model defaults are materialized in the stored document.
//! Reads pass through a per-collection redaction step.

use crate::db::models::{
    EmployeeTask, Mentor, Permission, School, SchoolAssignment, SchoolFollowup, Teacher,
    TrainingAssignment, TrainingAttendance, TrainingProgram, User, UserDevice,
};
use crate::error::AppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const USERS: &str = "users";
pub const USER_DEVICES: &str = "user_devices";

pub const COLLECTIONS: &[&str] = &[
    USERS,
    "permissions",
    "schools",
    "teachers",
    "mentors",
    "training_programs",
    "training_assignments",
    "training_attendance",
    "school_followups",
    "employee_tasks",
    "school_assignments",
    USER_DEVICES,
];

pub fn is_registered(name: &str) -> bool {
    COLLECTIONS.contains(&name)
}

/// Typing check plus normalization: returns the document as the collection's
/// model serializes it, with defaults filled in and absent optionals omitted.
pub fn normalize(collection: &str, body: &Value) -> Result<Value, AppError> {
    match collection {
        USERS => roundtrip::<User>(body),
        "permissions" => roundtrip::<Permission>(body),
        "schools" => roundtrip::<School>(body),
        "teachers" => roundtrip::<Teacher>(body),
        "mentors" => roundtrip::<Mentor>(body),
        "training_programs" => roundtrip::<TrainingProgram>(body),
        "training_assignments" => roundtrip::<TrainingAssignment>(body),
        "training_attendance" => roundtrip::<TrainingAttendance>(body),
        "school_followups" => roundtrip::<SchoolFollowup>(body),
        "employee_tasks" => roundtrip::<EmployeeTask>(body),
        "school_assignments" => roundtrip::<SchoolAssignment>(body),
        USER_DEVICES => roundtrip::<UserDevice>(body),
        other => Err(AppError::UnknownCollection(other.to_string())),
    }
}

fn roundtrip<T: DeserializeOwned + Serialize>(body: &Value) -> Result<Value, AppError> {
    let model: T = serde_json::from_value(body.clone())
        .map_err(|e| AppError::InvalidDocument(e.to_string()))?;
    Ok(serde_json::to_value(model)?)
}

/// Strip fields that must never leave the server.
pub fn redact(collection: &str, body: &mut Value) {
    if collection != USERS {
        return;
    }
    if let Some(obj) = body.as_object_mut() {
        obj.remove("password");
        obj.remove("password_hash");
    }
}
