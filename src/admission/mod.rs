//! Admission control for realm configuration resources.

pub mod types;
pub mod validator;

pub use types::{
    AdmissionOperation, AdmissionRequest, AdmissionResponse, AdmissionReview, AdmissionStatus,
    RealmConfig, RealmConfigSpec,
};
pub use validator::{RESERVED_REALM, RealmDirectory, RealmValidator, Warnings};
