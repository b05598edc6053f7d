pub mod validator;

pub use validator::{validate_path, validate_ref, ValidationError, MAX_PATH_LEN, MAX_REF_LEN};
