use actix_multipart::form::MultipartFormConfig;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

impl ErrorResponse {
    pub fn message(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            fields: serde_json::json!({ "message": message.into() }),
        }
    }
}

/// Per-field validation messages, e.g. `{"title": {"errors": ["..."]}}`
pub fn field_errors(validation_errors: &ValidationErrors) -> serde_json::Value {
    let mut fields = serde_json::Map::new();

    for (field, errors) in validation_errors.field_errors() {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
            })
            .collect();
        fields.insert(field.to_string(), serde_json::json!({ "errors": messages }));
    }

    serde_json::Value::Object(fields)
}

/// Multipart limits plus the project's standard error body for malformed forms
pub fn multipart_config(total_limit: usize) -> MultipartFormConfig {
    MultipartFormConfig::default()
        .total_limit(total_limit)
        .error_handler(|err, _req| {
            let response = HttpResponse::build(err.status_code())
                .json(ErrorResponse::message("Request validation failed", err.to_string()));
            actix_web::error::InternalError::from_response(err, response).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::{Validate, ValidationError};

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
    }

    #[test]
    fn field_errors_keep_custom_messages() {
        let errors = Sample { name: String::new() }.validate().unwrap_err();

        let fields = field_errors(&errors);
        assert_eq!(fields["name"]["errors"][0], "Name is required");
    }

    #[test]
    fn field_errors_fall_back_to_generic_message() {
        let mut errors = ValidationErrors::new();
        errors.add("privacy", ValidationError::new("privacy"));

        let fields = field_errors(&errors);
        assert_eq!(fields["privacy"]["errors"][0], "Validation error in field: privacy");
    }
}
