use crate::api::views::{self, FormValues};
use crate::api::AppState;
use crate::charts;
use crate::error::{AppError, Result};
use crate::metrics::gather_metrics;
use crate::ml::models::Prediction;
use crate::models::{CornealMeasurement, Severity, N_STAGES};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

const RETRAIN_HINT: &str = "Please retrain the model: kc-pipeline run";

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.predictor.is_some(),
    }))
}

/// Readiness: 503 until a model is loaded
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let model_loaded = state.predictor.is_some();
    let (status, label) = if model_loaded {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "model_not_loaded")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_loaded,
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Measurement input, from the HTML form or the JSON API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct PredictRequest {
    /// Posterior radius of curvature (mm)
    #[serde(alias = "Rm_B")]
    #[validate(range(min = 4.0, max = 8.0))]
    pub rm_b: f64,

    /// Anterior radius of curvature (mm)
    #[serde(alias = "Rm_F")]
    #[validate(range(min = 5.0, max = 9.0))]
    pub rm_f: f64,

    /// Thinnest pachymetry (µm)
    #[serde(alias = "Pachy_Min")]
    #[validate(range(min = 200.0, max = 600.0))]
    pub pachy_min: f64,
}

impl PredictRequest {
    fn measurement(&self) -> CornealMeasurement {
        CornealMeasurement::new(self.rm_b, self.rm_f, self.pachy_min)
    }

    fn form_values(&self) -> FormValues {
        FormValues {
            rm_b: self.rm_b,
            rm_f: self.rm_f,
            pachy_min: self.pachy_min,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub stage: Severity,
    pub name: String,
    pub description: String,
    pub recommendation: String,
    pub confidence: f64,
    /// Probability per stage, indexed by stage
    pub probabilities: [f64; N_STAGES],
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        let info = prediction.stage.info();
        Self {
            stage: prediction.stage,
            name: info.name.to_string(),
            description: info.description.to_string(),
            recommendation: info.recommendation.to_string(),
            confidence: prediction.confidence,
            probabilities: prediction.probabilities,
        }
    }
}

/// Predict severity from a JSON body
pub async fn predict_json(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>> {
    request.validate()?;
    let predictor = state.predictor()?;
    let prediction = predictor.predict(&request.measurement(), "api")?;
    Ok(Json(PredictResponse::from(prediction)))
}

/// The input form
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let section = state.predictor().err().map(|e| missing_model_section(&e));
    Html(views::index_page(
        state.model_metadata(),
        &FormValues::default(),
        section.as_deref(),
    ))
}

/// Form submission: the form again, followed by the result
pub async fn predict_form(
    State(state): State<AppState>,
    Form(request): Form<PredictRequest>,
) -> (StatusCode, Html<String>) {
    let values = request.form_values();
    let (status, section) = match render_prediction(&state, &request) {
        Ok(section) => (StatusCode::OK, section),
        Err(e @ AppError::ModelNotLoaded(_)) => (e.status_code(), missing_model_section(&e)),
        Err(e @ AppError::Validation(_)) => (
            e.status_code(),
            views::error_section(&e.to_string(), "Adjust the inputs and try again."),
        ),
        Err(e) => (
            e.status_code(),
            views::error_section(&e.to_string(), RETRAIN_HINT),
        ),
    };

    (
        status,
        Html(views::index_page(
            state.model_metadata(),
            &values,
            Some(&section),
        )),
    )
}

fn render_prediction(state: &AppState, request: &PredictRequest) -> Result<String> {
    request.validate()?;
    let predictor = state.predictor()?;
    let prediction = predictor.predict(&request.measurement(), "web")?;

    let gauge = charts::severity_gauge_svg(prediction.stage)
        .map_err(|e| warn!(error = %e, "Gauge chart failed"))
        .ok();
    let bars = charts::probability_bars_svg(&prediction.probabilities)
        .map_err(|e| warn!(error = %e, "Confidence chart failed"))
        .ok();

    Ok(views::prediction_section(
        prediction.stage,
        gauge.as_deref(),
        bars.as_deref(),
    ))
}

fn missing_model_section(error: &AppError) -> String {
    views::error_section(
        &error.to_string(),
        "Please run the training pipeline first: kc-pipeline run",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_request_validation() {
        let ok = PredictRequest {
            rm_b: 6.5,
            rm_f: 7.8,
            pachy_min: 520.0,
        };
        assert!(ok.validate().is_ok());

        let too_thin = PredictRequest {
            pachy_min: 150.0,
            ..ok
        };
        assert!(too_thin.validate().is_err());

        let too_flat = PredictRequest { rm_b: 8.5, ..ok };
        assert!(too_flat.validate().is_err());
    }

    #[test]
    fn test_predict_request_accepts_column_names() {
        let request: PredictRequest =
            serde_json::from_str(r#"{"Rm_B": 5.7, "Rm_F": 7.0, "Pachy_Min": 448}"#).unwrap();
        assert_eq!(request.rm_b, 5.7);
        assert_eq!(request.pachy_min, 448.0);
    }

    #[test]
    fn test_predict_response_from_prediction() {
        let prediction = Prediction::from_probabilities([0.0, 0.1, 0.7, 0.2, 0.0]);
        let response = PredictResponse::from(prediction);
        assert_eq!(response.stage, Severity::Moderate);
        assert_eq!(response.name, "Stage 2 - Moderate KC");
        assert_eq!(response.confidence, 0.7);
    }
}
