//! Server-rendered HTML for the prediction form

use crate::models::Severity;
use crate::ml::models::ModelMetadata;

/// Slider bounds for one input
#[derive(Debug, Clone, Copy)]
pub struct SliderSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub help: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

pub const RM_B_SLIDER: SliderSpec = SliderSpec {
    name: "rm_b",
    label: "Posterior Radius (Rm_B)",
    unit: "mm",
    help: "Posterior corneal surface curvature radius",
    min: 4.0,
    max: 8.0,
    step: 0.1,
    default: 6.5,
};

pub const RM_F_SLIDER: SliderSpec = SliderSpec {
    name: "rm_f",
    label: "Anterior Radius (Rm_F)",
    unit: "mm",
    help: "Anterior corneal surface curvature radius",
    min: 5.0,
    max: 9.0,
    step: 0.1,
    default: 7.8,
};

pub const PACHY_MIN_SLIDER: SliderSpec = SliderSpec {
    name: "pachy_min",
    label: "Thinnest Pachymetry (Pachy_Min)",
    unit: "µm",
    help: "Minimum corneal thickness",
    min: 200.0,
    max: 600.0,
    step: 5.0,
    default: 520.0,
};

const DISCLAIMER: &str =
    "Educational tool using synthetic data. Not for clinical diagnosis.";

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Current slider values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormValues {
    pub rm_b: f64,
    pub rm_f: f64,
    pub pachy_min: f64,
}

impl Default for FormValues {
    fn default() -> Self {
        Self {
            rm_b: RM_B_SLIDER.default,
            rm_f: RM_F_SLIDER.default,
            pachy_min: PACHY_MIN_SLIDER.default,
        }
    }
}

fn slider(spec: &SliderSpec, value: f64) -> String {
    let decimals = if spec.step < 1.0 { 1 } else { 0 };
    format!(
        r#"<div class="input-card">
            <h3>{label}</h3>
            <label for="{name}">{name_upper} ({unit})</label>
            <input type="range" id="{name}" name="{name}" min="{min}" max="{max}" step="{step}" value="{value:.decimals$}"
                   title="{help}" oninput="document.getElementById('{name}-value').textContent = this.value">
            <p class="caption">Current: <strong><span id="{name}-value">{value:.decimals$}</span> {unit}</strong></p>
        </div>"#,
        label = escape_html(spec.label),
        name = spec.name,
        name_upper = escape_html(column_name(spec.name)),
        unit = spec.unit,
        min = spec.min,
        max = spec.max,
        step = spec.step,
        value = value,
        decimals = decimals,
        help = escape_html(spec.help),
    )
}

fn column_name(field: &str) -> &str {
    match field {
        "rm_b" => "Rm_B",
        "rm_f" => "Rm_F",
        "pachy_min" => "Pachy_Min",
        other => other,
    }
}

fn sidebar(model: Option<&ModelMetadata>) -> String {
    let performance = match model {
        Some(meta) => format!(
            r#"<p><strong>Model Performance:</strong></p>
            <ul>
                <li>Training accuracy: {:.1}%</li>
                <li>Method: {}</li>
                <li>Trees: {}</li>
                <li>Features: {}</li>
            </ul>"#,
            meta.training_accuracy * 100.0,
            escape_html(&meta.name),
            escape_html(
                meta.hyperparameters
                    .get("n_estimators")
                    .map(String::as_str)
                    .unwrap_or("?")
            ),
            meta.n_features,
        ),
        None => "<p><strong>Model Performance:</strong> no model loaded</p>".to_string(),
    };

    let stages: String = Severity::all()
        .iter()
        .map(|s| format!("<li>{}</li>", escape_html(s.info().name)))
        .collect();

    format!(
        r#"<aside class="sidebar">
        <h2>About</h2>
        <div class="info">
            <p>This application predicts keratoconus severity (Stages 0-4) using three corneal parameters:</p>
            <ul>
                <li><strong>Rm_B</strong>: Posterior radius of curvature</li>
                <li><strong>Rm_F</strong>: Anterior radius of curvature</li>
                <li><strong>Pachy_Min</strong>: Thinnest pachymetry</li>
            </ul>
            {performance}
        </div>
        <div class="warning">&#9888; <strong>Disclaimer</strong>: {disclaimer}</div>
        <hr>
        <p><strong>Clinical Stages:</strong></p>
        <ul class="stages">{stages}</ul>
    </aside>"#,
        performance = performance,
        disclaimer = DISCLAIMER,
        stages = stages,
    )
}

/// Full page: sidebar, form, and an optional result or error section
pub fn index_page(model: Option<&ModelMetadata>, values: &FormValues, section: Option<&str>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>KC Severity Staging</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            margin: 0;
            display: flex;
            background-color: #f5f5f5;
        }}
        .sidebar {{
            width: 300px;
            background-color: #ffffff;
            padding: 20px;
            box-shadow: 2px 0 4px rgba(0,0,0,0.1);
        }}
        main {{
            flex: 1;
            max-width: 1200px;
            padding: 20px 40px;
        }}
        .main-header {{
            font-size: 2.5rem;
            font-weight: bold;
            color: #1f77b4;
            text-align: center;
        }}
        .sub-header {{
            font-size: 1.2rem;
            color: #555;
            text-align: center;
            margin-bottom: 2rem;
        }}
        .inputs {{
            display: flex;
            gap: 20px;
        }}
        .input-card {{
            flex: 1;
            background-color: white;
            padding: 15px;
            border-radius: 5px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        .input-card input {{ width: 100%; }}
        .caption {{ color: #666; font-size: 0.9rem; }}
        .actions {{ text-align: center; margin: 20px 0; }}
        button {{
            background-color: #ff4b4b;
            color: white;
            border: none;
            padding: 10px 40px;
            font-size: 1rem;
            border-radius: 5px;
            cursor: pointer;
        }}
        .results {{ display: flex; gap: 20px; }}
        .results > div {{ flex: 1; }}
        .prediction-box {{
            padding: 20px;
            border-radius: 10px;
            border-left: 6px solid;
            margin-bottom: 1rem;
        }}
        .stage-0 {{ background-color: #d4edda; border-color: #28a745; }}
        .stage-1 {{ background-color: #d1ecf1; border-color: #17a2b8; }}
        .stage-2 {{ background-color: #fff3cd; border-color: #ffc107; }}
        .stage-3 {{ background-color: #f8d7da; border-color: #fd7e14; }}
        .stage-4 {{ background-color: #f5c6cb; border-color: #dc3545; }}
        .info {{ background-color: #e8f4fd; padding: 10px; border-radius: 5px; }}
        .warning {{ background-color: #fff3cd; padding: 10px; border-radius: 5px; margin-top: 10px; }}
        .error {{ background-color: #f8d7da; color: #721c24; padding: 15px; border-radius: 5px; }}
        .footer {{
            text-align: center;
            margin-top: 30px;
            color: #666;
            font-size: 0.9rem;
        }}
    </style>
</head>
<body>
    {sidebar}
    <main>
        <div class="main-header">Keratoconus Severity Staging System</div>
        <div class="sub-header">Automated Severity Classification using Machine Learning</div>
        <h2>Enter Corneal Parameters</h2>
        <form method="post" action="/predict">
            <div class="inputs">
                {rm_b}
                {rm_f}
                {pachy_min}
            </div>
            <hr>
            <div class="actions"><button type="submit">Predict Severity</button></div>
        </form>
        {section}
        <hr>
        <div class="footer">
            <p><strong>Keratoconus Severity Staging System</strong> | Educational &amp; Research Tool</p>
            <p>Machine Learning-based automated classification</p>
        </div>
    </main>
</body>
</html>"#,
        sidebar = sidebar(model),
        rm_b = slider(&RM_B_SLIDER, values.rm_b),
        rm_f = slider(&RM_F_SLIDER, values.rm_f),
        pachy_min = slider(&PACHY_MIN_SLIDER, values.pachy_min),
        section = section.unwrap_or(""),
    )
}

/// Result section for a successful prediction
///
/// `gauge_svg` and `bars_svg` are inlined as-is.
pub fn prediction_section(stage: Severity, gauge_svg: Option<&str>, bars_svg: Option<&str>) -> String {
    let info = stage.info();
    format!(
        r#"<h2>Prediction Results</h2>
        <div class="results">
            <div>
                <div class="prediction-box {css_class}">
                    <h2 style="color: {color}; margin: 0;">{name}</h2>
                    <p style="font-size: 1.1rem; margin-top: 1rem;">{description}</p>
                </div>
                <h3>Clinical Recommendations</h3>
                <p class="recommendation">{recommendation}</p>
            </div>
            <div>
                <div class="chart">{gauge}</div>
                <h3>Confidence Distribution</h3>
                <div class="chart">{bars}</div>
            </div>
        </div>"#,
        css_class = info.css_class,
        color = info.color,
        name = escape_html(info.name),
        description = escape_html(info.description),
        recommendation = escape_html(info.recommendation),
        gauge = gauge_svg.unwrap_or(""),
        bars = bars_svg.unwrap_or(""),
    )
}

/// Error box with a follow-up hint
pub fn error_section(message: &str, hint: &str) -> String {
    format!(
        r#"<div class="error"><p><strong>{}</strong></p><p>{}</p></div>"#,
        escape_html(message),
        escape_html(hint)
    )
}
