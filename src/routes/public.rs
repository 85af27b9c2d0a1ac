use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    services::emissions::{self, TransportMode},
    state::AppState,
};

const HOME_AFTER_LOGIN: &str = "/me/requests";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/healthz", get(healthz))
        .route("/login", get(login_form).post(login_submit))
        .route("/register", get(register_form).post(register_submit))
        .route("/logout", post(logout))
        .route("/calculator", get(calculator_form).post(calculator_submit))
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    logged_in: bool,
}

async fn landing(current: CurrentUser) -> impl IntoResponse {
    AskamaTemplateResponse::into_response(LandingTemplate {
        logged_in: current.0.is_some(),
    })
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    logged_in: bool,
    show_error: bool,
    error_message: String,
    identifier: String,
}

async fn login_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(LoginTemplate {
        logged_in: false,
        show_error: false,
        error_message: String::new(),
        identifier: String::new(),
    })
}

#[derive(Deserialize)]
struct LoginForm {
    identifier: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match auth::authenticate_user(&state, &form.identifier, &form.password).await {
        Ok(user) => {
            let session_id = auth::create_session(&state, user.id).await?;
            Ok((
                auth::apply_session_cookie(jar, &session_id),
                Redirect::to(HOME_AFTER_LOGIN),
            )
                .into_response())
        }
        Err(AppError::Unauthorized) => Ok(render_login_error(
            form.identifier,
            "Login failed, please check your details.".into(),
        )),
        Err(AppError::BadRequest(msg)) => Ok(render_login_error(form.identifier, msg)),
        Err(err) => Err(err),
    }
}

fn render_login_error(identifier: String, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(LoginTemplate {
            logged_in: false,
            show_error: true,
            error_message: message,
            identifier,
        }),
    )
        .into_response()
}

#[derive(Template)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    logged_in: bool,
    show_error: bool,
    error_message: String,
    username: String,
    email: String,
}

async fn register_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(RegisterTemplate {
        logged_in: false,
        show_error: false,
        error_message: String::new(),
        username: String::new(),
        email: String::new(),
    })
}

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    email: String,
    password: String,
    password_confirm: String,
}

async fn register_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if form.password != form.password_confirm {
        return Ok(render_register_error(
            form.username,
            form.email,
            "Passwords do not match.".into(),
        ));
    }

    match auth::register_user(&state, &form.username, &form.email, &form.password).await {
        Ok(user) => {
            let session_id = auth::create_session(&state, user.id).await?;
            Ok((
                auth::apply_session_cookie(jar, &session_id),
                Redirect::to(HOME_AFTER_LOGIN),
            )
                .into_response())
        }
        Err(AppError::BadRequest(msg)) => Ok(render_register_error(form.username, form.email, msg)),
        Err(err) => Err(err),
    }
}

fn render_register_error(username: String, email: String, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(RegisterTemplate {
            logged_in: false,
            show_error: true,
            error_message: message,
            username,
            email,
        }),
    )
        .into_response()
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state, cookie.value()).await?;
    }
    Ok((auth::clear_session_cookie(jar), Redirect::to("/")))
}

#[derive(Template)]
#[template(path = "calculator.html")]
struct CalculatorTemplate {
    logged_in: bool,
    modes: Vec<ModeOption>,
    miles: String,
    result: Option<CalculatorResult>,
    error_message: String,
}

struct ModeOption {
    value: &'static str,
    selected: bool,
}

struct CalculatorResult {
    kg_co2: String,
    impact: &'static str,
}

impl CalculatorTemplate {
    fn blank(logged_in: bool, selected: &str) -> Self {
        Self {
            logged_in,
            modes: TransportMode::ALL
                .iter()
                .map(|mode| ModeOption {
                    value: mode.as_str(),
                    selected: mode.as_str() == selected,
                })
                .collect(),
            miles: String::new(),
            result: None,
            error_message: String::new(),
        }
    }
}

async fn calculator_form(current: CurrentUser) -> impl IntoResponse {
    AskamaTemplateResponse::into_response(CalculatorTemplate::blank(current.0.is_some(), ""))
}

#[derive(Deserialize)]
struct CalculatorForm {
    transport: String,
    miles: String,
}

async fn calculator_submit(current: CurrentUser, Form(form): Form<CalculatorForm>) -> Response {
    let mut page = CalculatorTemplate::blank(current.0.is_some(), form.transport.trim());
    page.miles = form.miles.clone();

    let outcome = form
        .transport
        .parse::<TransportMode>()
        .and_then(|mode| {
            let miles = form
                .miles
                .trim()
                .parse::<f64>()
                .map_err(|_| AppError::BadRequest("Please enter the distance in miles.".into()))?;
            emissions::estimate(mode, miles)
        });
    match outcome {
        Ok(estimate) => {
            page.result = Some(CalculatorResult {
                kg_co2: format!("{:.2}", estimate.kg_co2),
                impact: estimate.impact.message(),
            });
            AskamaTemplateResponse::into_response(page)
        }
        Err(err) => {
            page.error_message = err.to_string();
            (StatusCode::BAD_REQUEST, AskamaTemplateResponse::into_response(page)).into_response()
        }
    }
}
