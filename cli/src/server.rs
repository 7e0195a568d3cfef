use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use tally_core::identity::{self, TokenKeys};
use tally_core::models::{
    CalorieDay, DailySummary, GoalProfile, GoalSnapshot, MacroGoals, Macros, MonthCompliance,
    NewFoodItem, ProfileUpdate, Registration, TrendVerdict, User, parse_date, parse_id, today,
};
use tally_core::{Ledger, LedgerError};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

#[derive(Clone)]
struct AppState {
    ledger: Arc<Mutex<Ledger>>,
    keys: Arc<TokenKeys>,
}

impl AppState {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(alias = "calorieGoal")]
    calorie_goal: Option<f64>,
    #[serde(alias = "proteinGoal")]
    protein_goal: Option<f64>,
    #[serde(alias = "carbsGoal")]
    carbs_goal: Option<f64>,
    #[serde(alias = "fatGoal")]
    fat_goal: Option<f64>,
    weight: Option<f64>,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateProfileRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    height_cm: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    target_weight_kg: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    calorie_goal: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    protein_goal: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    carbs_goal: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    fat_goal: Option<Option<f64>>,
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Deserialize)]
struct CreateFoodRequest {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    food_type: String,
    #[serde(default)]
    serving_size: String,
    calories: Option<f64>,
    #[serde(default)]
    macros: Macros,
}

#[derive(Deserialize)]
struct LogFoodRequest {
    #[serde(alias = "foodItemId")]
    food_id: Option<String>,
    servings: Option<f64>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct LogWeightRequest {
    weight: Option<f64>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct LogActivityRequest {
    #[serde(alias = "caloriesBurned")]
    calories_burned: Option<f64>,
    date: Option<String>,
}

#[derive(Serialize)]
struct BodyProfile {
    height_cm: Option<f64>,
    target_weight_kg: Option<f64>,
    calorie_goal: Option<f64>,
}

#[derive(Serialize)]
struct ProfileResponse {
    name: String,
    email: String,
    current_weight: Option<f64>,
    profile: BodyProfile,
    macro_goals: MacroGoals,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        let snapshot = GoalSnapshot::of(&user);
        Self {
            profile: BodyProfile {
                height_cm: user.height_cm,
                target_weight_kg: user.target_weight_kg,
                calorie_goal: user.goals.calorie_goal,
            },
            macro_goals: snapshot.macro_goals,
            current_weight: user.current_weight,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Serialize)]
struct WeightPoint {
    date: String,
    weight: f64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unauthenticated(msg) => Self::Unauthorized(msg),
            LedgerError::NotFound(msg) => Self::NotFound(msg),
            LedgerError::InvalidArgument(msg) => Self::BadRequest(msg),
            LedgerError::Conflict(msg) => Self::Conflict(msg),
            err @ (LedgerError::Store(_) | LedgerError::Credential(_)) => {
                Self::Internal(err.into())
            }
        }
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

/// Run argon2 work on the blocking pool so the ledger lock is never held
/// across it.
async fn off_thread<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> tally_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(outcome?)
}

/// Absent date means today.
fn date_or_today(date: Option<&str>) -> Result<NaiveDate, ApiError> {
    match date {
        None => Ok(today()),
        Some(s) => Ok(parse_date(s)?),
    }
}

// --- Middleware ---

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let from_access_token = headers
        .get("x-access-token")
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    from_authorization
        .or(from_access_token)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::Unauthorized("Token is missing!".to_string()).into_response();
    };

    let resolved = state.ledger().resolve_caller(&state.keys, &token);
    match resolved {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers: accounts ---

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let registration = Registration {
        name: req.name,
        email: req.email,
        password: req.password,
        current_weight: req.weight,
        goals: GoalProfile {
            calorie_goal: req.calorie_goal,
            protein_goal: req.protein_goal,
            carbs_goal: req.carbs_goal,
            fat_goal: req.fat_goal,
        },
    };
    registration.validate()?;
    let (registration, password_hash) = off_thread(move || {
        let hash = identity::hash_password(&registration.password)?;
        Ok((registration, hash))
    })
    .await?;

    let user = state
        .ledger()
        .register_hashed(&registration, password_hash)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully!", "user_id": user.id })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let candidate = state.ledger().login_candidate(&req.email)?;
    let password = req.password;
    let user = off_thread(move || Ledger::check_login(candidate, &password)).await?;
    let token = state.keys.issue(user.id)?;
    Ok(Json(json!({ "token": token })))
}

async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.ledger().profile(user.id)?;
    Ok(Json(user.into()))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let update = ProfileUpdate {
        name: req.name,
        height_cm: req.height_cm,
        target_weight_kg: req.target_weight_kg,
        calorie_goal: req.calorie_goal,
        protein_goal: req.protein_goal,
        carbs_goal: req.carbs_goal,
        fat_goal: req.fat_goal,
    };
    state.ledger().update_profile(user.id, &update)?;
    Ok(Json(json!({ "message": "Profile updated successfully!" })))
}

async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let current = state.ledger().profile(user.id)?;
    let password_hash = off_thread(move || {
        Ledger::rehash_password(&current, &req.old_password, &req.new_password)
    })
    .await?;
    state
        .ledger()
        .store_password_hash(user.id, &password_hash)?;
    Ok(Json(json!({ "message": "Password updated successfully!" })))
}

// --- Handlers: catalog and logging ---

async fn add_food(
    State(state): State<AppState>,
    Json(req): Json<CreateFoodRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let calories = required(req.calories, "calories")?;
    let food = state.ledger().add_food_item(&NewFoodItem {
        name: req.name,
        food_type: req.food_type,
        serving_size: req.serving_size,
        calories,
        macros: req.macros,
    })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Food added successfully", "id": food.id })),
    ))
}

async fn log_food(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<LogFoodRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let servings = required(req.servings, "servings")?;
    let food_id = parse_id(&required(req.food_id, "food_id")?, "food")?;
    let date = date_or_today(req.date.as_deref())?;

    let entry = state
        .ledger()
        .record_food(user.id, food_id, servings, date)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Food logged successfully", "id": entry.id })),
    ))
}

async fn delete_food_log(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(log_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let log_id = parse_id(&log_id, "log")?;
    state.ledger().delete_food(user.id, log_id)?;
    Ok(Json(json!({ "message": "Food log deleted successfully" })))
}

async fn log_weight(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<LogWeightRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let weight = required(req.weight, "weight")?;
    let date = date_or_today(req.date.as_deref())?;
    state.ledger().upsert_weight(user.id, date, weight)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Weight logged successfully" })),
    ))
}

async fn log_activity(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<LogActivityRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let calories_burned = required(req.calories_burned, "calories_burned")?;
    let date = date_or_today(req.date.as_deref())?;
    state
        .ledger()
        .upsert_activity(user.id, date, calories_burned)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Activity logged successfully" })),
    ))
}

// --- Handlers: progress ---

async fn daily_summary(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(date): Path<String>,
) -> Result<Json<DailySummary>, ApiError> {
    let date = parse_date(&date)?;
    let summary = state.ledger().daily_summary(user.id, date)?;
    Ok(Json(summary))
}

async fn weight_progress(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<WeightPoint>>, ApiError> {
    let series = state.ledger().weight_series(user.id)?;
    Ok(Json(
        series
            .into_iter()
            .map(|e| WeightPoint {
                date: e.date,
                weight: e.weight,
            })
            .collect(),
    ))
}

async fn calorie_progress(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<CalorieDay>>, ApiError> {
    let series = state.ledger().calorie_trend(user.id)?;
    Ok(Json(series))
}

async fn month_summary(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<MonthCompliance>, ApiError> {
    let map = state.ledger().month_compliance(user.id, year, month)?;
    Ok(Json(map))
}

async fn check_progress(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<TrendVerdict>, ApiError> {
    let verdict = state.ledger().trend_verdict(user.id)?;
    Ok(Json(verdict))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/change-password", post(change_password))
        .route("/api/foods", post(add_food))
        .route("/api/log/food", post(log_food))
        .route("/api/log/food/{id}", delete(delete_food_log))
        .route("/api/log/weight", post(log_weight))
        .route("/api/log/activity", post(log_activity))
        .route("/api/summary/{date}", get(daily_summary))
        .route("/api/progress/weight", get(weight_progress))
        .route("/api/progress/calories", get(calorie_progress))
        .route("/api/progress/check", get(check_progress))
        .route("/api/month-summary/{year}/{month}", get(month_summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/health", get(health))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    ledger: Ledger,
    keys: TokenKeys,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    let state = AppState {
        ledger: Arc::new(Mutex::new(ledger)),
        keys: Arc::new(keys),
    };

    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        tracing::warn!(%bind, "listening beyond localhost; serve behind a TLS-terminating proxy");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
