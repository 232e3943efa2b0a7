use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::db::models::SiteSettings;
use crate::db::sqlite::SettingsStore;
use crate::handlers::Success;
use crate::{AdminError, router::AdminState};

const ICONS_KEY: &str = "registrarIcons";

async fn store(state: &AdminState) -> Result<SettingsStore, AdminError> {
    Ok(SettingsStore::new(state.db.connection().await?))
}

/// Settings values are stored as text; non-string JSON keeps its JSON form.
fn as_setting_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub async fn get_settings(
    State(state): State<AdminState>,
) -> Result<Json<SiteSettings>, AdminError> {
    Ok(Json(store(&state).await?.get().await?))
}

/// PUT /api/site-settings. `registrarIcons`, when present, replaces the icon
/// collection; every other key is upserted.
pub async fn update_settings(
    State(state): State<AdminState>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<SiteSettings>, AdminError> {
    let mut values = BTreeMap::new();
    let mut icons = None;
    for (key, value) in body {
        if key == ICONS_KEY {
            icons = Some(serde_json::from_value::<BTreeMap<String, String>>(value)?);
        } else {
            values.insert(key, as_setting_text(value));
        }
    }
    let settings = store(&state).await?.update(&values, icons.as_ref()).await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct SettingValue {
    pub value: Value,
}

/// PUT /api/site-settings/{key}
pub async fn update_setting_key(
    State(state): State<AdminState>,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> Result<Json<Success>, AdminError> {
    let store = store(&state).await?;
    if key == ICONS_KEY {
        let icons: BTreeMap<String, String> = serde_json::from_value(body.value)?;
        store.replace_icons(&icons).await?;
    } else {
        store.set_key(&key, &as_setting_text(body.value)).await?;
    }
    Ok(Json(Success::OK))
}

pub async fn reset_settings(
    State(state): State<AdminState>,
) -> Result<Json<SiteSettings>, AdminError> {
    Ok(Json(store(&state).await?.reset().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setting_text_keeps_strings_verbatim() {
        assert_eq!(as_setting_text(json!("域名展示")), "域名展示");
        assert_eq!(as_setting_text(json!(null)), "");
        assert_eq!(as_setting_text(json!(true)), "true");
        assert_eq!(as_setting_text(json!({"a": 1})), r#"{"a":1}"#);
    }
}
