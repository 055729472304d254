use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APKS_COLLECTION: &str = "apks";
pub const CATEGORIAS_COLLECTION: &str = "categorias";
pub const USERS_COLLECTION: &str = "Usuarios";

/// Fields stored as native timestamps rather than strings.
pub const TIMESTAMP_FIELDS: &[&str] = &["fechaCreacion"];

/// Subcollections seeded for every new user document.
pub const USER_SUBCOLLECTIONS: [&str; 8] = [
    "certIngreso",
    "declaracionJurada",
    "facturacion",
    "infoPersonal",
    "planPago",
    "AFIP",
    "sueldos",
    "f931",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Apk {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub apk_url: String,
    /// Category id, empty when uncategorized. Not checked against `categorias`.
    #[serde(default)]
    pub categoria_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_creacion: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Categoria {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_creacion: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

/// Partial category update; only the set fields are merged.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategoriaPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub dni: String,
    /// `sha256$<rounds>$<salt>$<digest>`, see `password::hash_password`
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining profile fields, carried through untouched.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl std::fmt::Display for Apk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .nombre
            .clone()
            .unwrap_or_else(|| crate::utils::apk_display_name(&self.apk_url));
        if self.categoria_id.is_empty() {
            write!(f, "{}  {}", self.id, name)
        } else {
            write!(f, "{}  {}  [{}]", self.id, name, self.categoria_id)
        }
    }
}
