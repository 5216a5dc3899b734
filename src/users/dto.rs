use serde::{Deserialize, Deserializer};

/// Body of `POST /users/`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>, // admin | user | guest, default user
    #[serde(default)]
    pub active: Option<bool>, // default true
}

/// Body of `PUT /users/{id}`. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_name: Option<Option<String>>, // Some(None) clears
    #[serde(default, deserialize_with = "double_option")]
    pub last_name: Option<Option<String>>,
    pub role: Option<String>,
    pub active: Option<bool>,
}

/// Distinguishes an explicit `null` from an absent key.
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_limit() -> i64 {
    100
}
