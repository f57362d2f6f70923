//! Conversion between users and their Secret-shaped storage records.
//!
//! A user is persisted as a record with labels, annotations and a `data` map,
//! following the Kubernetes Secret layout:
//!
//! ```yaml
//! name: ruser-alice-1a2b3c4d
//! labels:
//!   paas.io/api-user-credentials: "true"
//! annotations:
//!   paas.io/roles: "viewer,admin:workspace"
//! stringData:
//!   username: alice
//!   password: $argon2id$v=19$...
//!   namespaces: |
//!     workspace
//! ```
//!
//! `data` values are base64 encoded, `stringData` values are plain text and
//! take precedence. Records are normalized to `data` when written.

use authz::{parse_role_id, Role, Roles, User, ADMIN_ROLE_ID, ROLES_DELIMITER};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Label selecting the records that hold API user credentials.
pub const API_USER_LABEL: &str = "paas.io/api-user-credentials";

/// Value of [`API_USER_LABEL`] on user records.
pub const API_USER_LABEL_VALUE: &str = "true";

/// Annotation holding the comma-separated role ids of a user.
pub const ROLES_ANNOTATION: &str = "paas.io/roles";

/// Label holding the single role of users created before role lists existed.
pub const LEGACY_ROLE_LABEL: &str = "paas.io/role";

/// Legacy role value that granted admin rights on the user's own namespaces.
const LEGACY_USER_ROLE: &str = "user";

const LIST_DELIMITER: &str = "\n";

/// A Secret-shaped user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSecret {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Base64 encoded values.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Plain text values, merged into `data` on write.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub creation_timestamp: DateTime<Utc>,
}

impl UserSecret {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            data: BTreeMap::new(),
            string_data: BTreeMap::new(),
            creation_timestamp: Utc::now(),
        }
    }

    /// True if the record carries the API user label.
    pub fn is_user_secret(&self) -> bool {
        self.labels.get(API_USER_LABEL).map(String::as_str) == Some(API_USER_LABEL_VALUE)
    }

    /// Reads a value, preferring `stringData` over decoded `data`.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.string_data.get(key) {
            return Some(value.clone());
        }

        let encoded = self.data.get(key)?;
        match STANDARD.decode(encoded) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!(secret = %self.name, key, "invalid base64 in secret data: {}", e);
                None
            }
        }
    }

    /// Writes a value as plain text; see [`UserSecret::normalize`].
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.string_data.insert(key.to_string(), value.into());
    }

    /// Moves every `stringData` value into base64 encoded `data`.
    pub fn normalize(&mut self) {
        for (key, value) in std::mem::take(&mut self.string_data) {
            self.data.insert(key, STANDARD.encode(value));
        }
    }
}

/// Builds a deterministic record name for a username.
///
/// The username is sanitized to lowercase alphanumerics and dashes and
/// suffixed with a short hash, so distinct usernames never collide.
pub fn secret_name_for(username: &str) -> String {
    let sanitized: String = username
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let sanitized = sanitized.trim_matches('-');

    let digest = hex::encode(Sha256::digest(username.as_bytes()));
    format!("ruser-{}-{}", sanitized, &digest[..8])
}

fn split_list(value: &str) -> Vec<String> {
    value
        .trim()
        .split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a user from its record, resolving role ids against `roles`.
///
/// Unknown role ids are skipped with a debug log. A record carrying the legacy
/// role label gets that role added; the legacy `user` role becomes an admin
/// role scoped to each of the user's namespaces.
pub fn user_from_secret(secret: &UserSecret, roles: &Roles) -> User {
    let mut user = User {
        username: secret.get("username").unwrap_or_default(),
        password: secret.get("password").unwrap_or_default(),
        created_at: secret.creation_timestamp,
        secret_name: secret.name.clone(),
        ..User::default()
    };

    let roles_annotation = secret
        .annotations
        .get(ROLES_ANNOTATION)
        .map(|value| value.trim())
        .unwrap_or_default();

    if !roles_annotation.is_empty() {
        user.role_ids = roles_annotation
            .split(ROLES_DELIMITER)
            .map(str::to_string)
            .collect();

        for role_id in &user.role_ids {
            let (id, namespace) = parse_role_id(role_id);
            match roles.find_by_id(&id) {
                Some(role) => user.roles.push(role.scoped(namespace)),
                None => debug!(user = %user.username, role = %id, "role not found"),
            }
        }
    }

    if let Some(namespaces) = secret.get("namespaces") {
        user.namespaces = split_list(&namespaces);
    }
    if let Some(gitconfigs) = secret.get("gitconfigs") {
        user.gitconfigs = split_list(&gitconfigs);
    }

    if let Some(legacy_role) = secret.labels.get(LEGACY_ROLE_LABEL) {
        if let Some(role) = roles.find_by_id(legacy_role) {
            user.roles.push(role.clone());
        }

        if legacy_role == LEGACY_USER_ROLE {
            let admin = roles.find_by_id(ADMIN_ROLE_ID).cloned().unwrap_or_else(Role::admin);
            for namespace in &user.namespaces {
                user.roles.push(admin.scoped(namespace.as_str()));
            }
        }
    }

    user
}

/// Builds a new record for `user`.
pub fn secret_from_user(user: &User) -> UserSecret {
    let mut secret = UserSecret::new(secret_name_for(&user.username));
    secret
        .labels
        .insert(API_USER_LABEL.to_string(), API_USER_LABEL_VALUE.to_string());
    secret.creation_timestamp = user.created_at;
    secret.set("password", user.password.as_str());

    update_secret_data(user, &mut secret);
    secret
}

/// Writes the user's roles, namespaces and gitconfigs into `secret`.
///
/// Role ids are deduplicated and sorted. The legacy role label is dropped,
/// since its effect is now carried by the role ids.
pub fn update_secret_data(user: &User, secret: &mut UserSecret) {
    let role_ids: BTreeSet<String> = user.roles.ids().into_iter().collect();
    let role_ids: Vec<String> = role_ids.into_iter().collect();

    secret.annotations.insert(
        ROLES_ANNOTATION.to_string(),
        role_ids.join(ROLES_DELIMITER.to_string().as_str()),
    );

    secret.set("username", user.username.as_str());
    secret.set("namespaces", user.namespaces.join(LIST_DELIMITER));
    secret.set("gitconfigs", user.gitconfigs.join(LIST_DELIMITER));

    secret.labels.remove(LEGACY_ROLE_LABEL);
}

/// Detects drift between the stored and the resolved state of a user.
///
/// Returns the updated user and whether it must be written back: the stored
/// role ids differ from the resolved ones, or a scoped role names a namespace
/// missing from the user's namespaces.
pub fn refresh_user(mut user: User) -> (User, bool) {
    let mut update_needed = false;

    let actual_ids = user.roles.ids();
    if role_ids_differ(&user.role_ids, &actual_ids) {
        info!(
            user = %user.username,
            old = %user.role_ids.join(","),
            new = %actual_ids.join(","),
            "user needs update for different roles"
        );
        user.role_ids = actual_ids;
        update_needed = true;
    }

    let mut merged: BTreeSet<String> = user.namespaces.iter().cloned().collect();
    merged.extend(
        user.roles
            .iter()
            .filter(|role| !role.is_global())
            .map(|role| role.namespace.clone()),
    );
    if merged.len() != user.namespaces.len() {
        let merged: Vec<String> = merged.into_iter().collect();
        info!(
            user = %user.username,
            old = %user.namespaces.join(","),
            new = %merged.join(","),
            "user needs update for different namespaces"
        );
        user.namespaces = merged;
        update_needed = true;
    }

    (user, update_needed)
}

fn role_ids_differ(previous: &[String], actual: &[String]) -> bool {
    if previous.len() != actual.len() {
        return true;
    }

    let mut previous = previous.to_vec();
    let mut actual = actual.to_vec();
    previous.sort();
    actual.sort();
    previous != actual
}
