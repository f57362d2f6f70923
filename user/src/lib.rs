pub mod error;
pub mod password;
pub mod roles;
pub mod secret;
pub mod store;

use authz::{AuthzEngine, User};
use std::sync::Arc;
use tracing::{debug, info, warn};

use secret::{refresh_user, secret_from_user, update_secret_data, user_from_secret};
use store::UserStore;

/// User management on top of a [`UserStore`].
///
/// Records are resolved against the engine's role catalog on every read, so a
/// role change in configuration applies on the user's next request.
pub struct UserManager {
    store: Arc<dyn UserStore>,
    engine: Arc<AuthzEngine>,
}

impl UserManager {
    pub fn new(store: Arc<dyn UserStore>, engine: Arc<AuthzEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Every API user, with the default role applied to users without roles.
    pub async fn get_users(&self) -> error::Result<Vec<User>> {
        Ok(self
            .stored_users()
            .await?
            .into_iter()
            .map(|user| self.resolve(user))
            .collect())
    }

    pub async fn get_user_by_username(&self, username: &str) -> error::Result<User> {
        self.stored_user(username).await.map(|user| self.resolve(user))
    }

    /// Users as recorded, without the default role. Every write goes through
    /// these so the fallback never lands in a record.
    async fn stored_users(&self) -> error::Result<Vec<User>> {
        let secrets = self.store.list().await?;
        Ok(secrets
            .iter()
            .map(|secret| user_from_secret(secret, self.engine.roles()))
            .collect())
    }

    async fn stored_user(&self, username: &str) -> error::Result<User> {
        self.stored_users()
            .await?
            .into_iter()
            .find(|user| user.username == username)
            .ok_or_else(|| UserError::UserNotFound(username.to_string()))
    }

    /// Stores a new user. The password must already be hashed.
    pub async fn save_user(&self, user: &User) -> error::Result<User> {
        let created = self.store.create(secret_from_user(user)).await?;
        info!(user = %user.username, secret = %created.name, "user created");
        Ok(self.resolve(user_from_secret(&created, self.engine.roles())))
    }

    /// Hashes `password` and stores a new user with the given roles.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        roles: authz::Roles,
    ) -> error::Result<User> {
        let user = User {
            password: password::hash_password(password)?,
            roles,
            ..User::new(username)
        };
        self.save_user(&user).await
    }

    /// Writes the user's roles, namespaces and gitconfigs back to its record.
    pub async fn update_user(&self, user: &User) -> error::Result<()> {
        let mut secret = self.store.get(&user.secret_name).await?;
        update_secret_data(user, &mut secret);
        self.store.update(secret).await?;
        debug!(user = %user.username, "user updated");
        Ok(())
    }

    /// Checks the credentials and returns the user.
    ///
    /// Unknown users and wrong passwords both fail with
    /// [`UserError::InvalidCredentials`]. Stored records that drifted from the
    /// role catalog are written back before returning.
    pub async fn authenticate(&self, username: &str, password: &str) -> error::Result<User> {
        let user = match self.stored_user(username).await {
            Ok(user) => user,
            Err(UserError::UserNotFound(_)) => {
                warn!(user = %username, "authentication failed: unknown user");
                return Err(UserError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        match password::verify_password(password, &user.password) {
            Ok(true) => {}
            Ok(false) => {
                warn!(user = %username, "authentication failed: wrong password");
                return Err(UserError::InvalidCredentials);
            }
            Err(e) => {
                warn!(user = %username, "authentication failed: unusable password hash: {}", e);
                return Err(UserError::InvalidCredentials);
            }
        }

        let (user, update_needed) = refresh_user(user);
        if update_needed {
            if let Err(e) = self.update_user(&user).await {
                warn!(user = %username, "failed to update user record: {}", e);
            }
        }

        Ok(self.resolve(user))
    }

    pub async fn add_namespace_to_user(&self, username: &str, namespace: &str) -> error::Result<()> {
        let mut user = self.stored_user(username).await?;
        user.add_namespace(namespace);
        self.update_user(&user).await
    }

    /// Removes the namespace, and roles scoped to it, from every user.
    pub async fn remove_namespace_from_users(&self, namespace: &str) -> error::Result<()> {
        let mut failures = Vec::new();
        for mut user in self.stored_users().await? {
            if !user.remove_namespace(namespace) {
                continue;
            }
            if let Err(e) = self.update_user(&user).await {
                failures.push(e.to_string());
            }
        }
        collect_failures(failures)
    }

    pub async fn add_gitconfig_to_user(&self, username: &str, gitconfig: &str) -> error::Result<()> {
        let mut user = self.stored_user(username).await?;
        user.add_gitconfig(gitconfig);
        self.update_user(&user).await
    }

    /// Removes the gitconfig from every user.
    pub async fn remove_gitconfig_from_users(&self, gitconfig: &str) -> error::Result<()> {
        let mut failures = Vec::new();
        for mut user in self.stored_users().await? {
            if !user.remove_gitconfig(gitconfig) {
                continue;
            }
            if let Err(e) = self.update_user(&user).await {
                failures.push(e.to_string());
            }
        }
        collect_failures(failures)
    }

    fn resolve(&self, mut user: User) -> User {
        if user.roles.is_empty() {
            if let Some(default) = self.engine.default_role() {
                debug!(user = %user.username, role = %default.id, "applying default role");
                user.roles.push(default.clone());
            }
        }
        user
    }
}

fn collect_failures(failures: Vec<String>) -> error::Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(UserError::Update(failures.join(", ")))
    }
}

// Re-export commonly used types
pub use error::{Result as UserResult, UserError};
pub use roles::ConfigMapRolesGetter;
pub use secret::UserSecret;
pub use store::InMemoryUserStore;

#[cfg(test)]
mod tests {
    use super::*;
    use authz::{HttpVerb, Role, RouteRegistry};

    const ACTIONS: &str = r#"
- {id: default, name: Default, routes: [Info]}
- {id: namespace_read, name: Read Namespaces, routes: [Namespaces]}
"#;

    const ROLES: &str = r#"
- name: viewer
  data: {id: viewer, name: Viewer, default: "true", actions: namespace_read}
"#;

    async fn manager() -> UserManager {
        let mut routes = RouteRegistry::new();
        routes.register("Info", HttpVerb::Get, "/info").unwrap();
        routes.register("Namespaces", HttpVerb::Get, "/namespaces").unwrap();

        let engine = AuthzEngine::init(
            routes,
            RouteRegistry::new(),
            ACTIONS,
            &ConfigMapRolesGetter::from_yaml(ROLES),
        )
        .await
        .unwrap();

        UserManager::new(Arc::new(InMemoryUserStore::new()), Arc::new(engine))
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let manager = manager().await;
        manager
            .create_user("alice", "s3cret", vec![Role::admin()].into())
            .await
            .unwrap();

        let user = manager.authenticate("alice", "s3cret").await.unwrap();
        assert!(user.is_admin());

        let err = manager.authenticate("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, UserError::InvalidCredentials));

        let err = manager.authenticate("nobody", "s3cret").await.unwrap_err();
        assert!(matches!(err, UserError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_default_role_applied_to_users_without_roles() {
        let manager = manager().await;
        manager
            .create_user("bob", "s3cret", authz::Roles::new())
            .await
            .unwrap();

        let bob = manager.get_user_by_username("bob").await.unwrap();
        assert_eq!(bob.roles.ids(), ["viewer"]);
        assert!(bob.is_allowed("GET", "/api/v1/namespaces", &Default::default()));
    }

    #[tokio::test]
    async fn test_default_role_is_not_written_to_the_record() {
        let manager = manager().await;
        let bob = manager
            .create_user("bob", "s3cret", authz::Roles::new())
            .await
            .unwrap();

        let user = manager.authenticate("bob", "s3cret").await.unwrap();
        assert_eq!(user.roles.ids(), ["viewer"]);

        manager.add_namespace_to_user("bob", "ws1").await.unwrap();
        manager.add_gitconfig_to_user("bob", "gh").await.unwrap();
        manager.remove_gitconfig_from_users("gh").await.unwrap();

        let secret = manager.store().get(&bob.secret_name).await.unwrap();
        assert_eq!(
            secret.annotations.get(secret::ROLES_ANNOTATION).map(String::as_str),
            Some("")
        );
        assert_eq!(secret.get("namespaces").as_deref(), Some("ws1"));
    }

    #[tokio::test]
    async fn test_authenticate_writes_back_role_namespaces() {
        let manager = manager().await;
        let engine_viewer = Role::new("viewer", "Viewer").scoped("ws1");
        manager
            .create_user("carol", "s3cret", vec![engine_viewer].into())
            .await
            .unwrap();

        let carol = manager.authenticate("carol", "s3cret").await.unwrap();
        assert_eq!(carol.namespaces, ["ws1"]);

        let stored = manager.get_user_by_username("carol").await.unwrap();
        assert_eq!(stored.namespaces, ["ws1"]);
    }

    #[tokio::test]
    async fn test_namespace_and_gitconfig_lifecycle() {
        let manager = manager().await;
        manager
            .create_user("dave", "s3cret", vec![Role::admin().scoped("ws1")].into())
            .await
            .unwrap();

        manager.add_namespace_to_user("dave", "ws1").await.unwrap();
        manager.add_gitconfig_to_user("dave", "gh").await.unwrap();

        let dave = manager.get_user_by_username("dave").await.unwrap();
        assert_eq!(dave.namespaces, ["ws1"]);
        assert_eq!(dave.gitconfigs, ["gh"]);

        manager.remove_namespace_from_users("ws1").await.unwrap();
        manager.remove_gitconfig_from_users("gh").await.unwrap();

        let dave = manager.get_user_by_username("dave").await.unwrap();
        assert!(dave.namespaces.is_empty());
        assert!(dave.gitconfigs.is_empty());
        // the scoped admin role went away with its namespace, so the default applies
        assert_eq!(dave.roles.ids(), ["viewer"]);
    }

    #[tokio::test]
    async fn test_unknown_user_operations_fail() {
        let manager = manager().await;
        let err = manager.add_namespace_to_user("ghost", "ws1").await.unwrap_err();
        assert!(matches!(err, UserError::UserNotFound(_)));
    }
}
