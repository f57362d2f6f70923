//! The PaaS route table and its action catalog.
//!
//! Route names are stable identifiers: actions in `actions.yaml` reference
//! them, and clients render request paths from them.

use authz::{AuthzEngine, HttpVerb, RolesGetter, RouteRegistry};
use authz::HttpVerb::{Delete, Get, Patch, Post, Put};

/// Declarative action catalog covering every route below.
pub const ACTIONS_YAML: &str = include_str!("actions.yaml");

/// REST routes, served under `/api/v1`.
const ROUTES: &[(&str, HttpVerb, &str)] = &[
    ("AuthToken", Get, "/authtoken"),
    // applications
    ("AllApps", Get, "/applications"),
    ("Apps", Get, "/namespaces/:namespace/applications"),
    ("AppCreate", Post, "/namespaces/:namespace/applications"),
    ("AppShow", Get, "/namespaces/:namespace/applications/:app"),
    ("StagingComplete", Get, "/namespaces/:namespace/staging/:stage_id/complete"),
    ("AppDelete", Delete, "/namespaces/:namespace/applications/:app"),
    ("AppBatchDelete", Delete, "/namespaces/:namespace/applications"),
    ("AppDeploy", Post, "/namespaces/:namespace/applications/:app/deploy"),
    ("AppImportGit", Post, "/namespaces/:namespace/applications/:app/import-git"),
    ("AppPart", Get, "/namespaces/:namespace/applications/:app/part/:part"),
    ("AppRestart", Post, "/namespaces/:namespace/applications/:app/restart"),
    ("AppRunning", Get, "/namespaces/:namespace/applications/:app/running"),
    ("AppStage", Post, "/namespaces/:namespace/applications/:app/stage"),
    ("AppUpdate", Patch, "/namespaces/:namespace/applications/:app"),
    ("AppUpload", Post, "/namespaces/:namespace/applications/:app/store"),
    ("AppValidateCV", Get, "/namespaces/:namespace/applications/:app/validate-cv"),
    ("AppExport", Post, "/namespaces/:namespace/applications/:app/export"),
    ("AppMatch", Get, "/namespaces/:namespace/appsmatches/:pattern"),
    ("AppMatch0", Get, "/namespaces/:namespace/appsmatches"),
    // application environment
    ("EnvList", Get, "/namespaces/:namespace/applications/:app/environment"),
    ("EnvMatch", Get, "/namespaces/:namespace/applications/:app/environmentmatch/:pattern"),
    ("EnvMatch0", Get, "/namespaces/:namespace/applications/:app/environmentmatch"),
    ("EnvSet", Post, "/namespaces/:namespace/applications/:app/environment"),
    ("EnvShow", Get, "/namespaces/:namespace/applications/:app/environment/:env"),
    ("EnvUnset", Delete, "/namespaces/:namespace/applications/:app/environment/:env"),
    // configuration bindings
    ("ConfigurationBindingCreate", Post, "/namespaces/:namespace/applications/:app/configurationbindings"),
    (
        "ConfigurationBindingDelete",
        Delete,
        "/namespaces/:namespace/applications/:app/configurationbindings/:configuration",
    ),
    // namespaces
    ("Namespaces", Get, "/namespaces"),
    ("NamespaceCreate", Post, "/namespaces"),
    ("NamespaceDelete", Delete, "/namespaces/:namespace"),
    ("NamespaceBatchDelete", Delete, "/namespaces"),
    ("NamespaceShow", Get, "/namespaces/:namespace"),
    ("NamespacesMatch", Get, "/namespacematches/:pattern"),
    ("NamespacesMatch0", Get, "/namespacematches"),
    // configurations
    ("ConfigurationApps", Get, "/namespaces/:namespace/configurationapps"),
    ("AllConfigurations", Get, "/configurations"),
    ("Configurations", Get, "/namespaces/:namespace/configurations"),
    ("ConfigurationShow", Get, "/namespaces/:namespace/configurations/:configuration"),
    ("ConfigurationCreate", Post, "/namespaces/:namespace/configurations"),
    ("ConfigurationBatchDelete", Delete, "/namespaces/:namespace/configurations"),
    ("ConfigurationDelete", Delete, "/namespaces/:namespace/configurations/:configuration"),
    ("ConfigurationUpdate", Patch, "/namespaces/:namespace/configurations/:configuration"),
    ("ConfigurationReplace", Put, "/namespaces/:namespace/configurations/:configuration"),
    ("ConfigurationMatch", Get, "/namespaces/:namespace/configurationsmatches/:pattern"),
    ("ConfigurationMatch0", Get, "/namespaces/:namespace/configurationsmatches"),
    // service catalog
    ("ServiceCatalog", Get, "/catalogservices"),
    ("ServiceCatalogShow", Get, "/catalogservices/:catalogservice"),
    ("ServiceCatalogMatch", Get, "/catalogservicesmatches/:pattern"),
    ("ServiceCatalogMatch0", Get, "/catalogservicesmatches"),
    // services
    ("ServiceApps", Get, "/namespaces/:namespace/serviceapps"),
    ("AllServices", Get, "/services"),
    ("ServiceCreate", Post, "/namespaces/:namespace/services"),
    ("ServiceList", Get, "/namespaces/:namespace/services"),
    ("ServiceShow", Get, "/namespaces/:namespace/services/:service"),
    ("ServiceDelete", Delete, "/namespaces/:namespace/services/:service"),
    ("ServiceBatchDelete", Delete, "/namespaces/:namespace/services"),
    ("ServiceUpdate", Patch, "/namespaces/:namespace/services/:service"),
    ("ServiceReplace", Put, "/namespaces/:namespace/services/:service"),
    ("ServiceMatch", Get, "/namespaces/:namespace/servicesmatches/:pattern"),
    ("ServiceMatch0", Get, "/namespaces/:namespace/servicesmatches"),
    ("ServiceBind", Post, "/namespaces/:namespace/services/:service/bind"),
    ("ServiceUnbind", Post, "/namespaces/:namespace/services/:service/unbind"),
    // application charts
    ("ChartList", Get, "/appcharts"),
    ("ChartMatch", Get, "/appchartsmatch/:pattern"),
    ("ChartMatch0", Get, "/appchartsmatch"),
    ("ChartShow", Get, "/appcharts/:name"),
    // gitconfigs
    ("Gitconfigs", Get, "/gitconfigs"),
    ("GitconfigCreate", Post, "/gitconfigs"),
    ("GitconfigDelete", Delete, "/gitconfigs/:gitconfig"),
    ("GitconfigBatchDelete", Delete, "/gitconfigs"),
    ("GitconfigsMatch", Get, "/gitconfigsmatch/:pattern"),
    ("GitconfigsMatch0", Get, "/gitconfigsmatch"),
    ("GitconfigShow", Get, "/gitconfigs/:gitconfig"),
    // export registries
    ("Exportregistries", Get, "/exportregistries"),
    ("ExportregistriesMatch", Get, "/exportregistrymatches/:pattern"),
    ("ExportregistriesMatch0", Get, "/exportregistrymatches"),
    ("GitProxy", Post, "/gitproxy"),
];

/// Websocket routes, served under `/wapi/v1`.
const WS_ROUTES: &[(&str, HttpVerb, &str)] = &[
    ("AppExec", Get, "/namespaces/:namespace/applications/:app/exec"),
    ("AppPortForward", Get, "/namespaces/:namespace/applications/:app/portforward"),
    ("AppLogs", Get, "/namespaces/:namespace/applications/:app/logs"),
    ("ServicePortForward", Get, "/namespaces/:namespace/services/:service/portforward"),
    ("StagingLogs", Get, "/namespaces/:namespace/staging/:stage_id/logs"),
];

fn registry(table: &[(&str, HttpVerb, &str)]) -> authz::Result<RouteRegistry> {
    let mut registry = RouteRegistry::new();
    for &(name, method, path) in table {
        registry.register(name, method, path)?;
    }
    Ok(registry)
}

/// The REST route registry.
pub fn api_routes() -> authz::Result<RouteRegistry> {
    registry(ROUTES)
}

/// The websocket route registry.
pub fn ws_routes() -> authz::Result<RouteRegistry> {
    registry(WS_ROUTES)
}

/// Builds the authorization engine for this API.
pub async fn init_engine(roles_getter: &dyn RolesGetter) -> authz::Result<AuthzEngine> {
    AuthzEngine::init(api_routes()?, ws_routes()?, ACTIONS_YAML, roles_getter).await
}
