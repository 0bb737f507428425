/// dingrelay - relays Prometheus Alertmanager webhooks to DingTalk robots.
///
/// Each configured target maps `POST /{name}/send` to one robot webhook. The
/// Alertmanager payload is rendered into a markdown message through
/// Handlebars templates and posted to the robot; configuration and templates
/// are reloaded without a restart.
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod notification;
pub mod reload;
pub mod state;
pub mod task_manager;
pub mod telemetry;
pub mod template;
