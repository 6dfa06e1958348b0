//! On-demand announcement server.
//!
//! `GET /` is a liveness check; `GET /notify` announces one package, see
//! [`NotifyService::handle`] for the checks a request goes through.

use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use libget_ci_core::announce::{BlueskyClient, DiscordWebhook};
use libget_ci_core::cdn::PlatformRepoSource;
use libget_ci_core::contract::{AnnounceError, Announcer, RepoIndexSource};
use libget_ci_core::notify::{NotifyQuery, NotifyService};
use tracing::info;

use crate::load_config::Settings;

pub const DEFAULT_PORT: u16 = 8111;

pub struct ServerState {
    pub port: u16,
    pub service: NotifyService<Box<dyn RepoIndexSource>>,
}

impl ServerState {
    /// Wire the service from the environment. Channels without credentials
    /// stay unconfigured and answer as such.
    pub fn from_settings(settings: &Settings, port: u16) -> Result<Self, AnnounceError> {
        let discord = match settings.discord_webhook_url.as_deref() {
            Some(url) => Some(Box::new(DiscordWebhook::new(url)?) as Box<dyn Announcer>),
            None => None,
        };
        let bluesky = match settings.bsky_auth.as_deref() {
            Some(password) => Some(Box::new(BlueskyClient::new(
                settings.bsky_service.as_str(),
                settings.bsky_handle.as_str(),
                password,
            )?) as Box<dyn Announcer>),
            None => None,
        };

        Ok(Self {
            port,
            service: NotifyService {
                announce_key: settings.announce_key.clone(),
                repo_source: Box::new(PlatformRepoSource),
                discord,
                bluesky,
            },
        })
    }
}

#[get("/")]
pub async fn index(state: web::Data<ServerState>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(format!(
            "Notify Server is running, listening on port {}...",
            state.port
        ))
}

#[get("/notify")]
pub async fn notify(
    state: web::Data<ServerState>,
    query: web::Query<NotifyQuery>,
) -> impl Responder {
    let answer = state.service.handle(&query).await;
    info!(
        platform = query.platform.as_deref().unwrap_or(""),
        package = query.package.as_deref().unwrap_or(""),
        answer = %answer,
        "[NOTIFY] Handled notify request"
    );
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(answer)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(notify);
}

/// Serve until the process is stopped. Must run inside an actix system.
pub async fn run_server(state: ServerState) -> std::io::Result<()> {
    let port = state.port;
    let state = web::Data::new(state);
    info!(port, "[NOTIFY] Notify Server listening on port {port}");
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use libget_ci_core::contract::MockRepoIndexSource;
    use libget_ci_core::repo::{RepoIndex, RepoPackage};

    fn state(announce_key: Option<&str>) -> ServerState {
        let mut repo = MockRepoIndexSource::new();
        repo.expect_fetch_repo_index().returning(|_| {
            Ok(RepoIndex::from_packages(vec![RepoPackage {
                name: Some("appstore".into()),
                ..Default::default()
            }]))
        });
        ServerState {
            port: DEFAULT_PORT,
            service: NotifyService {
                announce_key: announce_key.map(String::from),
                repo_source: Box::new(repo),
                discord: None,
                bluesky: None,
            },
        }
    }

    async fn get_text(state: ServerState, uri: &str) -> String {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get().uri(uri).to_request();
        let body = test::call_and_read_body(&app, req).await;
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[actix_web::test]
    async fn index_reports_port() {
        assert_eq!(
            get_text(state(None), "/").await,
            "Notify Server is running, listening on port 8111..."
        );
    }

    #[actix_web::test]
    async fn notify_without_configured_key() {
        assert_eq!(
            get_text(state(None), "/notify?key=abc").await,
            "No announce key set in environment variables"
        );
    }

    #[actix_web::test]
    async fn notify_checks_query_in_order() {
        let cases = [
            ("/notify?key=nope", "Invalid announce key"),
            ("/notify?key=secret", "No platform specified"),
            ("/notify?key=secret&platform=3ds", "Unknown platform 3ds"),
            ("/notify?key=secret&platform=switch", "No package specified"),
            (
                "/notify?key=secret&platform=switch&package=ghost",
                "Package ghost not found in repo data",
            ),
            (
                "/notify?key=secret&platform=switch&package=appstore",
                "No announce method specified",
            ),
            (
                "/notify?key=secret&platform=switch&package=appstore&discord=1",
                "Discord is not configured",
            ),
        ];
        for (uri, expected) in cases {
            assert_eq!(get_text(state(Some("secret")), uri).await, expected, "{uri}");
        }
    }

    #[actix_web::test]
    async fn state_from_settings_leaves_missing_channels_unconfigured() {
        let settings = Settings::from_lookup(|name| match name {
            "DISCORD_WEBHOOK_URL" => Some("https://discord.example/hook".to_string()),
            "ANNOUNCE_KEY" => Some("k".to_string()),
            _ => None,
        });
        let state = ServerState::from_settings(&settings, 9000).unwrap();
        assert_eq!(state.port, 9000);
        assert!(state.service.discord.is_some());
        assert!(state.service.bluesky.is_none());
        assert_eq!(state.service.announce_key.as_deref(), Some("k"));
    }
}
