//! `transport` - CLI and HTTP server for the campus transport service.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use transport::card::PngQrEncoder;
use transport::cli::{Cli, Command};
use transport::config::MailBackend;
use transport::db::TransportDb;
use transport::notify::{MailTransport, RecordingMailer, SmtpMailer};
use transport::server::create_router;
use transport::{init_logging, AppState, Config};

/// How often expired sessions are swept.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    let db = Arc::new(
        TransportDb::open(&config.storage.database_path).context("opening database")?,
    );

    match cli.command {
        Command::Serve => serve(config, db).await,
        Command::CreateAdmin {
            email,
            name,
            password,
        } => {
            let identity = transport::identity::IdentityStore::new(db);
            let admin = identity
                .create_admin(&email, &name, &password)
                .context("creating administrator")?;
            info!(user_id = admin.id, "Created administrator {}", admin.email);
            Ok(())
        }
    }
}

async fn serve(config: Config, db: Arc<TransportDb>) -> anyhow::Result<()> {
    let mailer: Arc<dyn MailTransport> = match config.mail.backend {
        MailBackend::Smtp => Arc::new(SmtpMailer::from_config(&config.mail)?),
        MailBackend::Memory => {
            warn!("Mail backend is \"memory\"; schedule emails are only logged");
            Arc::new(RecordingMailer::new())
        }
    };

    let state = Arc::new(AppState::new(
        &config,
        db,
        mailer,
        Arc::new(PngQrEncoder::default()),
    ));

    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_state.sessions.purge_expired();
            if purged > 0 {
                info!("Purged {purged} expired sessions");
            }
        }
    });

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
