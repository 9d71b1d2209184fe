use std::process;
use std::sync::Arc;

use clap::Parser;
use prenota::config::{CliArgs, Command, LoadError, Settings, WatchArgs};
use prenota::sync::SyncEngine;
use prenota::transport::WsChannelTransport;
use prenota::{ApiClient, ChannelKind, CredentialStore, PlatformClient, SessionState, telemetry};
use prenota_api_types::{Credential, Role};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &LoadError) {
    if tracing::dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }
    eprintln!("prenota failed to start: {error}");
}

async fn run() -> Result<(), LoadError> {
    let cli = CliArgs::parse();
    let settings = Settings::load(&cli)?;
    telemetry::init(&settings.logging)?;

    match cli.command {
        Some(Command::Watch(args)) => watch(settings, args).await,
        None => watch(settings, WatchArgs::default()).await,
    }
}

/// Run the headless synchronization agent until interrupted.
async fn watch(settings: Settings, args: WatchArgs) -> Result<(), LoadError> {
    let credentials = match &settings.session.credential_path {
        Some(path) => Arc::new(CredentialStore::load(path.clone()).await),
        None => Arc::new(CredentialStore::in_memory()),
    };

    if let (Some(access_token), Some(refresh_token)) = (&args.access_token, &args.refresh_token) {
        // seeded tokens carry no role claim; the next login or refresh
        // replaces the whole slot anyway
        credentials
            .set(Credential {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
                role: Role::Resident,
            })
            .await;
        info!("credential slot seeded from arguments");
    }

    let api = Arc::new(
        ApiClient::new(
            settings.transport.api_base_url.clone(),
            settings.transport.language,
            settings.transport.request_timeout,
            Arc::clone(&credentials),
        )
        .map_err(|e| LoadError::Transport(e.to_string()))?,
    );

    let engine = Arc::new(SyncEngine::new(settings.sync.clone()));
    let client = PlatformClient::new(Arc::clone(&engine), Arc::clone(&api), settings.transport.language);

    let transport = Arc::new(WsChannelTransport::new(settings.transport.channel_url.clone()));
    let listener = engine.start_listener(transport, credentials.watch());

    info!(
        api = %settings.transport.api_base_url,
        channels = %settings.transport.channel_url,
        language = settings.transport.language.as_str(),
        "prenota agent running, press ctrl-c to stop"
    );

    let mut session_watch = api.session_watch();
    let mut booking_state = listener.state(ChannelKind::Booking);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = session_watch.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *session_watch.borrow();
                info!(?state, "session state changed");
                if state == SessionState::LoginRequired {
                    warn!("credential refresh failed, re-run with fresh tokens");
                }
            }
            changed = booking_state.changed() => {
                if changed.is_err() {
                    break;
                }
                info!(state = ?*booking_state.borrow(), "booking channel");
            }
        }
    }

    info!("shutting down");
    listener.shutdown().await;
    client.engine().teardown();
    Ok(())
}
