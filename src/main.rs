use parley::application::SessionController;
use parley::config::Config;
use parley::domain::participant::ParticipantId;
use parley::domain::shared::events::SessionEvent;
use parley::infrastructure::media::ProfileBackend;
use parley::infrastructure::peer::transport::SdpEngine;
use std::sync::Arc;
use tracing::{info, warn, Level};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting Parley call-session engine");

    // Load configuration
    let config = match std::env::var("PARLEY_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::default(),
    };
    info!("Configuration loaded: {:?}", config);

    let room_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "lobby".to_string());
    let local_id = ParticipantId::from(Uuid::new_v4().to_string());
    info!(%room_id, %local_id, "joining room");

    let backend = Arc::new(ProfileBackend::full());
    let transport = Arc::new(SdpEngine::new(config.ice.clone()));

    let (controller, handle) = SessionController::join(
        config,
        backend,
        transport,
        room_id,
        local_id,
    )
    .await?;

    // Log the session event stream
    let mut events = controller.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Notification { severity, message } => {
                    info!(?severity, %message, "notification");
                }
                other => {
                    info!(event = ?other, "session event");
                }
            }
        }
    });

    // Hang up on Ctrl-C
    let session = tokio::spawn(controller.run());
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    handle.hang_up();

    match session.await? {
        Ok(()) => info!("session ended"),
        Err(err) => warn!(%err, "session ended with error"),
    }
    Ok(())
}
