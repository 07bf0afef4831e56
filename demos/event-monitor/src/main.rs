//! Example monitor that prints every push event from an agent backend.
//!
//! Run with: cargo run -p event-monitor-example
//!
//! Set `AGENT_BRIDGE_URL` (default `http://localhost:3000/api`) and
//! optionally `AGENT_BRIDGE_TOKEN`. `RUST_LOG=agent_bridge_transport=debug`
//! shows the channel lifecycle.

use agent_bridge_core::{
    Transport,
    protocol::{
        ChatEvent, DomainGraphUpdate, HealthCheck, ListSessions, NotificationLevel,
        NotificationShow, ToolEvent, WorkflowEvent,
    },
};
use agent_bridge_transport::{BackendTransport, BridgeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = std::env::var("AGENT_BRIDGE_URL")
        .map_or_else(|_| BridgeConfig::default(), BridgeConfig::new);
    if let Ok(token) = std::env::var("AGENT_BRIDGE_TOKEN") {
        config = config.with_auth_token(token);
    }
    tracing::info!(base_url = %config.base_url, "Monitoring agent backend");

    let transport = BackendTransport::new(config)?;
    register_handlers(&transport);

    if let Err(e) = transport.request(HealthCheck {}).await {
        tracing::warn!(error = %e, "Health check failed, channels will keep retrying");
    }
    match transport.request(ListSessions { limit: Some(10) }).await {
        Ok(sessions) => {
            for session in sessions {
                tracing::info!(
                    session_id = %session.session_id,
                    title = session.title.as_deref().unwrap_or("-"),
                    "Existing session"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not list sessions"),
    }

    transport.connect();
    transport.connect_workflow();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    transport.disconnect();

    Ok(())
}

fn register_handlers<T: Transport>(transport: &T) {
    transport.on::<DomainGraphUpdate, _>(|msg| {
        tracing::info!(
            nodes = msg.data.nodes.len(),
            edges = msg.data.edges.len(),
            removed = msg.data.removed.len(),
            "Domain graph updated"
        );
        Ok(())
    });

    transport.on::<ChatEvent, _>(|msg| {
        tracing::info!(session_id = %msg.data.session_id, kind = %msg.data.kind, "Chat event");
        Ok(())
    });

    transport.on::<ToolEvent, _>(|msg| {
        tracing::info!(
            execution_id = %msg.data.execution_id,
            tool = msg.data.tool_name.as_deref().unwrap_or("-"),
            status = ?msg.data.status,
            "Tool event"
        );
        Ok(())
    });

    transport.on::<NotificationShow, _>(|msg| {
        let NotificationShow { message, level, title } = msg.data;
        let title = title.unwrap_or_default();
        match level {
            NotificationLevel::Info => tracing::info!(%title, "{message}"),
            NotificationLevel::Warning => tracing::warn!(%title, "{message}"),
            NotificationLevel::Error => tracing::error!(%title, "{message}"),
        }
        Ok(())
    });

    transport.on::<WorkflowEvent, _>(|msg| {
        tracing::info!(
            kind = %msg.data.kind,
            session_id = msg.data.session_id.as_deref().unwrap_or("-"),
            "Workflow event"
        );
        Ok(())
    });

    transport.on_error(|msg, err| {
        tracing::error!(message_type = %msg.message_type, error = %err, "Handler failed");
    });
}
