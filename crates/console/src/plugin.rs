use std::sync::RwLock;

use {
    async_trait::async_trait,
    tokio::io::{AsyncBufReadExt, BufReader},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatplug_common::types::{Author, InboundMessage, OutboundMessage},
    chatplug_services::{
        AdapterDescriptor, Error, Result, ServiceContext, ServicePlugin,
    },
};

use crate::config::ConsoleConfig;

struct SessionState {
    config: ConsoleConfig,
    cancel: CancellationToken,
}

/// Terminal-backed service plugin.
pub struct ConsolePlugin {
    // Never held across an await point.
    session: RwLock<Option<SessionState>>,
}

impl ConsolePlugin {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
        }
    }

    pub fn descriptor() -> AdapterDescriptor {
        AdapterDescriptor {
            module_name: "console".into(),
            display_name: "Console".into(),
            config_schema: ConsoleConfig::schema(),
        }
    }

    fn session_config(&self) -> Option<ConsoleConfig> {
        match self.session.read() {
            Ok(guard) => guard.as_ref().map(|s| s.config.clone()),
            Err(_) => None,
        }
    }
}

impl Default for ConsolePlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a routed message the way the console "platform" displays it.
fn render(message: &OutboundMessage) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message.origin_instance, message.author.username, message.content
    );
    for att in &message.attachments {
        line.push_str(&format!(
            "\n    ({}) {} <{}>",
            att.kind.as_str(),
            att.name,
            att.url
        ));
    }
    line
}

async fn read_loop(ctx: ServiceContext, config: ConsoleConfig) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let author = Author::new(config.username.clone(), config.username.clone());
                let message = InboundMessage::text(config.thread.clone(), author, text);
                if ctx.emit(message).await.is_err() {
                    // Exchange is gone; nothing left to feed.
                    break;
                }
            },
            Ok(None) => {
                debug!(instance = %ctx.instance_name, "stdin closed, console adapter idle");
                break;
            },
            Err(e) => {
                warn!(instance = %ctx.instance_name, "stdin read failed: {e}");
                break;
            },
        }
    }
}

#[async_trait]
impl ServicePlugin for ConsolePlugin {
    fn module_name(&self) -> &str {
        "console"
    }

    fn display_name(&self) -> &str {
        "Console"
    }

    async fn initialize(&self, ctx: ServiceContext) -> Result<()> {
        let config: ConsoleConfig = serde_json::from_value(ctx.config.clone())
            .map_err(|e| Error::connection(format!("invalid console config: {e}")))?;

        {
            let mut guard = self
                .session
                .write()
                .map_err(|_| Error::unavailable("console session lock poisoned"))?;
            if guard.is_some() {
                return Err(Error::unavailable("console instance already initialized"));
            }
            *guard = Some(SessionState {
                config: config.clone(),
                cancel: ctx.cancel.clone(),
            });
        }

        info!(
            instance = %ctx.instance_name,
            thread = %config.thread,
            "console adapter reading stdin"
        );
        tokio::spawn(read_loop(ctx, config));
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        let state = match self.session.write() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        // Idempotent: nothing to do when never initialized or already stopped.
        if let Some(state) = state {
            state.cancel.cancel();
        }
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage, target_external_id: &str) -> Result<()> {
        let config = self
            .session_config()
            .ok_or_else(|| Error::delivery(target_external_id, "console not initialized"))?;
        if config.thread != target_external_id {
            return Err(Error::delivery(
                target_external_id,
                "unknown console thread",
            ));
        }
        println!("{}", render(message));
        Ok(())
    }
}
