//! Unix socket client for talking to pilotd.

use anyhow::{anyhow, Result};
use pilot_common::ipc::{Request, Response};
use pilot_common::SystemConfig;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub struct PilotClient {
    stream: UnixStream,
}

impl PilotClient {
    pub async fn connect() -> Result<Self> {
        let socket_path = socket_path();
        if !socket_path.exists() {
            return Err(anyhow!(
                "Le daemon pilotd ne tourne pas (socket {} absent).\n\
                 Demarrez-le avec: systemctl start pilotd",
                socket_path.display()
            ));
        }

        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| anyhow!("Connexion a pilotd impossible: {}", e))?;
        Ok(Self { stream })
    }

    pub async fn call(&mut self, request: Request) -> Result<Response> {
        let mut payload = serde_json::to_string(&request)?;
        payload.push('\n');
        self.stream.write_all(payload.as_bytes()).await?;

        let mut reader = BufReader::new(&mut self.stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line.trim().is_empty() {
            return Err(anyhow!("pilotd a ferme la connexion sans repondre"));
        }
        Ok(serde_json::from_str(&line)?)
    }
}

fn socket_path() -> PathBuf {
    SystemConfig::load().map(|c| c.socket_path()).unwrap_or_else(|_| SystemConfig::default().socket_path())
}
