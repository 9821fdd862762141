use crate::error::PlaybackError;
use alert_core::config::PlayerConfig;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Plays one sound file and resolves once playback is over.
pub trait Notifier {
    fn play(&self, path: &Path) -> impl Future<Output = Result<(), PlaybackError>> + Send;
}

#[derive(Debug, Clone)]
pub enum Player {
    /// External program, e.g. `mpg123 -q <file>`.
    Command(CommandPlayer),
    #[cfg(feature = "audio")]
    Rodio,
    /// Nothing can produce sound; playback requests are only logged.
    Silent,
}

impl Player {
    pub fn from_config(config: Option<&PlayerConfig>) -> Self {
        match config {
            Some(config) => Player::Command(CommandPlayer::new(config)),
            None => built_in_player(),
        }
    }
}

#[cfg(feature = "audio")]
fn built_in_player() -> Player {
    Player::Rodio
}

#[cfg(not(feature = "audio"))]
fn built_in_player() -> Player {
    tracing::error!(
        name: "player.unavailable",
        "no `player` configured and built without the `audio` feature: alerts will NOT be audible, set `player.command` or rebuild with `--features audio`"
    );
    Player::Silent
}

impl Notifier for Player {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        match self {
            Player::Command(player) => player.play(path).await,
            #[cfg(feature = "audio")]
            Player::Rodio => play_with_rodio(path.to_path_buf()).await,
            Player::Silent => {
                info!(name: "player.silent", path = %path.display(), "would play sound");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
        }
    }

    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| PlaybackError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::ExitStatus {
                program: self.program.clone(),
                status,
            })
        }
    }
}

#[cfg(feature = "audio")]
async fn play_with_rodio(path: std::path::PathBuf) -> Result<(), PlaybackError> {
    tokio::task::spawn_blocking(move || -> Result<(), PlaybackError> {
        let file = std::fs::File::open(&path).map_err(|source| PlaybackError::Open {
            path: path.clone(),
            source,
        })?;
        let stream = rodio::OutputStreamBuilder::open_default_stream()?;
        let sink = rodio::Sink::connect_new(stream.mixer());
        sink.append(rodio::Decoder::new(std::io::BufReader::new(file))?);
        sink.sleep_until_end();
        Ok(())
    })
    .await?
}
