use anyhow::{Context, Result};
use serde::Deserialize;
use songbird::input::{ChildContainer, Input};
use std::{
    collections::HashMap,
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{config::Config, error::MusicError};

/// Metadata obtenida con ffprobe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub duration: Option<Duration>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl FfprobeFormat {
    /// Las etiquetas cambian de mayúsculas según el contenedor
    fn tag(&self, name: &str) -> Option<String> {
        self.tags
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

fn parse_probe(stdout: &[u8]) -> Result<ProbeInfo> {
    let output: FfprobeOutput =
        serde_json::from_slice(stdout).context("Salida de ffprobe inválida")?;
    let Some(format) = output.format else {
        return Ok(ProbeInfo::default());
    };

    Ok(ProbeInfo {
        duration: format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64),
        title: format.tag("title"),
        artist: format.tag("artist"),
    })
}

/// Argumentos de ffmpeg: lee la URL remota y emite WAV 48 kHz estéreo por stdout
fn ffmpeg_args(url: &str, start_at: Duration) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if !start_at.is_zero() {
        args.push("-ss".to_string());
        args.push(format!("{:.3}", start_at.as_secs_f64()));
    }

    args.extend(
        ["-i", url, "-f", "wav", "-ar", "48000", "-ac", "2", "-map", "a", "-"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

/// Procesos externos: ffmpeg para transcodificar y ffprobe para analizar
pub struct Transcoder {
    ffmpeg: String,
    ffprobe: String,
    ytdlp: String,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            ytdlp: config.ytdlp_path.clone(),
            timeout: config.transcoder_timeout(),
        }
    }

    /// Lanza ffmpeg y lo envuelve como entrada de songbird
    pub fn input(&self, url: &str, start_at: Duration) -> Result<Input, MusicError> {
        debug!("🎛️ ffmpeg desde {:?}: {}", start_at, url);

        let child = Command::new(&self.ffmpeg)
            .args(ffmpeg_args(url, start_at))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MusicError::Transcoder(format!("no se pudo iniciar ffmpeg: {e}")))?;

        Ok(Input::from(ChildContainer::from(child)))
    }

    /// Analiza un fichero remoto; el proceso se mata si supera el timeout
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let output = async_process::Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                url,
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| MusicError::Transcoder(format!("ffprobe superó {:?}", self.timeout)))?
            .context("Error al ejecutar ffprobe")?;

        if !output.status.success() {
            anyhow::bail!(MusicError::Transcoder(format!(
                "ffprobe terminó con {}",
                output.status
            )));
        }

        parse_probe(&output.stdout)
    }

    /// Verifica que los binarios externos respondan (usado por `--health-check`)
    pub async fn check_dependencies(&self) -> Result<()> {
        let checks = [
            (self.ytdlp.as_str(), "--version"),
            (self.ffmpeg.as_str(), "-version"),
            (self.ffprobe.as_str(), "-version"),
        ];

        for (binary, flag) in checks {
            let status = async_process::Command::new(binary)
                .arg(flag)
                .stdout(async_process::Stdio::null())
                .stderr(async_process::Stdio::null())
                .status()
                .await
                .with_context(|| format!("{} no encontrado", binary))?;

            if !status.success() {
                warn!("❌ {} respondió con {}", binary, status);
                anyhow::bail!("{} no funciona correctamente", binary);
            }
            info!("✅ {} disponible", binary);
        }

        Ok(())
    }
}
