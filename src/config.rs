//! Configuração do jobgate carregada a partir de `jobgate.toml`.
//!
//! A struct [`JobGateConfig`] diz onde fica a tabela de regras e como o
//! binário gera logs. Campos ausentes usam valores padrão, e um arquivo
//! ausente significa todos os padrões. A variável de ambiente `JOBGATE_RULES`
//! tem precedência sobre o caminho do arquivo de regras.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "jobgate.toml";
pub const RULES_ENV: &str = "JOBGATE_RULES";

#[derive(Debug, Clone, Deserialize)]
pub struct JobGateConfig {
    /// Caminho da tabela de regras em YAML.
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Filtro de log usado quando `RUST_LOG` não está definida.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Escreve o arquivo de regras embutido quando `rules_path` não existe.
    #[serde(default = "default_write_default_rules")]
    pub write_default_rules: bool,
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("jobs_settings.yml")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_write_default_rules() -> bool {
    true
}

impl Default for JobGateConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            log_level: default_log_level(),
            write_default_rules: default_write_default_rules(),
        }
    }
}

impl JobGateConfig {
    /// Carrega `jobgate.toml` no diretório atual.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega o arquivo em `path`, ou os padrões se ele não existir, e
    /// aplica a variável de ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<JobGateConfig>(&contents)
                .with_context(|| format!("invalid config in {}", path.display()))?
        } else {
            Self::default()
        };

        Ok(config.with_rules_override(std::env::var(RULES_ENV).ok()))
    }

    /// Um `rules` não vazio substitui o caminho de regras configurado.
    pub fn with_rules_override(mut self, rules: Option<String>) -> Self {
        if let Some(path) = rules
            && !path.trim().is_empty()
        {
            self.rules_path = PathBuf::from(path);
        }
        self
    }
}
