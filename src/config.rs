//! Configuração do serviço carregada a partir de `factory.toml`.
//!
//! A struct [`FactoryConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `FEATURE_FACTORY_*` têm precedência sobre o arquivo.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::FactoryError;

pub const CONFIG_FILE: &str = "factory.toml";

/// Como o POST executa o batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// O POST retorna imediatamente; o batch roda numa task em background.
    Background,
    /// O POST só retorna depois que o batch termina ou é abortado.
    Inline,
}

/// Qual executor recebe os objetivos das features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Mock,
    Ollama,
}

/// Configuração de nível superior carregada de `factory.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FactoryConfig {
    /// Endereço de escuta do servidor HTTP.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Arquivo JSON de persistência. Sem ele, os batches ficam só em memória.
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Orçamento de passos usado quando o request não informa `max_steps`.
    #[serde(default = "default_max_steps")]
    pub default_max_steps: u32,

    /// Máximo de batches executando ao mesmo tempo.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Tempo máximo de uma execução de feature, em segundos.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    #[serde(default = "default_execution")]
    pub execution: ExecutionMode,

    #[serde(default = "default_executor")]
    pub executor: ExecutorKind,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// Retentativas do executor para falhas de infraestrutura.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_steps() -> u32 {
    10
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_step_timeout_secs() -> u64 {
    120
}

fn default_execution() -> ExecutionMode {
    ExecutionMode::Background
}

fn default_executor() -> ExecutorKind {
    ExecutorKind::Mock
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_file: None,
            default_max_steps: default_max_steps(),
            max_concurrent_batches: default_max_concurrent_batches(),
            step_timeout_secs: default_step_timeout_secs(),
            execution: default_execution(),
            executor: default_executor(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl FactoryConfig {
    /// Carrega a configuração de um caminho explícito e aplica o ambiente.
    pub fn load_from(path: &Path) -> Result<Self, FactoryError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<FactoryConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Aplica overrides vindos de `lookup` (normalmente `std::env::var`).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), FactoryError> {
        if let Some(host) = lookup("FEATURE_FACTORY_HOST").filter(|v| !v.is_empty()) {
            self.host = host;
        }
        if let Some(port) = lookup("FEATURE_FACTORY_PORT").filter(|v| !v.is_empty()) {
            self.port = port
                .parse()
                .map_err(|_| FactoryError::Config(format!("invalid FEATURE_FACTORY_PORT: {port}")))?;
        }
        if let Some(data) = lookup("FEATURE_FACTORY_DATA").filter(|v| !v.is_empty()) {
            self.data_file = Some(PathBuf::from(data));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FactoryError> {
        if self.default_max_steps == 0 {
            return Err(FactoryError::Config("default_max_steps must be positive".into()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(FactoryError::Config(
                "max_concurrent_batches must be positive".into(),
            ));
        }
        if self.step_timeout_secs == 0 {
            return Err(FactoryError::Config("step_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
