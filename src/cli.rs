//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, submit, status,
//! fetch, list) e flags globais (--api-url, --config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::client::DEFAULT_API_URL;

/// Feature Factory: executa batches de features com orçamento de passos.
#[derive(Debug, Parser)]
#[command(name = "feature-factory", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL base da API usada pelos subcomandos cliente.
    #[arg(long, global = true, env = "FEATURE_FACTORY_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Caminho do arquivo de configuração do servidor.
    #[arg(long, global = true, default_value = crate::config::CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe o servidor HTTP.
    Serve {
        /// Sobrescreve o host da configuração.
        #[arg(long)]
        host: Option<String>,

        /// Sobrescreve a porta da configuração.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Envia um arquivo JSON de batch.
    Submit {
        /// Caminho para o JSON do batch.
        #[arg(long)]
        file: PathBuf,

        /// Aguarda o batch terminar, mostrando o progresso.
        #[arg(long, default_value_t = false)]
        wait: bool,
    },

    /// Mostra o status de um batch.
    Status {
        batch_id: String,
    },

    /// Mostra uma feature de um batch.
    Fetch {
        batch_id: String,
        feature_id: String,
    },

    /// Lista todos os batches.
    List,
}
