//! Interface de terminal da CLI: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`BatchProgress`] acompanha visualmente
//! a execução de um batch enquanto a CLI faz polling na API.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{BatchStatus, FeatureStatus};
use crate::wire::{BatchView, FeatureView};

/// Indicador visual de progresso para um batch em execução.
pub struct BatchProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
}

impl BatchProgress {
    /// Inicia o spinner para o batch informado.
    pub fn start(batch_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("{batch_id}: submitted"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Atualiza a mensagem com o status e o consumo de passos.
    pub fn update(&self, batch: &BatchView) {
        let resolved = batch
            .features
            .iter()
            .filter(|f| f.status.is_terminal())
            .count();
        self.pb.set_message(format!(
            "{}: {} ({resolved}/{} features, {}/{} steps)",
            batch.batch_id,
            batch.status,
            batch.features.len(),
            batch.steps_used,
            batch.max_steps
        ));
    }

    /// Finaliza o spinner e imprime o resumo do batch.
    pub fn finish(&self, batch: &BatchView) {
        self.pb.finish_and_clear();
        print_batch(batch);
    }
}

fn batch_style(status: BatchStatus) -> Style {
    match status {
        BatchStatus::Completed => Style::new().green().bold(),
        BatchStatus::Aborted => Style::new().red().bold(),
        BatchStatus::Running => Style::new().yellow(),
        BatchStatus::Pending => Style::new().dim(),
    }
}

fn feature_marker(status: FeatureStatus) -> String {
    match status {
        FeatureStatus::Succeeded => Style::new().green().apply_to("✓").to_string(),
        FeatureStatus::Failed => Style::new().red().apply_to("✗").to_string(),
        FeatureStatus::Running => Style::new().yellow().apply_to("↻").to_string(),
        FeatureStatus::Pending => Style::new().dim().apply_to("·").to_string(),
    }
}

/// Linha de uma feature no formato `✓ f1: succeeded - detalhe`.
pub fn feature_line(feature: &FeatureView) -> String {
    let mut line = format!(
        "{} {}: {}",
        feature_marker(feature.status),
        feature.feature_id,
        feature.status
    );
    if let Some(detail) = feature.detail.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" - {detail}"));
    }
    line
}

/// Imprime um batch com suas features.
pub fn print_batch(batch: &BatchView) {
    println!(
        "{} {} ({}/{} steps{})",
        Style::new().bold().apply_to(&batch.batch_id),
        batch_style(batch.status).apply_to(batch.status),
        batch.steps_used,
        batch.max_steps,
        if batch.dry_run { ", dry run" } else { "" }
    );
    for feature in &batch.features {
        println!("  {}", feature_line(feature));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(status: FeatureStatus, detail: Option<&str>) -> FeatureView {
        FeatureView {
            feature_id: "f1".into(),
            objective: "x".into(),
            status,
            detail: detail.map(str::to_string),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn feature_line_includes_status_and_detail() {
        console::set_colors_enabled(false);
        let line = feature_line(&feature(FeatureStatus::Failed, Some("timed out")));
        assert_eq!(line, "✗ f1: failed - timed out");
    }

    #[test]
    fn feature_line_omits_missing_detail() {
        console::set_colors_enabled(false);
        let line = feature_line(&feature(FeatureStatus::Pending, None));
        assert_eq!(line, "· f1: pending");
    }
}
