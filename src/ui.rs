//! Saída de terminal do jobgate com cores.
//!
//! Usa a crate `console` para estilização. O [`Printer`] mostra o resumo da
//! tabela de regras, os pacotes resolvidos, os registros de transição e o
//! estado final de uma simulação.

use console::Style;

use crate::engine::{TransitionRecord, TransitionState};
use crate::ids::JobId;
use crate::resolver::ResolvedBundle;
use crate::rules::RuleTable;
use crate::simulate::SimulationReport;

/// Impressora de resultados no terminal.
///
/// Sucesso em verde, negação em amarelo e falha em vermelho.
pub struct Printer {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_summary(&self, table: &RuleTable) {
        println!(
            "  {} {} job(s) configured",
            self.green.apply_to("✓"),
            table.len()
        );
        for id in table.job_ids() {
            let Some(rule) = table.lookup(id) else {
                continue;
            };
            let levels: Vec<String> = rule
                .level_permissions
                .iter()
                .map(|(level, entries)| format!("{level}:{}", entries.len()))
                .collect();
            println!("  {}", self.green.apply_to(id));
            println!(
                "    levels     {}",
                if levels.is_empty() { "-".to_string() } else { levels.join(" ") }
            );
            if !rule.incompatible_jobs.is_empty() {
                let ids: Vec<&str> = rule.incompatible_jobs.iter().map(JobId::as_str).collect();
                println!("    excludes   {}", ids.join(", "));
            }
            println!(
                "    on leave   -{} level(s), {} removal(s)",
                rule.on_leave_decrease,
                rule.on_leave_removals.len()
            );
        }
    }

    pub fn bundle(&self, job: &str, level: u32, bundle: Option<ResolvedBundle<'_>>) {
        match bundle {
            Some(bundle) => {
                println!(
                    "  {} {job} at level {level} uses the level {} bundle",
                    self.green.apply_to("✓"),
                    bundle.level
                );
                for entry in bundle.entries {
                    println!("    {} {entry}", self.dim.apply_to(entry.kind()));
                }
            }
            None => println!(
                "  {} no bundle for {job} at level {level}",
                self.yellow.apply_to("-")
            ),
        }
    }

    pub fn record(&self, record: &TransitionRecord, user_name: &str) {
        let header = format!("{} {} {}", record.kind, record.job, user_name);
        match record.state {
            TransitionState::Done => {
                let ops: Vec<String> = record.applied.ops.iter().map(ToString::to_string).collect();
                let mut line = format!("  {} {header}", self.green.apply_to("✓"));
                if let Some(level) = record.resolved_level {
                    line.push_str(&format!(" [level {level} bundle]"));
                }
                if let Some(decay) = record.decay {
                    line.push_str(&format!(
                        " [level {} → {}]",
                        decay.previous_level, decay.new_level
                    ));
                }
                if !ops.is_empty() {
                    line.push_str(&format!(" {}", ops.join(" ")));
                }
                println!("{line}");
            }
            TransitionState::Denied => {
                let message = record
                    .denial
                    .as_ref()
                    .map_or("", |notice| notice.message.as_str());
                println!("  {} {header}: {message}", self.yellow.apply_to("⊘"));
            }
            _ => {
                let reason = record
                    .failure
                    .as_ref()
                    .map_or("unknown failure".to_string(), |f| format!("{}: {}", f.kind, f.message));
                println!("  {} {header}: {reason}", self.red.apply_to("✗"));
            }
        }
    }

    /// Imprime o registro de transição formatado em JSON.
    pub fn record_json(&self, record: &TransitionRecord) {
        println!(
            "{}",
            serde_json::to_string_pretty(record).unwrap_or_default()
        );
    }

    /// Imprime cada registro e depois o estado final de cada usuário.
    pub fn report(&self, report: &SimulationReport, json: bool) {
        for record in &report.records {
            if json {
                self.record_json(record);
            } else {
                self.record(record, report.user_name(record.user));
            }
        }

        println!();
        println!("{}", self.dim.apply_to("─── Final state ───"));
        for user in &report.users {
            println!("  {}", self.green.apply_to(&user.name));
            for (job, state) in &user.jobs {
                let marker = if state.active { "active" } else { "inactive" };
                println!(
                    "    {job}: level {} xp {} ({marker})",
                    state.level, state.xp
                );
            }
            let entries = if user.entitlements.is_empty() {
                "-".to_string()
            } else {
                user.entitlements.join(", ")
            };
            println!("    entitlements: {entries}");
        }
    }
}
