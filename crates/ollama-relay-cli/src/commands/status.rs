use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use ollama_relay::client::GenerationClient;
use ollama_relay::relay::ModelStatus;

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct StatusCommand {
    #[clap(long, help = "Exit with status 1 when the upstream is unavailable")]
    pub fail_if_down: bool,
}

impl StatusCommand {
    pub async fn execute(&self, client: &GenerationClient, format: OutputFormat) -> CliResult<()> {
        let status = client.status().await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
            OutputFormat::Table => println!("{}", render_status(&status)),
        }

        if self.fail_if_down && !status.available {
            return Err("Upstream is unavailable".into());
        }
        Ok(())
    }
}

fn render_status(status: &ModelStatus) -> String {
    if !status.available {
        let reason = status.error.as_deref().unwrap_or("unknown error");
        return format!("Upstream: unavailable ({})", truncate_string(reason, 120));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["#", "Model"]);

    for (i, model) in status.models.iter().enumerate() {
        table.add_row([(i + 1).to_string(), model.clone()]);
    }

    format!(
        "Upstream: available ({} models)\n\n{table}",
        status.models.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_available_lists_models() {
        let rendered = render_status(&ModelStatus::available(vec![
            "llama3:latest".to_string(),
            "mistral".to_string(),
        ]));

        assert!(rendered.starts_with("Upstream: available (2 models)"));
        assert!(rendered.contains("llama3:latest"));
        assert!(rendered.contains("mistral"));
    }

    #[test]
    fn test_render_unavailable_shows_reason() {
        let rendered = render_status(&ModelStatus::unavailable("connection refused"));
        assert_eq!(rendered, "Upstream: unavailable (connection refused)");
    }
}
