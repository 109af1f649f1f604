use std::io::Write;

use clap::Parser;
use futures::StreamExt;
use ollama_relay::client::GenerationClient;
use ollama_relay::relay::GenerationRequest;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct GenerateCommand {
    #[clap(long, short, help = "Model name as known to Ollama (e.g., 'llama3')")]
    pub model: String,

    #[clap(long, short, help = "Prompt text")]
    pub prompt: String,

    #[clap(long, short, help = "Sampling temperature, passed through as-is")]
    pub temperature: Option<f64>,

    #[clap(long, help = "Wait for the whole response instead of streaming it")]
    pub no_stream: bool,
}

impl GenerateCommand {
    pub fn request(&self) -> GenerationRequest {
        let request = GenerationRequest::new(&self.model, &self.prompt).with_stream(!self.no_stream);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }

    pub async fn execute(&self, client: &GenerationClient, format: OutputFormat) -> CliResult<()> {
        let request = self.request();

        if self.no_stream {
            let body = client.generate(&request).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
                OutputFormat::Table => {
                    println!("{}", body["response"].as_str().unwrap_or_default())
                }
            }
            return Ok(());
        }

        let mut stream = client.generate_stream(&request).await?;
        let mut stdout = std::io::stdout();

        while let Some(item) = stream.next().await {
            let line = item?;
            match format {
                OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(&line)?)?,
                OutputFormat::Table => write!(stdout, "{}", line.response)?,
            }
            stdout.flush()?;
        }

        if matches!(format, OutputFormat::Table) {
            writeln!(stdout)?;
        }
        Ok(())
    }
}
