use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use refinevoice_core::{Transcript, TranscriptSource};
use refinevoice_runtime::runtime_engine::load_runner;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Speech,
    User,
}

impl From<SourceArg> for TranscriptSource {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Speech => TranscriptSource::Speech,
            SourceArg::User => TranscriptSource::User,
        }
    }
}

/// Refine a speech transcript into clean traditional Chinese text.
#[derive(Debug, Parser)]
#[command(name = "refinevoice", version)]
struct Cli {
    /// Pipeline configuration file; defaults are used when it does not exist.
    #[arg(long, value_name = "PATH", default_value = "refinevoice.json")]
    config: PathBuf,

    /// Print the whole run (stage outcomes, fallback reason) as JSON.
    #[arg(long)]
    json: bool,

    #[arg(long, value_enum, default_value_t = SourceArg::Speech)]
    source: SourceArg,

    /// Text to refine; read from stdin when omitted.
    text: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let input = if cli.text.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read transcript from stdin")?;
        buf
    } else {
        cli.text.join(" ")
    };

    let (cfg, runner) = load_runner(&cli.config)?;
    log::debug!("CLI: model={} mode={:?}", cfg.options.model_name, cfg.options.mode);

    let run = runner.run_blocking(Transcript::new(input, cli.source.into()));

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("encode run JSON")?
        );
    } else {
        println!("{}", run.final_text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags_and_text() {
        let cli = Cli::try_parse_from([
            "refinevoice",
            "--json",
            "--source",
            "user",
            "--config",
            "cfg.json",
            "你好",
            "世界",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.source, SourceArg::User));
        assert_eq!(cli.config, PathBuf::from("cfg.json"));
        assert_eq!(cli.text, vec!["你好", "世界"]);
    }
}
