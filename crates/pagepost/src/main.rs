use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pagepost_core::config::{
    Config, ConfigOverrides, PASSWORD_ENV, STDIN_SENTINEL, load_with_overrides,
};
use pagepost_core::error::{EXIT_FAILURE, PostError};
use pagepost_core::format::FileFormat;
use pagepost_core::interact::{HeadlessInteraction, Interaction, TerminalInteraction};
use pagepost_core::publish::{
    PublishEngine, PublishOptions, convert_markdown_pages, validate_online,
};
use pagepost_core::remote::{ConfluenceClient, ConfluenceClientConfig};
use pagepost_core::runtime::normalize_for_display;
use pagepost_core::wizard::{WizardOutcome, create_config};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pagepost",
    version,
    about = "Publish locally written pages to a Confluence wiki"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", default_value = "config.toml")]
    config: PathBuf,
    #[arg(
        long,
        global = true,
        value_name = "TITLE",
        help = "Override the page title. Only valid with a single page"
    )]
    page_title: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "TITLE",
        help = "Create the page under this parent. Only valid with a single page"
    )]
    parent_page_title: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Override the page file, '-' reads it from standard input"
    )]
    page_file: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Password, falls back to CONFLUENCE_PASSWORD and the config"
    )]
    password: Option<String>,
    #[arg(long, global = true, help = "Update pages last edited by someone else")]
    force: bool,
    #[arg(long, global = true, help = "Create missing pages without asking")]
    force_create: bool,
    #[arg(long, global = true, help = "Mark updates as minor edits")]
    minor_edit: bool,
    #[arg(long, global = true, help = "Print a summary of processed pages")]
    report: bool,
    #[arg(long, global = true, help = "Only print warnings and results")]
    quiet: bool,
    #[arg(long, global = true, help = "Enable debug logging")]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or update every page from the config.
    PostPage(PostPageArgs),
    /// Check the config, and optionally the credentials against the wiki.
    Validate(ValidateArgs),
    /// Write a config file interactively.
    CreateConfig,
    /// Print the XHTML rendering of markdown pages.
    ConvertMarkdown,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::PostPage(_) => "post-page",
            Self::Validate(_) => "validate",
            Self::CreateConfig => "create-config",
            Self::ConvertMarkdown => "convert-markdown",
        }
    }

    fn accepts_stdin(&self) -> bool {
        matches!(self, Self::PostPage(_) | Self::ConvertMarkdown)
    }
}

#[derive(Debug, Args)]
struct PostPageArgs {
    #[arg(long, value_name = "FILE", num_args = 1.., help = "Attach files to the first page")]
    upload_files: Vec<PathBuf>,
    #[arg(long, value_name = "TEXT")]
    version_comment: Option<String>,
    #[arg(long, help = "Create missing pages in the root of their space")]
    create_in_space_root: bool,
    #[arg(long, value_name = "FORMAT", value_parser = parse_file_format)]
    file_format: Option<FileFormat>,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    #[arg(long, help = "Also fetch the first page's space from the wiki")]
    online: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(error) = run(cli) {
        eprintln!("Error: {error:#}");
        let code = error
            .downcast_ref::<PostError>()
            .map(PostError::exit_code)
            .unwrap_or(EXIT_FAILURE);
        process::exit(code);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    debug!("command: {}", cli.command.name());
    if cli.page_file.as_deref() == Some(STDIN_SENTINEL) && !cli.command.accepts_stdin() {
        return Err(PostError::StdinIncompatible {
            command: cli.command.name().to_string(),
        }
        .into());
    }
    load_dotenv();

    match &cli.command {
        Commands::CreateConfig => run_create_config(&cli),
        Commands::Validate(args) => run_validate(&cli, args),
        Commands::ConvertMarkdown => run_convert_markdown(&cli),
        Commands::PostPage(args) => run_post_page(&cli, args),
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("loaded environment from {}", path.display()),
        Err(error) if error.not_found() => {}
        Err(error) => warn!("failed to load .env file: {error}"),
    }
}

fn load_config(cli: &Cli, file_format: Option<FileFormat>) -> Result<Config> {
    let overrides = ConfigOverrides {
        page_title: cli.page_title.clone(),
        parent_page_title: cli.parent_page_title.clone(),
        page_file: cli.page_file.clone(),
        file_format,
    };
    let config = load_with_overrides(&cli.config, &overrides).with_context(|| {
        format!(
            "failed to load configuration from {}",
            normalize_for_display(&cli.config)
        )
    })?;
    if config.reads_stdin() && !cli.command.accepts_stdin() {
        return Err(PostError::StdinIncompatible {
            command: cli.command.name().to_string(),
        }
        .into());
    }
    debug!("resolved {} page(s)", config.pages.len());
    Ok(config)
}

/// Standard input carrying page content rules out prompting.
fn interaction_for(cli: &Cli, config: &Config) -> Box<dyn Interaction> {
    if config.reads_stdin() {
        Box::new(HeadlessInteraction::new(cli.quiet))
    } else {
        Box::new(TerminalInteraction::stdio(cli.quiet))
    }
}

fn connect(cli: &Cli, config: &Config) -> Result<ConfluenceClient> {
    let password = config
        .auth
        .resolve_password(cli.password.as_deref(), env::var(PASSWORD_ENV).ok())?;
    let client = ConfluenceClient::new(ConfluenceClientConfig::new(&config.auth, password))?;
    Ok(client)
}

fn run_post_page(cli: &Cli, args: &PostPageArgs) -> Result<()> {
    let mut config = load_config(cli, args.file_format)?;
    let mut client = connect(cli, &config)?;
    let mut interaction = interaction_for(cli, &config);
    let options = PublishOptions {
        force: cli.force,
        force_create: cli.force_create,
        create_in_root: args.create_in_space_root,
        minor_edit: cli.minor_edit,
        version_comment: args.version_comment.clone(),
        upload_files: args.upload_files.clone(),
    };

    let report = PublishEngine::new(&mut client, interaction.as_mut(), &options)
        .run(&mut config, &mut io::stdin())?;
    if cli.report {
        let rendered = report.render(&mut client)?;
        interaction.always_echo(&rendered);
    }
    debug!("sent {} request(s) to {}", client.request_count(), config.auth.base_url);
    Ok(())
}

fn run_validate(cli: &Cli, args: &ValidateArgs) -> Result<()> {
    let config = load_config(cli, None)?;
    let mut client = connect(cli, &config)?;
    let mut interaction = interaction_for(cli, &config);
    if args.online {
        validate_online(&mut client, interaction.as_mut(), &config)?;
    }
    interaction.echo("Validation successful");
    Ok(())
}

fn run_convert_markdown(cli: &Cli) -> Result<()> {
    let config = load_config(cli, None)?;
    let rendered = convert_markdown_pages(&config.pages, &mut io::stdin())?;
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(rendered.as_bytes())
        .context("failed to write converted markdown")?;
    stdout.flush().context("failed to flush stdout")?;
    Ok(())
}

fn run_create_config(cli: &Cli) -> Result<()> {
    let mut interaction = TerminalInteraction::stdio(cli.quiet);
    match create_config(&mut interaction, &cli.config)? {
        WizardOutcome::Written(path) => debug!("config written to {}", path.display()),
        WizardOutcome::Kept(path) => {
            interaction.always_echo(&format!("Keeping the existing {}", normalize_for_display(&path)))
        }
    }
    Ok(())
}

fn parse_file_format(value: &str) -> Result<FileFormat, String> {
    FileFormat::parse(value).ok_or_else(|| {
        format!(
            "unsupported file format '{value}', expected one of: {}",
            FileFormat::ALL.map(FileFormat::as_str).join(", ")
        )
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "pagepost",
            "post-page",
            "--force",
            "--page-title",
            "Notes",
            "--file-format",
            "markdown",
            "--upload-files",
            "a.png",
            "b.png",
        ])
        .expect("parse");
        assert!(cli.force);
        assert_eq!(cli.page_title.as_deref(), Some("Notes"));
        match cli.command {
            Commands::PostPage(args) => {
                assert_eq!(args.file_format, Some(FileFormat::Markdown));
                assert_eq!(args.upload_files.len(), 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_file_format_is_rejected_by_the_parser() {
        let error = Cli::try_parse_from(["pagepost", "post-page", "--file-format", "docx"])
            .expect_err("must fail");
        assert!(error.to_string().contains("unsupported file format"));
    }

    #[test]
    fn stdin_page_file_is_rejected_for_validate() {
        let cli = Cli::try_parse_from(["pagepost", "--page-file", "-", "validate"]).expect("parse");
        let error = run(cli).expect_err("must fail");
        let post_error = error.downcast_ref::<PostError>().expect("post error");
        assert_eq!(post_error.exit_code(), 3);
        assert!(error.to_string().contains("not compatible"));
    }

    #[test]
    fn stdin_page_file_from_config_is_rejected_for_validate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[auth]
confluence_url = "https://wiki.example.org"
username = "writer"
is_cloud = false

[pages.main]
page_title = "Notes"
page_file = "-"
page_space = "DOC"
"#,
        )
        .expect("write config");
        let cli = Cli::try_parse_from([
            "pagepost",
            "--config",
            config_path.to_str().expect("utf8 path"),
            "validate",
        ])
        .expect("parse");

        let error = run(cli).expect_err("must fail");
        let post_error = error.downcast_ref::<PostError>().expect("post error");
        assert!(matches!(post_error, PostError::StdinIncompatible { .. }));
        assert_eq!(post_error.exit_code(), 3);
    }
}
