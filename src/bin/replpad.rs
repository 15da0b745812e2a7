use std::{fs, path::PathBuf, rc::Rc};

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use replpad::{
    FsModuleLoader, PadConfig, PassOutcome, ReplError, Repl, Session, link,
};

#[derive(Parser)]
#[command(author, version, about = "Live statement-by-statement script pad")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a pad file and print one result per source line
    Run {
        script: PathBuf,
        #[command(flatten)]
        pad: PadArgs,
    },
    /// Evaluate an inline snippet
    Eval {
        source: String,
        #[command(flatten)]
        pad: PadArgs,
    },
    /// Start an interactive pad
    Repl {
        #[command(flatten)]
        pad: PadArgs,
    },
    /// Print the shareable link of a pad file
    Link {
        script: PathBuf,
        /// Base URI the fragment is appended to
        #[arg(long)]
        base: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Decode a shareable link and evaluate it
    Open {
        uri: String,
        #[command(flatten)]
        pad: PadArgs,
    },
}

#[derive(ClapArgs, Default)]
struct PadArgs {
    /// Configuration file (defaults to ./replpad.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Options as a query string, e.g. `?reevalConsole=true&reevalUndef=0`
    #[arg(long)]
    query: Option<String>,
    /// Fold console statements into later evaluations
    #[arg(long)]
    reeval_console: bool,
    /// Drop blocks whose value is undefined
    #[arg(long)]
    no_reeval_undef: bool,
    /// Directory module specifiers resolve against
    #[arg(long)]
    modules: Option<PathBuf>,
    /// Print the pass report as JSON
    #[arg(long)]
    json: bool,
}

impl PadArgs {
    fn config(&self) -> Result<PadConfig, ReplError> {
        let mut config = PadConfig::discover(self.config.as_deref())?;
        if let Some(query) = &self.query {
            config.options.apply_query(query);
        }
        if self.reeval_console {
            config.options.reeval_console = true;
        }
        if self.no_reeval_undef {
            config.options.reeval_undef = false;
        }
        if let Some(modules) = &self.modules {
            config.session.module_root = Some(modules.clone());
        }
        Ok(config)
    }

    fn session(&self, config: &PadConfig) -> Session {
        let session = Session::new(config.options).with_base_uri(config.session.base_uri.clone());
        let root = config
            .session
            .module_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let loader = FsModuleLoader::new(root).with_console(session.console());
        session.with_loader(Rc::new(loader))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ReplError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args
        .command
        .unwrap_or_else(|| Command::Repl { pad: PadArgs::default() })
    {
        Command::Run { script, pad } => {
            let source = fs::read_to_string(&script)?;
            run_pad(&source, &pad).await
        }
        Command::Eval { source, pad } => run_pad(&source, &pad).await,
        Command::Open { uri, pad } => {
            let source = link::decode(&uri)?;
            run_pad(&source, &pad).await
        }
        Command::Repl { pad } => {
            let config = pad.config()?;
            let mut repl = Repl::new(pad.session(&config))
                .with_column_width(config.session.column_width);
            repl.run().await
        }
        Command::Link {
            script,
            base,
            config,
        } => {
            let source = fs::read_to_string(&script)?;
            let config = PadConfig::discover(config.as_deref())?;
            let base = base.unwrap_or(config.session.base_uri);
            println!("{}", link::encode(&source, &base));
            Ok(())
        }
    }
}

async fn run_pad(source: &str, pad: &PadArgs) -> Result<(), ReplError> {
    let config = pad.config()?;
    let session = pad.session(&config);
    let PassOutcome::Completed(report) = session.run_pass(source).await else {
        return Ok(());
    };
    if pad.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|err| ReplError::Config(err.to_string()))?;
        println!("{json}");
        return Ok(());
    }
    print!("{}", report.render_table(config.session.column_width));
    if !report.console.is_empty() {
        println!("-- console --");
        for message in &report.console {
            println!("[{}] {}", message.kind, message.text);
        }
    }
    Ok(())
}
