use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clawbot_agent::AgentLoop;
use clawbot_core::{Config, Paths};
use clawbot_providers::create_provider;
use clawbot_storage::MemoryStore;
use clawbot_tools::{BrowserHandle, ToolContext, ToolRegistry};

#[derive(Parser)]
#[command(name = "clawbot")]
#[command(about = "Chat-driven automation assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single request and exit
    Ask {
        /// The request text
        prompt: String,

        /// User id for the memory journal
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Interactive chat (reads lines from stdin)
    Chat {
        /// User id for the memory journal
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Show configuration and session status
    Status,
}

struct App {
    registry: ToolRegistry,
    ctx: ToolContext,
    provider: Arc<dyn clawbot_providers::Provider>,
    memory: Arc<MemoryStore>,
}

impl App {
    fn build(paths: &Paths) -> anyhow::Result<Self> {
        paths.ensure_dirs().context("creating data directories")?;
        let config = Config::load(paths).context("loading config")?;

        let browser = BrowserHandle::new(
            config.tools.browser.clone(),
            paths.screenshots_dir(),
            paths.browser_dir().join("profile"),
        );
        let ctx = ToolContext {
            workspace: paths.workspace(),
            config: config.clone(),
            browser,
        };

        Ok(Self {
            registry: ToolRegistry::with_defaults(),
            ctx,
            provider: Arc::from(create_provider(&config)),
            memory: Arc::new(MemoryStore::open(paths.memory_file())),
        })
    }

    async fn answer(&self, user: &str, prompt: &str) -> String {
        let context = self.memory.get_context(user, 10);
        let agent = AgentLoop::new(
            self.provider.clone(),
            self.registry.clone(),
            self.ctx.clone(),
        )
        .with_memory(self.memory.clone(), user);
        agent.run(prompt, &context).await.final_text
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let paths = Paths::new();

    match cli.command {
        Commands::Ask { prompt, user } => {
            let app = App::build(&paths)?;
            let answer = app.answer(&user, &prompt).await;
            println!("{}", answer);
            // Take the browser down before exiting so no Chrome is orphaned.
            let _ = app.ctx.browser.close().await;
        }
        Commands::Chat { user } => {
            let app = App::build(&paths)?;
            println!("clawbot ready. Empty line or Ctrl-D to exit.");
            let stdin = std::io::stdin();
            loop {
                let mut line = String::new();
                if stdin.read_line(&mut line)? == 0 {
                    break;
                }
                let prompt = line.trim();
                if prompt.is_empty() {
                    break;
                }
                let answer = app.answer(&user, prompt).await;
                println!("{}\n", answer);
            }
            let _ = app.ctx.browser.close().await;
        }
        Commands::Status => {
            let config = Config::load(&paths)?;
            let registry = ToolRegistry::with_defaults();
            println!("config:  {}", paths.config_file().display());
            println!("model:   {}", config.agent.model);
            println!("budget:  {} tool iterations", config.agent.max_tool_iterations);
            let mut names = registry.tool_names();
            names.sort();
            println!("tools:   {}", names.join(", "));
        }
    }

    Ok(())
}
