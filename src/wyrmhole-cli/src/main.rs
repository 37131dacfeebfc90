use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use wyrmhole_core::{init_logging, AppDirs, Config};
use wyrmhole_host::{
    spawn_stdin_reader, HostFunctionTable, LoopConfig, MainLoop, Outbound, PluginBridge,
};
use wyrmhole_plugin::ExecPluginLoader;
use wyrmhole_protocol::Chunker;

#[derive(Debug, Parser)]
#[command(
    name = "wyrmhole",
    version,
    about = "Native-messaging host bridging browser extensions to plugins",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Config file override (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the extension over stdin/stdout (the default)
    Run(RunArgs),
    /// Plugin management commands
    #[command(subcommand)]
    Plugins(PluginsCommand),
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum PluginsCommand {
    /// List configured mimetypes and their executables
    List,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the config file location
    Path,
}

#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
struct RunArgs {
    /// Arguments the browser appends (caller origin or manifest path)
    #[arg(
        value_name = "BROWSER_ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    browser_args: Vec<String>,
}

impl RunArgs {
    /// The first browser argument identifies the caller.
    fn origin(&self) -> Option<String> {
        self.browser_args.first().cloned()
    }
}

impl Cli {
    fn config_path(&self, dirs: &AppDirs) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| Config::config_path(dirs))
    }

    fn load_config(&self, dirs: &AppDirs) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load_or_default(dirs)?,
        };
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = cli.load_config(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    match cli.command {
        Some(Command::Plugins(PluginsCommand::List)) => print_plugins(&config),
        Some(Command::Config(ConfigCommand::Path)) => {
            println!("{}", cli.config_path(&dirs).display());
        }
        Some(Command::Run(args)) => run_host(&config, &args)?,
        None => run_host(&config, &cli.run)?,
    }

    Ok(())
}

fn run_host(config: &Config, args: &RunArgs) -> Result<()> {
    let origin = args.origin();
    tracing::info!(
        origin = origin.as_deref().unwrap_or("<none>"),
        plugins = config.plugins.len(),
        max_chunk_size = config.protocol.max_chunk_size,
        "starting native messaging host"
    );

    let outbound = Arc::new(Outbound::stdout(Chunker::new(
        config.protocol.max_chunk_size,
    )));
    let main_loop = MainLoop::new(LoopConfig { origin });
    let host = Arc::new(HostFunctionTable::new(
        Arc::clone(&outbound),
        main_loop.handle(),
    ));
    let loader = ExecPluginLoader::new(config.plugins.clone());
    let mut bridge = PluginBridge::new(Box::new(loader), host, outbound);

    // The reader stays blocked on stdin after exit; process teardown reaps it.
    let _reader = spawn_stdin_reader(main_loop.handle(), config.protocol.max_frame_bytes)
        .context("failed to start stdin reader")?;

    main_loop.run(&mut bridge);
    bridge.shutdown();
    Ok(())
}

fn print_plugins(config: &Config) {
    if config.plugins.is_empty() {
        println!("No plugins configured. Add plugins.\"<mimetype>\" to config.toml.");
        return;
    }

    for (mimetype, plugin) in &config.plugins {
        println!("{mimetype}");
        println!("  executable: {}", plugin.executable.display());
        if !plugin.args.is_empty() {
            println!("  args: {}", plugin.args.join(" "));
        }
    }
}
