use anyhow::Result;
use clap::{Parser, Subcommand};
use linuxmodmanager::deploy::LinkMethod;
use linuxmodmanager::games::{DeployMode, Game};
use linuxmodmanager::installer::BatchResult;
use linuxmodmanager::model::{Mod, ModReference};
use linuxmodmanager::{App, CoreError, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cancellation and the rest of the core share `CoreError::Cancelled`;
/// the shell layer is the only place that turns it into an exit code.
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "lmm")]
#[command(author, version, about = "Profile-driven mod deployment manager for Linux games")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the game registry
    Game {
        #[command(subcommand)]
        action: GameCommands,
    },

    /// Manage profiles for a game
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },

    /// Install or uninstall a mod within a profile
    Mod {
        #[command(subcommand)]
        action: ModCommands,
    },

    /// Switch a game's active profile, deploying its mods
    Switch {
        game_id: String,
        profile: String,
    },

    /// Verify installed mod files against their recorded checksums
    Verify {
        game_id: String,
        profile: String,
        /// Attempt to re-download mismatched or missing files
        #[arg(long)]
        fix: bool,
    },
}

#[derive(Subcommand)]
enum GameCommands {
    /// List registered games
    List,
    /// Register or update a game
    Add {
        id: String,
        name: String,
        install_path: String,
        mod_path: String,
        /// extract (link cached files in place) or copy
        #[arg(long, default_value = "extract")]
        deploy_mode: String,
    },
    /// Remove a registered game
    Remove { id: String },
}

#[derive(Subcommand)]
enum ModCommands {
    /// Deploy an already-cached mod into a profile
    Install {
        game_id: String,
        profile: String,
        source_id: String,
        mod_id: String,
        version: String,
        name: String,
        /// Repeatable: --file-id f1 --file-id f2
        #[arg(long = "file-id")]
        file_id: Vec<String>,
        /// symlink, hardlink, or copy; defaults to the profile's/game's method
        #[arg(long)]
        link_method: Option<String>,
        /// Deploy even if files conflict with another installed mod
        #[arg(long)]
        force: bool,
    },
    /// Remove a mod's deployed files from a profile
    Uninstall {
        game_id: String,
        profile: String,
        source_id: String,
        mod_id: String,
        version: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List profiles for a game
    List { game_id: String },
    /// Create an empty profile
    Create { game_id: String, name: String },
    /// Delete a profile
    Delete { game_id: String, name: String },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn parse_deploy_mode(raw: &str) -> Result<DeployMode> {
    match raw {
        "extract" => Ok(DeployMode::Extract),
        "copy" => Ok(DeployMode::Copy),
        other => anyhow::bail!("unknown deploy mode '{other}', expected extract or copy"),
    }
}

fn parse_link_method(raw: &str) -> Result<LinkMethod> {
    match raw {
        "symlink" => Ok(LinkMethod::Symlink),
        "hardlink" => Ok(LinkMethod::Hardlink),
        "copy" => Ok(LinkMethod::Copy),
        other => anyhow::bail!("unknown link method '{other}', expected symlink, hardlink, or copy"),
    }
}

fn print_batch_result(result: &BatchResult) {
    for reference in &result.installed {
        println!("installed\t{}", reference.key());
    }
    for reference in &result.uninstalled {
        println!("uninstalled\t{}", reference.key());
    }
    for (reference, reason) in &result.skipped {
        println!("skipped\t{}\t{reason}", reference.key());
    }
    for error in &result.errors {
        eprintln!("error\t{error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load().await?;
    let app = App::new(config)?;

    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if let Err(err) = run(cli, &app).await {
        if matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)) {
            eprintln!("cancelled");
            std::process::exit(EXIT_CANCELLED);
        }
        return Err(err);
    }

    Ok(())
}

async fn run(cli: Cli, app: &App) -> Result<()> {
    match cli.command {
        Commands::Game { action } => match action {
            GameCommands::List => {
                for game in app.list_games()? {
                    println!("{}\t{}\t{}", game.id, game.name, game.install_path.display());
                }
            }
            GameCommands::Add { id, name, install_path, mod_path, deploy_mode } => {
                let mode = parse_deploy_mode(&deploy_mode)?;
                let mut game = Game::new(id, name, install_path.into(), mod_path.into());
                game.deploy_mode = mode;
                app.add_game(game)?;
            }
            GameCommands::Remove { id } => app.remove_game(&id)?,
        },
        Commands::Profile { action } => match action {
            ProfileCommands::List { game_id } => {
                for profile in app.list_profiles(&game_id)? {
                    let marker = if profile.is_default { "*" } else { " " };
                    println!("{marker} {}", profile.name);
                }
            }
            ProfileCommands::Create { game_id, name } => {
                app.create_profile(&game_id, &name)?;
            }
            ProfileCommands::Delete { game_id, name } => {
                app.delete_profile(&game_id, &name)?;
            }
        },
        Commands::Mod { action } => match action {
            ModCommands::Install { game_id, profile, source_id, mod_id, version, name, file_id, link_method, force } => {
                let game = app.get_game(&game_id)?;
                let link = link_method.as_deref().map(parse_link_method).transpose()?;
                let m = Mod {
                    reference: ModReference { source_id, mod_id, version, file_ids: file_id },
                    name,
                    author: None,
                    summary: None,
                    category: None,
                    dependencies: Vec::new(),
                };
                let result = app.install_mod(&game, &profile, &m, link, force).await;
                print_batch_result(&result);
                if let Some(err) = result.errors.into_iter().next() {
                    return Err(err.into());
                }
            }
            ModCommands::Uninstall { game_id, profile, source_id, mod_id, version } => {
                let game = app.get_game(&game_id)?;
                let m = Mod {
                    reference: ModReference { source_id, mod_id, version, file_ids: Vec::new() },
                    name: String::new(),
                    author: None,
                    summary: None,
                    category: None,
                    dependencies: Vec::new(),
                };
                let result = app.uninstall_mod(&game, &profile, &m).await;
                print_batch_result(&result);
                if let Some(err) = result.errors.into_iter().next() {
                    return Err(err.into());
                }
            }
        },
        Commands::Switch { game_id, profile } => {
            let game = app.get_game(&game_id)?;
            app.switch_profile(&game, &profile)?;
            println!("switched {game_id} to profile '{profile}'");
        }
        Commands::Verify { game_id, profile, fix } => {
            let report = app.verify(&game_id, &profile, fix, None).await?;
            for file in &report.files {
                println!("{}\t{}\t{:?}", file.mod_id, file.file_id, file.status);
            }
            if fix {
                println!("repaired {} file(s), {} failure(s)", report.fixed.len(), report.fix_errors.len());
            }
        }
    }

    Ok(())
}
