//! InstMan - INSTEAD games manager
//!
//! Command-line front end over the repository sync and game lifecycle engine.

use std::error::Error;
use std::io::{self, Write};

use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;

use instman::catalog::{self, Catalog, Game};
use instman::config::AppConfig;
use instman::installer::Installer;
use instman::interpreter::InterpreterFinder;
use instman::logging;
use instman::repository::Synchronizer;
use instman::runner::Runner;
use instman::utils;

#[derive(Parser)]
#[command(name = "instman", version, about = "INSTEAD games manager (launcher)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the game repositories
    Update,
    /// Print the list of games, newest first
    List {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Search games by name and title
    Search {
        keyword: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show information about a game
    Show { keyword: String },
    /// Download and install a game
    Install { keyword: String },
    /// Run an installed game
    Run { keyword: String },
    /// Remove an installed game
    Remove { keyword: String },
    /// Detect the INSTEAD interpreter and save its path to the config
    FindInterpreter,
    /// Verify that the configured interpreter actually works
    Check,
    /// Print the configured repositories
    Repositories,
    /// Print available game languages
    Langs,
    /// Print the config file path
    ConfigPath,
}

#[derive(Args)]
struct FilterArgs {
    /// Only games from this repository
    #[arg(long)]
    repository: Option<String>,
    /// Only games available in this language
    #[arg(long)]
    lang: Option<String>,
    /// Only installed games
    #[arg(long)]
    installed: bool,
}

fn main() {
    logging::init_logger();
    let cli = Cli::parse();
    let mut config = AppConfig::load();

    let result = match cli.command {
        Commands::Update => cmd_update(&config).map(|_| ()),
        Commands::List { filters } => cmd_list(&config, &filters),
        Commands::Search { keyword, filters } => cmd_search(&config, &keyword, &filters),
        Commands::Show { keyword } => cmd_show(&config, &keyword),
        Commands::Install { keyword } => cmd_install(&mut config, &keyword),
        Commands::Run { keyword } => cmd_run(&mut config, &keyword),
        Commands::Remove { keyword } => cmd_remove(&config, &keyword),
        Commands::FindInterpreter => cmd_find_interpreter(&mut config),
        Commands::Check => cmd_check(&mut config),
        Commands::Repositories => cmd_repositories(&config),
        Commands::Langs => cmd_langs(&config),
        Commands::ConfigPath => {
            println!("{}", AppConfig::config_path().display());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red(), e);
        std::process::exit(1);
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_update(config: &AppConfig) -> Result<Catalog, Box<dyn Error>> {
    println!("Updating repositories...");

    let sync = synchronizer(config);
    let (mut catalog, errors) = sync.sync_all(&config.repositories);

    if !errors.is_empty() {
        println!("There are errors:");
        for error in &errors {
            println!("  {}", error);
        }
    }

    catalog.refresh_installed(&config.games_path());
    println!("Repositories have been updated: {} game(s).", catalog.len());
    Ok(catalog)
}

fn cmd_list(config: &AppConfig, filters: &FilterArgs) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(config)?;
    let games = catalog.sorted_by_date_desc();
    let games = catalog::filter_games(
        &games,
        None,
        filters.repository.as_deref(),
        filters.lang.as_deref(),
        filters.installed,
    );

    print_games(&games);
    Ok(())
}

fn cmd_search(config: &AppConfig, keyword: &str, filters: &FilterArgs) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(config)?;
    let games = catalog.sorted_by_title();
    let games = catalog::filter_games(
        &games,
        Some(keyword),
        filters.repository.as_deref(),
        filters.lang.as_deref(),
        filters.installed,
    );

    print_games(&games);
    Ok(())
}

fn cmd_show(config: &AppConfig, keyword: &str) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(config)?;
    let game = resolve_game(&catalog, keyword)?;

    let installed = if game.installed { " [installed]" } else { "" };
    println!(
        "{} ({}) {}{}",
        game.title.bold(),
        game.name.cyan(),
        game.human_size(),
        installed.green(),
    );
    println!("Version: {}", game.human_version());
    if !game.languages.is_empty() {
        println!("Languages: {}", game.languages.join(", "));
    }
    println!("Repository: {}", game.repository_name);
    if !game.description_url.is_empty() {
        println!("More: {}", game.description_url);
    }
    if game.installed {
        let on_disk = utils::dir_size(&game.install_dir(&config.games_path()));
        println!("On disk: {}", utils::human_size(on_disk));
    }
    if !game.description.is_empty() {
        println!("\n{}:\n{}", "Description".bold(), game.description);
    }
    Ok(())
}

fn cmd_install(config: &mut AppConfig, keyword: &str) -> Result<(), Box<dyn Error>> {
    ensure_interpreter(config);

    let catalog = load_catalog(config)?;
    let mut game = resolve_game(&catalog, keyword)?;

    let title = game.title.clone();
    let total = game.size_bytes;
    print!("Downloading and installing game {}...", title.bold());
    let _ = io::stdout().flush();

    installer(config).install(&mut game, |transferred| {
        print!(
            "\rDownloading and installing game {}... {}",
            title.bold(),
            utils::percents(transferred, total).green(),
        );
        let _ = io::stdout().flush();
    })?;

    println!("\nGame {} has been installed.", title.bold());
    Ok(())
}

fn cmd_run(config: &mut AppConfig, keyword: &str) -> Result<(), Box<dyn Error>> {
    ensure_interpreter(config);

    let catalog = load_catalog(config)?;
    let game = resolve_game(&catalog, keyword)?;

    if !game.installed {
        return Err(format!(
            "Game {} isn't installed. Please run for installation:\n    instman install {}",
            game.title, game.name
        )
        .into());
    }

    let runner = Runner::new(config.interpreter_command.clone(), config.games_path());
    runner.run(&game)?;

    println!("Running game {}...", game.title.bold());
    Ok(())
}

fn cmd_remove(config: &AppConfig, keyword: &str) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(config)?;
    let mut game = resolve_game(&catalog, keyword)?;

    println!("Removing game {}...", game.title.bold());
    installer(config).remove(&mut game)?;
    println!("Game {} has been removed.", game.title.bold());
    Ok(())
}

fn cmd_find_interpreter(config: &mut AppConfig) -> Result<(), Box<dyn Error>> {
    let finder = InterpreterFinder::new();

    match finder.locate_verified() {
        Some(candidate) => {
            match &candidate.verified_version {
                Some(version) => {
                    println!("INSTEAD {} has been found: {}", version, candidate.command_path)
                }
                None => println!(
                    "INSTEAD has been found (version check failed): {}",
                    candidate.command_path
                ),
            }
            config.interpreter_command = candidate.command_path;
            config.save();
            println!("Path has been saved.");
        }
        None => {
            println!(
                "INSTEAD has not been found. Please set interpreter_command in {}",
                AppConfig::config_path().display()
            );
        }
    }
    Ok(())
}

fn cmd_check(config: &mut AppConfig) -> Result<(), Box<dyn Error>> {
    ensure_interpreter(config);
    if config.interpreter_command.is_empty() {
        return Err("no interpreter configured or detected".into());
    }

    let finder = InterpreterFinder::new();
    match finder.check(&config.interpreter_command) {
        Ok(version) => {
            println!("INSTEAD {} has been found!", version);
            Ok(())
        }
        // A broken bundled interpreter is a packaging defect, a broken
        // configured one is a configuration defect
        Err(e) if e.is_builtin() => Err(format!("INSTEAD built-in check failed: {}", e).into()),
        Err(e) => Err(format!("INSTEAD check failed: {}", e).into()),
    }
}

fn cmd_repositories(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    for repository in &config.repositories {
        println!("{} ({})", repository.name.bold(), repository.url);
    }
    Ok(())
}

fn cmd_langs(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(config)?;
    for lang in catalog::find_languages(catalog.games()) {
        println!("{}", lang);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn synchronizer(config: &AppConfig) -> Synchronizer {
    Synchronizer::new(config.repositories_cache_path())
}

fn installer(config: &AppConfig) -> Installer {
    Installer::new(config.games_path(), config.tmp_path(), config.images_path())
}

/// Load the catalog from the cached indexes, syncing first when nothing has
/// ever been synced
fn load_catalog(config: &AppConfig) -> Result<Catalog, Box<dyn Error>> {
    let sync = synchronizer(config);
    if !sync.has_any_synced_data() {
        return cmd_update(config);
    }

    let mut catalog = sync.load_cached(&config.repositories);
    catalog.refresh_installed(&config.games_path());
    Ok(catalog)
}

fn resolve_game(catalog: &Catalog, keyword: &str) -> Result<Game, Box<dyn Error>> {
    let games = catalog.sorted_by_title();
    let matches = catalog::filter_games(&games, Some(keyword), None, None, false);

    match catalog::resolve_by_keyword(&matches, keyword) {
        Some(game) => Ok(game.clone()),
        None => Err(format!("Game {} has not been found", keyword).into()),
    }
}

/// Make sure an interpreter command is configured, detecting and saving one
/// when possible
fn ensure_interpreter(config: &mut AppConfig) {
    if !config.interpreter_command.is_empty() {
        return;
    }

    let finder = InterpreterFinder::new();
    if config.use_builtin_interpreter {
        if let Some(builtin) = finder.find_builtin() {
            // The bundled interpreter ships with the app, nothing to persist
            config.interpreter_command = builtin;
            return;
        }
    }

    if let Some(path) = finder.find() {
        println!("INSTEAD has been found: {}", path);
        config.interpreter_command = path;
        config.save();
    }
}

fn print_games(games: &[Game]) {
    for game in games {
        let installed = if game.installed { " [installed]" } else { "" };
        println!(
            "{}, {}, {} [{}]{}",
            game.title.bold(),
            game.name.cyan(),
            game.repository_name,
            game.languages.join(", "),
            installed.green(),
        );
    }
}
