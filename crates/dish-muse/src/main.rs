//! `dish-muse` command line.

use std::io::Write as _;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dish_muse::{
    AnalysisObserver, AppConfig, AppError, Analyzer, JsonFileStore, NewRecipe, RecipeDraft,
    RecipeStore, Seasoning, config, init_observability,
};
use dish_muse_client::{CancellationToken, ClientError, ImageClient};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "dish-muse", version, about = "Taste-test recipe ideas before you cook them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream a tasting evaluation and generate a dish image
    Analyze {
        /// Ingredient (repeatable)
        #[arg(long = "ingredient", short = 'i', required = true)]
        ingredients: Vec<String>,
        /// Seasoning as `name` or `name:amount` (repeatable)
        #[arg(long = "seasoning", short = 's')]
        seasonings: Vec<Seasoning>,
        /// Cooking method, e.g. stir-fry
        #[arg(long, short = 'm')]
        method: String,
        /// Your rating when saving, 0 to 5
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: u8,
        /// Do not save the result to history
        #[arg(long)]
        no_save: bool,
    },
    /// Generate only an image for a prompt
    Image {
        #[arg(long, short = 'p')]
        prompt: String,
        /// Use the single-request inline image endpoint
        #[arg(long)]
        inline: bool,
    },
    /// Inspect saved recipes
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    /// List saved recipes, newest first
    List,
    /// Show one saved recipe
    Show { id: Uuid },
    /// Delete one saved recipe
    Delete { id: Uuid },
}

/// Prints streamed text incrementally and image progress on stderr.
#[derive(Default)]
struct ConsoleObserver {
    printed: usize,
}

impl AnalysisObserver for ConsoleObserver {
    fn on_text(&mut self, full_text: &str) {
        // Updates carry the full text; print only what is new.
        if let Some(suffix) = full_text.get(self.printed..) {
            print!("{suffix}");
            let _ = std::io::stdout().flush();
        }
        self.printed = full_text.len();
    }

    fn on_image_progress(&mut self, fraction: f64) {
        eprint!("\rimage: {:>3.0}%", fraction * 100.0);
    }

    fn on_image_error(&mut self, err: &ClientError) {
        eprintln!("\nimage generation failed: {err}");
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Analyze {
            ingredients,
            seasonings,
            method,
            rating,
            no_save,
        } => {
            let app = AppConfig::from_env()?;
            let analyzer = Analyzer::from_config(app.client)?;
            let draft = RecipeDraft {
                ingredients,
                seasonings,
                cooking_method: method,
            }
            .validate()?;
            let mut observer = ConsoleObserver::default();
            let result = analyzer
                .analyze(draft.clone(), cancel_on_ctrl_c(), &mut observer)
                .await?;
            println!();
            if !result.image_url.is_empty() {
                eprintln!();
                println!("image: {}", result.image_url);
            }
            if !no_save {
                let store = JsonFileStore::new(app.history_path);
                let record = store.create(NewRecipe {
                    ingredients: draft.ingredients,
                    seasonings: draft.seasonings,
                    cooking_method: draft.cooking_method,
                    evaluation: result.full_evaluation,
                    rating,
                    image_url: Some(result.image_url),
                })?;
                println!("saved as {}", record.id);
            }
        }
        Command::Image { prompt, inline } => {
            let app = AppConfig::from_env()?;
            if inline {
                let image = ImageClient::new(app.client)?.generate_inline(&prompt).await?;
                println!("{}", image.as_uri());
            } else {
                let analyzer = Analyzer::from_config(app.client)?;
                let url = analyzer
                    .generate_image(&prompt, cancel_on_ctrl_c(), &mut ConsoleObserver::default())
                    .await?;
                eprintln!();
                println!("{url}");
            }
        }
        Command::History { action } => {
            let store = JsonFileStore::new(config::history_path_from_env());
            match action {
                HistoryAction::List => {
                    for record in store.list()? {
                        println!(
                            "{}  {}  {} with {}  ({}/5)",
                            record.id,
                            record.created_at.format("%Y-%m-%d %H:%M"),
                            record.cooking_method,
                            record.ingredients.join(", "),
                            record.rating,
                        );
                    }
                }
                HistoryAction::Show { id } => {
                    let record = store
                        .get(id)?
                        .ok_or(dish_muse::HistoryError::NotFound(id))?;
                    let json = serde_json::to_string_pretty(&record)
                        .map_err(|e| AppError::Config(format!("cannot render record: {e}")))?;
                    println!("{json}");
                }
                HistoryAction::Delete { id } => {
                    store.delete(id)?;
                    println!("deleted {id}");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    config::init();
    init_observability();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\nerror: {err}");
            ExitCode::FAILURE
        }
    }
}
