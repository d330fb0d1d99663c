//! Trust or Bust - terminal entry point
//!
//! Drives one learner through the session registry from stdin. All
//! formatting lives here; the engine only returns content.

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use trust_or_bust::content::ContentBackend;
use trust_or_bust::core::config::ContentSource;
use trust_or_bust::core::error::{GameError, Result};
use trust_or_bust::core::{GameConfig, LearnerId, Level};
use trust_or_bust::game::{
    DaySummary, DisputeAction, DisputeReply, EveningNext, EveningPrompt, GameContext, MorningCard,
    MorningStep, PersistenceWarning, SessionRegistry, VerdictReply,
};
use trust_or_bust::ledger::AuditBackend;

/// Vocabulary trust game in the terminal
#[derive(Parser, Debug)]
#[command(name = "trust-or-bust")]
#[command(about = "Study five words in the morning, judge sentences in the evening")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Content pack to play with instead of the built-in bank
    #[arg(long)]
    pack: Option<PathBuf>,

    /// Learner id used for the audit trail
    #[arg(long, default_value_t = 1)]
    learner: i64,

    /// Random seed for reproducible days
    #[arg(long)]
    seed: Option<u64>,
}

type Registry = SessionRegistry<ContentBackend, AuditBackend>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trust_or_bust=info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let content = ContentBackend::from_config(&config)?;
    let audit = AuditBackend::from_config(&config)?;
    tracing::info!(
        "Trust or Bust starting (content: {}, audit: {})",
        content.describe(),
        audit.describe()
    );

    let rt = Runtime::new()?;
    let registry = SessionRegistry::new(GameContext::new(content, audit, config));
    let learner = LearnerId(args.learner);

    print_help();

    loop {
        let stage = rt.block_on(registry.stage(learner));
        print!("[{}] > ", stage);
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "q" {
            break;
        }

        if let Err(e) = rt.block_on(dispatch(&registry, learner, input)) {
            println!("  ! {}", e);
        }
    }

    let balance = rt.block_on(registry.balance(learner));
    println!("\nGoodbye! Balance: {}", balance);
    Ok(())
}

fn load_config(args: &Args) -> Result<GameConfig> {
    let mut config = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => {
            let mut config = GameConfig::new();
            config.apply_env();
            config
        }
    };

    if let Some(pack) = &args.pack {
        config.content.backend = ContentSource::Pack;
        config.content.path = Some(pack.clone());
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    config.validate().map_err(GameError::Config)?;
    Ok(config)
}

async fn dispatch(registry: &Registry, learner: LearnerId, input: &str) -> Result<()> {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    match command {
        "help" | "h" => print_help(),
        "process" => {
            registry.show_process(learner).await?;
            print_process();
        }
        "level" => match argument {
            Some(level) => {
                let level: Level = level.parse()?;
                registry.set_level(learner, level).await?;
                println!("  Level set to {} (you will study {} words)", level, level.study_level());
            }
            None => {
                let levels: Vec<&str> = Level::all().iter().map(|l| l.as_str()).collect();
                println!("  Usage: level <{}>", levels.join("|"));
            }
        },
        "start" => {
            let reply = registry.start_day(learner).await?;
            print_warnings(&reply.warnings);
            print_card(&reply.body);
        }
        "next" | "n" => {
            let reply = registry.advance_morning(learner).await?;
            print_warnings(&reply.warnings);
            match reply.body {
                MorningStep::Card(card) => print_card(&card),
                MorningStep::Evening(prompt) => {
                    println!("\n  Evening. Judge each sentence: yes (correct) / no (incorrect).");
                    print_prompt(&prompt);
                }
            }
        }
        "yes" | "y" | "no" => {
            let reply = registry.render_verdict(learner, command != "no").await?;
            print_warnings(&reply.warnings);
            print_verdict(&reply.body);
        }
        "concede" | "check" => {
            let action: DisputeAction = command.parse()?;
            let reply = registry.resolve_dispute(learner, action).await?;
            print_warnings(&reply.warnings);
            print_dispute(&reply.body);
        }
        "stats" => {
            let reply = registry.stats(learner).await?;
            print_warnings(&reply.warnings);
            let stats = reply.body;
            println!(
                "  Answers: {} | Correct: {} | Accuracy: {:.1}% | Balance change: {}",
                stats.total, stats.correct, stats.accuracy_percent, stats.sum_delta
            );
        }
        "export" => {
            let reply = registry.csv(learner).await?;
            print_warnings(&reply.warnings);
            match argument {
                Some(path) => {
                    std::fs::write(path, &reply.body)?;
                    println!("  Wrote {}", path);
                }
                None => print!("{}", reply.body),
            }
        }
        "flush" => {
            let reply = registry.flush_audit(learner).await?;
            print_warnings(&reply.warnings);
            println!("  Flushed {} pending attempt(s)", reply.body);
        }
        "reset" => {
            let reply = registry.reset(learner).await?;
            print_warnings(&reply.warnings);
            println!("  Day abandoned.");
        }
        other => return Err(GameError::UnknownCommand(other.to_string())),
    }

    Ok(())
}

fn print_help() {
    println!("\n=== TRUST OR BUST ===");
    println!();
    println!("Commands:");
    println!("  process          - How the day works");
    println!("  level <A1..B2>   - Choose your level");
    println!("  start            - Start a new day");
    println!("  next / n         - Next morning card");
    println!("  yes / y, no      - Judge the evening sentence");
    println!("  concede, check   - Settle a dispute");
    println!("  stats            - Your statistics");
    println!("  export [file]    - Attempts as CSV");
    println!("  flush            - Retry unsaved attempts");
    println!("  reset            - Abandon the current day");
    println!("  quit / q         - Exit");
    println!();
}

fn print_process() {
    println!("  Morning: study five words, each with an example sentence.");
    println!("  Evening: an employee wrote five sentences with them. Some are wrong.");
    println!("  Say whether each one is correct. The employee gives an opinion too.");
    println!("  When you disagree: concede (-50), or check the dictionary");
    println!("  (+50 if you were right, -100 if you were wrong).");
}

fn print_warnings(warnings: &[PersistenceWarning]) {
    for warning in warnings {
        println!("  (degraded) {}", warning);
    }
}

fn print_card(card: &MorningCard) {
    println!(
        "\n  Word {}/{}: {} - {}",
        card.position, card.total, card.card.word, card.card.translation
    );
    println!("    {}", card.example.text);
    println!("    {}", card.example.translation);
    if card.is_last {
        println!("  Last word. 'next' starts the evening.");
    }
}

fn print_prompt(prompt: &EveningPrompt) {
    println!("\n  Sentence {}/{}:", prompt.position, prompt.total);
    println!("    {}", prompt.text);
    println!("    {}", prompt.translation);
}

fn print_next(next: &EveningNext) {
    match next {
        EveningNext::Item(prompt) => print_prompt(prompt),
        EveningNext::Done(summary) => print_summary(summary),
    }
}

fn print_verdict(reply: &VerdictReply) {
    println!("  Employee says: {}", reply.label);
    match &reply.next {
        Some(next) => {
            println!("  Agreed.");
            print_next(next);
        }
        None => {
            println!("  You disagree.");
            if let Some(proposal) = &reply.proposal {
                println!("  Employee suggests: {}", proposal.text);
                println!("                     {}", proposal.translation);
            }
            println!("  concede or check?");
        }
    }
}

fn print_dispute(reply: &DisputeReply) {
    println!("  {}: {:+} (balance {})", reply.outcome, reply.delta, reply.balance);
    if let Some(note) = &reply.note {
        let verdict = if note.truth { "correct" } else { "incorrect" };
        println!("  The sentence was {}. {}", verdict, note.explanation);
        if let Some(correct) = &note.correct {
            println!("  Correct: {}", correct.text);
        }
        if !note.highlights.is_empty() {
            println!("  Look at: {}", note.highlights.join(", "));
        }
    }
    print_next(&reply.next);
}

fn print_summary(summary: &DaySummary) {
    println!("\n  Day over.");
    println!("  Agreed: {}", summary.matched);
    println!("  Disputes: {}", summary.disputes);
    println!("  Balance: {}", summary.balance);
}
