use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use rag_cost_core::cost::{
    estimate_workload, CostCalculator, EmbeddingModel, EmbeddingWorkload, GenerativeModel,
    ModelPricing, WorkloadScenario,
};
use rag_cost_core::observability::{setup_logging, LogFormat, MetricsCollector};
use rag_cost_core::pipeline::{ImmediateScheduler, LatencyScheduler, TokioScheduler};
use rag_cost_core::session::Role;
use rag_cost_core::tokens::estimate_tokens;
use rag_cost_core::{ChatSimulator, SimulatorConfig, TurnSelection};

#[derive(Parser, Debug)]
#[command(
    name = "rag-cost",
    about = "Estimate token usage and cost of RAG chat turns against published model rates"
)]
struct Cli {
    /// Emit logs as JSON on stderr
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate the token count of a piece of text
    Estimate {
        text: String,
    },

    /// Price explicit token counts on a model
    Cost {
        #[arg(long, default_value = "gpt-4o")]
        model: String,

        #[arg(long, allow_negative_numbers = true)]
        input_tokens: i64,

        #[arg(long, allow_negative_numbers = true)]
        output_tokens: i64,

        /// Embedding tokens to charge alongside the request
        #[arg(long, allow_negative_numbers = true)]
        embedding_tokens: Option<i64>,

        #[arg(long, default_value = "text-embedding-3-small")]
        embedding_model: String,
    },

    /// Estimate an embedding workload over a corpus or a query volume
    Batch {
        #[arg(long, value_enum, default_value_t = ScenarioArg::Corpus)]
        scenario: ScenarioArg,

        #[arg(long, default_value_t = 180, allow_negative_numbers = true)]
        tokens_per_item: i64,

        #[arg(long, default_value_t = 4000, allow_negative_numbers = true)]
        items: i64,

        #[arg(long, default_value = "text-embedding-3-small")]
        embedding_model: String,
    },

    /// List every priced model
    Models,

    /// Run chat turns through the simulated pipeline
    Simulate {
        /// TOML file with simulator settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Generative model, overrides the config default
        #[arg(long)]
        model: Option<String>,

        /// Embedding model, overrides the config default
        #[arg(long)]
        embedding_model: Option<String>,

        /// Skip embedding, search, rank and prompt stages
        #[arg(long, default_value_t = false)]
        no_rag: bool,

        /// Do not wait out simulated stage latencies
        #[arg(long, default_value_t = false)]
        fast: bool,

        /// Print the session snapshot as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Print Prometheus metrics after the run
        #[arg(long, default_value_t = false)]
        metrics: bool,

        #[arg(required = true)]
        queries: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioArg {
    Corpus,
    Query,
}

impl From<ScenarioArg> for WorkloadScenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Corpus => WorkloadScenario::Corpus,
            ScenarioArg::Query => WorkloadScenario::Query,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    match cli.command {
        Command::Estimate { text } => {
            println!("characters: {}", text.chars().count());
            println!("tokens:     {}", estimate_tokens(&text));
        }
        Command::Cost {
            model,
            input_tokens,
            output_tokens,
            embedding_tokens,
            embedding_model,
        } => {
            let model: GenerativeModel = model.parse()?;
            let embedding = match embedding_tokens {
                Some(tokens) => Some((tokens, embedding_model.parse::<EmbeddingModel>()?)),
                None => None,
            };
            let breakdown = CostCalculator::new()
                .cost_from_raw(input_tokens, output_tokens, model, embedding, embedding.is_some())
                .context("failed to price request")?;
            println!("model:          {}", model.label());
            println!("input cost:     ${:.6}", breakdown.input_cost);
            println!("output cost:    ${:.6}", breakdown.output_cost);
            println!("embedding cost: ${:.6}", breakdown.embedding_cost);
            println!("total cost:     ${:.6}", breakdown.total_cost);
        }
        Command::Batch {
            scenario,
            tokens_per_item,
            items,
            embedding_model,
        } => {
            let model: EmbeddingModel = embedding_model.parse()?;
            let workload = EmbeddingWorkload::new(scenario.into(), tokens_per_item, items, model)?;
            let estimate = estimate_workload(&CostCalculator::new(), &workload)?;
            println!(
                "{} {} x {} tokens on {}",
                workload.item_count,
                workload.scenario.item_label(),
                workload.tokens_per_item,
                model
            );
            println!("total tokens:   {}", estimate.total_tokens);
            println!("million tokens: {:.4}", estimate.million_tokens);
            println!("total cost:     ${:.4}", estimate.total_cost);
        }
        Command::Models => {
            for descriptor in CostCalculator::new().catalog().entries() {
                match descriptor.pricing {
                    ModelPricing::Generative {
                        input_price_per_1m,
                        output_price_per_1m,
                    } => println!(
                        "{:<24} {:<20} in ${:>6.2}/1M  out ${:>6.2}/1M",
                        descriptor.id.id(),
                        descriptor.label,
                        input_price_per_1m,
                        output_price_per_1m
                    ),
                    ModelPricing::Embedding { price_per_1m } => println!(
                        "{:<24} {:<20} ${:>6.2}/1M",
                        descriptor.id.id(),
                        descriptor.label,
                        price_per_1m
                    ),
                }
            }
        }
        Command::Simulate {
            config,
            model,
            embedding_model,
            no_rag,
            fast,
            json,
            metrics,
            queries,
        } => {
            let config = match config {
                Some(path) => SimulatorConfig::load(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => SimulatorConfig::default(),
            };
            simulate(&config, model, embedding_model, no_rag, fast, json, metrics, &queries).await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    config: &SimulatorConfig,
    model: Option<String>,
    embedding_model: Option<String>,
    no_rag: bool,
    fast: bool,
    json: bool,
    with_metrics: bool,
    queries: &[String],
) -> Result<()> {
    let selection = TurnSelection {
        model: match model {
            Some(id) => id.parse()?,
            None => config.default_model,
        },
        embedding_model: match embedding_model {
            Some(id) => id.parse()?,
            None => config.default_embedding_model,
        },
        include_retrieval: config.include_retrieval && !no_rag,
    };

    let scheduler: Box<dyn LatencyScheduler> = if fast {
        Box::new(ImmediateScheduler)
    } else {
        Box::new(TokioScheduler)
    };
    let mut simulator = ChatSimulator::from_config(config, scheduler)?;
    if with_metrics {
        simulator = simulator.with_metrics(MetricsCollector::new()?);
    }

    for query in queries {
        if simulator.send(query, selection).await?.is_none() {
            bail!("query must not be blank");
        }
        if !json {
            print_turn(&simulator);
        }
    }

    if json {
        println!("{}", simulator.session().to_json()?);
    } else {
        let totals = simulator.session().totals();
        println!("=== session totals ({} turns) ===", totals.turns);
        println!("input tokens:     {}", totals.input_tokens);
        println!("output tokens:    {}", totals.output_tokens);
        println!("embedding tokens: {}", totals.embedding_tokens);
        println!("session tokens:   {}", totals.session_tokens());
        println!("input cost:       ${:.6}", totals.input_cost);
        println!("output cost:      ${:.6}", totals.output_cost);
        println!("embedding cost:   ${:.6}", totals.embedding_cost);
        println!("total cost:       ${:.6}", totals.total_cost);
    }

    if let Some(metrics) = simulator.metrics() {
        print!("{}", metrics.export()?);
    }
    Ok(())
}

fn print_turn(simulator: &ChatSimulator) {
    let session = simulator.session();
    let last_two = session.messages().len().saturating_sub(2);
    for message in &session.messages()[last_two..] {
        let who = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("[{}] ({} tokens, ${:.6})", who, message.tokens, message.cost);
        println!("{}\n", message.content);
    }

    for stage in session.stages() {
        let tokens = stage.tokens.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
        let cost = stage
            .cost
            .map(|c| format!("${:.6}", c))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<28} {:<10} {:>6} {:>10}", stage.title, stage.status.label(), tokens, cost);
    }
    if !session.matched_records().is_empty() {
        let ids: Vec<&str> = session.matched_records().iter().map(|r| r.id.as_str()).collect();
        println!("  matched: {}", ids.join(", "));
    }
    println!();
}
